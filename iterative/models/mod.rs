//! The iterative estimators.

pub mod altmaxvar;
pub mod elastic;
pub mod parkhomenko;
pub mod pls_als;
pub mod pmd;
pub mod span;

pub use altmaxvar::{AltMaxVar, AltMaxVarConfig, ProximalChoice};
pub use elastic::{ElasticCca, ElasticConfig};
pub use parkhomenko::{Parkhomenko, ParkhomenkoConfig};
pub use pls_als::PlsAls;
pub use pmd::{Pmd, PmdConfig};
pub use span::{Span, SpanConfig, SpanPenalty};

use crate::convergence::{Direction, StoppingRule};
use crate::errors::CcaError;
use crate::inner_loop::{AlternatingScheme, LoopState};
use crate::metrics::{Agreement, masked_correlation};
use crate::regularizer::{UpdateTarget, ViewRegularizer};
use ndarray::Array2;

/// `Σ_{i≠j} Σ_k agreement(s_i[:, k], s_j[:, k])`, where covariance is the
/// plain inner product over `n` (scores are centred).
pub(crate) fn pairwise_objective(scores: &[Array2<f64>], agreement: Agreement) -> f64 {
    let mut total = 0.0;
    for (i, a) in scores.iter().enumerate() {
        for (j, b) in scores.iter().enumerate() {
            if i == j {
                continue;
            }
            for (x, y) in a.columns().into_iter().zip(b.columns()) {
                total += match agreement {
                    Agreement::Covariance => x.dot(&y) / x.len() as f64,
                    Agreement::Correlation => masked_correlation(x, y),
                };
            }
        }
    }
    total
}

/// Power-iteration family: every view is updated from the sum of the other
/// views' scores and the sweep maximizes their pairwise agreement.
pub(crate) struct PowerScheme<R> {
    regularizer: R,
    agreement: Agreement,
}

impl<R: ViewRegularizer> PowerScheme<R> {
    pub(crate) fn new(regularizer: R, agreement: Agreement) -> Self {
        Self {
            regularizer,
            agreement,
        }
    }
}

impl<R: ViewRegularizer> AlternatingScheme for PowerScheme<R> {
    fn direction(&self) -> Direction {
        Direction::Maximize
    }

    fn stopping_rule(&self) -> StoppingRule {
        StoppingRule::AbsoluteChange
    }

    fn update_view(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        state: &LoopState,
    ) -> Result<Array2<f64>, CcaError> {
        self.regularizer.update(
            views,
            view,
            &state.weights[view],
            UpdateTarget::Scores(&state.scores),
        )
    }

    /// Pairwise agreement minus every view's penalty.
    fn objective(&mut self, _: &[Array2<f64>], state: &LoopState) -> f64 {
        let penalty: f64 = state
            .weights
            .iter()
            .enumerate()
            .map(|(view, weights)| self.regularizer.cost(view, weights))
            .sum();
        pairwise_objective(&state.scores, self.agreement) - penalty
    }
}
