//! Elastic-net CCA (Waaijenborg, Verselewel de Witt Hamer & Zwinderman, 2008)
//! and its lasso special case SCCA-IPLS (Mai & Zhang, 2019).
//!
//! Every view is regressed onto a target with an elastic-net penalty: the
//! normalized mean of all views' scores (MAXVAR) or the previous view's
//! scores (SUMCOR, rescaled afterwards so the projection has norm `sqrt(n)`).

use crate::convergence::{Direction, StoppingRule};
use crate::errors::CcaError;
use crate::estimator::{FittedModel, IterativeEstimator, IterativeOptions, fit_deflated, prepare};
use crate::inner_loop::{AlternatingScheme, LoopState};
use crate::params::{PerView, at_least, in_closed_range};
use crate::regularizer::{ElasticRegularizer, ElasticTarget, UpdateTarget, ViewRegularizer};
use ndarray::Array2;

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticConfig {
    /// Overall penalty strength per view; zero switches that view to ridge
    /// regression with penalty `tol`.
    pub alpha: PerView<f64>,
    /// Share of the penalty that is L1, in `[0, 1]`.
    pub l1_ratio: PerView<f64>,
    /// Regress onto the consensus of all views instead of the sister view.
    pub maxvar: bool,
    pub positive: PerView<bool>,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            alpha: PerView::Shared(0.0),
            l1_ratio: PerView::Shared(0.0),
            maxvar: true,
            positive: PerView::Shared(false),
        }
    }
}

impl ElasticConfig {
    /// Lasso penalties chasing the sister view.
    pub fn scca_ipls(alpha: PerView<f64>) -> Self {
        Self {
            alpha,
            l1_ratio: PerView::Shared(1.0),
            maxvar: false,
            positive: PerView::Shared(false),
        }
    }
}

struct ElasticScheme {
    regularizer: ElasticRegularizer,
}

impl AlternatingScheme for ElasticScheme {
    fn direction(&self) -> Direction {
        Direction::Minimize
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

    fn objective(&mut self, _: &[Array2<f64>], state: &LoopState) -> f64 {
        let mut total = 0.0;
        for (view, (scores, weights)) in state.scores.iter().zip(state.weights.iter()).enumerate() {
            let target = self.regularizer.target(&state.scores, view);
            let n = scores.nrows() as f64;
            let misfit = (scores - &target).mapv(|r| r * r).sum() / (2.0 * n);
            total += misfit + self.regularizer.cost(view, weights);
        }
        total
    }
}

#[derive(Debug, Clone)]
pub struct ElasticCca {
    pub options: IterativeOptions,
    pub config: ElasticConfig,
    fitted: Option<FittedModel>,
}

impl ElasticCca {
    pub fn new(options: IterativeOptions, config: ElasticConfig) -> Self {
        Self {
            options,
            config,
            fitted: None,
        }
    }

    /// Options tuned for regression targets: a much tighter tolerance than
    /// the power-step variants.
    pub fn default_options() -> IterativeOptions {
        IterativeOptions {
            tol: 1e-9,
            ..Default::default()
        }
    }

    pub fn scca_ipls(options: IterativeOptions, alpha: PerView<f64>) -> Self {
        Self::new(options, ElasticConfig::scca_ipls(alpha))
    }
}

impl Default for ElasticCca {
    fn default() -> Self {
        Self::new(Self::default_options(), ElasticConfig::default())
    }
}

impl IterativeEstimator for ElasticCca {
    fn options(&self) -> &IterativeOptions {
        &self.options
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn fit(&mut self, views: &[Array2<f64>]) -> Result<&FittedModel, CcaError> {
        self.fitted = None;
        let prepared = prepare(views, &self.options)?;
        let n_views = prepared.views.len();
        let alpha = self.config.alpha.resolve("alpha", n_views, at_least(0.0))?;
        let l1_ratio = self
            .config
            .l1_ratio
            .resolve("l1_ratio", n_views, in_closed_range(0.0, 1.0))?;
        let positive = self.config.positive.broadcast("positive", n_views)?;
        let mode = if self.config.maxvar {
            ElasticTarget::Maxvar
        } else {
            ElasticTarget::Sumcor
        };
        let tol = self.options.tol;
        log::info!("Fitting elastic-net CCA ({mode:?}) with alpha {alpha:?}, l1_ratio {l1_ratio:?}");

        let model = fit_deflated(prepared, &self.options, |_, _, _| {
            let regularizer =
                ElasticRegularizer::new(alpha.clone(), l1_ratio.clone(), positive.clone(), mode, tol)?;
            Ok(ElasticScheme { regularizer })
        })?;
        Ok(self.fitted.insert(model))
    }
}
