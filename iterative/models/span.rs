//! Sparse CCA by low-rank span search (Asteris, Kyrillidis, Koyejo & Dimakis, 2016).
//!
//! Two views only. The cross-covariance `C = XᵗY / n` is replaced by its rank-r
//! truncation `U S Vᵗ`. Every iteration samples a direction in the span of
//! `U S`, sparsifies it into the first view's weights, answers with the best
//! sparse weights for the second view, and keeps the best pair seen.

use crate::convergence::{Direction, StoppingRule};
use crate::errors::CcaError;
use crate::estimator::{FittedModel, IterativeEstimator, IterativeOptions, fit_deflated, prepare};
use crate::inner_loop::{AlternatingScheme, LoopState};
use crate::linalg::faer_ndarray::FaerSvd;
use crate::params::{PerView, at_least};
use crate::search::{delta_search, keep_top_k, l2_norm};
use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;

/// How sampled directions are made sparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanPenalty {
    /// Keep the `c` largest entries.
    #[default]
    L0,
    /// Project onto the unit sphere intersected with the L1 ball of radius `c`.
    L1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpanConfig {
    /// Sparsity per view; `None` leaves the weights dense.
    pub c: Option<PerView<f64>>,
    pub penalty: SpanPenalty,
    /// Rank of the cross-covariance approximation.
    pub rank: usize,
}

impl Default for SpanConfig {
    fn default() -> Self {
        Self {
            c: None,
            penalty: SpanPenalty::L0,
            rank: 1,
        }
    }
}

struct SpanScheme {
    /// `U S`, the basis directions are drawn from.
    left: Array2<f64>,
    /// `V S`, used to answer for the second view.
    right: Array2<f64>,
    /// `Uᵗ`, to express the first view's weights in the basis.
    left_t: Array2<f64>,
    covariance: Array2<f64>,
    c: Option<Vec<f64>>,
    penalty: SpanPenalty,
    tol: f64,
    rng: StdRng,
    best: f64,
}

impl SpanScheme {
    fn new(
        views: &[Array2<f64>],
        rank: usize,
        c: Option<Vec<f64>>,
        penalty: SpanPenalty,
        tol: f64,
        rng: StdRng,
    ) -> Result<Self, CcaError> {
        let n = views[0].nrows() as f64;
        let covariance = views[0].t().dot(&views[1]) / n;
        let (u, singular, vt) = covariance.thin_svd()?;
        let r = rank.min(singular.len());
        let u = u.slice(s![.., ..r]).to_owned();
        let scale = singular.slice(s![..r]).to_owned().insert_axis(Axis(0));
        let v = vt.slice(s![..r, ..]).t().to_owned();
        Ok(Self {
            left: &u * &scale,
            right: &v * &scale,
            left_t: u.t().to_owned(),
            covariance,
            c,
            penalty,
            tol,
            rng,
            best: f64::NEG_INFINITY,
        })
    }

    fn sparsify(&self, direction: ArrayView1<f64>, view: usize) -> Array1<f64> {
        let sparse = match (&self.c, self.penalty) {
            (None, _) => direction.to_owned(),
            (Some(c), SpanPenalty::L0) => keep_top_k(&direction, c[view].floor() as usize),
            (Some(c), SpanPenalty::L1) => delta_search(&direction, c[view], self.tol).weights,
        };
        let norm = l2_norm(&sparse);
        if norm > 0.0 {
            sparse / norm
        } else {
            sparse
        }
    }
}

impl AlternatingScheme for SpanScheme {
    fn direction(&self) -> Direction {
        Direction::Maximize
    }

    fn stopping_rule(&self) -> StoppingRule {
        StoppingRule::FixedBudget
    }

    fn update_view(
        &mut self,
        _: &[Array2<f64>],
        view: usize,
        state: &LoopState,
    ) -> Result<Array2<f64>, CcaError> {
        let direction = if view == 0 {
            let rank = self.left.ncols();
            let mut sample: Array1<f64> =
                Array1::from_shape_simple_fn(rank, || self.rng.sample(StandardNormal));
            let norm = l2_norm(&sample);
            if norm > 0.0 {
                sample /= norm;
            }
            self.left.dot(&sample)
        } else {
            let first = state.weights[0].column(0);
            self.right.dot(&self.left_t.dot(&first))
        };
        let weights = self.sparsify(direction.view(), view);
        Ok(weights.insert_axis(Axis(1)))
    }

    fn objective(&mut self, _: &[Array2<f64>], state: &LoopState) -> f64 {
        let u = state.weights[0].column(0);
        let v = state.weights[1].column(0);
        let value = u.dot(&self.covariance.dot(&v));
        if value > self.best {
            self.best = value;
        }
        self.best
    }
}

#[derive(Debug, Clone, Default)]
pub struct Span {
    pub options: IterativeOptions,
    pub config: SpanConfig,
    fitted: Option<FittedModel>,
}

impl Span {
    pub fn new(options: IterativeOptions, config: SpanConfig) -> Self {
        Self {
            options,
            config,
            fitted: None,
        }
    }
}

impl IterativeEstimator for Span {
    fn options(&self) -> &IterativeOptions {
        &self.options
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn fit(&mut self, views: &[Array2<f64>]) -> Result<&FittedModel, CcaError> {
        self.fitted = None;
        let prepared = prepare(views, &self.options)?;
        if prepared.views.len() != 2 {
            return Err(CcaError::invalid(
                "views",
                format!("span search needs exactly two views, got {}", prepared.views.len()),
            ));
        }
        if self.config.rank == 0 {
            return Err(CcaError::invalid("rank", "must be at least 1"));
        }
        let c = match &self.config.c {
            Some(c) => Some(c.resolve("c", 2, at_least(1.0))?),
            None => None,
        };
        let penalty = self.config.penalty;
        let rank = self.config.rank;
        let tol = self.options.tol;
        log::info!("Fitting span CCA with rank {rank}, {penalty:?} sparsity {c:?}");

        let model = fit_deflated(prepared, &self.options, |residuals, _, rng| {
            let stream = StdRng::seed_from_u64(rng.next_u64());
            SpanScheme::new(residuals, rank, c.clone(), penalty, tol, stream)
        })?;
        Ok(self.fitted.insert(model))
    }
}
