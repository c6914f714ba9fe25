//! Per-view update rules.
//!
//! A [`ViewRegularizer`] turns the current state of the other views into new
//! weights for one view and reports the penalty those weights carry. The
//! three families are the delta-search power step (PMD, PLS-ALS), proximal
//! gradient towards a consensus target (AltMaxVar), and elastic-net
//! regression towards a MAXVAR or SUMCOR target (ElasticCCA, SCCA-IPLS).
//! Parkhomenko's thresholded power step lives here too.

use crate::errors::CcaError;
use crate::linalg::regression::{ElasticNet, RegularizedLeastSquares, Ridge};
use crate::proximal::ProximalOperator;
use crate::search::{delta_search, l1_norm, l2_norm, soft_threshold};
use ndarray::{Array1, Array2, ArrayView2, Zip};
use std::sync::Arc;

/// What an update is steered by.
#[derive(Debug, Clone, Copy)]
pub enum UpdateTarget<'a> {
    /// Current scores of every view, one `(n, k)` block each.
    Scores(&'a [Array2<f64>]),
    /// A shared `(n, k)` consensus target.
    Consensus(&'a Array2<f64>),
}

pub trait ViewRegularizer {
    fn update(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        current: &Array2<f64>,
        target: UpdateTarget<'_>,
    ) -> Result<Array2<f64>, CcaError>;

    /// Penalty carried by `weights` for `view`.
    fn cost(&self, view: usize, weights: &Array2<f64>) -> f64;
}

/// `Σ_{j≠view} scores[j]`.
pub fn sum_of_others(scores: &[Array2<f64>], view: usize) -> Array2<f64> {
    let mut total = Array2::zeros(scores[view].raw_dim());
    for (j, s) in scores.iter().enumerate() {
        if j != view {
            total += s;
        }
    }
    total
}

/// Element-wise mean of the score blocks.
pub fn mean_scores(scores: &[Array2<f64>]) -> Array2<f64> {
    let mut total = Array2::zeros(scores[0].raw_dim());
    for s in scores {
        total += s;
    }
    total / scores.len() as f64
}

/// Candidate columns smaller than this, relative to `||X_i|| ||target||`, are
/// rounding noise and treated as zero.
const CANDIDATE_FLOOR: f64 = 1e-10;

/// `X_iᵗ (Σ_{j≠i} s_j)` or `X_iᵗ G`.
fn power_candidate(views: &[Array2<f64>], view: usize, target: UpdateTarget<'_>) -> Array2<f64> {
    let data = &views[view];
    let goal = match target {
        UpdateTarget::Scores(scores) => sum_of_others(scores, view),
        UpdateTarget::Consensus(consensus) => consensus.clone(),
    };
    let mut candidate = data.t().dot(&goal);
    let data_norm = l2_norm(data);
    for (mut column, target_column) in candidate.columns_mut().into_iter().zip(goal.columns()) {
        if l2_norm(&column) <= CANDIDATE_FLOOR * data_norm * l2_norm(&target_column) {
            column.fill(0.0);
        }
    }
    candidate
}

fn clip_negative(weights: &mut Array2<f64>) {
    weights.mapv_inplace(|w| w.max(0.0));
}

/// Power step projected onto `{||w||₂ = 1, ||w||₁ <= bound}` per latent dimension.
///
/// An infinite bound gives the plain PLS power step.
#[derive(Debug, Clone)]
pub struct DeltaSearchRegularizer {
    bounds: Vec<f64>,
    positive: Vec<bool>,
    tol: f64,
}

impl DeltaSearchRegularizer {
    pub fn new(bounds: Vec<f64>, positive: Vec<bool>, tol: f64) -> Self {
        Self {
            bounds,
            positive,
            tol,
        }
    }

    /// PMD bounds `max(1, tau_i * sqrt(p_i))`.
    pub fn pmd(tau: &[f64], features: &[usize], positive: Vec<bool>, tol: f64) -> Self {
        let bounds = tau
            .iter()
            .zip(features.iter())
            .map(|(t, &p)| (t * (p as f64).sqrt()).max(1.0))
            .collect();
        Self::new(bounds, positive, tol)
    }

    pub fn unconstrained(n_views: usize) -> Self {
        Self::new(vec![f64::INFINITY; n_views], vec![false; n_views], 0.0)
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }
}

impl ViewRegularizer for DeltaSearchRegularizer {
    fn update(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        _: &Array2<f64>,
        target: UpdateTarget<'_>,
    ) -> Result<Array2<f64>, CcaError> {
        let mut candidate = power_candidate(views, view, target);
        if self.positive[view] {
            clip_negative(&mut candidate);
        }
        let mut updated = Array2::zeros(candidate.raw_dim());
        for (column, values) in candidate.columns().into_iter().enumerate() {
            let search = delta_search(&values, self.bounds[view], self.tol);
            if !search.converged {
                log::warn!(
                    "Delta search for view {view} did not reach the L1 bound {:.4} after {} steps; using the closest feasible weights.",
                    self.bounds[view],
                    search.iterations
                );
            }
            updated.column_mut(column).assign(&search.weights);
        }
        Ok(updated)
    }

    fn cost(&self, view: usize, weights: &Array2<f64>) -> f64 {
        let slack = 1e-9 * self.bounds[view].max(1.0);
        let feasible = weights
            .columns()
            .into_iter()
            .all(|column| l1_norm(&column) <= self.bounds[view] + slack);
        if feasible { 0.0 } else { f64::INFINITY }
    }
}

/// Soft-thresholded power step of Parkhomenko et al.: the unit-norm candidate
/// is shrunk by `tau_i / 2` and renormalized.
#[derive(Debug, Clone)]
pub struct ThresholdedPowerRegularizer {
    tau: Vec<f64>,
}

impl ThresholdedPowerRegularizer {
    pub fn new(tau: Vec<f64>) -> Self {
        Self { tau }
    }
}

impl ViewRegularizer for ThresholdedPowerRegularizer {
    fn update(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        current: &Array2<f64>,
        target: UpdateTarget<'_>,
    ) -> Result<Array2<f64>, CcaError> {
        let candidate = power_candidate(views, view, target);
        let threshold = self.tau[view] / 2.0;
        let mut updated = current.clone();
        for (column, values) in candidate.columns().into_iter().enumerate() {
            let norm = l2_norm(&values);
            if norm == 0.0 {
                continue;
            }
            let unit = values.mapv(|v| v / norm);
            if unit.iter().all(|v| v.abs() <= threshold) {
                log::warn!(
                    "All weights of view {view} fall below the threshold {threshold:.4}; keeping the previous weights. Try a smaller tau."
                );
                continue;
            }
            let shrunk = soft_threshold(&unit, threshold);
            let shrunk_norm = l2_norm(&shrunk);
            updated
                .column_mut(column)
                .assign(&shrunk.mapv(|v| v / shrunk_norm));
        }
        Ok(updated)
    }

    fn cost(&self, view: usize, weights: &Array2<f64>) -> f64 {
        self.tau[view] * l1_norm(weights)
    }
}

/// Proximal gradient on `½||X_i W − G||² + f_i(W)` with a fixed step size.
#[derive(Debug, Clone)]
pub struct ProximalGradientRegularizer {
    proximals: Vec<Arc<dyn ProximalOperator>>,
    positive: Vec<bool>,
    learning_rates: Vec<f64>,
    max_steps: usize,
}

/// Relative and absolute tolerances for "successive iterates are equal".
const ALLCLOSE_RTOL: f64 = 1e-5;
const ALLCLOSE_ATOL: f64 = 1e-8;

fn allclose(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    Zip::from(a)
        .and(b)
        .all(|&x, &y| (x - y).abs() <= ALLCLOSE_ATOL + ALLCLOSE_RTOL * y.abs())
}

impl ProximalGradientRegularizer {
    pub fn new(
        proximals: Vec<Arc<dyn ProximalOperator>>,
        positive: Vec<bool>,
        learning_rates: Vec<f64>,
        max_steps: usize,
    ) -> Self {
        Self {
            proximals,
            positive,
            learning_rates,
            max_steps,
        }
    }

    fn prox_step(&self, view: usize, weights: ArrayView2<f64>, step: f64) -> Result<Array2<f64>, CcaError> {
        let mut next = self.proximals[view].prox(weights, step)?;
        if self.positive[view] {
            clip_negative(&mut next);
        }
        Ok(next)
    }
}

impl ViewRegularizer for ProximalGradientRegularizer {
    fn update(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        current: &Array2<f64>,
        target: UpdateTarget<'_>,
    ) -> Result<Array2<f64>, CcaError> {
        let consensus = match target {
            UpdateTarget::Consensus(consensus) => consensus.clone(),
            UpdateTarget::Scores(scores) => mean_scores(scores),
        };
        let data = &views[view];
        let step = self.learning_rates[view];
        let mut weights = current.clone();
        for sub_step in 0..self.max_steps {
            let residual = data.dot(&weights) - &consensus;
            let gradient = data.t().dot(&residual);
            let moved = &weights - &(gradient * step);
            let next = self.prox_step(view, moved.view(), step)?;
            let settled = allclose(&next, &weights);
            weights = next;
            if settled {
                log::trace!("View {view} proximal steps settled after {}", sub_step + 1);
                break;
            }
        }
        Ok(weights)
    }

    fn cost(&self, view: usize, weights: &Array2<f64>) -> f64 {
        self.proximals[view].cost(weights.view())
    }
}

/// Which target the elastic-net regressions chase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElasticTarget {
    /// Mean of every view's scores, rescaled to norm `sqrt(n)`.
    Maxvar,
    /// The previous view's scores (view 0 uses the last view).
    Sumcor,
}

/// Smallest `||X_i w||` accepted before SUMCOR rescaling.
const RESCALE_FLOOR: f64 = 1e-12;

/// Elastic-net regression of each view onto a MAXVAR or SUMCOR target.
pub struct ElasticRegularizer {
    solvers: Vec<Box<dyn RegularizedLeastSquares + Send>>,
    alpha: Vec<f64>,
    l1_ratio: Vec<f64>,
    mode: ElasticTarget,
}

impl ElasticRegularizer {
    /// Views with `alpha == 0` fall back to ridge regression with penalty `tol`.
    pub fn new(
        alpha: Vec<f64>,
        l1_ratio: Vec<f64>,
        positive: Vec<bool>,
        mode: ElasticTarget,
        tol: f64,
    ) -> Result<Self, CcaError> {
        let mut solvers: Vec<Box<dyn RegularizedLeastSquares + Send>> =
            Vec::with_capacity(alpha.len());
        for ((&a, &ratio), &pos) in alpha.iter().zip(l1_ratio.iter()).zip(positive.iter()) {
            if a == 0.0 {
                solvers.push(Box::new(Ridge::new(tol, pos)?));
            } else {
                solvers.push(Box::new(ElasticNet::new(a, ratio, pos)?));
            }
        }
        Ok(Self {
            solvers,
            alpha,
            l1_ratio,
            mode,
        })
    }

    /// The regression target for `view` given the current scores.
    pub fn target(&self, scores: &[Array2<f64>], view: usize) -> Array2<f64> {
        match self.mode {
            ElasticTarget::Maxvar => {
                let mean = mean_scores(scores);
                let n = mean.nrows() as f64;
                let norm = l2_norm(&mean);
                if norm > 0.0 {
                    mean * (n.sqrt() / norm)
                } else {
                    mean
                }
            }
            ElasticTarget::Sumcor => {
                let sister = if view == 0 { scores.len() - 1 } else { view - 1 };
                scores[sister].clone()
            }
        }
    }
}

impl ViewRegularizer for ElasticRegularizer {
    fn update(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        current: &Array2<f64>,
        target: UpdateTarget<'_>,
    ) -> Result<Array2<f64>, CcaError> {
        let goal = match target {
            UpdateTarget::Scores(scores) => self.target(scores, view),
            UpdateTarget::Consensus(consensus) => consensus.clone(),
        };
        let data = &views[view];
        let mut updated = Array2::zeros(current.raw_dim());
        for (column, y) in goal.columns().into_iter().enumerate() {
            let coef: Array1<f64> = self.solvers[view].fit(data.view(), y)?;
            updated.column_mut(column).assign(&coef);
        }
        if self.mode == ElasticTarget::Sumcor {
            let n = data.nrows() as f64;
            for (column, mut w) in updated.columns_mut().into_iter().enumerate() {
                let projected = l2_norm(&data.dot(&w));
                if w.iter().all(|v| *v == 0.0) || !(projected > RESCALE_FLOOR) {
                    return Err(CcaError::DegenerateWeights {
                        view,
                        reason: format!(
                            "regression weights for latent dimension {column} are numerically zero; lower the regularization"
                        ),
                    });
                }
                w.mapv_inplace(|v| v * n.sqrt() / projected);
            }
        }
        Ok(updated)
    }

    fn cost(&self, view: usize, weights: &Array2<f64>) -> f64 {
        let l1 = self.alpha[view] * self.l1_ratio[view];
        let l2 = self.alpha[view] * (1.0 - self.l1_ratio[view]);
        l1 * l1_norm(weights) + 0.5 * l2 * weights.iter().map(|w| w * w).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximal::{ProximalKind, ProximalParams};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn views() -> Vec<Array2<f64>> {
        vec![
            array![[1.0, 0.5, -1.0], [-1.0, 0.2, 0.5], [0.5, -0.4, 1.5], [-0.5, -0.3, -1.0]],
            array![[0.9, 0.1], [-1.1, 0.3], [0.4, -0.2], [-0.2, -0.2]],
        ]
    }

    #[test]
    fn unconstrained_power_step_is_unit_norm_cross_product() {
        let views = views();
        let scores: Vec<Array2<f64>> = views
            .iter()
            .map(|v| v.dot(&Array2::ones((v.ncols(), 1))))
            .collect();
        let mut reg = DeltaSearchRegularizer::unconstrained(2);
        let current = Array2::zeros((3, 1));
        let out = reg
            .update(&views, 0, &current, UpdateTarget::Scores(&scores))
            .unwrap();
        let expected = views[0].t().dot(&scores[1]);
        let norm = l2_norm(&expected);
        for (a, b) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, b / norm, epsilon = 1e-12);
        }
    }

    #[test]
    fn pmd_bound_clamps_to_one() {
        let reg = DeltaSearchRegularizer::pmd(&[0.0, 1.0], &[9, 4], vec![false, false], 1e-6);
        assert_eq!(reg.bounds(), &[1.0, 2.0]);
    }

    #[test]
    fn positive_power_step_has_no_negative_entries() {
        let views = views();
        let consensus = array![[1.0], [-1.0], [1.0], [-1.0]];
        let mut reg = DeltaSearchRegularizer::new(vec![1.5, 1.5], vec![true, true], 1e-8);
        let out = reg
            .update(&views, 0, &Array2::zeros((3, 1)), UpdateTarget::Consensus(&consensus))
            .unwrap();
        assert!(out.iter().all(|w| *w >= 0.0));
        assert_abs_diff_eq!(l2_norm(&out), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn thresholding_everything_keeps_previous_weights() {
        let views = views();
        let scores: Vec<Array2<f64>> = views
            .iter()
            .map(|v| v.dot(&Array2::ones((v.ncols(), 1))))
            .collect();
        let previous = array![[0.0], [1.0], [0.0]];
        let mut reg = ThresholdedPowerRegularizer::new(vec![2.0, 2.0]);
        let out = reg
            .update(&views, 0, &previous, UpdateTarget::Scores(&scores))
            .unwrap();
        assert_eq!(out, previous);
    }

    #[test]
    fn proximal_gradient_without_penalty_solves_least_squares() {
        let x = array![[1.0, 0.0], [0.0, 2.0], [0.0, 0.0]];
        let g = array![[1.0], [1.0], [0.0]];
        let l2 = ProximalKind::L2.build(&ProximalParams::with_sigma(0.0)).unwrap();
        let proximal: Arc<dyn ProximalOperator> = Arc::new(l2);
        let mut reg = ProximalGradientRegularizer::new(vec![proximal], vec![false], vec![0.2], 500);
        let out = reg
            .update(&[x], 0, &Array2::zeros((2, 1)), UpdateTarget::Consensus(&g))
            .unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(out[[1, 0]], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn sumcor_rescales_projection_to_sqrt_n() {
        let views = views();
        let scores: Vec<Array2<f64>> = views
            .iter()
            .map(|v| v.dot(&Array2::ones((v.ncols(), 1))))
            .collect();
        let mut reg = ElasticRegularizer::new(
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            vec![false, false],
            ElasticTarget::Sumcor,
            1e-9,
        )
        .unwrap();
        let out = reg
            .update(&views, 1, &Array2::zeros((2, 1)), UpdateTarget::Scores(&scores))
            .unwrap();
        assert_abs_diff_eq!(l2_norm(&views[1].dot(&out)), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn sumcor_zero_regression_is_degenerate() {
        let views = views();
        let scores: Vec<Array2<f64>> = views
            .iter()
            .map(|v| v.dot(&Array2::ones((v.ncols(), 1))))
            .collect();
        let mut reg = ElasticRegularizer::new(
            vec![100.0, 100.0],
            vec![1.0, 1.0],
            vec![false, false],
            ElasticTarget::Sumcor,
            1e-9,
        )
        .unwrap();
        let err = reg
            .update(&views, 0, &Array2::zeros((3, 1)), UpdateTarget::Scores(&scores))
            .unwrap_err();
        assert!(matches!(err, CcaError::DegenerateWeights { view: 0, .. }));
    }

    #[test]
    fn maxvar_target_has_norm_sqrt_n() {
        let reg = ElasticRegularizer::new(
            vec![0.1, 0.1],
            vec![0.5, 0.5],
            vec![false, false],
            ElasticTarget::Maxvar,
            1e-9,
        )
        .unwrap();
        let scores = vec![array![[1.0], [2.0], [0.0], [-1.0]], array![[3.0], [0.0], [1.0], [-1.0]]];
        assert_abs_diff_eq!(l2_norm(&reg.target(&scores, 0)), 2.0, epsilon = 1e-12);
    }
}
