//! Regularized least-squares solvers used as per-view subproblems.
//!
//! Both solvers fit without an intercept; callers are expected to pass centered
//! data. `ElasticNet` minimizes
//!
//! ```text
//! (1 / 2n) ||y - Xw||² + alpha * l1_ratio * ||w||₁ + ½ alpha * (1 - l1_ratio) * ||w||²
//! ```
//!
//! by cyclic coordinate descent, and `Ridge` minimizes `||y - Xw||² + alpha ||w||²`
//! through the normal equations.

use super::faer_ndarray::{FaerCholesky, FaerLinalgError};
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("Design matrix has {rows} rows but the target has {len} entries")]
    DimensionMismatch { rows: usize, len: usize },

    #[error("Regularization strength must be finite and non-negative, got {0}")]
    InvalidAlpha(f64),

    #[error("l1_ratio must lie in [0, 1], got {0}")]
    InvalidL1Ratio(f64),

    #[error("Normal equations could not be factorized: {0}")]
    Factorization(#[from] FaerLinalgError),
}

/// The opaque "solve regularized least squares" capability.
///
/// Implementations may keep state between calls (warm starts), which is why
/// `fit` takes `&mut self`.
pub trait RegularizedLeastSquares {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>)
    -> Result<Array1<f64>, RegressionError>;
}

fn check_shapes(x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<(), RegressionError> {
    if x.nrows() != y.len() {
        return Err(RegressionError::DimensionMismatch {
            rows: x.nrows(),
            len: y.len(),
        });
    }
    Ok(())
}

#[inline]
fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

/// Coordinate-descent elastic net with warm starts and optional non-negativity.
#[derive(Debug, Clone)]
pub struct ElasticNet {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub positive: bool,
    pub max_iter: usize,
    pub tol: f64,
    coef: Option<Array1<f64>>,
}

impl ElasticNet {
    pub fn new(alpha: f64, l1_ratio: f64, positive: bool) -> Result<Self, RegressionError> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(RegressionError::InvalidAlpha(alpha));
        }
        if !(0.0..=1.0).contains(&l1_ratio) {
            return Err(RegressionError::InvalidL1Ratio(l1_ratio));
        }
        Ok(Self {
            alpha,
            l1_ratio,
            positive,
            max_iter: 1000,
            tol: 1e-4,
            coef: None,
        })
    }

    /// Coefficients from the most recent fit, used as the next warm start.
    pub fn coef(&self) -> Option<&Array1<f64>> {
        self.coef.as_ref()
    }
}

impl RegularizedLeastSquares for ElasticNet {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, RegressionError> {
        check_shapes(&x, &y)?;
        let (n, p) = x.dim();
        let n_f = n as f64;
        let l1 = self.alpha * self.l1_ratio;
        let l2 = self.alpha * (1.0 - self.l1_ratio);

        let mut coef = match self.coef.take() {
            Some(previous) if previous.len() == p => previous,
            _ => Array1::zeros(p),
        };
        let column_norms: Array1<f64> = x.map_axis(Axis(0), |col| col.dot(&col) / n_f);
        let mut residual = &y - &x.dot(&coef);

        let mut converged = false;
        for sweep in 0..self.max_iter {
            let mut max_step = 0.0_f64;
            let mut max_coef = 0.0_f64;
            for j in 0..p {
                let denom = column_norms[j] + l2;
                let old = coef[j];
                if denom <= 0.0 {
                    continue;
                }
                let col = x.column(j);
                let rho = col.dot(&residual) / n_f + column_norms[j] * old;
                let mut updated = soft_threshold(rho, l1) / denom;
                if self.positive && updated < 0.0 {
                    updated = 0.0;
                }
                let step = updated - old;
                if step != 0.0 {
                    residual.scaled_add(-step, &col);
                    coef[j] = updated;
                }
                max_step = max_step.max(step.abs());
                max_coef = max_coef.max(updated.abs());
            }
            if max_coef == 0.0 || max_step <= self.tol * max_coef {
                log::trace!("Elastic net converged after {} sweeps", sweep + 1);
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!(
                "Elastic net did not converge in {} sweeps; returning best effort coefficients",
                self.max_iter
            );
        }

        self.coef = Some(coef.clone());
        Ok(coef)
    }
}

/// Ridge regression through the normal equations.
#[derive(Debug, Clone)]
pub struct Ridge {
    pub alpha: f64,
    pub positive: bool,
}

impl Ridge {
    pub fn new(alpha: f64, positive: bool) -> Result<Self, RegressionError> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(RegressionError::InvalidAlpha(alpha));
        }
        Ok(Self { alpha, positive })
    }
}

impl RegularizedLeastSquares for Ridge {
    fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, RegressionError> {
        check_shapes(&x, &y)?;
        if self.positive {
            // ||y - Xw||² + a||w||² is (2n) times the elastic-net objective with l2 = a / n.
            let n = x.nrows().max(1) as f64;
            let mut solver = ElasticNet::new(self.alpha / n, 0.0, true)?;
            return solver.fit(x, y);
        }
        let p = x.ncols();
        let mut gram: Array2<f64> = x.t().dot(&x);
        for i in 0..p {
            gram[[i, i]] += self.alpha;
        }
        let rhs = x.t().dot(&y);
        let factor = gram.cholesky(Side::Lower)?;
        Ok(factor.solve_vec(&rhs))
    }
}
