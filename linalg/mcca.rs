//! Closed-form regularized multiview CCA.
//!
//! Solves the generalized symmetric eigenproblem `C v = λ D v` where `C` holds the
//! between-view covariance blocks (within-view blocks zeroed) and
//! `D = blockdiag((1 - c_i) X_iᵗX_i / n + c_i I)`. With `c_i = 0` for every view this
//! is ordinary (multiview) CCA, with `c_i = 1` it is PLS.

use super::faer_ndarray::{FaerEigh, FaerLinalgError};
use faer::Side;
use ndarray::{Array1, Array2, Axis, s};

/// Eigenpairs of the multiview problem, already split per view.
#[derive(Debug, Clone)]
pub struct MccaSolution {
    /// Generalized eigenvalues, largest first.
    pub eigenvalues: Array1<f64>,
    /// One `(p_i, latent_dimensions)` weight block per view.
    pub weights: Vec<Array2<f64>>,
}

impl MccaSolution {
    pub fn scores(&self, views: &[Array2<f64>]) -> Vec<Array2<f64>> {
        views
            .iter()
            .zip(self.weights.iter())
            .map(|(view, weights)| view.dot(weights))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Mcca {
    pub latent_dimensions: usize,
    /// Per-view shrinkage towards the identity, each in `[0, 1]`.
    pub c: Vec<f64>,
    /// Lower bound enforced on the spectrum of `D`.
    pub eps: f64,
}

impl Mcca {
    pub fn new(latent_dimensions: usize, c: Vec<f64>) -> Self {
        Self {
            latent_dimensions,
            c,
            eps: 1e-9,
        }
    }

    /// Fits on centered views. `self.c` must hold one entry per view and
    /// `latent_dimensions` must not exceed the total feature count.
    pub fn fit(&self, views: &[Array2<f64>]) -> Result<MccaSolution, FaerLinalgError> {
        let n = views.first().map_or(0, |v| v.nrows()).max(1) as f64;
        let splits: Vec<usize> = std::iter::once(0)
            .chain(views.iter().scan(0, |acc, v| {
                *acc += v.ncols();
                Some(*acc)
            }))
            .collect();
        let total = *splits.last().unwrap_or(&0);

        let mut c_mat = Array2::<f64>::zeros((total, total));
        let mut d_mat = Array2::<f64>::zeros((total, total));
        for (i, xi) in views.iter().enumerate() {
            let (a0, a1) = (splits[i], splits[i + 1]);
            for (j, xj) in views.iter().enumerate() {
                let (b0, b1) = (splits[j], splits[j + 1]);
                let block = xi.t().dot(xj) / n;
                if i == j {
                    let shrink = self.c[i];
                    let mut within = block * (1.0 - shrink);
                    within.diag_mut().mapv_inplace(|d| d + shrink);
                    d_mat.slice_mut(s![a0..a1, b0..b1]).assign(&within);
                } else {
                    c_mat.slice_mut(s![a0..a1, b0..b1]).assign(&block);
                }
            }
        }

        // D^{-1/2} from the eigendecomposition of D, after lifting its spectrum above eps.
        let (d_values, d_vectors) = d_mat.eigh(Side::Lower)?;
        let smallest = d_values.iter().cloned().fold(f64::INFINITY, f64::min);
        let shift = self.eps - smallest.min(0.0);
        let inv_sqrt = d_values.mapv(|v| 1.0 / (v + shift).sqrt());
        let d_inv_sqrt = (&d_vectors * &inv_sqrt.insert_axis(Axis(0))).dot(&d_vectors.t());

        let whitened = d_inv_sqrt.dot(&c_mat).dot(&d_inv_sqrt);
        let symmetric = (&whitened + &whitened.t()) * 0.5;
        let (values, vectors) = symmetric.eigh(Side::Lower)?;

        let k = self.latent_dimensions.min(total);
        let order: Vec<usize> = (0..values.len()).rev().take(k).collect();
        let eigenvalues = Array1::from_iter(order.iter().map(|&idx| values[idx]));
        let mut top = Array2::<f64>::zeros((total, k));
        for (col, &idx) in order.iter().enumerate() {
            top.column_mut(col).assign(&vectors.column(idx));
        }
        let stacked = d_inv_sqrt.dot(&top);

        let weights = (0..views.len())
            .map(|i| stacked.slice(s![splits[i]..splits[i + 1], ..]).to_owned())
            .collect();
        Ok(MccaSolution {
            eigenvalues,
            weights,
        })
    }
}
