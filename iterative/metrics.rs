//! Pairwise agreement between view scores.
//!
//! Rows where either member of a pair is NaN are dropped for that pair only.

use itertools::iproduct;
use ndarray::{Array1, Array2, Array3, ArrayView1};

/// Which pairwise statistic a model is scored by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agreement {
    Correlation,
    Covariance,
}

fn masked_pairs(a: ArrayView1<f64>, b: ArrayView1<f64>) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b.iter())
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(x, y)| (*x, *y))
        .unzip()
}

fn centred_moments(a: &[f64], b: &[f64]) -> Option<(f64, f64, f64)> {
    let n = a.len();
    if n < 2 {
        return None;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    Some((sab, saa, sbb))
}

/// Pearson correlation over the rows where both inputs are present.
///
/// Returns NaN with fewer than two usable rows and 0 when either side is constant.
pub fn masked_correlation(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let (x, y) = masked_pairs(a, b);
    match centred_moments(&x, &y) {
        None => f64::NAN,
        Some((sab, saa, sbb)) => {
            let denom = (saa * sbb).sqrt();
            if denom > 0.0 { sab / denom } else { 0.0 }
        }
    }
}

/// Sample covariance (`n - 1` denominator) over the rows where both inputs are present.
pub fn masked_covariance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let (x, y) = masked_pairs(a, b);
    match centred_moments(&x, &y) {
        None => f64::NAN,
        Some((sab, _, _)) => sab / (x.len() - 1) as f64,
    }
}

/// `(views, views, latent_dimensions)` array of pairwise statistics.
pub fn pairwise(scores: &[Array2<f64>], agreement: Agreement) -> Array3<f64> {
    let n_views = scores.len();
    let latent = scores.first().map_or(0, |s| s.ncols());
    let mut out = Array3::zeros((n_views, n_views, latent));
    for (i, j, k) in iproduct!(0..n_views, 0..n_views, 0..latent) {
        if j < i {
            out[[i, j, k]] = out[[j, i, k]];
            continue;
        }
        let (a, b) = (scores[i].column(k), scores[j].column(k));
        out[[i, j, k]] = match agreement {
            Agreement::Correlation => masked_correlation(a, b),
            Agreement::Covariance => masked_covariance(a, b),
        };
    }
    out
}

/// Mean of the off-diagonal entries for each latent dimension.
pub fn average_off_diagonal(pairs: &Array3<f64>) -> Array1<f64> {
    let (n_views, _, latent) = pairs.dim();
    let count = (n_views * n_views.saturating_sub(1)) as f64;
    Array1::from_shape_fn(latent, |k| {
        let total: f64 = iproduct!(0..n_views, 0..n_views)
            .filter(|(i, j)| i != j)
            .map(|(i, j)| pairs[[i, j, k]])
            .sum();
        total / count
    })
}
