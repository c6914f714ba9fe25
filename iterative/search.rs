//! Thresholding helpers and the bisection ("delta search") used by PMD-style updates.

use ndarray::{Array, ArrayBase, Data, Dimension, Ix1};

/// Bisection steps allowed before the search gives up and returns its best feasible point.
pub const DELTA_SEARCH_MAX_ITER: usize = 150;

#[inline]
pub fn soft_threshold_scalar(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

pub fn soft_threshold<S, D>(values: &ArrayBase<S, D>, threshold: f64) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    values.mapv(|v| soft_threshold_scalar(v, threshold))
}

pub fn l1_norm<S, D>(values: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    values.iter().map(|v| v.abs()).sum()
}

pub fn l2_norm<S, D>(values: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Keeps the `k` entries of largest magnitude and zeroes the rest.
pub fn keep_top_k<S>(values: &ArrayBase<S, Ix1>, k: usize) -> Array<f64, Ix1>
where
    S: Data<Elem = f64>,
{
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));
    let mut kept = Array::zeros(values.len());
    for &idx in order.iter().take(k) {
        kept[idx] = values[idx];
    }
    kept
}

/// Result of [`delta_search`].
#[derive(Debug, Clone)]
pub struct DeltaSearch {
    /// Unit-L2 weights satisfying the L1 bound (all zero only when the input was).
    pub weights: Array<f64, Ix1>,
    /// Soft-threshold level that produced `weights`.
    pub delta: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Finds the soft-threshold level `delta` such that `S(w, delta) / ||S(w, delta)||₂`
/// has L1 norm at most `bound`, as close to `bound` as `tol` allows.
///
/// The returned point is always on the feasible side of the bracket. `bound`
/// must be at least 1 for the constraint to be satisfiable by a unit vector.
pub fn delta_search<S>(candidate: &ArrayBase<S, Ix1>, bound: f64, tol: f64) -> DeltaSearch
where
    S: Data<Elem = f64>,
{
    let norm = l2_norm(candidate);
    if norm == 0.0 {
        return DeltaSearch {
            weights: Array::zeros(candidate.len()),
            delta: 0.0,
            iterations: 0,
            converged: true,
        };
    }
    let unit = candidate.mapv(|v| v / norm);
    if l1_norm(&unit) <= bound {
        return DeltaSearch {
            weights: unit,
            delta: 0.0,
            iterations: 0,
            converged: true,
        };
    }

    let max_abs = candidate.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let (mut lo, mut hi) = (0.0_f64, max_abs);
    let mut converged = false;
    let mut iterations = 0;
    while iterations < DELTA_SEARCH_MAX_ITER {
        iterations += 1;
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let shrunk = soft_threshold(candidate, mid);
        let shrunk_norm = l2_norm(&shrunk);
        if shrunk_norm == 0.0 {
            hi = mid;
            continue;
        }
        let ratio = l1_norm(&shrunk) / shrunk_norm;
        if ratio > bound {
            lo = mid;
        } else {
            hi = mid;
            if bound - ratio < tol {
                converged = true;
                break;
            }
        }
    }

    let mut weights = soft_threshold(candidate, hi);
    let weights_norm = l2_norm(&weights);
    if weights_norm > 0.0 {
        weights.mapv_inplace(|v| v / weights_norm);
    } else {
        // Ties at the largest magnitude: fall back to the sparsest unit vector.
        weights = keep_top_k(candidate, 1);
        let kept_norm = l2_norm(&weights);
        weights.mapv_inplace(|v| v / kept_norm);
    }
    DeltaSearch {
        weights,
        delta: hi,
        iterations,
        converged,
    }
}
