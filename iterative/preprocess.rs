//! View validation and the centring/scaling applied before optimization.

use crate::errors::CcaError;
use ndarray::{Array1, Array2, Axis};

/// Sample count and per-view feature counts of a validated set of views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewShape {
    pub n_samples: usize,
    pub n_features: Vec<usize>,
}

/// Checks that there are at least two views, that they share their row
/// count, and that none of them is empty.
pub fn check_views(views: &[Array2<f64>]) -> Result<ViewShape, CcaError> {
    if views.len() < 2 {
        return Err(CcaError::ViewCount {
            minimum: 2,
            found: views.len(),
        });
    }
    let n_samples = views[0].nrows();
    for (view, data) in views.iter().enumerate().skip(1) {
        if data.nrows() != n_samples {
            return Err(CcaError::SampleCountMismatch {
                view,
                expected: n_samples,
                found: data.nrows(),
            });
        }
    }
    if n_samples < 2 {
        return Err(CcaError::invalid(
            "views",
            format!("at least two samples are required, got {n_samples}"),
        ));
    }
    if let Some(view) = views.iter().position(|data| data.ncols() == 0) {
        return Err(CcaError::invalid(
            "views",
            format!("view {view} has no features"),
        ));
    }
    Ok(ViewShape {
        n_samples,
        n_features: views.iter().map(|data| data.ncols()).collect(),
    })
}

/// Column means and standard deviations stored at fit time.
#[derive(Debug, Clone)]
pub struct ViewScaler {
    means: Vec<Array1<f64>>,
    scales: Vec<Array1<f64>>,
}

impl ViewScaler {
    /// Learns per-column statistics. Without `centre` the means are zero,
    /// without `scale` the scales are one. Columns with zero spread keep a
    /// scale of one.
    pub fn fit(views: &[Array2<f64>], centre: bool, scale: bool) -> Self {
        let means = views
            .iter()
            .map(|data| match (centre, data.mean_axis(Axis(0))) {
                (true, Some(mean)) => mean,
                _ => Array1::zeros(data.ncols()),
            })
            .collect();
        let scales = views
            .iter()
            .map(|data| {
                if scale && data.nrows() > 1 {
                    data.std_axis(Axis(0), 1.0)
                        .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 })
                } else {
                    Array1::ones(data.ncols())
                }
            })
            .collect();
        Self { means, scales }
    }

    pub fn means(&self) -> &[Array1<f64>] {
        &self.means
    }

    pub fn scales(&self) -> &[Array1<f64>] {
        &self.scales
    }

    /// Applies the stored statistics. The inputs are left untouched.
    pub fn transform(&self, views: &[Array2<f64>]) -> Result<Vec<Array2<f64>>, CcaError> {
        if views.len() != self.means.len() {
            return Err(CcaError::ViewCount {
                minimum: self.means.len(),
                found: views.len(),
            });
        }
        views
            .iter()
            .enumerate()
            .map(|(view, data)| {
                let mean = &self.means[view];
                if data.ncols() != mean.len() {
                    return Err(CcaError::FeatureCountMismatch {
                        view,
                        expected: mean.len(),
                        found: data.ncols(),
                    });
                }
                Ok((data - mean) / &self.scales[view])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn rejects_single_view_and_row_mismatch() {
        let a = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            check_views(std::slice::from_ref(&a)),
            Err(CcaError::ViewCount { minimum: 2, found: 1 })
        ));
        let b = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            check_views(&[a, b]),
            Err(CcaError::SampleCountMismatch { view: 1, expected: 4, found: 3 })
        ));
    }

    #[test]
    fn centred_and_scaled_columns_have_unit_sample_variance() {
        let views = vec![
            array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [6.0, 5.0]],
            array![[0.0], [1.0], [0.0], [1.0]],
        ];
        let scaler = ViewScaler::fit(&views, true, true);
        let out = scaler.transform(&views).unwrap();
        let column = out[0].column(0);
        assert_abs_diff_eq!(column.sum(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(column.std(1.0), 1.0, epsilon = 1e-12);
        // Constant column: centred, scale left at one.
        assert!(out[0].column(1).iter().all(|v| *v == 0.0));
        assert_eq!(scaler.scales()[0][1], 1.0);
        assert_abs_diff_eq!(scaler.means()[0][0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn transform_checks_feature_counts() {
        let views = vec![Array2::<f64>::ones((3, 2)), Array2::<f64>::ones((3, 1))];
        let scaler = ViewScaler::fit(&views, true, false);
        let wrong = vec![Array2::<f64>::ones((3, 3)), Array2::<f64>::ones((3, 1))];
        assert!(matches!(
            scaler.transform(&wrong),
            Err(CcaError::FeatureCountMismatch { view: 0, expected: 2, found: 3 })
        ));
    }
}
