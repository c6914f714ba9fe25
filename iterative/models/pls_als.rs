//! Partial least squares by alternating power steps with unit-norm weights.

use super::PowerScheme;
use crate::errors::CcaError;
use crate::estimator::{FittedModel, IterativeEstimator, IterativeOptions, fit_deflated, prepare};
use crate::metrics::Agreement;
use crate::regularizer::DeltaSearchRegularizer;
use ndarray::Array2;

#[derive(Debug, Clone, Default)]
pub struct PlsAls {
    pub options: IterativeOptions,
    fitted: Option<FittedModel>,
}

impl PlsAls {
    pub fn new(options: IterativeOptions) -> Self {
        Self {
            options,
            fitted: None,
        }
    }
}

impl IterativeEstimator for PlsAls {
    fn options(&self) -> &IterativeOptions {
        &self.options
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn agreement(&self) -> Agreement {
        Agreement::Covariance
    }

    fn fit(&mut self, views: &[Array2<f64>]) -> Result<&FittedModel, CcaError> {
        self.fitted = None;
        let prepared = prepare(views, &self.options)?;
        let n_views = prepared.views.len();
        log::info!("Fitting PLS by alternating least squares on {n_views} views");
        let model = fit_deflated(prepared, &self.options, |_, _, _| {
            Ok(PowerScheme::new(
                DeltaSearchRegularizer::unconstrained(n_views),
                Agreement::Covariance,
            ))
        })?;
        Ok(self.fitted.insert(model))
    }
}
