//! Sparse CCA by soft-thresholded power steps (Parkhomenko, Tritchler & Beyene, 2009).

use super::PowerScheme;
use crate::errors::CcaError;
use crate::estimator::{FittedModel, IterativeEstimator, IterativeOptions, fit_deflated, prepare};
use crate::metrics::Agreement;
use crate::params::{PerView, at_least};
use crate::regularizer::ThresholdedPowerRegularizer;
use ndarray::Array2;

#[derive(Debug, Clone, PartialEq)]
pub struct ParkhomenkoConfig {
    /// Threshold per view; unit-norm candidates are shrunk by `tau / 2`.
    pub tau: PerView<f64>,
}

impl Default for ParkhomenkoConfig {
    fn default() -> Self {
        Self {
            tau: PerView::Shared(0.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Parkhomenko {
    pub options: IterativeOptions,
    pub config: ParkhomenkoConfig,
    fitted: Option<FittedModel>,
}

impl Parkhomenko {
    pub fn new(options: IterativeOptions, config: ParkhomenkoConfig) -> Self {
        Self {
            options,
            config,
            fitted: None,
        }
    }
}

impl IterativeEstimator for Parkhomenko {
    fn options(&self) -> &IterativeOptions {
        &self.options
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn fit(&mut self, views: &[Array2<f64>]) -> Result<&FittedModel, CcaError> {
        self.fitted = None;
        let prepared = prepare(views, &self.options)?;
        let tau = self
            .config
            .tau
            .resolve("tau", prepared.views.len(), at_least(0.0))?;
        log::info!("Fitting Parkhomenko sparse CCA with tau {tau:?}");
        let model = fit_deflated(prepared, &self.options, |_, _, _| {
            Ok(PowerScheme::new(
                ThresholdedPowerRegularizer::new(tau.clone()),
                Agreement::Correlation,
            ))
        })?;
        Ok(self.fitted.insert(model))
    }
}
