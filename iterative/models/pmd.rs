//! Penalized matrix decomposition (Witten, Tibshirani & Hastie, 2009).
//!
//! Each view's weights are the power-step candidate `X_iᵗ Σ_{j≠i} s_j`
//! projected onto the unit L2 sphere intersected with the L1 ball of radius
//! `max(1, tau_i * sqrt(p_i))`. `tau = 1` leaves the constraint inactive, and
//! small `tau` keeps a single non-zero weight.

use super::PowerScheme;
use crate::errors::CcaError;
use crate::estimator::{FittedModel, IterativeEstimator, IterativeOptions, fit_deflated, prepare};
use crate::metrics::Agreement;
use crate::params::{PerView, in_closed_range};
use crate::regularizer::DeltaSearchRegularizer;
use ndarray::Array2;

#[derive(Debug, Clone, PartialEq)]
pub struct PmdConfig {
    /// Sparsity level per view, in `[0, 1]`.
    pub tau: PerView<f64>,
    /// Clip negative candidate entries before the projection.
    pub positive: PerView<bool>,
}

impl Default for PmdConfig {
    fn default() -> Self {
        Self {
            tau: PerView::Shared(1.0),
            positive: PerView::Shared(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pmd {
    pub options: IterativeOptions,
    pub config: PmdConfig,
    fitted: Option<FittedModel>,
}

impl Pmd {
    pub fn new(options: IterativeOptions, config: PmdConfig) -> Self {
        Self {
            options,
            config,
            fitted: None,
        }
    }
}

impl Default for Pmd {
    fn default() -> Self {
        Self::new(IterativeOptions::default(), PmdConfig::default())
    }
}

impl IterativeEstimator for Pmd {
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
        let tau = self
            .config
            .tau
            .resolve("tau", n_views, in_closed_range(0.0, 1.0))?;
        let positive = self.config.positive.broadcast("positive", n_views)?;
        let features = prepared.shape.n_features.clone();
        let tol = self.options.tol;
        log::info!(
            "Fitting PMD with {} latent dimension(s) on {n_views} views, tau {tau:?}",
            self.options.latent_dimensions
        );

        let model = fit_deflated(prepared, &self.options, |_, _, _| {
            let regularizer = DeltaSearchRegularizer::pmd(&tau, &features, positive.clone(), tol);
            Ok(PowerScheme::new(regularizer, Agreement::Covariance))
        })?;
        Ok(self.fitted.insert(model))
    }
}
