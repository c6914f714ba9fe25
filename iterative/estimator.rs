//! Shared options, the fitted artifact, and the estimator interface.

use crate::convergence::{ConvergenceTrace, LoopStatus};
use crate::deflation::Deflation;
use crate::errors::CcaError;
use crate::initialize::{Initialization, initialize};
use crate::inner_loop::{AlternatingScheme, InnerLoop};
use crate::metrics::{Agreement, average_off_diagonal, pairwise};
use crate::preprocess::{ViewScaler, ViewShape, check_views};
use ndarray::{Array1, Array2, Array3};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Options every iterative variant shares.
#[derive(Debug, Clone, PartialEq)]
pub struct IterativeOptions {
    pub latent_dimensions: usize,
    pub tol: f64,
    /// Outer iteration budget per run of the loop.
    pub max_iter: usize,
    pub initialization: Initialization,
    /// `None` seeds the generator from entropy.
    pub seed: Option<u64>,
    pub centre: bool,
    pub scale: bool,
    /// Only used by variants that fit one latent dimension at a time.
    pub deflation: Deflation,
}

impl Default for IterativeOptions {
    fn default() -> Self {
        Self {
            latent_dimensions: 1,
            tol: 1e-3,
            max_iter: 100,
            initialization: Initialization::Pls,
            seed: None,
            centre: true,
            scale: true,
            deflation: Deflation::Cca,
        }
    }
}

impl IterativeOptions {
    pub fn validate(&self) -> Result<(), CcaError> {
        if self.latent_dimensions == 0 {
            return Err(CcaError::invalid("latent_dimensions", "must be at least 1"));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(CcaError::invalid(
                "tol",
                format!("{} must be finite and non-negative", self.tol),
            ));
        }
        if self.max_iter == 0 {
            return Err(CcaError::invalid("max_iter", "must be at least 1"));
        }
        Ok(())
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Everything a fit leaves behind.
#[derive(Debug, Clone)]
pub struct FittedModel {
    /// One `(p_i, latent_dimensions)` block per view.
    pub weights: Vec<Array2<f64>>,
    pub scaler: ViewScaler,
    /// One trace per run of the loop: per latent dimension for deflating
    /// variants, a single trace for variants that fit all dimensions jointly.
    pub traces: Vec<ConvergenceTrace>,
}

impl FittedModel {
    pub fn converged(&self) -> bool {
        self.traces.iter().all(|trace| trace.converged())
    }

    pub fn statuses(&self) -> Vec<LoopStatus> {
        self.traces
            .iter()
            .map(|trace| trace.status().unwrap_or(LoopStatus::MaxIterationsReached))
            .collect()
    }
}

/// Common interface of the iterative CCA/PLS variants.
pub trait IterativeEstimator {
    fn options(&self) -> &IterativeOptions;

    fn fitted(&self) -> Option<&FittedModel>;

    /// Statistic used by [`score`](Self::score).
    fn agreement(&self) -> Agreement {
        Agreement::Correlation
    }

    /// Learns weights for `views`, replacing any previous fit.
    fn fit(&mut self, views: &[Array2<f64>]) -> Result<&FittedModel, CcaError>;

    fn weights(&self) -> Result<&[Array2<f64>], CcaError> {
        self.fitted()
            .map(|model| model.weights.as_slice())
            .ok_or(CcaError::NotFitted)
    }

    /// Projects new views with the stored centring, scaling, and weights.
    fn transform(&self, views: &[Array2<f64>]) -> Result<Vec<Array2<f64>>, CcaError> {
        let model = self.fitted().ok_or(CcaError::NotFitted)?;
        let prepared = model.scaler.transform(views)?;
        Ok(prepared
            .iter()
            .zip(model.weights.iter())
            .map(|(data, weights)| data.dot(weights))
            .collect())
    }

    fn fit_transform(&mut self, views: &[Array2<f64>]) -> Result<Vec<Array2<f64>>, CcaError> {
        self.fit(views)?;
        self.transform(views)
    }

    /// `(views, views, latent_dimensions)` statistics between transformed views.
    fn pairwise_correlations(&self, views: &[Array2<f64>]) -> Result<Array3<f64>, CcaError> {
        let scores = self.transform(views)?;
        Ok(pairwise(&scores, self.agreement()))
    }

    /// Per latent dimension, the statistic averaged over all ordered pairs of
    /// distinct views.
    fn score(&self, views: &[Array2<f64>]) -> Result<Array1<f64>, CcaError> {
        Ok(average_off_diagonal(&self.pairwise_correlations(views)?))
    }
}

/// Views after validation and preprocessing, ready for the loop.
pub(crate) struct PreparedViews {
    pub shape: ViewShape,
    pub scaler: ViewScaler,
    pub views: Vec<Array2<f64>>,
}

pub(crate) fn prepare(
    views: &[Array2<f64>],
    options: &IterativeOptions,
) -> Result<PreparedViews, CcaError> {
    options.validate()?;
    let shape = check_views(views)?;
    let scaler = ViewScaler::fit(views, options.centre, options.scale);
    let prepared = scaler.transform(views)?;
    Ok(PreparedViews {
        shape,
        scaler,
        views: prepared,
    })
}

/// Fits one latent dimension at a time, deflating the views in between.
///
/// `make_scheme` receives the residual views and the component index.
pub(crate) fn fit_deflated<S, F>(
    prepared: PreparedViews,
    options: &IterativeOptions,
    mut make_scheme: F,
) -> Result<FittedModel, CcaError>
where
    S: AlternatingScheme,
    F: FnMut(&[Array2<f64>], usize, &mut StdRng) -> Result<S, CcaError>,
{
    let PreparedViews {
        shape,
        scaler,
        views,
    } = prepared;
    let latent = options.latent_dimensions;
    let mut rng = options.rng();
    let mut weights: Vec<Array2<f64>> = shape
        .n_features
        .iter()
        .map(|&p| Array2::zeros((p, latent)))
        .collect();
    let mut traces = Vec::with_capacity(latent);
    let mut residuals = views;

    for component in 0..latent {
        let initial = initialize(&residuals, options.initialization, &mut rng, 1)?;
        let scheme = make_scheme(&residuals, component, &mut rng)?;
        let outcome = InnerLoop::new(&residuals, scheme, options.max_iter, options.tol).run(initial)?;
        log::info!(
            "Latent dimension {} finished after {} iterations ({:?}), objective {:.6e}",
            component + 1,
            outcome.iterations,
            outcome.status,
            outcome.trace.last().unwrap_or(f64::NAN)
        );

        for (view, found) in outcome.weights.iter().enumerate() {
            weights[view].column_mut(component).assign(&found.column(0));
        }
        if component + 1 < latent {
            residuals = residuals
                .iter()
                .zip(outcome.weights.iter())
                .map(|(data, found)| {
                    let w = found.column(0);
                    let s = data.dot(&w);
                    options.deflation.deflate(data, w, s.view())
                })
                .collect();
        }
        traces.push(outcome.trace);
    }

    Ok(FittedModel {
        weights,
        scaler,
        traces,
    })
}

/// Fits every latent dimension in a single run of the loop.
pub(crate) fn fit_joint<S, F>(
    prepared: PreparedViews,
    options: &IterativeOptions,
    make_scheme: F,
) -> Result<FittedModel, CcaError>
where
    S: AlternatingScheme,
    F: FnOnce(&[Array2<f64>], &mut StdRng) -> Result<S, CcaError>,
{
    let PreparedViews {
        shape,
        scaler,
        views,
    } = prepared;
    let total: usize = shape.n_features.iter().sum();
    if options.latent_dimensions > total {
        return Err(CcaError::invalid(
            "latent_dimensions",
            format!(
                "{} latent dimensions requested but the views hold only {total} features",
                options.latent_dimensions
            ),
        ));
    }
    let mut rng = options.rng();
    let initial = initialize(&views, options.initialization, &mut rng, options.latent_dimensions)?;
    let scheme = make_scheme(&views, &mut rng)?;
    let outcome = InnerLoop::new(&views, scheme, options.max_iter, options.tol).run(initial)?;
    log::info!(
        "Joint fit of {} latent dimension(s) finished after {} iterations ({:?})",
        options.latent_dimensions,
        outcome.iterations,
        outcome.status
    );
    Ok(FittedModel {
        weights: outcome.weights,
        scaler,
        traces: vec![outcome.trace],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(IterativeOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_latent_dimensions_are_rejected() {
        let options = IterativeOptions {
            latent_dimensions: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CcaError::InvalidParameter { ref name, .. }) if name == "latent_dimensions"
        ));
    }

    #[test]
    fn seeded_generators_agree() {
        use rand::Rng;
        let options = IterativeOptions {
            seed: Some(42),
            ..Default::default()
        };
        let a: f64 = options.rng().gen_range(0.0..1.0);
        let b: f64 = options.rng().gen_range(0.0..1.0);
        assert_eq!(a, b);
    }
}
