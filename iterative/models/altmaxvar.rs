//! Alternating MAXVAR with proximal penalties (Fu, Huang, Hong, Sidiropoulos & So, 2017).
//!
//! All latent dimensions are fitted jointly. Each outer iteration replaces the
//! consensus `G` by the orthonormal factor `U Vᵗ` of the (optionally smoothed)
//! mean score matrix, then runs proximal-gradient steps on
//! `½||X_i W_i − G||² + f_i(W_i)` for each view in turn.

use crate::convergence::{Direction, StoppingRule};
use crate::errors::CcaError;
use crate::estimator::{FittedModel, IterativeEstimator, IterativeOptions, fit_joint, prepare};
use crate::inner_loop::{AlternatingScheme, LoopState};
use crate::linalg::faer_ndarray::FaerSvd;
use crate::params::{PerView, at_least};
use crate::proximal::{ProximalKind, ProximalOperator, ProximalParams};
use crate::regularizer::{ProximalGradientRegularizer, UpdateTarget, ViewRegularizer, mean_scores};
use ndarray::Array2;
use std::sync::Arc;

/// A named operator from the registry or a caller-supplied one.
#[derive(Debug, Clone)]
pub enum ProximalChoice {
    Named(ProximalKind),
    Custom(Arc<dyn ProximalOperator>),
}

impl From<ProximalKind> for ProximalChoice {
    fn from(kind: ProximalKind) -> Self {
        ProximalChoice::Named(kind)
    }
}

#[derive(Debug, Clone)]
pub struct AltMaxVarConfig {
    pub proximal: PerView<ProximalChoice>,
    /// Penalty strength, used as `sigma` for named operators unless
    /// `proximal_params` sets it.
    pub tau: PerView<f64>,
    /// Extra parameters for named operators (radius, rank, ...).
    pub proximal_params: Option<PerView<ProximalParams>>,
    /// Clip negative weights after every proximal step.
    pub positive: PerView<bool>,
    /// Step size per view; `None` uses `1 / σ_max(X_i)²`.
    pub learning_rate: Option<PerView<f64>>,
    /// Proximal-gradient steps per view per outer iteration.
    pub max_steps: usize,
    /// Weight of the new mean scores when smoothing the consensus against the
    /// previous one; `None` recomputes it from the mean scores alone.
    pub gamma: Option<f64>,
}

impl Default for AltMaxVarConfig {
    fn default() -> Self {
        Self {
            proximal: PerView::Shared(ProximalChoice::Named(ProximalKind::L1)),
            tau: PerView::Shared(0.0),
            proximal_params: None,
            positive: PerView::Shared(false),
            learning_rate: None,
            max_steps: 100,
            gamma: Some(0.1),
        }
    }
}

impl AltMaxVarConfig {
    fn proximal_operators(
        &self,
        tau: &[f64],
    ) -> Result<Vec<Arc<dyn ProximalOperator>>, CcaError> {
        let n_views = tau.len();
        let choices = self.proximal.broadcast("proximal", n_views)?;
        let params = match &self.proximal_params {
            Some(params) => params.broadcast("proximal_params", n_views)?,
            None => vec![ProximalParams::default(); n_views],
        };
        choices
            .into_iter()
            .zip(params)
            .zip(tau.iter())
            .map(|((choice, mut params), &strength)| -> Result<Arc<dyn ProximalOperator>, CcaError> {
                match choice {
                    ProximalChoice::Named(kind) => {
                        if params.sigma.is_none() {
                            params.sigma = Some(strength);
                        }
                        Ok(Arc::new(kind.build(&params)?))
                    }
                    ProximalChoice::Custom(operator) => Ok(operator),
                }
            })
            .collect()
    }

    fn learning_rates(&self, views: &[Array2<f64>]) -> Result<Vec<f64>, CcaError> {
        if let Some(rates) = &self.learning_rate {
            return rates.resolve("learning_rate", views.len(), |rate| {
                if rate.is_finite() && *rate > 0.0 {
                    None
                } else {
                    Some(format!("{rate} must be finite and positive"))
                }
            });
        }
        views
            .iter()
            .map(|view| -> Result<f64, CcaError> {
                let largest = view.singular_values()?.iter().cloned().fold(0.0, f64::max);
                Ok(if largest > 0.0 {
                    1.0 / (largest * largest)
                } else {
                    1.0
                })
            })
            .collect()
    }
}

struct AltMaxVarScheme {
    regularizer: ProximalGradientRegularizer,
    consensus: Option<Array2<f64>>,
    gamma: Option<f64>,
}

impl AltMaxVarScheme {
    fn consensus(&self) -> Result<&Array2<f64>, CcaError> {
        self.consensus
            .as_ref()
            .ok_or_else(|| CcaError::invalid("consensus", "requested before the first sweep"))
    }
}

impl AlternatingScheme for AltMaxVarScheme {
    fn direction(&self) -> Direction {
        Direction::Minimize
    }

    fn stopping_rule(&self) -> StoppingRule {
        StoppingRule::SignedDecrease
    }

    fn prepare_sweep(&mut self, _: &[Array2<f64>], state: &LoopState) -> Result<(), CcaError> {
        let mean = mean_scores(&state.scores);
        let aggregate = match (self.gamma, self.consensus.take()) {
            (Some(gamma), Some(previous)) => mean * gamma + previous * (1.0 - gamma),
            _ => mean,
        };
        let (u, _, vt) = aggregate.thin_svd()?;
        self.consensus = Some(u.dot(&vt));
        Ok(())
    }

    fn update_view(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        state: &LoopState,
    ) -> Result<Array2<f64>, CcaError> {
        let consensus = self
            .consensus
            .as_ref()
            .ok_or_else(|| CcaError::invalid("consensus", "requested before the first sweep"))?;
        self.regularizer.update(
            views,
            view,
            &state.weights[view],
            UpdateTarget::Consensus(consensus),
        )
    }

    fn objective(&mut self, _: &[Array2<f64>], state: &LoopState) -> f64 {
        let consensus = match self.consensus() {
            Ok(consensus) => consensus,
            Err(_) => return f64::NAN,
        };
        state
            .scores
            .iter()
            .zip(state.weights.iter())
            .enumerate()
            .map(|(view, (scores, weights))| {
                let misfit = 0.5 * (scores - consensus).mapv(|r| r * r).sum();
                misfit + self.regularizer.cost(view, weights)
            })
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct AltMaxVar {
    pub options: IterativeOptions,
    pub config: AltMaxVarConfig,
    fitted: Option<FittedModel>,
}

impl AltMaxVar {
    pub fn new(options: IterativeOptions, config: AltMaxVarConfig) -> Self {
        Self {
            options,
            config,
            fitted: None,
        }
    }
}

impl Default for AltMaxVar {
    fn default() -> Self {
        Self::new(IterativeOptions::default(), AltMaxVarConfig::default())
    }
}

impl IterativeEstimator for AltMaxVar {
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
        if self.options.latent_dimensions > prepared.shape.n_samples {
            return Err(CcaError::invalid(
                "latent_dimensions",
                format!(
                    "{} exceeds the {} samples available for the consensus",
                    self.options.latent_dimensions, prepared.shape.n_samples
                ),
            ));
        }
        let tau = self.config.tau.resolve("tau", n_views, at_least(0.0))?;
        let positive = self.config.positive.broadcast("positive", n_views)?;
        let proximals = self.config.proximal_operators(&tau)?;
        if self.config.max_steps == 0 {
            return Err(CcaError::invalid("max_steps", "must be at least 1"));
        }
        match self.config.gamma {
            Some(gamma) if !(0.0..=1.0).contains(&gamma) => {
                return Err(CcaError::invalid("gamma", format!("{gamma} is outside [0, 1]")));
            }
            _ => {}
        }
        let learning_rates = self.config.learning_rates(&prepared.views)?;
        log::info!(
            "Fitting AltMaxVar with {} latent dimension(s), step sizes {learning_rates:?}",
            self.options.latent_dimensions
        );

        let max_steps = self.config.max_steps;
        let gamma = self.config.gamma;
        let model = fit_joint(prepared, &self.options, |_, _| {
            Ok(AltMaxVarScheme {
                regularizer: ProximalGradientRegularizer::new(
                    proximals,
                    positive,
                    learning_rates,
                    max_steps,
                ),
                consensus: None,
                gamma,
            })
        })?;
        Ok(self.fitted.insert(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialize::Initialization;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn views(seed: u64) -> Vec<Array2<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let z: Vec<f64> = (0..50).map(|_| rng.gen_range(-1.0..1.0)).collect();
        (0..3)
            .map(|v| {
                Array2::from_shape_fn((50, 6 + v), |(i, j)| {
                    let signal = if j < 2 { z[i] } else { 0.0 };
                    signal + rng.gen_range(-0.5..0.5)
                })
            })
            .collect()
    }

    #[test]
    fn objective_never_increases() {
        let views = views(4);
        let mut model = AltMaxVar::new(
            IterativeOptions {
                latent_dimensions: 2,
                seed: Some(1),
                tol: 1e-12,
                initialization: Initialization::Random,
                ..Default::default()
            },
            AltMaxVarConfig {
                tau: PerView::Shared(0.1),
                ..Default::default()
            },
        );
        let fitted = model.fit(&views).unwrap();
        assert_eq!(fitted.weights[2].dim(), (8, 2));
        let objectives = fitted.traces[0].objectives();
        // Only the final, stopping step may fail to decrease.
        for pair in objectives[..objectives.len() - 1].windows(2) {
            assert!(pair[1] <= pair[0] + 1e-8, "{} rose to {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn consensus_smoothing_changes_the_trace() {
        let views = views(8);
        let trace_with = |gamma: Option<f64>| {
            let mut model = AltMaxVar::new(
                IterativeOptions {
                    seed: Some(4),
                    tol: 1e-12,
                    initialization: Initialization::Random,
                    ..Default::default()
                },
                AltMaxVarConfig {
                    tau: PerView::Shared(0.05),
                    gamma,
                    ..Default::default()
                },
            );
            model.fit(&views).unwrap().traces[0].objectives().to_vec()
        };
        assert_eq!(AltMaxVarConfig::default().gamma, Some(0.1));
        let smoothed = trace_with(Some(0.1));
        let plain = trace_with(None);
        // The first consensus has no predecessor to smooth against.
        assert_eq!(smoothed[0], plain[0]);
        assert_ne!(smoothed, plain);
    }

    #[test]
    fn strong_group_penalty_shrinks_noise_rows() {
        let views = views(5);
        let mut model = AltMaxVar::new(
            IterativeOptions {
                seed: Some(2),
                ..Default::default()
            },
            AltMaxVarConfig {
                proximal: PerView::Shared(ProximalKind::L21.into()),
                tau: PerView::Shared(2.0),
                ..Default::default()
            },
        );
        let weights = model.fit(&views).unwrap().weights.clone();
        let signal: f64 = weights[0].rows().into_iter().take(2).map(|r| r.dot(&r)).sum();
        let noise: f64 = weights[0].rows().into_iter().skip(2).map(|r| r.dot(&r)).sum();
        assert!(signal > noise);
    }

    #[test]
    fn named_operator_missing_parameter_fails() {
        let mut model = AltMaxVar::new(
            IterativeOptions::default(),
            AltMaxVarConfig {
                proximal: PerView::Shared(ProximalKind::Nuclear.into()),
                ..Default::default()
            },
        );
        let err = model.fit(&views(6)).unwrap_err();
        assert!(matches!(err, CcaError::InvalidParameter { ref name, .. } if name == "dim"));
    }

    #[derive(Debug)]
    struct Shrink(f64);

    impl ProximalOperator for Shrink {
        fn cost(&self, weights: ndarray::ArrayView2<f64>) -> f64 {
            0.5 * self.0 * weights.iter().map(|w| w * w).sum::<f64>()
        }

        fn prox(&self, weights: ndarray::ArrayView2<f64>, step_size: f64) -> Result<Array2<f64>, CcaError> {
            Ok(weights.mapv(|w| w / (1.0 + self.0 * step_size)))
        }
    }

    #[test]
    fn custom_operator_is_used() {
        let views = views(7);
        let mut model = AltMaxVar::new(
            IterativeOptions {
                seed: Some(3),
                ..Default::default()
            },
            AltMaxVarConfig {
                proximal: PerView::Shared(ProximalChoice::Custom(Arc::new(Shrink(0.5)))),
                positive: PerView::Shared(true),
                ..Default::default()
            },
        );
        let weights = model.fit(&views).unwrap().weights.clone();
        assert!(weights.iter().all(|w| w.iter().all(|v| *v >= 0.0)));
    }
}
