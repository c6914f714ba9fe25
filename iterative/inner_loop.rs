//! The alternating-optimization state machine.
//!
//! One outer iteration is: an optional consensus-target recompute
//! ([`AlternatingScheme::prepare_sweep`]), a Gauss–Seidel sweep over the views in
//! index order where every update immediately refreshes that view's scores, and
//! one objective evaluation appended to the [`ConvergenceTrace`].

use crate::convergence::{ConvergenceTrace, Direction, LoopStatus, StoppingRule};
use crate::errors::CcaError;
use ndarray::Array2;

/// Mutable state owned by a single run of the loop.
#[derive(Debug, Clone)]
pub struct LoopState {
    /// One `(p_i, k)` block per view.
    pub weights: Vec<Array2<f64>>,
    /// One `(n, k)` block per view, always `views[i] @ weights[i]` once view `i`
    /// has been updated; before that, the initializer's scores.
    pub scores: Vec<Array2<f64>>,
    /// Completed sweeps.
    pub iteration: usize,
}

impl LoopState {
    /// Starts from the initializer's scores with all weights at zero.
    pub fn new(views: &[Array2<f64>], initial_scores: Vec<Array2<f64>>) -> Result<Self, CcaError> {
        if initial_scores.len() != views.len() {
            return Err(CcaError::ParameterLength {
                name: "initial_scores".to_string(),
                expected: views.len(),
                found: initial_scores.len(),
            });
        }
        let latent = initial_scores.first().map_or(0, |s| s.ncols());
        if latent == 0 {
            return Err(CcaError::invalid(
                "initial_scores",
                "at least one latent dimension is required",
            ));
        }
        for (view, (data, scores)) in views.iter().zip(initial_scores.iter()).enumerate() {
            if scores.dim() != (data.nrows(), latent) {
                return Err(CcaError::invalid(
                    "initial_scores",
                    format!(
                        "view {view} scores have shape {:?}, expected ({}, {latent})",
                        scores.dim(),
                        data.nrows()
                    ),
                ));
            }
        }
        let weights = views
            .iter()
            .map(|data| Array2::zeros((data.ncols(), latent)))
            .collect();
        Ok(Self {
            weights,
            scores: initial_scores,
            iteration: 0,
        })
    }
}

/// A variant's per-view update rule and objective, driven by [`InnerLoop`].
pub trait AlternatingScheme {
    fn direction(&self) -> Direction;

    fn stopping_rule(&self) -> StoppingRule;

    /// Runs once per outer iteration before the sweep. MAXVAR schemes
    /// recompute their consensus target here.
    fn prepare_sweep(&mut self, _: &[Array2<f64>], _: &LoopState) -> Result<(), CcaError> {
        Ok(())
    }

    /// Returns the new weights for `view`. Views with a lower index have
    /// already been updated in this sweep and `state.scores` reflects that.
    fn update_view(
        &mut self,
        views: &[Array2<f64>],
        view: usize,
        state: &LoopState,
    ) -> Result<Array2<f64>, CcaError>;

    /// Objective after a completed sweep.
    fn objective(&mut self, views: &[Array2<f64>], state: &LoopState) -> f64;
}

/// Rejects updates that are all zero or contain non-finite values.
pub fn check_weights(view: usize, weights: &Array2<f64>) -> Result<(), CcaError> {
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(CcaError::DegenerateWeights {
            view,
            reason: "the update produced non-finite values".to_string(),
        });
    }
    for (column, values) in weights.columns().into_iter().enumerate() {
        if values.iter().all(|w| *w == 0.0) {
            return Err(CcaError::DegenerateWeights {
                view,
                reason: format!("every weight of latent dimension {column} is zero"),
            });
        }
    }
    Ok(())
}

/// Result of [`InnerLoop::run`].
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub weights: Vec<Array2<f64>>,
    pub trace: ConvergenceTrace,
    pub status: LoopStatus,
    pub iterations: usize,
}

pub struct InnerLoop<'a, S> {
    views: &'a [Array2<f64>],
    scheme: S,
    max_iter: usize,
    tol: f64,
}

impl<'a, S: AlternatingScheme> InnerLoop<'a, S> {
    pub fn new(views: &'a [Array2<f64>], scheme: S, max_iter: usize, tol: f64) -> Self {
        Self {
            views,
            scheme,
            max_iter,
            tol,
        }
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// One Gauss–Seidel pass over every view.
    pub fn sweep(&mut self, state: &mut LoopState) -> Result<(), CcaError> {
        self.scheme.prepare_sweep(self.views, state)?;
        for view in 0..self.views.len() {
            let updated = self.scheme.update_view(self.views, view, state)?;
            check_weights(view, &updated)?;
            state.scores[view] = self.views[view].dot(&updated);
            state.weights[view] = updated;
        }
        state.iteration += 1;
        Ok(())
    }

    /// Iterates until the scheme's stopping rule fires or `max_iter` sweeps
    /// have run. On budget exhaustion the best weights seen are returned.
    pub fn run(mut self, initial_scores: Vec<Array2<f64>>) -> Result<LoopOutcome, CcaError> {
        let mut state = LoopState::new(self.views, initial_scores)?;
        let direction = self.scheme.direction();
        let mut trace = ConvergenceTrace::new(self.scheme.stopping_rule(), self.tol);
        let mut best: Option<(f64, Vec<Array2<f64>>)> = None;
        let mut stopped = false;

        for iter in 0..self.max_iter {
            self.sweep(&mut state)?;
            let objective = self.scheme.objective(self.views, &state);
            log::debug!("Iteration {}: objective {:.6e}", iter + 1, objective);

            let improved = match &best {
                None => objective.is_finite(),
                Some((incumbent, _)) => direction.improves(objective, *incumbent),
            };
            if improved {
                best = Some((objective, state.weights.clone()));
            }
            if trace.record(objective) {
                stopped = true;
                break;
            }
        }

        let (status, weights) = if stopped {
            (LoopStatus::Converged, state.weights)
        } else {
            let status = trace.finish_budget();
            if status == LoopStatus::MaxIterationsReached {
                log::warn!(
                    "Alternating optimization did not converge after {} iterations (tol {:e}); returning the best weights found.",
                    state.iteration,
                    self.tol
                );
            }
            let weights = match best {
                Some((_, weights)) => weights,
                None => state.weights,
            };
            (status, weights)
        };

        Ok(LoopOutcome {
            weights,
            trace,
            status,
            iterations: state.iteration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Sets every weight of a view to `iteration + view + 1` and records the
    /// scores of view 0 as seen by view 1.
    struct Recorder {
        seen_by_second: Vec<Array2<f64>>,
        objectives: Vec<f64>,
        calls: usize,
    }

    impl AlternatingScheme for Recorder {
        fn direction(&self) -> Direction {
            Direction::Maximize
        }

        fn stopping_rule(&self) -> StoppingRule {
            StoppingRule::AbsoluteChange
        }

        fn update_view(
            &mut self,
            views: &[Array2<f64>],
            view: usize,
            state: &LoopState,
        ) -> Result<Array2<f64>, CcaError> {
            if view == 1 {
                self.seen_by_second.push(state.scores[0].clone());
            }
            let value = (state.iteration + view + 1) as f64;
            Ok(Array2::from_elem((views[view].ncols(), 1), value))
        }

        fn objective(&mut self, _: &[Array2<f64>], _: &LoopState) -> f64 {
            let value = self.objectives.get(self.calls).copied().unwrap_or(0.0);
            self.calls += 1;
            value
        }
    }

    fn toy_views() -> Vec<Array2<f64>> {
        vec![
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            array![[2.0], [1.0], [0.0]],
        ]
    }

    fn ones_scores(views: &[Array2<f64>]) -> Vec<Array2<f64>> {
        views.iter().map(|v| Array2::ones((v.nrows(), 1))).collect()
    }

    #[test]
    fn sweep_is_gauss_seidel() {
        let views = toy_views();
        let scheme = Recorder {
            seen_by_second: Vec::new(),
            objectives: vec![1.0, 1.0],
            calls: 0,
        };
        let mut inner = InnerLoop::new(&views, scheme, 5, 1e-6);
        let mut state = LoopState::new(&views, ones_scores(&views)).unwrap();
        inner.sweep(&mut state).unwrap();

        let expected = views[0].dot(&Array2::from_elem((2, 1), 1.0));
        assert_eq!(inner.scheme().seen_by_second[0], expected);
        assert_eq!(state.scores[1], views[1].dot(&Array2::from_elem((1, 1), 2.0)));
        assert_eq!(state.iteration, 1);
    }

    #[test]
    fn converges_when_objective_settles() {
        let views = toy_views();
        let scheme = Recorder {
            seen_by_second: Vec::new(),
            objectives: vec![1.0, 2.0, 2.0],
            calls: 0,
        };
        let outcome = InnerLoop::new(&views, scheme, 10, 1e-6)
            .run(ones_scores(&views))
            .unwrap();
        assert_eq!(outcome.status, LoopStatus::Converged);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.trace.objectives(), &[1.0, 2.0, 2.0]);
        assert_eq!(outcome.weights[0][[0, 0]], 3.0);
    }

    #[test]
    fn exhausted_budget_returns_best_weights() {
        let views = toy_views();
        let scheme = Recorder {
            seen_by_second: Vec::new(),
            objectives: vec![1.0, 5.0, 2.0],
            calls: 0,
        };
        let outcome = InnerLoop::new(&views, scheme, 3, 1e-6)
            .run(ones_scores(&views))
            .unwrap();
        assert_eq!(outcome.status, LoopStatus::MaxIterationsReached);
        assert!(!outcome.trace.converged());
        // Iteration index 1 produced the best objective and wrote weights of 2.
        assert_eq!(outcome.weights[0][[0, 0]], 2.0);
        assert_eq!(outcome.weights[1][[0, 0]], 3.0);
    }

    struct Collapsing;

    impl AlternatingScheme for Collapsing {
        fn direction(&self) -> Direction {
            Direction::Minimize
        }

        fn stopping_rule(&self) -> StoppingRule {
            StoppingRule::SignedDecrease
        }

        fn update_view(
            &mut self,
            views: &[Array2<f64>],
            view: usize,
            _: &LoopState,
        ) -> Result<Array2<f64>, CcaError> {
            Ok(Array2::zeros((views[view].ncols(), 1)))
        }

        fn objective(&mut self, _: &[Array2<f64>], _: &LoopState) -> f64 {
            0.0
        }
    }

    #[test]
    fn zero_update_is_a_hard_error() {
        let views = toy_views();
        let err = InnerLoop::new(&views, Collapsing, 10, 1e-6)
            .run(ones_scores(&views))
            .unwrap_err();
        assert!(matches!(err, CcaError::DegenerateWeights { view: 0, .. }));
    }

    #[test]
    fn non_finite_weights_are_rejected() {
        let weights = array![[1.0], [f64::NAN]];
        assert!(check_weights(2, &weights).is_err());
        assert!(check_weights(2, &array![[0.0], [1.0]]).is_ok());
    }

    #[test]
    fn mismatched_initial_scores_are_rejected() {
        let views = toy_views();
        let scores = vec![Array2::ones((3, 1)), Array2::ones((2, 1))];
        assert!(LoopState::new(&views, scores).is_err());
    }
}
