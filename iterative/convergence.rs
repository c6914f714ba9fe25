//! Objective tracking and the stopping rules used by the alternating loop.

/// Final state of one run of the outer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// The stopping rule fired before the iteration budget ran out.
    Converged,
    /// The budget ran out first; weights are the best seen so far.
    MaxIterationsReached,
}

/// How successive objective values are compared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoppingRule {
    /// Stop once `|obj[t] - obj[t-1]| < tol`.
    AbsoluteChange,
    /// Stop once `obj[t-1] - obj[t] < tol`. Used by minimizing schemes whose
    /// objective can only go down, so any stall or rise ends the loop.
    SignedDecrease,
    /// Never stop early; the whole budget is spent and the run counts as converged.
    FixedBudget,
}

impl StoppingRule {
    pub fn should_stop(self, previous: f64, current: f64, tol: f64) -> bool {
        match self {
            StoppingRule::AbsoluteChange => (current - previous).abs() < tol,
            StoppingRule::SignedDecrease => previous - current < tol,
            StoppingRule::FixedBudget => false,
        }
    }
}

/// Whether larger or smaller objective values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Maximize => candidate > incumbent,
            Direction::Minimize => candidate < incumbent,
        }
    }
}

/// Per-iteration objective values of one fit, append-only.
#[derive(Debug, Clone)]
pub struct ConvergenceTrace {
    objectives: Vec<f64>,
    rule: StoppingRule,
    tol: f64,
    status: Option<LoopStatus>,
}

impl ConvergenceTrace {
    pub fn new(rule: StoppingRule, tol: f64) -> Self {
        Self {
            objectives: Vec::new(),
            rule,
            tol,
            status: None,
        }
    }

    /// Appends the objective of a completed sweep and reports whether the
    /// stopping rule fired. The first value never stops the loop.
    pub fn record(&mut self, objective: f64) -> bool {
        let stop = match self.objectives.last() {
            Some(&previous) => self.rule.should_stop(previous, objective, self.tol),
            None => false,
        };
        self.objectives.push(objective);
        if stop {
            self.status = Some(LoopStatus::Converged);
        }
        stop
    }

    /// Closes the trace when the loop ends without the rule firing.
    pub fn finish_budget(&mut self) -> LoopStatus {
        let status = match self.rule {
            StoppingRule::FixedBudget => LoopStatus::Converged,
            StoppingRule::AbsoluteChange | StoppingRule::SignedDecrease => {
                LoopStatus::MaxIterationsReached
            }
        };
        self.status = Some(status);
        status
    }

    pub fn objectives(&self) -> &[f64] {
        &self.objectives
    }

    pub fn last(&self) -> Option<f64> {
        self.objectives.last().copied()
    }

    pub fn status(&self) -> Option<LoopStatus> {
        self.status
    }

    pub fn converged(&self) -> bool {
        self.status == Some(LoopStatus::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_rule_stops_on_small_change_in_either_direction() {
        let mut trace = ConvergenceTrace::new(StoppingRule::AbsoluteChange, 1e-3);
        assert!(!trace.record(1.0));
        assert!(!trace.record(1.5));
        assert!(trace.record(1.5005));
        assert!(trace.converged());

        let mut falling = ConvergenceTrace::new(StoppingRule::AbsoluteChange, 1e-3);
        falling.record(2.0);
        assert!(falling.record(1.9995));
    }

    #[test]
    fn signed_rule_stops_when_objective_rises() {
        let mut trace = ConvergenceTrace::new(StoppingRule::SignedDecrease, 1e-6);
        trace.record(10.0);
        assert!(!trace.record(5.0));
        assert!(trace.record(5.5));
        assert_eq!(trace.objectives(), &[10.0, 5.0, 5.5]);
    }

    #[test]
    fn exhausted_budget_is_reported_per_rule() {
        let mut trace = ConvergenceTrace::new(StoppingRule::AbsoluteChange, 1e-9);
        trace.record(1.0);
        trace.record(2.0);
        assert_eq!(trace.finish_budget(), LoopStatus::MaxIterationsReached);
        assert!(!trace.converged());

        let mut fixed = ConvergenceTrace::new(StoppingRule::FixedBudget, 1e-9);
        fixed.record(1.0);
        assert!(!fixed.record(1.0));
        assert_eq!(fixed.finish_budget(), LoopStatus::Converged);
    }

    #[test]
    fn direction_compares_strictly() {
        assert!(Direction::Maximize.improves(2.0, 1.0));
        assert!(!Direction::Maximize.improves(1.0, 1.0));
        assert!(Direction::Minimize.improves(0.5, 1.0));
    }
}
