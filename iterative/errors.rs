use crate::linalg::faer_ndarray::FaerLinalgError;
use crate::linalg::regression::RegressionError;
use thiserror::Error;

/// Every failure an estimator can report.
///
/// Budget exhaustion of the outer loop is deliberately absent: it is reported
/// through [`LoopStatus::MaxIterationsReached`](crate::convergence::LoopStatus)
/// and a log warning, never as an error.
#[derive(Error, Debug)]
pub enum CcaError {
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Parameter '{name}' has {found} entries but there are {expected} views")]
    ParameterLength {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("At least {minimum} views are required, got {found}")]
    ViewCount { minimum: usize, found: usize },

    #[error("View {view} has {found} rows but view 0 has {expected}")]
    SampleCountMismatch {
        view: usize,
        expected: usize,
        found: usize,
    },

    #[error("View {view} has {found} columns but the model was fitted with {expected}")]
    FeatureCountMismatch {
        view: usize,
        expected: usize,
        found: usize,
    },

    #[error("This estimator has not been fitted yet. Call fit before transform or score.")]
    NotFitted,

    #[error("Weights for view {view} collapsed during the update: {reason}")]
    DegenerateWeights { view: usize, reason: String },

    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] FaerLinalgError),

    #[error("Per-view regression failed: {0}")]
    Regression(#[from] RegressionError),
}

impl CcaError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CcaError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
