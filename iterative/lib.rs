#![deny(dead_code)]
#![deny(unused_imports)]

//! Iterative alternating-optimization estimators for multiview CCA and PLS.
//!
//! Given `N >= 2` views sharing their rows, every estimator learns one
//! `(p_i, k)` weight block per view by block-coordinate alternation: all
//! views but one are held fixed, the free view solves a regularized
//! subproblem, and sweeps repeat until the objective settles.
//!
//! | Estimator | Per-view update |
//! |---|---|
//! | [`Pmd`] | power step + delta search onto an L1 ball |
//! | [`ElasticCca`] | elastic-net regression onto a MAXVAR/SUMCOR target |
//! | [`AltMaxVar`] | proximal gradient towards an orthonormal consensus |
//! | [`Span`] | sparse projection of directions from a low-rank span |
//! | [`Parkhomenko`] | soft-thresholded power step |
//! | [`PlsAls`] | unit-norm power step |

#[path = "../linalg/mod.rs"]
pub mod linalg;

pub mod convergence;
pub mod deflation;
pub mod errors;
pub mod estimator;
pub mod initialize;
pub mod inner_loop;
pub mod metrics;
pub mod models;
pub mod params;
pub mod preprocess;
pub mod proximal;
pub mod regularizer;
pub mod search;

pub use convergence::{ConvergenceTrace, LoopStatus, StoppingRule};
pub use deflation::Deflation;
pub use errors::CcaError;
pub use estimator::{FittedModel, IterativeEstimator, IterativeOptions};
pub use initialize::Initialization;
pub use models::{
    AltMaxVar, AltMaxVarConfig, ElasticCca, ElasticConfig, Parkhomenko, ParkhomenkoConfig, PlsAls,
    Pmd, PmdConfig, ProximalChoice, Span, SpanConfig, SpanPenalty,
};
pub use params::PerView;
pub use proximal::{Proximal, ProximalKind, ProximalOperator, ProximalParams};
