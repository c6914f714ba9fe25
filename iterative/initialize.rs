//! Starting scores for the alternating loop.

use crate::errors::CcaError;
use crate::linalg::mcca::Mcca;
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Initialization {
    /// i.i.d. standard normal scores.
    Random,
    /// All-ones scores. On centred data every power step from here is zero.
    Uniform,
    /// Scores of the closed-form PLS solution (`c = 1` for every view).
    #[default]
    Pls,
    /// Scores of the closed-form CCA solution (`c = 0` for every view).
    Cca,
}

impl FromStr for Initialization {
    type Err = CcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Initialization::Random),
            "uniform" => Ok(Initialization::Uniform),
            "pls" => Ok(Initialization::Pls),
            "cca" => Ok(Initialization::Cca),
            other => Err(CcaError::invalid(
                "initialization",
                format!("unknown scheme '{other}', expected one of random, uniform, pls, cca"),
            )),
        }
    }
}

impl fmt::Display for Initialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Initialization::Random => "random",
            Initialization::Uniform => "uniform",
            Initialization::Pls => "pls",
            Initialization::Cca => "cca",
        };
        f.write_str(name)
    }
}

/// Produces one `(n, latent_dimensions)` score block per view.
pub fn initialize<R: Rng>(
    views: &[Array2<f64>],
    scheme: Initialization,
    rng: &mut R,
    latent_dimensions: usize,
) -> Result<Vec<Array2<f64>>, CcaError> {
    log::debug!("Initializing {latent_dimensions} latent dimension(s) with '{scheme}'");
    let scores: Vec<Array2<f64>> = match scheme {
        Initialization::Random => views
            .iter()
            .map(|view| {
                Array2::from_shape_simple_fn((view.nrows(), latent_dimensions), || {
                    rng.sample::<f64, _>(StandardNormal)
                })
            })
            .collect(),
        Initialization::Uniform => views
            .iter()
            .map(|view| Array2::ones((view.nrows(), latent_dimensions)))
            .collect(),
        Initialization::Pls | Initialization::Cca => {
            let c = if scheme == Initialization::Pls { 1.0 } else { 0.0 };
            let solution = Mcca::new(latent_dimensions, vec![c; views.len()]).fit(views)?;
            solution.scores(views)
        }
    };
    if let Some(block) = scores.iter().find(|block| block.ncols() != latent_dimensions) {
        return Err(CcaError::invalid(
            "latent_dimensions",
            format!(
                "'{scheme}' initialization produced {} score column(s) but {latent_dimensions} were requested",
                block.ncols()
            ),
        ));
    }
    Ok(scores)
}
