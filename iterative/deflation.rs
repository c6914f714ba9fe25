//! Residual views for extracting one latent dimension at a time.

use crate::errors::CcaError;
use ndarray::{Array2, ArrayView1, Axis};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deflation {
    /// `X ← X − s sᵗX / (sᵗs)`: removes the score direction from the samples.
    #[default]
    Cca,
    /// `X ← X − X w wᵗ / (wᵗw)`: removes the weight direction from the features.
    Pls,
}

impl FromStr for Deflation {
    type Err = CcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cca" => Ok(Deflation::Cca),
            "pls" => Ok(Deflation::Pls),
            other => Err(CcaError::invalid(
                "deflation",
                format!("unknown deflation '{other}', expected cca or pls"),
            )),
        }
    }
}

impl Deflation {
    /// Residual of `view` after removing one component. A zero direction
    /// leaves the view unchanged.
    pub fn deflate(
        self,
        view: &Array2<f64>,
        weights: ArrayView1<f64>,
        scores: ArrayView1<f64>,
    ) -> Array2<f64> {
        match self {
            Deflation::Cca => {
                let norm = scores.dot(&scores);
                if norm == 0.0 {
                    return view.clone();
                }
                let loading = scores.dot(view) / norm;
                let s = scores.insert_axis(Axis(1));
                view - &s.dot(&loading.insert_axis(Axis(0)))
            }
            Deflation::Pls => {
                let norm = weights.dot(&weights);
                if norm == 0.0 {
                    return view.clone();
                }
                let projected = view.dot(&weights) / norm;
                let w = weights.insert_axis(Axis(0));
                view - &projected.insert_axis(Axis(1)).dot(&w)
            }
        }
    }
}
