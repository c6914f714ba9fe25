//! Proximal operators for the penalties AltMaxVar can place on a view's weights.
//!
//! Every operator exposes the penalty value (`cost`) and its proximal map
//! `prox(v, t) = argmin_x t * f(x) + ½ ||x - v||²`. Weight matrices are
//! `(features, latent_dimensions)`; group penalties (`L21`) group by feature row,
//! spectral penalties (`Nuclear`) act on the matrix as a whole.
//!
//! Named operators are created through a registry keyed by [`ProximalKind`]; the
//! registry lists the parameters each kind requires, and construction fails
//! with [`CcaError::InvalidParameter`] when one is missing or out of range.

use crate::errors::CcaError;
use crate::linalg::faer_ndarray::FaerSvd;
use crate::search::{keep_top_k, l1_norm, l2_norm, soft_threshold, soft_threshold_scalar};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::fmt;
use std::str::FromStr;

/// Indicator penalties treat points this far outside their set as feasible.
const FEASIBILITY_SLACK: f64 = 1e-9;

/// A penalty function together with its proximal map.
pub trait ProximalOperator: fmt::Debug + Send + Sync {
    fn cost(&self, weights: ArrayView2<f64>) -> f64;
    fn prox(&self, weights: ArrayView2<f64>, step_size: f64) -> Result<Array2<f64>, CcaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProximalKind {
    L0,
    L0Ball,
    L1,
    L1Ball,
    L2,
    L21,
    L21PlusL1,
    Nuclear,
    NuclearBall,
    Log,
    Log1,
    Euclidean,
    EuclideanBall,
}

/// Named parameters a proximal operator may require.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximalParams {
    pub sigma: Option<f64>,
    pub radius: Option<f64>,
    pub dim: Option<usize>,
    pub rho: Option<f64>,
    pub gamma: Option<f64>,
    pub delta: Option<f64>,
}

impl ProximalParams {
    pub fn with_sigma(sigma: f64) -> Self {
        Self {
            sigma: Some(sigma),
            ..Default::default()
        }
    }

    fn has(&self, name: &str) -> bool {
        match name {
            "sigma" => self.sigma.is_some(),
            "radius" => self.radius.is_some(),
            "dim" => self.dim.is_some(),
            "rho" => self.rho.is_some(),
            "gamma" => self.gamma.is_some(),
            "delta" => self.delta.is_some(),
            _ => false,
        }
    }

    fn non_negative(value: Option<f64>, name: &str) -> Result<f64, CcaError> {
        match value {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            Some(v) => Err(CcaError::invalid(
                name,
                format!("{v} must be finite and non-negative"),
            )),
            None => Err(CcaError::invalid(name, "required parameter is missing")),
        }
    }

    fn positive(value: Option<f64>, name: &str) -> Result<f64, CcaError> {
        match Self::non_negative(value, name)? {
            v if v > 0.0 => Ok(v),
            v => Err(CcaError::invalid(name, format!("{v} must be strictly positive"))),
        }
    }
}

struct RegistryEntry {
    kind: ProximalKind,
    name: &'static str,
    required: &'static [&'static str],
    build: fn(&ProximalParams) -> Result<Proximal, CcaError>,
}

static REGISTRY: [RegistryEntry; 13] = [
    RegistryEntry {
        kind: ProximalKind::L0,
        name: "L0",
        required: &["sigma"],
        build: |p| {
            Ok(Proximal::L0 {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::L0Ball,
        name: "L0Ball",
        required: &["radius"],
        build: |p| {
            Ok(Proximal::L0Ball {
                radius: ProximalParams::non_negative(p.radius, "radius")?.floor() as usize,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::L1,
        name: "L1",
        required: &["sigma"],
        build: |p| {
            Ok(Proximal::L1 {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::L1Ball,
        name: "L1Ball",
        required: &["radius"],
        build: |p| {
            Ok(Proximal::L1Ball {
                radius: ProximalParams::non_negative(p.radius, "radius")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::L2,
        name: "L2",
        required: &["sigma"],
        build: |p| {
            Ok(Proximal::L2 {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::L21,
        name: "L21",
        required: &["sigma"],
        build: |p| {
            Ok(Proximal::L21 {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::L21PlusL1,
        name: "L21_plus_L1",
        required: &["sigma", "rho"],
        build: |p| {
            Ok(Proximal::L21PlusL1 {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
                rho: ProximalParams::non_negative(p.rho, "rho")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::Nuclear,
        name: "Nuclear",
        required: &["sigma", "dim"],
        build: |p| {
            let dim = p
                .dim
                .filter(|&d| d > 0)
                .ok_or_else(|| CcaError::invalid("dim", "target rank must be at least 1"))?;
            Ok(Proximal::Nuclear {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
                dim,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::NuclearBall,
        name: "NuclearBall",
        required: &["radius"],
        build: |p| {
            Ok(Proximal::NuclearBall {
                radius: ProximalParams::non_negative(p.radius, "radius")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::Log,
        name: "Log",
        required: &["sigma", "gamma"],
        build: |p| {
            Ok(Proximal::Log {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
                gamma: ProximalParams::positive(p.gamma, "gamma")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::Log1,
        name: "Log1",
        required: &["sigma", "delta"],
        build: |p| {
            Ok(Proximal::Log1 {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
                delta: ProximalParams::positive(p.delta, "delta")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::Euclidean,
        name: "Euclidean",
        required: &["sigma"],
        build: |p| {
            Ok(Proximal::Euclidean {
                sigma: ProximalParams::non_negative(p.sigma, "sigma")?,
            })
        },
    },
    RegistryEntry {
        kind: ProximalKind::EuclideanBall,
        name: "EuclideanBall",
        required: &["radius"],
        build: |p| {
            Ok(Proximal::EuclideanBall {
                radius: ProximalParams::non_negative(p.radius, "radius")?,
            })
        },
    },
];

impl ProximalKind {
    fn entry(self) -> &'static RegistryEntry {
        REGISTRY
            .iter()
            .find(|entry| entry.kind == self)
            .unwrap_or(&REGISTRY[0])
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn required_params(self) -> &'static [&'static str] {
        self.entry().required
    }

    /// Validates `params` against this kind's requirements and builds the operator.
    pub fn build(self, params: &ProximalParams) -> Result<Proximal, CcaError> {
        let entry = self.entry();
        if let Some(missing) = entry.required.iter().find(|name| !params.has(name)) {
            return Err(CcaError::invalid(
                *missing,
                format!("required by the {} proximal operator", entry.name),
            ));
        }
        (entry.build)(params)
    }
}

impl FromStr for ProximalKind {
    type Err = CcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        REGISTRY
            .iter()
            .find(|entry| entry.name == s)
            .map(|entry| entry.kind)
            .ok_or_else(|| {
                let known: Vec<&str> = REGISTRY.iter().map(|entry| entry.name).collect();
                CcaError::invalid(
                    "proximal",
                    format!("unknown operator '{s}', expected one of {}", known.join(", ")),
                )
            })
    }
}

impl fmt::Display for ProximalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The built-in operators with their validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Proximal {
    L0 { sigma: f64 },
    L0Ball { radius: usize },
    L1 { sigma: f64 },
    L1Ball { radius: f64 },
    L2 { sigma: f64 },
    L21 { sigma: f64 },
    L21PlusL1 { sigma: f64, rho: f64 },
    Nuclear { sigma: f64, dim: usize },
    NuclearBall { radius: f64 },
    Log { sigma: f64, gamma: f64 },
    Log1 { sigma: f64, delta: f64 },
    Euclidean { sigma: f64 },
    EuclideanBall { radius: f64 },
}

fn indicator(feasible: bool) -> f64 {
    if feasible { 0.0 } else { f64::INFINITY }
}

fn row_norms(weights: &ArrayView2<f64>) -> Array1<f64> {
    weights.map_axis(Axis(1), |row| row.dot(&row).sqrt())
}

fn group_shrink(mut weights: Array2<f64>, threshold: f64) -> Array2<f64> {
    for mut row in weights.rows_mut() {
        let norm = row.dot(&row).sqrt();
        let factor = if norm > 0.0 {
            (1.0 - threshold / norm).max(0.0)
        } else {
            0.0
        };
        row.mapv_inplace(|v| v * factor);
    }
    weights
}

/// Euclidean projection onto `{x : ||x||₁ <= radius}` (sort-based, Duchi et al. 2008).
fn project_l1_ball(values: &[f64], radius: f64) -> Vec<f64> {
    let total: f64 = values.iter().map(|v| v.abs()).sum();
    if total <= radius {
        return values.to_vec();
    }
    if radius <= 0.0 {
        return vec![0.0; values.len()];
    }
    let mut sorted: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (j, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - radius) / (j + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        } else {
            break;
        }
    }
    values
        .iter()
        .map(|&v| soft_threshold_scalar(v, theta))
        .collect()
}

/// Minimizes `½(x - v)² + penalty(|x|)` over the candidates `0` and the
/// non-negative stationary points, then restores the sign of `v`.
fn scalar_prox<F>(v: f64, stationary: &[f64], penalty: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let a = v.abs();
    let objective = |x: f64| 0.5 * (x - a) * (x - a) + penalty(x);
    let mut best = 0.0;
    let mut best_value = objective(0.0);
    for &x in stationary.iter().filter(|x| x.is_finite() && **x > 0.0) {
        let value = objective(x);
        if value < best_value {
            best = x;
            best_value = value;
        }
    }
    v.signum() * best
}

fn quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let root = disc.sqrt();
    vec![(-b + root) / (2.0 * a), (-b - root) / (2.0 * a)]
}

impl ProximalOperator for Proximal {
    fn cost(&self, weights: ArrayView2<f64>) -> f64 {
        match *self {
            Proximal::L0 { sigma } => sigma * weights.iter().filter(|v| **v != 0.0).count() as f64,
            Proximal::L0Ball { radius } => {
                indicator(weights.iter().filter(|v| **v != 0.0).count() <= radius)
            }
            Proximal::L1 { sigma } => sigma * l1_norm(&weights),
            Proximal::L1Ball { radius } => indicator(l1_norm(&weights) <= radius + FEASIBILITY_SLACK),
            Proximal::L2 { sigma } => 0.5 * sigma * weights.iter().map(|v| v * v).sum::<f64>(),
            Proximal::L21 { sigma } => sigma * row_norms(&weights).sum(),
            Proximal::L21PlusL1 { sigma, rho } => {
                sigma * row_norms(&weights).sum() + rho * l1_norm(&weights)
            }
            Proximal::Nuclear { sigma, .. } => match weights.singular_values() {
                Ok(values) => sigma * values.sum(),
                Err(_) => f64::NAN,
            },
            Proximal::NuclearBall { radius } => match weights.singular_values() {
                Ok(values) => indicator(values.sum() <= radius + FEASIBILITY_SLACK),
                Err(_) => f64::NAN,
            },
            Proximal::Log { sigma, gamma } => {
                sigma * weights.iter().map(|v| (gamma * v.abs() + 1.0).ln()).sum::<f64>()
            }
            Proximal::Log1 { sigma, delta } => {
                sigma * weights.iter().map(|v| (v.abs() + delta).ln()).sum::<f64>()
            }
            Proximal::Euclidean { sigma } => sigma * l2_norm(&weights),
            Proximal::EuclideanBall { radius } => {
                indicator(l2_norm(&weights) <= radius + FEASIBILITY_SLACK)
            }
        }
    }

    fn prox(&self, weights: ArrayView2<f64>, step_size: f64) -> Result<Array2<f64>, CcaError> {
        let shape = weights.raw_dim();
        let prox = match *self {
            Proximal::L0 { sigma } => {
                let cutoff = (2.0 * sigma * step_size).sqrt();
                weights.mapv(|v| if v.abs() > cutoff { v } else { 0.0 })
            }
            Proximal::L0Ball { radius } => {
                let flat = Array1::from_iter(weights.iter().cloned());
                keep_top_k(&flat, radius).into_shape_with_order(shape).map_err(|e| {
                    CcaError::invalid("radius", format!("cannot reshape projection: {e}"))
                })?
            }
            Proximal::L1 { sigma } => soft_threshold(&weights, sigma * step_size),
            Proximal::L1Ball { radius } => {
                let flat: Vec<f64> = weights.iter().cloned().collect();
                Array2::from_shape_vec(shape, project_l1_ball(&flat, radius)).map_err(|e| {
                    CcaError::invalid("radius", format!("cannot reshape projection: {e}"))
                })?
            }
            Proximal::L2 { sigma } => weights.mapv(|v| v / (1.0 + sigma * step_size)),
            Proximal::L21 { sigma } => group_shrink(weights.to_owned(), sigma * step_size),
            Proximal::L21PlusL1 { sigma, rho } => {
                group_shrink(soft_threshold(&weights, rho * step_size), sigma * step_size)
            }
            Proximal::Nuclear { sigma, dim } => {
                let (u, s, vt) = weights.thin_svd()?;
                let shrunk = Array1::from_iter(s.iter().enumerate().map(|(i, &value)| {
                    if i < dim {
                        (value - sigma * step_size).max(0.0)
                    } else {
                        0.0
                    }
                }));
                (&u * &shrunk.insert_axis(Axis(0))).dot(&vt)
            }
            Proximal::NuclearBall { radius } => {
                let (u, s, vt) = weights.thin_svd()?;
                let projected = Array1::from(project_l1_ball(s.as_slice().unwrap_or(&[]), radius));
                (&u * &projected.insert_axis(Axis(0))).dot(&vt)
            }
            Proximal::Log { sigma, gamma } => {
                let ts = sigma * step_size;
                weights.mapv(|v| {
                    let a = v.abs();
                    // x - a + ts * gamma / (gamma x + 1) = 0, multiplied through by (gamma x + 1).
                    let roots = quadratic_roots(gamma, 1.0 - gamma * a, ts * gamma - a);
                    scalar_prox(v, &roots, |x| ts * (gamma * x + 1.0).ln())
                })
            }
            Proximal::Log1 { sigma, delta } => {
                let ts = sigma * step_size;
                weights.mapv(|v| {
                    let a = v.abs();
                    let roots = quadratic_roots(1.0, delta - a, ts - a * delta);
                    scalar_prox(v, &roots, |x| ts * (x + delta).ln())
                })
            }
            Proximal::Euclidean { sigma } => {
                let norm = l2_norm(&weights);
                let factor = if norm > 0.0 {
                    (1.0 - sigma * step_size / norm).max(0.0)
                } else {
                    0.0
                };
                weights.mapv(|v| v * factor)
            }
            Proximal::EuclideanBall { radius } => {
                let norm = l2_norm(&weights);
                let factor = if norm > radius { radius / norm } else { 1.0 };
                weights.mapv(|v| v * factor)
            }
        };
        Ok(prox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn build(name: &str, params: ProximalParams) -> Proximal {
        name.parse::<ProximalKind>().unwrap().build(&params).unwrap()
    }

    #[test]
    fn unknown_kind_is_rejected_with_its_name() {
        let err = "TV".parse::<ProximalKind>().unwrap_err();
        assert!(err.to_string().contains("'TV'"));
    }

    #[test]
    fn missing_required_parameter_fails_construction() {
        let err = ProximalKind::Nuclear
            .build(&ProximalParams::with_sigma(0.1))
            .unwrap_err();
        assert!(matches!(err, CcaError::InvalidParameter { ref name, .. } if name == "dim"));
        assert!(ProximalKind::L1.build(&ProximalParams::default()).is_err());
    }

    #[test]
    fn registry_names_round_trip() {
        for name in [
            "L0",
            "L0Ball",
            "L1",
            "L1Ball",
            "L2",
            "L21",
            "L21_plus_L1",
            "Nuclear",
            "NuclearBall",
            "Log",
            "Log1",
            "Euclidean",
            "EuclideanBall",
        ] {
            let kind: ProximalKind = name.parse().unwrap();
            assert_eq!(kind.to_string(), name);
            assert!(!kind.required_params().is_empty());
        }
    }

    #[test]
    fn l1_prox_is_soft_threshold() {
        let op = build("L1", ProximalParams::with_sigma(0.5));
        let w = array![[1.0, -0.2], [-2.0, 0.6]];
        let out = op.prox(w.view(), 2.0).unwrap();
        assert_eq!(out, array![[0.0, 0.0], [-1.0, 0.0]]);
        assert_abs_diff_eq!(op.cost(w.view()), 0.5 * 3.8, epsilon = 1e-12);
    }

    #[test]
    fn l1_ball_projection_lands_on_the_boundary() {
        let op = build(
            "L1Ball",
            ProximalParams {
                radius: Some(1.0),
                ..Default::default()
            },
        );
        let w = array![[3.0], [1.0], [-0.5]];
        let out = op.prox(w.view(), 1.0).unwrap();
        assert_abs_diff_eq!(l1_norm(&out), 1.0, epsilon = 1e-12);
        assert_eq!(op.cost(out.view()), 0.0);
        assert_eq!(op.cost(w.view()), f64::INFINITY);
    }

    #[test]
    fn group_penalty_removes_weak_rows() {
        let op = build("L21", ProximalParams::with_sigma(1.0));
        let w = array![[3.0, 4.0], [0.3, 0.4]];
        let out = op.prox(w.view(), 1.0).unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 2.4, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 1]], 3.2, epsilon = 1e-12);
        assert_eq!(out.row(1).sum(), 0.0);
    }

    #[test]
    fn nuclear_prox_caps_rank() {
        let op = build(
            "Nuclear",
            ProximalParams {
                sigma: Some(0.0),
                dim: Some(1),
                ..Default::default()
            },
        );
        let w = array![[2.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let out = op.prox(w.view(), 1.0).unwrap();
        let singular = out.singular_values().unwrap();
        assert_abs_diff_eq!(singular[0], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(singular[1], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn log_prox_never_increases_its_objective() {
        let op = build(
            "Log",
            ProximalParams {
                sigma: Some(0.7),
                gamma: Some(2.0),
                ..Default::default()
            },
        );
        let v = array![[1.5, -0.1, 0.0, -3.0]];
        let t = 0.8;
        let out = op.prox(v.view(), t).unwrap();
        let objective = |x: &Array2<f64>| t * op.cost(x.view()) + 0.5 * (x - &v).mapv(|d| d * d).sum();
        assert!(objective(&out) <= objective(&v) + 1e-12);
        assert!(objective(&out) <= objective(&Array2::zeros(v.raw_dim())) + 1e-12);
    }

    #[test]
    fn log1_small_inputs_collapse_to_zero() {
        let op = build(
            "Log1",
            ProximalParams {
                sigma: Some(1.0),
                delta: Some(0.5),
                ..Default::default()
            },
        );
        let out = op.prox(array![[0.05]].view(), 1.0).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
    }

    #[test]
    fn euclidean_ball_scales_down_only_outside() {
        let op = build(
            "EuclideanBall",
            ProximalParams {
                radius: Some(1.0),
                ..Default::default()
            },
        );
        let inside = array![[0.3, 0.4]];
        assert_eq!(op.prox(inside.view(), 1.0).unwrap(), inside);
        let outside = array![[3.0, 4.0]];
        let projected = op.prox(outside.view(), 1.0).unwrap();
        assert_abs_diff_eq!(l2_norm(&projected), 1.0, epsilon = 1e-12);
    }
}
