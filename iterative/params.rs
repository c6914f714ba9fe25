//! Per-view hyperparameter broadcasting.

use crate::errors::CcaError;

/// A hyperparameter given either once for all views or once per view.
#[derive(Debug, Clone, PartialEq)]
pub enum PerView<T> {
    Shared(T),
    Each(Vec<T>),
}

impl<T> From<T> for PerView<T> {
    fn from(value: T) -> Self {
        PerView::Shared(value)
    }
}

impl<T: Clone> PerView<T> {
    /// Expands to exactly `n_views` values, rejecting sequences of the wrong length.
    pub fn broadcast(&self, name: &str, n_views: usize) -> Result<Vec<T>, CcaError> {
        match self {
            PerView::Shared(value) => Ok(vec![value.clone(); n_views]),
            PerView::Each(values) if values.len() == n_views => Ok(values.clone()),
            PerView::Each(values) => Err(CcaError::ParameterLength {
                name: name.to_string(),
                expected: n_views,
                found: values.len(),
            }),
        }
    }

    /// Broadcasts and then checks every value with `check`, which returns the
    /// reason a value is rejected.
    pub fn resolve<F>(&self, name: &str, n_views: usize, check: F) -> Result<Vec<T>, CcaError>
    where
        F: Fn(&T) -> Option<String>,
    {
        let values = self.broadcast(name, n_views)?;
        for (view, value) in values.iter().enumerate() {
            if let Some(reason) = check(value) {
                return Err(CcaError::invalid(name, format!("view {view}: {reason}")));
            }
        }
        Ok(values)
    }
}

/// Accepts finite values in the closed interval `[lo, hi]`.
pub fn in_closed_range(lo: f64, hi: f64) -> impl Fn(&f64) -> Option<String> {
    move |&value| {
        if value.is_finite() && value >= lo && value <= hi {
            None
        } else {
            Some(format!("{value} is outside [{lo}, {hi}]"))
        }
    }
}

/// Accepts finite values that are at least `lo`.
pub fn at_least(lo: f64) -> impl Fn(&f64) -> Option<String> {
    move |&value| {
        if value.is_finite() && value >= lo {
            None
        } else {
            Some(format!("{value} must be finite and at least {lo}"))
        }
    }
}
