//! Shared vocabulary types for the selection engine.
//!
//! This module only holds types that cross module boundaries: the task kind
//! driving resampling validity, the synthetic-feature generation mode, and
//! the stability scores matrix produced by the path builder and consumed by
//! the FDR controller and the selection interface.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::ops::Deref;
use std::str::FromStr;

use crate::errors::SelectionError;

/// The kind of outcome the selector is resampling against.
///
/// Classification outcomes carry a two-class validity constraint on every
/// subsample; regression outcomes do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Classification,
    Regression,
}

/// Synthetic-feature generation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtificialKind {
    /// Randomly chosen real columns, each independently shuffled across
    /// samples. Preserves marginal distributions, destroys any association
    /// with the outcome.
    RandomPermutation,
    /// Second-moment-matched Gaussian knockoffs: decoys that preserve the
    /// covariance structure of the real features, so correlation-induced
    /// spurious selection is captured by the null reference as well.
    Knockoff,
}

impl FromStr for ArtificialKind {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random_permutation" => Ok(ArtificialKind::RandomPermutation),
            "knockoff" => Ok(ArtificialKind::Knockoff),
            other => Err(SelectionError::InvalidConfiguration(format!(
                "artificial feature kind must be \"random_permutation\" or \"knockoff\", got \"{other}\""
            ))),
        }
    }
}

/// Empirical selection frequencies, one row per feature and one column per
/// regularization grid point. Every entry is the fraction of resample fits
/// at that grid point in which the feature was selected, so all entries lie
/// in [0, 1]. Immutable once a fit has produced it.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct StabilityScores(pub Array2<f64>);

impl StabilityScores {
    pub fn new(scores: Array2<f64>) -> Self {
        Self(scores)
    }

    /// Per-feature maximum selection frequency across the whole grid. This
    /// is the statistic the FDR controller and the support mask operate on.
    pub fn max_over_grid(&self) -> Array1<f64> {
        self.0
            .map_axis(Axis(1), |row| row.iter().fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)))
    }

    pub fn as_view(&self) -> ArrayView2<'_, f64> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.0
    }
}

impl Deref for StabilityScores {
    type Target = Array2<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Array2<f64>> for StabilityScores {
    fn from(scores: Array2<f64>) -> Self {
        Self(scores)
    }
}
