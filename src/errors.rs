//! Crate-wide error taxonomy.
//!
//! Configuration violations are surfaced synchronously, before any resampling
//! or fitting starts, and are never retried. A failure inside a single
//! resample fit aborts the whole selection: every resample at a grid point
//! must contribute to the selection frequencies, so silent skipping is
//! disallowed.

use thiserror::Error;

use crate::estimator::EstimatorError;

#[derive(Error, Debug)]
pub enum SelectionError {
    /// Contract violation in the configuration or the fit arguments.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A read accessor was called before a successful `fit`.
    #[error("this selector has not been fitted yet; call `fit` before reading results")]
    NotFitted,

    /// Feature-count mismatch between fit time and transform time.
    #[error("feature count mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// The class-balance constraint could not be satisfied within the retry
    /// budget. Signals that the outcome vector is unusable for resampling,
    /// not a transient fault.
    #[error(
        "could not draw a subsample containing both outcome classes after {attempts} attempts; \
         the outcome vector is too imbalanced for this procedure"
    )]
    DegenerateInput { attempts: usize },

    /// The base estimator failed inside a resample fit.
    #[error("base estimator failed during a resample fit: {0}")]
    Estimator(#[from] EstimatorError),

    /// A dense linear algebra routine failed (knockoff construction).
    #[error("linear algebra routine failed: {0}")]
    LinearAlgebra(#[from] ndarray_linalg::error::LinalgError),
}
