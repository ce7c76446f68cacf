//! Base-estimator capability and the built-in sparse linear models.
//!
//! The stability engine never assumes a concrete model type. It consumes any
//! estimator implementing [`SparseEstimator`]: something that can take a
//! named penalty hyperparameter, fit on a design matrix and outcome vector,
//! and report a per-feature importance afterwards. Two deterministic
//! implementations ship with the crate: [`Lasso`] (coordinate descent) and
//! [`L1LogisticRegression`] (proximal gradient with optional balanced class
//! weights). Determinism matters here: it is what makes a seeded selection
//! fit reproducible bit-for-bit regardless of worker count.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("estimator has no hyperparameter named \"{0}\"")]
    UnknownHyperparameter(String),

    #[error("estimator has not been fitted; call `fit` first")]
    NotFitted,

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("labels must be 0.0 or 1.0 for binary classification, got {0}")]
    InvalidLabel(f64),

    #[error("X must contain at least one sample")]
    EmptyInput,
}

/// Capability consumed by the stability engine.
///
/// Implementations must be deterministic for identical inputs, and cheap to
/// clone: every resample fit receives its own freshly configured clone, so
/// no estimator instance is ever shared across concurrent fits.
pub trait SparseEstimator {
    /// Set a named hyperparameter prior to fitting. Unrecognized names fail
    /// with [`EstimatorError::UnknownHyperparameter`]; the selector probes
    /// this during validation so a misnamed penalty surfaces before any
    /// resampling starts.
    fn configure(&mut self, name: &str, value: f64) -> Result<(), EstimatorError>;

    /// Fit on a design matrix and outcome vector. Must not retain references
    /// into the inputs.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), EstimatorError>;

    /// Per-feature importances of the fitted model (signed coefficients for
    /// the built-in linear models).
    fn importances(&self) -> Result<ArrayView1<'_, f64>, EstimatorError>;
}

/// Rule converting a fitted model's importances into a selection cutoff.
///
/// `Fixed` is the usual choice for L1 models (anything with a non-negligible
/// coefficient counts as selected); the statistical rules compute the cutoff
/// from the fitted model's own absolute importances.
#[derive(Clone, Debug, PartialEq)]
pub enum ThresholdPolicy {
    Fixed(f64),
    Median,
    Mean,
    ScaledMedian(f64),
    ScaledMean(f64),
}

impl ThresholdPolicy {
    fn cutoff(&self, magnitudes: &[f64]) -> f64 {
        match *self {
            ThresholdPolicy::Fixed(value) => value,
            ThresholdPolicy::Median => median(magnitudes),
            ThresholdPolicy::Mean => mean(magnitudes),
            ThresholdPolicy::ScaledMedian(factor) => factor * median(magnitudes),
            ThresholdPolicy::ScaledMean(factor) => factor * mean(magnitudes),
        }
    }
}

/// Boolean selection mask over the importance vector: a feature is selected
/// when its absolute importance reaches the policy cutoff.
pub fn select_from_importances(importances: ArrayView1<'_, f64>, policy: &ThresholdPolicy) -> Vec<bool> {
    let magnitudes: Vec<f64> = importances.iter().map(|v| v.abs()).collect();
    let cutoff = policy.cutoff(&magnitudes);
    magnitudes.iter().map(|&m| m >= cutoff).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

fn check_dims(x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<(), EstimatorError> {
    if x.nrows() == 0 {
        return Err(EstimatorError::EmptyInput);
    }
    if x.nrows() != y.len() {
        return Err(EstimatorError::DimensionMismatch {
            expected: x.nrows(),
            found: y.len(),
        });
    }
    Ok(())
}

/// L1-penalized least squares, fitted by cyclic coordinate descent with
/// incremental residual updates. Minimizes
/// `1/(2n) * ||y - Xb||^2 + alpha * ||b||_1` with an implicit (unpenalized)
/// intercept handled by centering.
#[derive(Clone, Debug)]
pub struct Lasso {
    alpha: f64,
    max_iter: usize,
    tolerance: f64,
    coefficients: Option<Array1<f64>>,
    intercept: Option<f64>,
}

impl Lasso {
    pub fn new() -> Self {
        Self {
            alpha: 1.0,
            max_iter: 1000,
            tolerance: 1e-4,
            coefficients: None,
            intercept: None,
        }
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, EstimatorError> {
        let coefficients = self.coefficients.as_ref().ok_or(EstimatorError::NotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(EstimatorError::DimensionMismatch {
                expected: coefficients.len(),
                found: x.ncols(),
            });
        }
        let intercept = self.intercept.unwrap_or(0.0);
        Ok(x.dot(coefficients) + intercept)
    }
}

impl Default for Lasso {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseEstimator for Lasso {
    fn configure(&mut self, name: &str, value: f64) -> Result<(), EstimatorError> {
        match name {
            "alpha" => {
                self.alpha = value;
                Ok(())
            }
            other => Err(EstimatorError::UnknownHyperparameter(other.to_string())),
        }
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), EstimatorError> {
        check_dims(&x, &y)?;
        let n = x.nrows();
        let p = x.ncols();
        let n_f = n as f64;

        let x_means = x.sum_axis(Axis(0)) / n_f;
        let y_mean = y.sum() / n_f;
        let x_centered = &x - &x_means;
        let y_centered = y.mapv(|v| v - y_mean);

        let col_sq: Vec<f64> = (0..p)
            .map(|j| x_centered.column(j).fold(0.0, |acc, &v| acc + v * v))
            .collect();

        let mut beta = Array1::<f64>::zeros(p);
        // residual = y_centered - X_centered * beta, kept current incrementally
        let mut residual = y_centered.clone();

        for _ in 0..self.max_iter {
            let mut max_step = 0.0_f64;
            for j in 0..p {
                if col_sq[j] < 1e-12 {
                    continue;
                }
                let xj = x_centered.column(j);
                let rho = xj.dot(&residual) / n_f + col_sq[j] / n_f * beta[j];
                let updated = soft_threshold(rho, self.alpha) / (col_sq[j] / n_f);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    residual.scaled_add(-delta, &xj);
                    beta[j] = updated;
                    max_step = max_step.max(delta.abs());
                }
            }
            if max_step < self.tolerance {
                break;
            }
        }

        self.intercept = Some(y_mean - beta.dot(&x_means));
        self.coefficients = Some(beta);
        Ok(())
    }

    fn importances(&self) -> Result<ArrayView1<'_, f64>, EstimatorError> {
        self.coefficients
            .as_ref()
            .map(|c| c.view())
            .ok_or(EstimatorError::NotFitted)
    }
}

/// L1-penalized logistic regression, fitted by proximal gradient descent
/// (ISTA) with a Lipschitz step size. The penalty strength follows the
/// inverse-regularization convention: hyperparameter `C`, larger values
/// penalize less. Optional balanced class weighting reweights each sample
/// inversely to its class frequency.
#[derive(Clone, Debug)]
pub struct L1LogisticRegression {
    c: f64,
    balanced: bool,
    max_iter: usize,
    tolerance: f64,
    coefficients: Option<Array1<f64>>,
    intercept: Option<f64>,
}

impl L1LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            balanced: true,
            max_iter: 1000,
            tolerance: 1e-5,
            coefficients: None,
            intercept: None,
        }
    }

    pub fn c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, EstimatorError> {
        let coefficients = self.coefficients.as_ref().ok_or(EstimatorError::NotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(EstimatorError::DimensionMismatch {
                expected: coefficients.len(),
                found: x.ncols(),
            });
        }
        let intercept = self.intercept.unwrap_or(0.0);
        Ok((x.dot(coefficients) + intercept).mapv(sigmoid))
    }

    fn sample_weights(&self, y: ArrayView1<'_, f64>) -> Result<Array1<f64>, EstimatorError> {
        for &label in y.iter() {
            if label != 0.0 && label != 1.0 {
                return Err(EstimatorError::InvalidLabel(label));
            }
        }
        let n = y.len() as f64;
        if !self.balanced {
            return Ok(Array1::from_elem(y.len(), 1.0 / n));
        }
        let n_pos = y.iter().filter(|&&v| v == 1.0).count() as f64;
        let n_neg = n - n_pos;
        // weights sum to one; degenerate single-class inputs fall back to uniform
        if n_pos == 0.0 || n_neg == 0.0 {
            return Ok(Array1::from_elem(y.len(), 1.0 / n));
        }
        Ok(y.mapv(|v| if v == 1.0 { 0.5 / n_pos } else { 0.5 / n_neg }))
    }
}

impl Default for L1LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

fn sigmoid(z: f64) -> f64 {
    let clamped = z.clamp(-500.0, 500.0);
    1.0 / (1.0 + (-clamped).exp())
}

impl SparseEstimator for L1LogisticRegression {
    fn configure(&mut self, name: &str, value: f64) -> Result<(), EstimatorError> {
        match name {
            "C" => {
                self.c = value;
                Ok(())
            }
            other => Err(EstimatorError::UnknownHyperparameter(other.to_string())),
        }
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), EstimatorError> {
        check_dims(&x, &y)?;
        let p = x.ncols();
        let weights = self.sample_weights(y)?;

        // Lipschitz bound on the weighted logistic gradient; the 1/4 is the
        // maximum of p(1-p).
        let mut lipschitz = 0.0;
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            lipschitz += 0.25 * weights[i] * row.fold(0.0, |acc, &v| acc + v * v);
        }
        let step = 1.0 / lipschitz.max(1e-12);
        let penalty = 1.0 / (self.c * x.nrows() as f64);

        let mut beta = Array1::<f64>::zeros(p);
        let mut intercept = 0.0_f64;

        for _ in 0..self.max_iter {
            let eta = x.dot(&beta) + intercept;
            let probs = eta.mapv(sigmoid);
            // weighted residual: w_i * (p_i - y_i)
            let residual: Array1<f64> = ndarray::Zip::from(&probs)
                .and(&y)
                .and(&weights)
                .map_collect(|&pr, &yi, &wi| wi * (pr - yi));
            let grad = x.t().dot(&residual);
            let grad_intercept = residual.sum();

            let mut max_step = 0.0_f64;
            for j in 0..p {
                let updated = soft_threshold(beta[j] - step * grad[j], step * penalty);
                max_step = max_step.max((updated - beta[j]).abs());
                beta[j] = updated;
            }
            intercept -= step * grad_intercept;

            if max_step < self.tolerance {
                break;
            }
        }

        self.intercept = Some(intercept);
        self.coefficients = Some(beta);
        Ok(())
    }

    fn importances(&self) -> Result<ArrayView1<'_, f64>, EstimatorError> {
        self.coefficients
            .as_ref()
            .map(|c| c.view())
            .ok_or(EstimatorError::NotFitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn lasso_recovers_sparse_signal() {
        // y depends on column 0 only
        let x = array![
            [1.0, 0.3],
            [2.0, -0.1],
            [3.0, 0.2],
            [4.0, -0.4],
            [5.0, 0.1],
            [6.0, -0.2]
        ];
        let y = array![2.1, 3.9, 6.0, 8.1, 9.9, 12.0];
        let mut model = Lasso::new().alpha(0.05);
        model.fit(x.view(), y.view()).unwrap();
        let coefficients = model.coefficients().unwrap();
        assert!(coefficients[0] > 1.5, "signal coefficient {}", coefficients[0]);
        assert!(coefficients[1].abs() < 0.2, "noise coefficient {}", coefficients[1]);
    }

    #[test]
    fn lasso_heavy_penalty_shrinks_everything_to_zero() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = Lasso::new().alpha(100.0);
        model.fit(x.view(), y.view()).unwrap();
        for &c in model.coefficients().unwrap() {
            assert_relative_eq!(c, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn lasso_prediction_matches_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut model = Lasso::new().alpha(0.001);
        model.fit(x.view(), y.view()).unwrap();
        let predictions = model.predict(x.view()).unwrap();
        for (pred, actual) in predictions.iter().zip(y.iter()) {
            assert_relative_eq!(*pred, *actual, epsilon = 0.1);
        }
    }

    #[test]
    fn configure_rejects_unknown_hyperparameter() {
        let mut lasso = Lasso::new();
        assert!(matches!(
            lasso.configure("C", 0.5),
            Err(EstimatorError::UnknownHyperparameter(_))
        ));
        let mut logistic = L1LogisticRegression::new();
        assert!(matches!(
            logistic.configure("alpha", 0.5),
            Err(EstimatorError::UnknownHyperparameter(_))
        ));
    }

    #[test]
    fn importances_before_fit_fail() {
        let lasso = Lasso::new();
        assert!(matches!(lasso.importances(), Err(EstimatorError::NotFitted)));
    }

    #[test]
    fn logistic_separates_shifted_classes() {
        let x = array![
            [-2.0],
            [-1.5],
            [-1.8],
            [-2.2],
            [2.0],
            [1.5],
            [1.8],
            [2.2]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = L1LogisticRegression::new().c(10.0).max_iter(5000);
        model.fit(x.view(), y.view()).unwrap();
        let probs = model.predict_proba(x.view()).unwrap();
        for (prob, label) in probs.iter().zip(y.iter()) {
            if *label == 1.0 {
                assert!(*prob > 0.5, "positive sample got p={prob}");
            } else {
                assert!(*prob < 0.5, "negative sample got p={prob}");
            }
        }
    }

    #[test]
    fn logistic_rejects_non_binary_labels() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 2.0];
        let mut model = L1LogisticRegression::new();
        assert!(matches!(
            model.fit(x.view(), y.view()),
            Err(EstimatorError::InvalidLabel(_))
        ));
    }

    #[test]
    fn fixed_policy_masks_by_magnitude() {
        let importances = array![0.5, -0.3, 1e-9, 0.0];
        let mask = select_from_importances(importances.view(), &ThresholdPolicy::Fixed(1e-5));
        assert_eq!(mask, vec![true, true, false, false]);
    }

    #[test]
    fn statistical_policies_use_own_importances() {
        let importances = array![4.0, 2.0, 0.0, -2.0];
        // magnitudes 4, 2, 0, 2 -> mean 2, median 2
        let mean_mask = select_from_importances(importances.view(), &ThresholdPolicy::Mean);
        assert_eq!(mean_mask, vec![true, true, false, true]);
        let scaled = select_from_importances(importances.view(), &ThresholdPolicy::ScaledMean(1.5));
        assert_eq!(scaled, vec![true, false, false, false]);
        let median_mask = select_from_importances(importances.view(), &ThresholdPolicy::Median);
        assert_eq!(median_mask, vec![true, true, false, true]);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = Lasso::new();
        assert!(matches!(
            model.fit(x.view(), y.view()),
            Err(EstimatorError::DimensionMismatch { .. })
        ));
    }
}
