//! Stability path computation.
//!
//! For each regularization value the builder draws a fresh batch of
//! resampled index sets, fans the per-resample fits out across the rayon
//! pool, and aggregates the returned selection masks into one column of the
//! stability scores matrix. Draws happen serially on the driving thread from
//! the single master generator and results are collected positionally, so a
//! seeded run produces the same scores for any worker count.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rayon::prelude::*;

use crate::errors::SelectionError;
use crate::estimator::{SparseEstimator, ThresholdPolicy, select_from_importances};
use crate::resample::draw_subsample;
use crate::types::TaskKind;

/// Knobs the path builder needs from the selector configuration.
pub struct PathConfig<'a> {
    pub penalty_name: &'a str,
    pub lambda_grid: &'a [f64],
    pub n_bootstraps: usize,
    pub n_subsamples: usize,
    pub replace: bool,
    pub task: TaskKind,
    pub policy: &'a ThresholdPolicy,
}

/// Fit one freshly configured estimator clone on one resampled slice and
/// return the boolean selection mask over all (real + synthetic) columns.
///
/// The unit of parallel work: no shared mutable state, no side effects
/// beyond the returned mask.
pub fn fit_and_select<E>(
    estimator: &E,
    penalty_name: &str,
    penalty_value: f64,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    policy: &ThresholdPolicy,
) -> Result<Vec<bool>, SelectionError>
where
    E: SparseEstimator + Clone,
{
    let mut fitted = estimator.clone();
    fitted.configure(penalty_name, penalty_value)?;
    fitted.fit(x, y)?;
    let importances = fitted.importances()?;
    if importances.len() != x.ncols() {
        return Err(SelectionError::Estimator(
            crate::estimator::EstimatorError::DimensionMismatch {
                expected: x.ncols(),
                found: importances.len(),
            },
        ));
    }
    Ok(select_from_importances(importances, policy))
}

/// Build the full stability scores matrix (columns × grid points) over
/// `x_aug`, which already carries any synthetic columns on its right.
pub fn build_stability_path<E>(
    estimator: &E,
    x_aug: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    config: &PathConfig<'_>,
    rng: &mut impl Rng,
) -> Result<Array2<f64>, SelectionError>
where
    E: SparseEstimator + Clone + Send + Sync,
{
    let n_columns = x_aug.ncols();
    let mut scores = Array2::zeros((n_columns, config.lambda_grid.len()));

    for (grid_idx, &penalty_value) in config.lambda_grid.iter().enumerate() {
        // a fresh batch per grid point: resamples are never shared across
        // grid points
        let draws: Vec<Vec<usize>> = (0..config.n_bootstraps)
            .map(|_| draw_subsample(y, config.n_subsamples, config.replace, config.task, rng))
            .collect::<Result<_, _>>()?;

        log::debug!(
            "stability path: {}={} ({}/{}), dispatching {} resample fits",
            config.penalty_name,
            penalty_value,
            grid_idx + 1,
            config.lambda_grid.len(),
            config.n_bootstraps
        );

        let masks: Vec<Vec<bool>> = draws
            .into_par_iter()
            .map(|indices| {
                let x_sub = x_aug.select(Axis(0), &indices);
                let y_sub = y.select(Axis(0), &indices);
                fit_and_select(
                    estimator,
                    config.penalty_name,
                    penalty_value,
                    x_sub.view(),
                    y_sub.view(),
                    config.policy,
                )
            })
            .collect::<Result<_, _>>()?;

        let mut column = scores.column_mut(grid_idx);
        for mask in &masks {
            for (j, &selected) in mask.iter().enumerate() {
                if selected {
                    column[j] += 1.0;
                }
            }
        }
        column.mapv_inplace(|count| count / config.n_bootstraps as f64);
    }

    Ok(scores)
}
