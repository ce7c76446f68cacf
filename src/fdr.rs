//! Decoy-calibrated false discovery proportion control.
//!
//! At a candidate threshold `t` the estimated FDP is
//!
//! ```text
//! FDP(t) = [ count(synthetic_max > t) / artificial_proportion + 1 ]
//!          / max(1, count(real_max > t))
//! ```
//!
//! a conservative finite-sample estimator: the `+1` keeps a run with zero
//! decoy survivors from reporting an estimate of zero, and the floor-1
//! denominator keeps the ratio finite when no real feature clears `t`.

use ndarray::ArrayView1;

/// Result of FDR control over one threshold grid.
#[derive(Clone, Debug)]
pub struct FdrCurve {
    pub thresholds: Vec<f64>,
    pub estimates: Vec<f64>,
    /// Smallest estimated FDP across the grid.
    pub min_fdp: f64,
    /// Threshold achieving `min_fdp`, clipped to at most 1.0. `None` when
    /// even the best threshold leaves the estimated FDP above 0.5: the
    /// "no usable threshold" state.
    pub selected: Option<f64>,
}

impl FdrCurve {
    /// The cutoff the selection interface should apply: the selected
    /// threshold, or 1.0 (select nothing) in the no-usable-threshold state.
    pub fn effective_threshold(&self) -> f64 {
        self.selected.unwrap_or(1.0)
    }
}

/// Compute the FDP curve from the per-feature maximum stability scores of
/// real and synthetic features, and pick the minimizing threshold.
pub fn control_fdr(
    real_max: ArrayView1<'_, f64>,
    synthetic_max: ArrayView1<'_, f64>,
    thresholds: &[f64],
    artificial_proportion: f64,
) -> FdrCurve {
    let mut estimates = Vec::with_capacity(thresholds.len());
    for &threshold in thresholds {
        let decoy_survivors = synthetic_max.iter().filter(|&&s| s > threshold).count() as f64;
        let discoveries = real_max.iter().filter(|&&s| s > threshold).count().max(1) as f64;
        estimates.push((decoy_survivors / artificial_proportion + 1.0) / discoveries);
    }

    let mut best_idx = 0;
    let mut min_fdp = f64::INFINITY;
    for (idx, &fdp) in estimates.iter().enumerate() {
        if fdp < min_fdp {
            min_fdp = fdp;
            best_idx = idx;
        }
    }

    let selected = if min_fdp > 0.5 {
        None
    } else {
        Some(thresholds[best_idx].min(1.0))
    };

    FdrCurve {
        thresholds: thresholds.to_vec(),
        estimates,
        min_fdp,
        selected,
    }
}
