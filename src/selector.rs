//! The selection interface: configuration, fitting, and the fitted state.
//!
//! `StabilitySelector` drives the whole procedure: validate the
//! configuration, realize the synthetic feature block, build the stability
//! path over the regularization grid, run FDR control (unless a fixed hard
//! threshold bypasses it), and expose the result as a support mask /
//! reduced matrix plus read-only diagnostics.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::errors::SelectionError;
use crate::estimator::{SparseEstimator, ThresholdPolicy};
use crate::fdr::{FdrCurve, control_fdr};
use crate::path::{PathConfig, build_stability_path};
use crate::synthetic::make_artificial_features;
use crate::types::{ArtificialKind, StabilityScores, TaskKind};

/// Construction-time configuration surface. Defaults mirror the reference
/// procedure: a 30-point grid on [0.01, 1.0] for an inverse-regularization
/// hyperparameter named `C`, 1000 bootstraps of half the samples without
/// replacement, permutation decoys at proportion 1.0 with FDR thresholds
/// scanned over 0.30..0.99.
#[derive(Clone, Debug)]
pub struct StabilityConfig {
    /// Name of the base estimator's penalty hyperparameter (e.g. `"alpha"`
    /// for the built-in Lasso, `"C"` for L1 logistic regression).
    pub penalty_name: String,
    pub lambda_grid: Vec<f64>,
    /// Resample fits per grid point.
    pub n_bootstraps: usize,
    /// `None` disables decoys entirely; a fixed `threshold` is then
    /// mandatory.
    pub artificial_kind: Option<ArtificialKind>,
    /// Decoy count as a fraction of the real feature count, in (0, 1].
    pub artificial_proportion: f64,
    /// Subsample size as a fraction of the population; may exceed 1.0 when
    /// `replace` is set.
    pub sample_fraction: f64,
    pub replace: bool,
    /// Fixed hard selection threshold. Setting this bypasses FDR control.
    pub threshold: Option<f64>,
    /// Candidate thresholds scanned by the FDR controller.
    pub fdr_threshold_range: Vec<f64>,
    /// Rule turning fitted importances into a per-resample selection mask.
    pub importance_policy: ThresholdPolicy,
    pub task: TaskKind,
    /// `None` runs on the ambient rayon pool; `Some(n)` pins a dedicated
    /// pool of `n` workers for the duration of the fit.
    pub n_workers: Option<usize>,
    pub random_state: Option<u64>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            penalty_name: "C".to_string(),
            lambda_grid: Array1::linspace(0.01, 1.0, 30).to_vec(),
            n_bootstraps: 1000,
            artificial_kind: Some(ArtificialKind::RandomPermutation),
            artificial_proportion: 1.0,
            sample_fraction: 0.5,
            replace: false,
            threshold: None,
            fdr_threshold_range: (30..100).map(|i| i as f64 / 100.0).collect(),
            importance_policy: ThresholdPolicy::Fixed(1e-5),
            task: TaskKind::Classification,
            n_workers: None,
            random_state: None,
        }
    }
}

/// Everything one `fit` call produces. Read-only afterwards; refitting
/// replaces the whole state.
#[derive(Clone, Debug)]
struct FittedState {
    n_features_in: usize,
    stability_scores: StabilityScores,
    artificial_scores: Option<StabilityScores>,
    artificial_block: Option<Array2<f64>>,
    fdr_curve: Option<FdrCurve>,
}

/// Stability-selection feature selector with decoy-calibrated FDR control.
///
/// Generic over the base estimator capability; every resample fit receives
/// its own freshly configured clone of `estimator`.
pub struct StabilitySelector<E> {
    estimator: E,
    config: StabilityConfig,
    state: Option<FittedState>,
}

impl<E> StabilitySelector<E>
where
    E: SparseEstimator + Clone + Send + Sync,
{
    pub fn new(estimator: E, config: StabilityConfig) -> Self {
        Self {
            estimator,
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Run the full procedure on `x` (samples × features) and `y`. The only
    /// mutating operation; any previously fitted state is discarded first.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), SelectionError> {
        self.state = None;
        self.validate(x, y)?;

        let state = match self.config.n_workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| {
                        SelectionError::InvalidConfiguration(format!(
                            "could not build a worker pool of size {workers}: {e}"
                        ))
                    })?;
                pool.install(|| fit_state(&self.estimator, &self.config, x, y))?
            }
            None => fit_state(&self.estimator, &self.config, x, y)?,
        };

        self.state = Some(state);
        Ok(())
    }

    /// Boolean mask over the real features: `true` where the maximum
    /// stability score across the grid exceeds the effective threshold.
    pub fn get_support(&self, new_threshold: Option<f64>) -> Result<Array1<bool>, SelectionError> {
        let state = self.fitted()?;
        let cutoff = self.resolve_threshold(state, new_threshold)?;
        Ok(state.stability_scores.max_over_grid().mapv(|score| score > cutoff))
    }

    /// Names of the selected features, in input order. `input_features`
    /// defaults to generated names `x0..x{p-1}`.
    pub fn get_feature_names_out(
        &self,
        input_features: Option<&[String]>,
        new_threshold: Option<f64>,
    ) -> Result<Vec<String>, SelectionError> {
        let state = self.fitted()?;
        let support = self.get_support(new_threshold)?;
        let names: Vec<String> = match input_features {
            Some(names) => {
                if names.len() != state.n_features_in {
                    return Err(SelectionError::ShapeMismatch {
                        expected: state.n_features_in,
                        found: names.len(),
                    });
                }
                names.to_vec()
            }
            None => (0..state.n_features_in).map(|i| format!("x{i}")).collect(),
        };
        Ok(names
            .into_iter()
            .zip(support.iter())
            .filter(|&(_, &selected)| selected)
            .map(|(name, _)| name)
            .collect())
    }

    /// Reduce `x` to the selected feature columns. An empty selection is a
    /// valid outcome: it is logged at warning level and yields a
    /// well-typed zero-column matrix, never an error.
    pub fn transform(
        &self,
        x: ArrayView2<'_, f64>,
        new_threshold: Option<f64>,
    ) -> Result<Array2<f64>, SelectionError> {
        let state = self.fitted()?;
        if x.ncols() != state.n_features_in {
            return Err(SelectionError::ShapeMismatch {
                expected: state.n_features_in,
                found: x.ncols(),
            });
        }
        let support = self.get_support(new_threshold)?;
        let keep: Vec<usize> = support
            .iter()
            .enumerate()
            .filter(|&(_, &selected)| selected)
            .map(|(j, _)| j)
            .collect();
        if keep.is_empty() {
            log::warn!(
                "no features were selected: either the data is too noisy or the selection threshold too strict"
            );
            return Ok(Array2::zeros((x.nrows(), 0)));
        }
        Ok(x.select(Axis(1), &keep))
    }

    /// Stability scores of the real features (features × grid points).
    pub fn stability_scores(&self) -> Result<&StabilityScores, SelectionError> {
        Ok(&self.fitted()?.stability_scores)
    }

    /// Stability scores of the decoy columns; `None` when decoys were
    /// disabled.
    pub fn artificial_scores(&self) -> Result<Option<&StabilityScores>, SelectionError> {
        Ok(self.fitted()?.artificial_scores.as_ref())
    }

    /// The realized decoy block (samples × decoys); `None` when decoys were
    /// disabled.
    pub fn artificial_block(&self) -> Result<Option<&Array2<f64>>, SelectionError> {
        Ok(self.fitted()?.artificial_block.as_ref())
    }

    /// The FDP curve; `None` when FDR control was bypassed.
    pub fn fdr_curve(&self) -> Result<Option<&FdrCurve>, SelectionError> {
        Ok(self.fitted()?.fdr_curve.as_ref())
    }

    /// The cutoff `get_support(None)` applies.
    pub fn effective_threshold(&self) -> Result<f64, SelectionError> {
        let state = self.fitted()?;
        self.resolve_threshold(state, None)
    }

    /// Feature count seen at fit time.
    pub fn n_features_in(&self) -> Result<usize, SelectionError> {
        Ok(self.fitted()?.n_features_in)
    }

    fn fitted(&self) -> Result<&FittedState, SelectionError> {
        self.state.as_ref().ok_or(SelectionError::NotFitted)
    }

    /// Override threshold if given, else the configured hard threshold,
    /// else the FDR-selected one (1.0 in the no-usable-threshold state).
    fn resolve_threshold(
        &self,
        state: &FittedState,
        new_threshold: Option<f64>,
    ) -> Result<f64, SelectionError> {
        if let Some(threshold) = new_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(SelectionError::InvalidConfiguration(format!(
                    "override threshold must lie in (0, 1], got {threshold}"
                )));
            }
            return Ok(threshold);
        }
        if let Some(threshold) = self.config.threshold {
            return Ok(threshold);
        }
        state
            .fdr_curve
            .as_ref()
            .map(FdrCurve::effective_threshold)
            .ok_or_else(|| {
                SelectionError::InvalidConfiguration(
                    "no selection threshold is configured and FDR control was not enabled".to_string(),
                )
            })
    }

    fn validate(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), SelectionError> {
        let config = &self.config;
        let (n_samples, n_features) = x.dim();

        if n_samples == 0 || n_features == 0 {
            return Err(SelectionError::InvalidConfiguration(format!(
                "X must be non-empty, got shape ({n_samples}, {n_features})"
            )));
        }
        if y.len() != n_samples {
            return Err(SelectionError::InvalidConfiguration(format!(
                "X has {n_samples} rows but y has {} entries",
                y.len()
            )));
        }
        if config.n_bootstraps == 0 {
            return Err(SelectionError::InvalidConfiguration(
                "n_bootstraps must be a positive integer".to_string(),
            ));
        }
        if !(config.sample_fraction > 0.0) || !config.sample_fraction.is_finite() {
            return Err(SelectionError::InvalidConfiguration(format!(
                "sample_fraction must be a positive finite number, got {}",
                config.sample_fraction
            )));
        }
        let n_subsamples = (config.sample_fraction * n_samples as f64).floor() as usize;
        if n_subsamples == 0 {
            return Err(SelectionError::InvalidConfiguration(format!(
                "sample_fraction {} of {n_samples} samples leaves an empty subsample",
                config.sample_fraction
            )));
        }
        if !config.replace && n_subsamples > n_samples {
            return Err(SelectionError::InvalidConfiguration(format!(
                "without replacement, the subsample size cannot exceed the population; \
                 got n_samples={n_samples} and n_subsamples={n_subsamples}"
            )));
        }
        if config.lambda_grid.is_empty() {
            return Err(SelectionError::InvalidConfiguration(
                "the regularization grid must contain at least one value".to_string(),
            ));
        }
        if config.lambda_grid.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(SelectionError::InvalidConfiguration(
                "every regularization value must be a positive finite number".to_string(),
            ));
        }
        if let Some(threshold) = config.threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(SelectionError::InvalidConfiguration(format!(
                    "threshold must lie in (0, 1], got {threshold}"
                )));
            }
        }
        if config.threshold.is_none() && config.artificial_kind.is_none() {
            return Err(SelectionError::InvalidConfiguration(
                "without artificial features a fixed selection threshold must be configured".to_string(),
            ));
        }
        if config.artificial_kind.is_some() {
            if !(config.artificial_proportion > 0.0 && config.artificial_proportion <= 1.0) {
                return Err(SelectionError::InvalidConfiguration(format!(
                    "artificial_proportion must lie in (0, 1], got {}",
                    config.artificial_proportion
                )));
            }
            if config.threshold.is_none() && config.fdr_threshold_range.is_empty() {
                return Err(SelectionError::InvalidConfiguration(
                    "the FDR threshold grid must contain at least one value".to_string(),
                ));
            }
        }

        // surface a misnamed penalty hyperparameter before any resampling
        let mut probe = self.estimator.clone();
        probe
            .configure(&config.penalty_name, config.lambda_grid[0])
            .map_err(|_| {
                SelectionError::InvalidConfiguration(format!(
                    "penalty_name = \"{}\", but the base estimator has no hyperparameter with that name",
                    config.penalty_name
                ))
            })?;

        Ok(())
    }
}

fn fit_state<E>(
    estimator: &E,
    config: &StabilityConfig,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<FittedState, SelectionError>
where
    E: SparseEstimator + Clone + Send + Sync,
{
    let (n_samples, n_features) = x.dim();
    let n_subsamples = (config.sample_fraction * n_samples as f64).floor() as usize;

    let mut rng = match config.random_state {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (x_path, artificial_block) = match config.artificial_kind {
        Some(kind) => {
            // floored at one decoy so the FDP numerator can actually move
            let nb_noise =
                (((n_features as f64) * config.artificial_proportion).floor() as usize).max(1);
            let block = make_artificial_features(x, kind, nb_noise, &mut rng)?;
            let mut augmented = Array2::zeros((n_samples, n_features + nb_noise));
            augmented.slice_mut(s![.., ..n_features]).assign(&x);
            augmented.slice_mut(s![.., n_features..]).assign(&block);
            (augmented, Some(block))
        }
        None => (x.to_owned(), None),
    };

    let n_decoys = x_path.ncols() - n_features;
    log::info!(
        "stability selection: {} grid points x {} resamples on {} samples, {} features, {} decoys",
        config.lambda_grid.len(),
        config.n_bootstraps,
        n_samples,
        n_features,
        n_decoys
    );

    let path_config = PathConfig {
        penalty_name: &config.penalty_name,
        lambda_grid: &config.lambda_grid,
        n_bootstraps: config.n_bootstraps,
        n_subsamples,
        replace: config.replace,
        task: config.task,
        policy: &config.importance_policy,
    };
    let scores = build_stability_path(estimator, x_path.view(), y, &path_config, &mut rng)?;

    let stability_scores = StabilityScores::new(scores.slice(s![..n_features, ..]).to_owned());

    let (artificial_scores, fdr_curve) = if artificial_block.is_some() {
        let artificial = StabilityScores::new(scores.slice(s![n_features.., ..]).to_owned());
        let curve = if config.threshold.is_none() {
            let curve = control_fdr(
                stability_scores.max_over_grid().view(),
                artificial.max_over_grid().view(),
                &config.fdr_threshold_range,
                config.artificial_proportion,
            );
            match curve.selected {
                Some(threshold) => log::info!(
                    "FDR control selected stability threshold {threshold:.2} (estimated FDP {:.3})",
                    curve.min_fdp
                ),
                None => log::warn!(
                    "no threshold achieves an estimated FDP of 0.5 or less; the selection will be empty"
                ),
            }
            Some(curve)
        } else {
            // a fixed hard threshold bypasses FDR control entirely
            None
        };
        (Some(artificial), curve)
    } else {
        (None, None)
    };

    Ok(FittedState {
        n_features_in: n_features,
        stability_scores,
        artificial_scores,
        artificial_block,
        fdr_curve,
    })
}
