//! Synthetic (decoy) feature generation.
//!
//! Decoy columns are statistically exchangeable with real features under the
//! null of "no association with the outcome" and serve as the reference set
//! for FDR estimation. Two constructions are supported: random permutation
//! of real columns, and second-moment-matched Gaussian knockoffs built with
//! the equicorrelated construction.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_linalg::{Eigh, Inverse, UPLO};
use rand::Rng;
use rand::seq::{SliceRandom, index};
use rand_distr::StandardNormal;

use crate::errors::SelectionError;
use crate::types::ArtificialKind;

/// Generate `nb_noise` decoy columns with the same row count as `x`.
///
/// The generator draws from `rng` in a fixed order, so a seeded run always
/// realizes the same block.
pub fn make_artificial_features(
    x: ArrayView2<'_, f64>,
    kind: ArtificialKind,
    nb_noise: usize,
    rng: &mut impl Rng,
) -> Result<Array2<f64>, SelectionError> {
    let n_features = x.ncols();
    if nb_noise == 0 || nb_noise > n_features {
        return Err(SelectionError::InvalidConfiguration(format!(
            "the number of decoy columns must lie in 1..={n_features}, got {nb_noise}"
        )));
    }

    match kind {
        ArtificialKind::RandomPermutation => Ok(permuted_columns(x, nb_noise, rng)),
        ArtificialKind::Knockoff => {
            let knockoffs = gaussian_knockoffs(x, rng)?;
            let keep = index::sample(rng, n_features, nb_noise).into_vec();
            Ok(knockoffs.select(Axis(1), &keep))
        }
    }
}

/// Pick `nb_noise` real columns without replacement and independently
/// shuffle each across samples: marginal distributions survive, any real
/// association with the outcome does not.
fn permuted_columns(x: ArrayView2<'_, f64>, nb_noise: usize, rng: &mut impl Rng) -> Array2<f64> {
    let chosen = index::sample(rng, x.ncols(), nb_noise).into_vec();
    let mut block = Array2::zeros((x.nrows(), nb_noise));
    for (k, &j) in chosen.iter().enumerate() {
        let mut values = x.column(j).to_vec();
        values.shuffle(rng);
        block.column_mut(k).assign(&Array1::from_vec(values));
    }
    block
}

/// Equicorrelated Gaussian knockoffs for all columns of `x`.
///
/// With estimated moments `(mu, Sigma)` and `S = s_equi * diag(Sigma)` where
/// `s_equi = min(1, 2 * lambda_min(correlation))`, the knockoff block is
/// drawn from the conditional Gaussian
///
/// ```text
/// X~ | X ~ N( mu + (X - mu)(I - Sigma^-1 S),  2S - S Sigma^-1 S )
/// ```
///
/// which matches the covariance of the real features and their cross-moments
/// with the knockoffs. The covariance is ridge-stabilized before inversion
/// and the conditional-covariance square root is taken via a symmetric
/// eigendecomposition with negative eigenvalues floored at zero, so
/// rank-deficient inputs (more features than samples) cannot make the draw
/// fail.
fn gaussian_knockoffs(x: ArrayView2<'_, f64>, rng: &mut impl Rng) -> Result<Array2<f64>, SelectionError> {
    let (n_samples, n_features) = x.dim();
    let n_f = n_samples as f64;

    let mu = x.sum_axis(Axis(0)) / n_f;
    let x_centered = &x - &mu;
    let mut sigma = x_centered.t().dot(&x_centered) / (n_f - 1.0).max(1.0);

    let avg_variance = sigma.diag().sum() / n_features as f64;
    let ridge = 1e-6 * avg_variance.max(1e-12);
    for j in 0..n_features {
        sigma[(j, j)] += ridge;
    }

    let std_devs: Vec<f64> = sigma.diag().iter().map(|&v| v.sqrt().max(1e-12)).collect();
    let mut correlation = sigma.clone();
    for i in 0..n_features {
        for j in 0..n_features {
            correlation[(i, j)] /= std_devs[i] * std_devs[j];
        }
    }

    // eigenvalues come back in ascending order
    let (corr_eigenvalues, _) = correlation.eigh(UPLO::Lower)?;
    let s_equi = (2.0 * corr_eigenvalues[0]).min(1.0).max(1e-6);
    let s: Array1<f64> = sigma.diag().mapv(|v| s_equi * v);

    let sigma_inv = sigma.inv()?;

    // A = I - Sigma^-1 S, with S diagonal
    let mut transfer = Array2::eye(n_features);
    for i in 0..n_features {
        for j in 0..n_features {
            transfer[(i, j)] -= sigma_inv[(i, j)] * s[j];
        }
    }

    // C = 2S - S Sigma^-1 S, symmetrized against accumulation error
    let mut cond_cov = Array2::zeros((n_features, n_features));
    for i in 0..n_features {
        for j in 0..n_features {
            cond_cov[(i, j)] = -s[i] * sigma_inv[(i, j)] * s[j];
        }
    }
    for j in 0..n_features {
        cond_cov[(j, j)] += 2.0 * s[j];
    }
    let cond_cov = (&cond_cov + &cond_cov.t()) * 0.5;

    let (mut cov_eigenvalues, cov_eigenvectors) = cond_cov.eigh(UPLO::Lower)?;
    cov_eigenvalues.mapv_inplace(|e| e.max(0.0).sqrt());
    let mut sqrt_cov = cov_eigenvectors;
    for (j, mut column) in sqrt_cov.columns_mut().into_iter().enumerate() {
        column *= cov_eigenvalues[j];
    }

    let standard_normal =
        Array2::from_shape_fn((n_samples, n_features), |_| rng.sample::<f64, _>(StandardNormal));

    let cond_mean = x_centered.dot(&transfer) + &mu;
    Ok(cond_mean + standard_normal.dot(&sqrt_cov.t()))
}
