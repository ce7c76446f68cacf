//! Bootstrap/subsample index drawing.
//!
//! One draw produces `n_subsamples` indices into the sample population,
//! with or without replacement. For classification outcomes a draw is only
//! valid if it contains at least two distinct classes; invalid draws are
//! redrawn from the same generator state, up to a bounded retry budget.

use ndarray::ArrayView1;
use rand::Rng;
use rand::seq::index;

use crate::errors::SelectionError;
use crate::types::TaskKind;

/// Retry budget for the class-balance constraint. Exhausting it means the
/// outcome vector is so imbalanced that subsamples of the requested size
/// almost never contain both classes, which no amount of retrying fixes.
pub const MAX_REDRAWS: usize = 1000;

/// Draw one index set of size `n_subsamples` from the population described
/// by `y`. Reproducible: the same seeded generator and call sequence yields
/// the same sequence of index sets.
pub fn draw_subsample(
    y: ArrayView1<'_, f64>,
    n_subsamples: usize,
    replace: bool,
    task: TaskKind,
    rng: &mut impl Rng,
) -> Result<Vec<usize>, SelectionError> {
    let n_samples = y.len();

    if !replace && n_subsamples > n_samples {
        return Err(SelectionError::InvalidConfiguration(format!(
            "without replacement, n_subsamples cannot exceed the population size; \
             got n_samples={n_samples} and n_subsamples={n_subsamples}"
        )));
    }
    if n_subsamples == 0 || n_samples == 0 {
        return Err(SelectionError::InvalidConfiguration(
            "cannot draw an empty subsample".to_string(),
        ));
    }

    for _ in 0..MAX_REDRAWS {
        let indices = if replace {
            (0..n_subsamples).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            index::sample(rng, n_samples, n_subsamples).into_vec()
        };

        match task {
            TaskKind::Regression => return Ok(indices),
            TaskKind::Classification => {
                let first = y[indices[0]];
                if indices.iter().any(|&i| y[i] != first) {
                    return Ok(indices);
                }
            }
        }
    }

    Err(SelectionError::DegenerateInput { attempts: MAX_REDRAWS })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn binary_outcome(n_positive: usize, n_negative: usize) -> Array1<f64> {
        let mut y = vec![1.0; n_positive];
        y.extend(std::iter::repeat(0.0).take(n_negative));
        Array1::from_vec(y)
    }

    #[test]
    fn same_seed_reproduces_the_draw_sequence() {
        let y = binary_outcome(10, 10);
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let a = draw_subsample(y.view(), 10, false, TaskKind::Classification, &mut rng_a).unwrap();
            let b = draw_subsample(y.view(), 10, false, TaskKind::Classification, &mut rng_b).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn oversized_subsample_without_replacement_is_rejected() {
        let y = binary_outcome(5, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let result = draw_subsample(y.view(), 11, false, TaskKind::Classification, &mut rng);
        assert!(matches!(result, Err(SelectionError::InvalidConfiguration(_))));
    }

    #[test]
    fn oversized_subsample_with_replacement_is_allowed() {
        let y = binary_outcome(5, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let indices = draw_subsample(y.view(), 20, true, TaskKind::Classification, &mut rng).unwrap();
        assert_eq!(indices.len(), 20);
        assert!(indices.iter().all(|&i| i < 10));
    }

    #[test]
    fn classification_draws_always_contain_both_classes() {
        // 2 positives among 40: naive draws of 8 frequently miss the
        // positives, so the redraw loop has to do real work here
        let y = binary_outcome(2, 38);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let indices = draw_subsample(y.view(), 8, false, TaskKind::Classification, &mut rng).unwrap();
            let positives = indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert!(positives >= 1 && positives < indices.len());
        }
    }

    #[test]
    fn regression_draws_skip_the_class_constraint() {
        let y = Array1::from_elem(10, 3.5);
        let mut rng = StdRng::seed_from_u64(1);
        let indices = draw_subsample(y.view(), 5, false, TaskKind::Regression, &mut rng).unwrap();
        assert_eq!(indices.len(), 5);
    }

    #[test]
    fn single_class_outcome_is_degenerate() {
        let y = Array1::from_elem(20, 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        let result = draw_subsample(y.view(), 10, false, TaskKind::Classification, &mut rng);
        assert!(matches!(result, Err(SelectionError::DegenerateInput { .. })));
    }
}
