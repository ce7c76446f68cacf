use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use stabsel::{
    ArtificialKind, Lasso, StabilityConfig, StabilitySelector, TaskKind, ThresholdPolicy,
};

fn synthetic_panel(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, p), |_| rng.sample::<f64, _>(StandardNormal));
    let noise = Array1::from_shape_fn(n, |_| 0.3 * rng.sample::<f64, _>(StandardNormal));
    let y = 3.0 * &x.column(0) + 2.0 * &x.column(1) + noise;
    (x, y)
}

fn bench_stability_fit(c: &mut Criterion) {
    let (x, y) = synthetic_panel(60, 15, 99);
    let config = StabilityConfig {
        penalty_name: "alpha".to_string(),
        lambda_grid: vec![0.1, 0.3, 0.6],
        n_bootstraps: 50,
        artificial_kind: Some(ArtificialKind::RandomPermutation),
        artificial_proportion: 1.0,
        sample_fraction: 0.5,
        replace: false,
        threshold: None,
        fdr_threshold_range: (30..100).map(|i| i as f64 / 100.0).collect(),
        importance_policy: ThresholdPolicy::Fixed(1e-5),
        task: TaskKind::Regression,
        n_workers: None,
        random_state: Some(1),
    };

    c.bench_function("stability_fit_60x15", |b| {
        b.iter(|| {
            let mut selector = StabilitySelector::new(Lasso::new(), config.clone());
            selector.fit(black_box(x.view()), black_box(y.view())).unwrap();
            black_box(selector.stability_scores().unwrap().max_over_grid())
        })
    });
}

criterion_group!(benches, bench_stability_fit);
criterion_main!(benches);
