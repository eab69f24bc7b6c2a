//! Criterion benchmarks for MoveLab hot paths.
//!
//! Benchmarks:
//! 1. Fitting (default rounds, varying row counts)
//! 2. Batch prediction on a fitted model
//! 3. Evaluation (predict + confusion matrix + metrics)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use movelab_core::{
    Classifier, Evaluator, FeatureMatrix, LabelVector, ParamOverrides, TracingSink, Trainer,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_dataset(n: usize) -> (FeatureMatrix, LabelVector) {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let t = i as f64;
            vec![
                (t * 0.1).sin(),
                (t * 0.37).cos(),
                ((i * 31) % 97) as f64 / 97.0,
                (t * 0.05).sin() * (t * 0.02).cos(),
                ((i * 7) % 13) as f64,
            ]
        })
        .collect();
    let y = LabelVector::from_bools(rows.iter().map(|r| r[0] + 0.5 * r[3] > 0.0));
    let names = ["ret_1", "ret_5", "range_pct", "sma_10_ratio", "volume_ratio_10"];
    (FeatureMatrix::from_rows(names, rows).unwrap(), y)
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);
    for n in [250usize, 1_000] {
        let (x, y) = make_dataset(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let trainer = Trainer::new();
            b.iter(|| trainer.fit(black_box(&x), black_box(&y), None, None).unwrap())
        });
    }
    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let (x, y) = make_dataset(1_000);
    let model = Trainer::new().fit(&x, &y, None, None).unwrap();
    c.bench_function("predict_1000_rows", |b| {
        b.iter(|| model.predict(black_box(&x)).unwrap())
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let (x, y) = make_dataset(1_000);
    let overrides = ParamOverrides {
        n_estimators: Some(50),
        ..Default::default()
    };
    let model = Trainer::new().fit(&x, &y, Some(&overrides), None).unwrap();
    let evaluator = Evaluator::with_sink(Box::new(TracingSink));
    c.bench_function("evaluate_1000_rows", |b| {
        b.iter(|| {
            evaluator
                .evaluate(&model, black_box(&x), black_box(&y), false)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_fit, bench_predict, bench_evaluate);
criterion_main!(benches);
