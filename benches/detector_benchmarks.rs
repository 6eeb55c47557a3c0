//! Benchmarks for the detector hot paths.
//!
//! Run with: `cargo bench --bench detector_benchmarks`

use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use htm_anomaly::prelude::*;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn value_at(step: i64) -> f64 {
    10.0 + 5.0 * ((step % 288) as f64 * std::f64::consts::TAU / 288.0).sin()
}

/// Warms a detector up on a repeating signal so segments exist.
fn warmed_detector(config: &DetectorConfig, steps: i64) -> HtmDetector {
    let mut detector = HtmDetector::new(config, StreamProfile::new(0.0, 20.0, 150)).unwrap();
    for step in 0..steps {
        detector
            .process(start() + Duration::minutes(5 * step), value_at(step))
            .unwrap();
    }
    detector
}

// =============================================================================
// ENCODING
// =============================================================================

fn bench_record_encoder(c: &mut Criterion) {
    let config = DetectorConfig::default();
    let encoder = RecordEncoder::new(config.value_encoder_params(0.1), config.time_encoding()).unwrap();

    c.bench_function("record_encode", |b| {
        let mut step = 0i64;
        b.iter(|| {
            step += 1;
            black_box(
                encoder
                    .encode((start() + Duration::minutes(5 * step), value_at(step)))
                    .unwrap(),
            )
        });
    });
}

// =============================================================================
// FULL PIPELINE
// =============================================================================

fn bench_detector_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("detector_step");
    group.throughput(Throughput::Elements(1));
    group.sample_size(50);

    let mut small = DetectorConfig::default();
    small.enc.value.size = 1000;
    small.sp.column_count = 512;
    small.sp.local_area_density = 0.04;
    small.tm.cells_per_column = 8;

    for (name, config) in [("small", small), ("default", DetectorConfig::default())] {
        let mut detector = warmed_detector(&config, 600);
        let mut step = 600i64;

        group.bench_with_input(BenchmarkId::from_parameter(name), &name, |b, _| {
            b.iter(|| {
                step += 1;
                black_box(
                    detector
                        .process(start() + Duration::minutes(5 * step), value_at(step))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_likelihood(c: &mut Criterion) {
    let mut likelihood = AnomalyLikelihood::new(AnomalyLikelihoodParams::from_probationary_period(600, 100)).unwrap();
    let mut step = 0u64;

    c.bench_function("likelihood_score", |b| {
        b.iter(|| {
            step += 1;
            let raw = if step % 97 == 0 { 0.8 } else { 0.05 };
            black_box(likelihood.log_anomaly_score(raw))
        });
    });
}

criterion_group!(
    detector_benches,
    bench_record_encoder,
    bench_detector_step,
    bench_likelihood,
);
criterion_main!(detector_benches);
