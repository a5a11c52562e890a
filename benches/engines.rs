//! Benchmarks for the analytical engines.

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use seascan::cycle::{self, CycleConfig};
use seascan::prelude::*;
use seascan::seasonal;

/// Generate a realistic daily series: drift, a planted cycle, and
/// deterministic "random" wiggle
fn generate_series(n: usize) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2012, 1, 2).unwrap();
    let mut price = 100.0f64;

    let points = (0..n)
        .map(|i| {
            let wiggle = ((i * 7 + 13) % 100) as f64 / 100.0 - 0.5;
            let cycle = (std::f64::consts::TAU / 55.0 * i as f64).cos();
            price *= (0.0002 + 0.004 * wiggle + 0.002 * cycle).exp();
            PricePoint::new(start + Duration::days(i as i64), price)
        })
        .collect();

    PriceSeries::new(points).unwrap()
}

fn bench_seasonal_scan(c: &mut Criterion) {
    let series = generate_series(3650);
    let config = ScanConfig {
        as_of: Some(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()),
        ..ScanConfig::default()
    };

    c.bench_function("seasonal_scan_10_years", |b| {
        b.iter(|| {
            let _ = black_box(seasonal::scan(black_box(&series), black_box(&config)));
        })
    });
}

fn bench_trend_aggregate(c: &mut Criterion) {
    let series = generate_series(3650);
    let config = TrendConfig {
        as_of: Some(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()),
        ..TrendConfig::default()
    };

    c.bench_function("trend_aggregate_10_years", |b| {
        b.iter(|| {
            let _ = black_box(seasonal::trend::aggregate(
                black_box(&series),
                black_box(&config),
            ));
        })
    });
}

fn bench_cycle_analyze(c: &mut Criterion) {
    let config = CycleConfig::default();

    let mut group = c.benchmark_group("cycle_analyze");
    for size in [250, 1000, 2500].iter() {
        let series = generate_series(*size);
        group.bench_with_input(BenchmarkId::new("analyze", size), size, |b, _| {
            b.iter(|| {
                let _ = black_box(cycle::analyze(black_box(&series), black_box(&config)));
            })
        });
    }
    group.finish();
}

fn bench_regime_train(c: &mut Criterion) {
    let series = generate_series(1500);
    let config = RegimeConfig::default();

    c.bench_function("regime_train_1500_days", |b| {
        b.iter(|| {
            let _ = black_box(RegimeModel::train(black_box(&series), black_box(&config)));
        })
    });
}

fn bench_batch_analyze(c: &mut Criterion) {
    let s1 = generate_series(1000);
    let s2 = generate_series(1000);
    let s3 = generate_series(1000);
    let s4 = generate_series(1000);
    let inputs: Vec<(&str, &PriceSeries)> =
        vec![("SYM1", &s1), ("SYM2", &s2), ("SYM3", &s3), ("SYM4", &s4)];
    let config = CycleConfig::default();

    c.bench_function("batch_cycle_4_instruments", |b| {
        b.iter(|| {
            let _ = black_box(batch_analyze(black_box(inputs.clone()), |series| {
                cycle::analyze(series, &config)
            }));
        })
    });
}

criterion_group!(
    benches,
    bench_seasonal_scan,
    bench_trend_aggregate,
    bench_cycle_analyze,
    bench_regime_train,
    bench_batch_analyze,
);

criterion_main!(benches);
