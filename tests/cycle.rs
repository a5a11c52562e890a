//! Integration tests for the cycle analysis engine.

use chrono::{Duration, NaiveDate};
use seascan::cycle::{self, CycleConfig};
use seascan::prelude::*;

fn series_from(values: &[f64]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();
    let points = values
        .iter()
        .enumerate()
        .map(|(i, &v)| PricePoint::new(start + Duration::days(i as i64), v))
        .collect();
    PriceSeries::new(points).unwrap()
}

/// Deterministic pseudo-random noise in [-1, 1]
fn noise(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed.max(1);
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

#[test]
fn recovers_planted_cycle_with_noise() {
    let period = 60.0;
    let amplitude = 10.0;
    let noise = noise(1000, 7);
    let values: Vec<f64> = (0..1000)
        .map(|t| {
            let tf = t as f64;
            300.0 + 0.08 * tf
                + amplitude * (std::f64::consts::TAU / period * tf + 0.9).cos()
                + 0.5 * noise[t]
        })
        .collect();
    let series = series_from(&values);

    let analysis = cycle::analyze(&series, &CycleConfig::default()).unwrap();
    assert!(!analysis.cycles.is_empty());

    let best = &analysis.cycles[0];
    assert!(
        (best.period_days - period).abs() / period < 0.1,
        "recovered period {}",
        best.period_days
    );
    // Same order of magnitude as the planted amplitude
    assert!(best.amplitude > amplitude / 3.0 && best.amplitude < amplitude * 3.0);
    assert!(best.bartels_genuineness_pct > 49.0);
}

#[test]
fn genuineness_stays_within_bounds() {
    let values: Vec<f64> = noise(800, 99).iter().map(|v| 100.0 + 5.0 * v).collect();
    let series = series_from(&values);
    let analysis = cycle::analyze(&series, &CycleConfig::default()).unwrap();
    for c in &analysis.cycles {
        assert!((0.0..=99.9).contains(&c.bartels_genuineness_pct));
        assert!(c.amplitude > 0.0);
        assert!(c.strength > 0.0);
    }
}

#[test]
fn too_few_points_is_a_typed_error() {
    let series = series_from(&[100.0; 19]);
    match cycle::analyze(&series, &CycleConfig::default()) {
        Err(AnalysisError::InsufficientData { need, got, .. }) => {
            assert_eq!(need, 20);
            assert_eq!(got, 19);
        }
        other => panic!("expected InsufficientData, got {other:?}"),
    }
}

#[test]
fn composite_covers_forecast_horizon() {
    let values: Vec<f64> = (0..500)
        .map(|t| 150.0 + 6.0 * (std::f64::consts::TAU / 45.0 * t as f64).cos())
        .collect();
    let series = series_from(&values);

    let config = CycleConfig {
        forecast_horizon_days: 120,
        ..CycleConfig::default()
    };
    let analysis = cycle::analyze(&series, &config).unwrap();
    assert_eq!(analysis.composite_wave.len(), 500 + 120);
    assert_eq!(analysis.forecast_horizon_days, 120);
    assert!(analysis.composite_wave.iter().all(|v| v.is_finite()));
}

#[test]
fn next_extrema_offsets_are_sane() {
    let values: Vec<f64> = (0..600)
        .map(|t| 200.0 + 8.0 * (std::f64::consts::TAU / 50.0 * t as f64).cos())
        .collect();
    let series = series_from(&values);

    let analysis = cycle::analyze(&series, &CycleConfig::default()).unwrap();
    for c in &analysis.cycles {
        assert!(c.next_peak_offset_days >= 0.0);
        assert!(c.next_trough_offset_days >= 0.0);
        assert!(c.next_peak_offset_days <= c.period_days);
        assert!(c.next_trough_offset_days <= c.period_days);
    }
}

#[test]
fn cluster_filter_leaves_separated_periods() {
    let values: Vec<f64> = (0..1200)
        .map(|t| {
            let tf = t as f64;
            400.0
                + 9.0 * (std::f64::consts::TAU / 30.0 * tf).cos()
                + 7.0 * (std::f64::consts::TAU / 90.0 * tf + 1.3).cos()
        })
        .collect();
    let series = series_from(&values);

    let analysis = cycle::analyze(&series, &CycleConfig::default()).unwrap();
    for (i, a) in analysis.cycles.iter().enumerate() {
        for b in analysis.cycles.iter().skip(i + 1) {
            let rel = (a.period_days - b.period_days).abs() / a.period_days.min(b.period_days);
            assert!(rel >= 0.15, "{} and {} cluster", a.period_days, b.period_days);
        }
    }
    // Both planted periods survive
    assert!(analysis
        .cycles
        .iter()
        .any(|c| (c.period_days - 30.0).abs() <= 3.0));
    assert!(analysis
        .cycles
        .iter()
        .any(|c| (c.period_days - 90.0).abs() <= 9.0));
}

#[test]
fn analysis_serializes_without_nan() {
    let values: Vec<f64> = (0..300)
        .map(|t| 120.0 + 4.0 * (std::f64::consts::TAU / 25.0 * t as f64).cos())
        .collect();
    let series = series_from(&values);

    let analysis = cycle::analyze(&series, &CycleConfig::default()).unwrap();
    let json = serde_json::to_string(&analysis).unwrap();
    assert!(!json.contains("null"));
    assert!(!json.contains("NaN"));
}
