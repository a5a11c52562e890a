//! Integration tests for the seasonality scanner and trend aggregator.

use chrono::{Datelike, Duration, NaiveDate};
use seascan::prelude::*;
use seascan::seasonal;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn md(m: u32, d: u32) -> MonthDay {
    MonthDay::new(m, d).unwrap()
}

/// 10 years of daily data: price rises exactly 5% between March 1 and
/// March 20 every year, flat otherwise.
fn march_rally_series() -> PriceSeries {
    let mut points = Vec::new();
    let mut price = 100.0;
    let mut d = date(2013, 1, 1);
    while d.year() < 2023 {
        if d.month() == 3 && d.day() > 1 && d.day() <= 20 {
            price *= 1.05f64.powf(1.0 / 19.0);
        }
        points.push(PricePoint::new(d, price));
        d += Duration::days(1);
    }
    PriceSeries::new(points).unwrap()
}

fn fine_grid_config() -> ScanConfig {
    ScanConfig {
        lookback_years: 10,
        min_win_rate_pct: 90.0,
        start_step_days: 1,
        duration_step_days: 1,
        as_of: Some(date(2022, 12, 31)),
        ..ScanConfig::default()
    }
}

#[test]
fn march_rally_round_trip() {
    let series = march_rally_series();
    let patterns = seasonal::scan(&series, &fine_grid_config()).unwrap();
    assert!(!patterns.is_empty());

    let best = &patterns[0];
    assert_eq!(best.direction, Direction::Long);
    assert_eq!(best.start, md(3, 1));
    assert_eq!(best.win_rate_pct, 100.0);
    assert_eq!(best.years_analyzed, 10);
    assert!((best.avg_return_pct - 5.0).abs() < 0.25);
}

#[test]
fn single_year_series_yields_empty() {
    let mut points = Vec::new();
    let mut d = date(2022, 1, 1);
    while d.year() == 2022 {
        points.push(PricePoint::new(d, 100.0 + d.ordinal() as f64 * 0.1));
        d += Duration::days(1);
    }
    let series = PriceSeries::new(points).unwrap();

    let config = ScanConfig {
        min_win_rate_pct: 0.0,
        as_of: Some(date(2022, 12, 31)),
        ..ScanConfig::default()
    };
    assert!(seasonal::scan(&series, &config).unwrap().is_empty());
}

#[test]
fn scan_is_deterministic() {
    let series = march_rally_series();
    let config = fine_grid_config();
    assert_eq!(
        seasonal::scan(&series, &config).unwrap(),
        seasonal::scan(&series, &config).unwrap()
    );
}

#[test]
fn win_rate_matches_yearly_trades() {
    let series = march_rally_series();
    for p in seasonal::scan(&series, &fine_grid_config()).unwrap() {
        let wins = p
            .yearly_trades
            .iter()
            .filter(|t| match p.direction {
                Direction::Long => t.gain_pct > 0.0,
                Direction::Short => t.gain_pct < 0.0,
            })
            .count();
        let expected = 100.0 * wins as f64 / p.years_analyzed as f64;
        assert!((p.win_rate_pct - expected).abs() < 1e-9);
        assert_eq!(p.years_analyzed, p.yearly_trades.len());
        assert_eq!(p.missed_years.len(), p.years_analyzed - wins);
        for t in &p.yearly_trades {
            let gain = (t.exit_price - t.entry_price) / t.entry_price * 100.0;
            assert!((t.gain_pct - gain).abs() < 1e-9);
        }
    }
}

#[test]
fn no_pair_overlaps_more_than_half() {
    let series = march_rally_series();
    let config = ScanConfig {
        min_win_rate_pct: 0.0,
        ..fine_grid_config()
    };
    let patterns = seasonal::scan(&series, &config).unwrap();
    assert!(patterns.len() > 1);

    for (i, a) in patterns.iter().enumerate() {
        for b in patterns.iter().skip(i + 1) {
            let (a0, a1) = (
                a.start.day_of_year() as i64,
                a.start.day_of_year() as i64 + i64::from(a.duration_days),
            );
            let (b0, b1) = (
                b.start.day_of_year() as i64,
                b.start.day_of_year() as i64 + i64::from(b.duration_days),
            );
            let shared = (a1.min(b1) - a0.max(b0)).max(0);
            let shorter = i64::from(a.duration_days.min(b.duration_days));
            assert!(shared * 2 <= shorter, "patterns {i} overlap too much");
        }
    }
}

#[test]
fn short_pattern_on_falling_window() {
    // Mirror image: a 5% drop every March
    let mut points = Vec::new();
    let mut price = 1000.0;
    let mut d = date(2013, 1, 1);
    while d.year() < 2023 {
        if d.month() == 3 && d.day() > 1 && d.day() <= 20 {
            price *= 0.95f64.powf(1.0 / 19.0);
        }
        points.push(PricePoint::new(d, price));
        d += Duration::days(1);
    }
    let series = PriceSeries::new(points).unwrap();

    let patterns = seasonal::scan(&series, &fine_grid_config()).unwrap();
    assert!(!patterns.is_empty());
    let best = &patterns[0];
    assert_eq!(best.direction, Direction::Short);
    assert_eq!(best.win_rate_pct, 100.0);
    // Short statistics are reported from the short side
    assert!(best.avg_return_pct > 0.0);
    // Raw trade returns keep their original sign
    assert!(best.yearly_trades.iter().all(|t| t.gain_pct < 0.0));
    // Every year fell, so none count against the Short direction
    assert!(best.missed_years.is_empty());
}

#[test]
fn election_phase_filter_thins_years() {
    let series = march_rally_series();
    let config = ScanConfig {
        year_filter: YearFilter::all().phase(ElectionPhase::Election),
        min_win_rate_pct: 90.0,
        as_of: Some(date(2022, 12, 31)),
        ..ScanConfig::default()
    };
    for p in seasonal::scan(&series, &config).unwrap() {
        assert!(p.yearly_trades.iter().all(|t| t.year % 4 == 0));
        assert!(p.years_analyzed <= 3); // 2016, 2020 (2013..2022 window)
    }
}

#[test]
fn trend_day_one_is_100_and_shape_holds() {
    let series = march_rally_series();
    let config = TrendConfig {
        as_of: Some(date(2022, 12, 31)),
        ..TrendConfig::default()
    };
    let trend = seasonal::trend::aggregate(&series, &config).unwrap();
    assert_eq!(trend.len(), 365);
    assert_eq!(trend[0].value, 100.0);
    assert!(trend.iter().all(|p| p.value.is_finite()));
    // The March rally must be visible in the average path
    let before = trend[(md(2, 25).day_of_year() - 1) as usize].value;
    let after = trend[(md(3, 25).day_of_year() - 1) as usize].value;
    assert!(after > before + 3.0);
}

#[test]
fn overlay_never_projects_forward() {
    let mut points = march_rally_series().points().to_vec();
    points.retain(|p| p.date <= date(2022, 5, 15));
    let series = PriceSeries::new(points).unwrap();

    let overlay = seasonal::trend::current_year_overlay(&series).unwrap();
    assert_eq!(overlay.first().unwrap().date, date(2022, 1, 1));
    assert_eq!(overlay.first().unwrap().value, 100.0);
    assert_eq!(overlay.last().unwrap().date, date(2022, 5, 15));
}

#[test]
fn pattern_serializes_to_json() {
    let series = march_rally_series();
    let patterns = seasonal::scan(&series, &fine_grid_config()).unwrap();
    let json = serde_json::to_string(&patterns).unwrap();
    let back: Vec<SeasonalPattern> = serde_json::from_str(&json).unwrap();
    assert_eq!(patterns, back);
    // Finite-by-construction outputs never serialize as null
    assert!(!json.contains("null"));
}
