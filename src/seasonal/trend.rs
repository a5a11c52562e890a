//! Seasonal trend: average normalized yearly price path by calendar day.
//!
//! Each contributing year is laid onto a full daily calendar grid
//! (forward-filled over non-trading days, back-filled at the year start),
//! normalized so day 1 = 100, then averaged per calendar slot. Feb 29 is
//! excluded so every slot has a leap-year-independent sample size.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, MonthDay, PricePoint, PriceSeries, Result, YearFilter, REF_YEAR};

/// One of the 365 calendar slots of the aggregated trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub day: MonthDay,
    /// Mean normalized price (day 1 = 100), rounded to 2 decimals
    pub value: f64,
    /// Number of years contributing an observation to this slot
    pub sample_count: usize,
}

/// One day of the in-progress-year overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    pub lookback_years: u32,
    pub year_filter: YearFilter,
    /// Pin "today" for reproducible runs; `None` uses the current date
    pub as_of: Option<NaiveDate>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            lookback_years: 10,
            year_filter: YearFilter::all(),
            as_of: None,
        }
    }
}

/// Aggregate the series into the 365-slot average seasonal path.
///
/// Years are forward-filled only up to their last actual trading date, so
/// a partial (in-progress) year contributes to the early slots without
/// projecting a constant tail over the rest of the calendar.
pub fn aggregate(series: &PriceSeries, config: &TrendConfig) -> Result<Vec<TrendPoint>> {
    let as_of = config.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let view = super::restrict(series, config.lookback_years, as_of);

    let mut sums = [0.0f64; 365];
    let mut counts = [0usize; 365];
    let mut contributing = 0usize;

    for &year in &super::distinct_years(view) {
        if !config.year_filter.accepts(year) {
            continue;
        }
        if let Some(path) = normalized_year_path(view, year) {
            contributing += 1;
            for (slot, value) in path {
                sums[slot] += value;
                counts[slot] += 1;
            }
        }
    }

    if contributing == 0 {
        return Err(AnalysisError::InsufficientData {
            need: 1,
            got: 0,
            unit: "contributing years",
        });
    }

    let mut trend = Vec::with_capacity(365);
    let mut carry = 100.0;
    for doy in 1..=365u32 {
        let slot = (doy - 1) as usize;
        let day = ref_month_day(doy);
        let value = if counts[slot] > 0 {
            round2(sums[slot] / counts[slot] as f64)
        } else {
            // Empty late-year slot when every contributing year is partial
            carry
        };
        carry = value;
        trend.push(TrendPoint {
            day,
            value,
            sample_count: counts[slot],
        });
    }
    Ok(trend)
}

/// Normalized daily path of the in-progress calendar year (the year of the
/// series' last point), day 1 = 100, ending at the last available trading
/// date. Never projects forward.
pub fn current_year_overlay(series: &PriceSeries) -> Result<Vec<OverlayPoint>> {
    let year = series.last().date.year();
    let points: Vec<PricePoint> = series
        .points()
        .iter()
        .filter(|p| p.date.year() == year)
        .copied()
        .collect();

    let first_close = points[0].close;
    if first_close <= 0.0 {
        return Err(AnalysisError::NumericalFitting(
            "non-positive price at year start",
        ));
    }

    let mut overlay = Vec::new();
    let mut idx = 0usize;
    let mut last_close = first_close; // back-fill a missing Jan 1
    let mut d = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| {
        AnalysisError::DataFormat(format!("invalid year {year}"))
    })?;
    let end = points[points.len() - 1].date;

    while d <= end {
        while idx < points.len() && points[idx].date <= d {
            last_close = points[idx].close;
            idx += 1;
        }
        if !(d.month() == 2 && d.day() == 29) {
            overlay.push(OverlayPoint {
                date: d,
                value: round2(last_close / first_close * 100.0),
            });
        }
        d += Duration::days(1);
    }
    Ok(overlay)
}

// ============================================================
// INTERNALS
// ============================================================

/// One year's (slot, normalized value) observations on the 365-day grid,
/// forward-filled through the year's last trading date. `None` when the
/// year has no data or a degenerate base price.
fn normalized_year_path(points: &[PricePoint], year: i32) -> Option<Vec<(usize, f64)>> {
    let lo = points.partition_point(|p| p.date.year() < year);
    let hi = points.partition_point(|p| p.date.year() <= year);
    let year_points = &points[lo..hi];
    if year_points.is_empty() {
        return None;
    }

    let base = year_points[0].close;
    if base <= 0.0 || !base.is_finite() {
        return None;
    }

    let mut path = Vec::with_capacity(365);
    let mut idx = 0usize;
    let mut last_close = base;
    let mut d = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = year_points[year_points.len() - 1].date;

    while d <= end {
        while idx < year_points.len() && year_points[idx].date <= d {
            last_close = year_points[idx].close;
            idx += 1;
        }
        if !(d.month() == 2 && d.day() == 29) {
            let slot = (MonthDay::from_date(d).day_of_year() - 1) as usize;
            path.push((slot, last_close / base * 100.0));
        }
        d += Duration::days(1);
    }
    Some(path)
}

fn ref_month_day(doy: u32) -> MonthDay {
    NaiveDate::from_yo_opt(REF_YEAR, doy)
        .map(MonthDay::from_date)
        .unwrap_or(MonthDay::new_const(1, 1))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ============================================================
// TESTS
// ============================================================
