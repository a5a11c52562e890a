//! Calendar seasonality: exhaustive window scanning and single-window
//! evaluation.
//!
//! The scanner enumerates candidate (start day, duration) windows on the
//! non-leap reference calendar, replays each window across the historical
//! years, and keeps windows whose directional win rate clears the configured
//! floor. Both directions are considered: a window that rose in most years is
//! a Long pattern, one that fell in most years is a Short pattern.

pub mod trend;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, MonthDay, PricePoint, PriceSeries, Result, YearFilter, REF_YEAR};

/// Maximum distance (in calendar days) a window boundary may be snapped
/// forward to the next trading day before the year is discarded
const MAX_SNAP_GAP_DAYS: i64 = 10;

// ============================================================
// TYPES
// ============================================================

/// Trade direction of a seasonal window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// One historical replay of a seasonal window.
///
/// `gain_pct` is always the raw long return of the window; for Short
/// patterns the sign inversion happens in the aggregate statistics only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyTrade {
    pub year: i32,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub gain_pct: f64,
}

/// A recurring calendar window with its historical statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    pub start: MonthDay,
    pub end: MonthDay,
    pub duration_days: u32,
    pub direction: Direction,
    /// Share of replayed years that closed in the pattern's direction
    pub win_rate_pct: f64,
    /// Number of years that produced a valid trade
    pub years_analyzed: usize,
    /// Years whose trade closed against the pattern's direction
    pub missed_years: Vec<i32>,
    /// Directional mean return (sign-adjusted for Short patterns)
    pub avg_return_pct: f64,
    pub max_return_pct: f64,
    pub min_return_pct: f64,
    pub yearly_trades: Vec<YearlyTrade>,
    pub analysis_period_start: NaiveDate,
    pub analysis_period_end: NaiveDate,
}

/// Scanner configuration. `Default` reproduces the standard screen:
/// 10 lookback years, 70 % win-rate floor, 10-100 day windows on a 3-day
/// start/duration grid, top 10 patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub lookback_years: u32,
    pub min_win_rate_pct: f64,
    /// Restrict candidate start days to this inclusive calendar range;
    /// a wrapped range (end before start) covers the year boundary.
    pub search_range: Option<(MonthDay, MonthDay)>,
    pub min_duration_days: u32,
    pub max_duration_days: u32,
    pub start_step_days: u32,
    pub duration_step_days: u32,
    /// Minimum number of valid yearly trades a window needs
    pub min_years: usize,
    pub max_patterns: usize,
    pub year_filter: YearFilter,
    /// Pin "today" for reproducible runs; `None` uses the current date
    pub as_of: Option<NaiveDate>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookback_years: 10,
            min_win_rate_pct: 70.0,
            search_range: None,
            min_duration_days: 10,
            max_duration_days: 100,
            start_step_days: 3,
            duration_step_days: 3,
            min_years: 2,
            max_patterns: 10,
            year_filter: YearFilter::all(),
            as_of: None,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback_years == 0 {
            return Err(AnalysisError::InvalidConfig(
                "lookback_years must be at least 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_win_rate_pct) {
            return Err(AnalysisError::InvalidConfig(format!(
                "min_win_rate_pct {} outside 0..=100",
                self.min_win_rate_pct
            )));
        }
        if self.min_duration_days == 0 || self.min_duration_days > self.max_duration_days {
            return Err(AnalysisError::InvalidConfig(format!(
                "duration range {}..={} is empty",
                self.min_duration_days, self.max_duration_days
            )));
        }
        if self.start_step_days == 0 || self.duration_step_days == 0 {
            return Err(AnalysisError::InvalidConfig(
                "step sizes must be at least 1 day".into(),
            ));
        }
        if self.min_years < 2 {
            return Err(AnalysisError::InvalidConfig(
                "min_years must be at least 2".into(),
            ));
        }
        if self.max_patterns == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_patterns must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for evaluating one caller-chosen window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub lookback_years: u32,
    pub year_filter: YearFilter,
    pub as_of: Option<NaiveDate>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            lookback_years: 10,
            year_filter: YearFilter::all(),
            as_of: None,
        }
    }
}

// ============================================================
// SCANNER
// ============================================================

/// Scan a price series for recurring seasonal windows.
///
/// Returns the top patterns ranked by (win rate, years analyzed) after
/// removing windows that overlap a better-ranked one by more than half.
/// A series spanning fewer than 2 distinct years yields an empty result
/// rather than an error.
pub fn scan(series: &PriceSeries, config: &ScanConfig) -> Result<Vec<SeasonalPattern>> {
    config.validate()?;

    let as_of = resolve_as_of(config.as_of);
    let view = restrict(series, config.lookback_years, as_of);

    let years = distinct_years(view);
    if years.len() < 2 {
        return Ok(Vec::new());
    }
    let candidate_years: Vec<i32> = years
        .into_iter()
        .filter(|y| config.year_filter.accepts(*y))
        .collect();
    if candidate_years.len() < 2 {
        return Ok(Vec::new());
    }

    let period_start = view[0].date;
    let period_end = view[view.len() - 1].date;

    let mut found = Vec::new();
    for start_doy in candidate_start_days(config) {
        let start_date = NaiveDate::from_yo_opt(REF_YEAR, start_doy)
            .ok_or_else(|| AnalysisError::InvalidConfig(format!("bad day of year {start_doy}")))?;
        let start_md = MonthDay::from_date(start_date);

        let mut duration = config.min_duration_days;
        while duration <= config.max_duration_days {
            let trades = replay_window(view, start_md, i64::from(duration), &candidate_years);

            if trades.len() >= config.min_years {
                let end_md = MonthDay::from_date(start_date + Duration::days(i64::from(duration)));
                for direction in [Direction::Long, Direction::Short] {
                    let pattern = build_pattern(
                        start_md,
                        end_md,
                        duration,
                        direction,
                        &trades,
                        period_start,
                        period_end,
                    );
                    if pattern.win_rate_pct >= config.min_win_rate_pct {
                        found.push(pattern);
                    }
                }
            }
            duration += config.duration_step_days;
        }
    }

    // Win rate first, sample size as robustness tie-break, then sharper
    // windows (higher mean return over fewer days) ahead of diluted ones
    found.sort_by(|a, b| {
        b.win_rate_pct
            .total_cmp(&a.win_rate_pct)
            .then(b.years_analyzed.cmp(&a.years_analyzed))
            .then(b.avg_return_pct.total_cmp(&a.avg_return_pct))
            .then(a.duration_days.cmp(&b.duration_days))
    });

    Ok(dedup_overlapping(found, config.max_patterns))
}

/// Evaluate one explicit calendar window across the historical years.
///
/// Unlike [`scan`] there is no win-rate floor; the window's statistics are
/// reported as-is with `direction` set to the majority outcome. A window
/// whose end precedes its start wraps across the year boundary.
pub fn evaluate_window(
    series: &PriceSeries,
    start: MonthDay,
    end: MonthDay,
    config: &EvalConfig,
) -> Result<SeasonalPattern> {
    let as_of = resolve_as_of(config.as_of);
    let view = restrict(series, config.lookback_years, as_of);

    let years = distinct_years(view);
    let candidate_years: Vec<i32> = years
        .into_iter()
        .filter(|y| config.year_filter.accepts(*y))
        .collect();

    let duration = if end.day_of_year() > start.day_of_year() {
        end.day_of_year() - start.day_of_year()
    } else {
        365 - start.day_of_year() + end.day_of_year()
    };

    let trades = replay_window(view, start, i64::from(duration), &candidate_years);
    if trades.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            need: 2,
            got: trades.len(),
            unit: "yearly trades",
        });
    }

    let longs = trades.iter().filter(|t| t.gain_pct > 0.0).count();
    let direction = if longs * 2 >= trades.len() {
        Direction::Long
    } else {
        Direction::Short
    };

    Ok(build_pattern(
        start,
        end,
        duration,
        direction,
        &trades,
        view[0].date,
        view[view.len() - 1].date,
    ))
}

// ============================================================
// INTERNALS
// ============================================================

fn resolve_as_of(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Utc::now().date_naive())
}

/// Slice of `series` within the lookback horizon, ending at `as_of`
fn restrict(series: &PriceSeries, lookback_years: u32, as_of: NaiveDate) -> &[PricePoint] {
    let cutoff = shift_years(as_of, -(lookback_years as i32));
    let view = series.since(cutoff);
    let end = view.partition_point(|p| p.date <= as_of);
    &view[..end]
}

/// Move a date by whole years, folding Feb 29 to Feb 28
fn shift_years(date: NaiveDate, delta: i32) -> NaiveDate {
    MonthDay::from_date(date)
        .in_year(date.year() + delta)
        .unwrap_or(date)
}

fn distinct_years(points: &[PricePoint]) -> Vec<i32> {
    let mut years: Vec<i32> = points.iter().map(|p| p.date.year()).collect();
    years.dedup();
    years
}

/// Candidate start days of year, honoring the search range and step
fn candidate_start_days(config: &ScanConfig) -> Vec<u32> {
    let in_range = |doy: u32| -> bool {
        match config.search_range {
            None => true,
            Some((from, to)) => {
                let (a, b) = (from.day_of_year(), to.day_of_year());
                if a <= b {
                    (a..=b).contains(&doy)
                } else {
                    doy >= a || doy <= b
                }
            }
        }
    };
    (1..=365)
        .step_by(config.start_step_days as usize)
        .filter(|&doy| in_range(doy))
        .collect()
}

/// First point dated at or after `target`, rejected when the snap distance
/// exceeds [`MAX_SNAP_GAP_DAYS`]
fn snap(points: &[PricePoint], target: NaiveDate) -> Option<(usize, &PricePoint)> {
    let idx = points.partition_point(|p| p.date < target);
    let point = points.get(idx)?;
    ((point.date - target).num_days() <= MAX_SNAP_GAP_DAYS).then_some((idx, point))
}

/// Replay one window across `years`, returning the valid trades. Years
/// without a snappable entry and exit are simply skipped.
fn replay_window(
    points: &[PricePoint],
    start: MonthDay,
    duration_days: i64,
    years: &[i32],
) -> Vec<YearlyTrade> {
    let mut trades = Vec::with_capacity(years.len());

    for &year in years {
        let Some(entry_target) = start.in_year(year) else {
            continue;
        };
        let trade = snap(points, entry_target).and_then(|(entry_idx, entry)| {
            let exit_target = entry_target + Duration::days(duration_days);
            let (exit_idx, exit) = snap(points, exit_target)?;
            if exit_idx <= entry_idx || entry.close == 0.0 {
                return None;
            }
            let gain_pct = (exit.close - entry.close) / entry.close * 100.0;
            gain_pct.is_finite().then_some(YearlyTrade {
                year,
                entry_date: entry.date,
                exit_date: exit.date,
                entry_price: entry.close,
                exit_price: exit.close,
                gain_pct,
            })
        });
        if let Some(t) = trade {
            trades.push(t);
        }
    }
    trades
}

fn build_pattern(
    start: MonthDay,
    end: MonthDay,
    duration_days: u32,
    direction: Direction,
    trades: &[YearlyTrade],
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> SeasonalPattern {
    let n = trades.len();
    let won = |t: &YearlyTrade| match direction {
        Direction::Long => t.gain_pct > 0.0,
        Direction::Short => t.gain_pct < 0.0,
    };
    let wins = trades.iter().filter(|t| won(t)).count();
    let win_rate_pct = wins as f64 / n as f64 * 100.0;
    let missed_years: Vec<i32> = trades
        .iter()
        .filter(|t| !won(t))
        .map(|t| t.year)
        .collect();

    // Short statistics are reported from the short seller's side
    let sign = match direction {
        Direction::Long => 1.0,
        Direction::Short => -1.0,
    };
    let returns: Vec<f64> = trades.iter().map(|t| t.gain_pct * sign).collect();
    let avg_return_pct = returns.iter().sum::<f64>() / n as f64;
    let max_return_pct = returns.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_return_pct = returns.iter().cloned().fold(f64::INFINITY, f64::min);

    SeasonalPattern {
        start,
        end,
        duration_days,
        direction,
        win_rate_pct,
        years_analyzed: n,
        missed_years,
        avg_return_pct,
        max_return_pct,
        min_return_pct,
        yearly_trades: trades.to_vec(),
        analysis_period_start: period_start,
        analysis_period_end: period_end,
    }
}

/// Greedy rank-order dedup: a pattern is dropped when it shares more than
/// half of its days with an already-kept (better-ranked) pattern.
fn dedup_overlapping(sorted: Vec<SeasonalPattern>, max_patterns: usize) -> Vec<SeasonalPattern> {
    let mut kept: Vec<SeasonalPattern> = Vec::with_capacity(max_patterns);
    for candidate in sorted {
        if kept.len() >= max_patterns {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|existing| overlap_ratio(existing, &candidate) > 0.5);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

/// Shared-day fraction of the shorter window, on an unwrapped day-of-year
/// axis (windows may extend past day 365 into the next year)
fn overlap_ratio(a: &SeasonalPattern, b: &SeasonalPattern) -> f64 {
    let (a0, a1) = (
        a.start.day_of_year() as i64,
        a.start.day_of_year() as i64 + i64::from(a.duration_days),
    );
    let (b0, b1) = (
        b.start.day_of_year() as i64,
        b.start.day_of_year() as i64 + i64::from(b.duration_days),
    );
    let shared = (a1.min(b1) - a0.max(b0)).max(0);
    let shorter = i64::from(a.duration_days.min(b.duration_days)).max(1);
    shared as f64 / shorter as f64
}

// ============================================================
// TESTS
// ============================================================
