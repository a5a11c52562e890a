//! # seascan - Seasonality, Cycle & Regime Analytics
//!
//! Pure analytical engines over daily price series: calendar seasonality
//! scanning, spectral cycle detection, and hidden-Markov regime modeling.
//!
//! ## Quick Start
//!
//! ```rust
//! use seascan::prelude::*;
//! use chrono::NaiveDate;
//!
//! // Build a canonical series (normally produced by the normalizer)
//! let points: Vec<PricePoint> = (0..730)
//!     .map(|i| {
//!         let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
//!             + chrono::Duration::days(i);
//!         PricePoint::new(date, 100.0 + i as f64 * 0.05)
//!     })
//!     .collect();
//! let series = PriceSeries::new(points).unwrap();
//!
//! // Scan for seasonal windows
//! let config = ScanConfig::default();
//! let patterns = seascan::seasonal::scan(&series, &config).unwrap();
//! assert!(patterns.len() <= config.max_patterns);
//! ```
//!
//! All engines are pure functions of `(series, config)`: no I/O, no global
//! state, no internal caching. Batch parallelism across independent symbols
//! is available via [`batch_analyze`].

pub mod cycle;
pub mod normalize;
pub mod regime;
pub mod seasonal;

pub mod prelude {
    pub use crate::{
        // Batch
        batch_analyze,
        // Cycle engine
        cycle::{Cycle, CycleAnalysis, CycleConfig, SpectrumPoint},
        // Normalizer
        normalize::{Cell, RawTable},
        // Regime model
        regime::{
            backtest::{BacktestConfig, BacktestResult, StrategyMetrics},
            RegimeConfig, RegimeDay, RegimeLabel, RegimeModel, StateStats,
        },
        // Seasonality
        seasonal::{
            trend::{OverlayPoint, TrendConfig, TrendPoint},
            Direction, EvalConfig, ScanConfig, SeasonalPattern, YearlyTrade,
        },
        // Errors
        AnalysisError,
        BatchError,
        BatchResult,
        // Calendar types
        ElectionPhase,
        MonthDay,
        // Core data model
        PricePoint,
        PriceSeries,
        Result,
        YearFilter,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur during analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// Input could not be normalized into a usable price series
    #[error("Unusable input data: {0}")]
    DataFormat(String),

    /// Series exists but is too short for the requested analysis
    #[error("Insufficient data: need {need} {unit}, got {got}")]
    InsufficientData {
        need: usize,
        got: usize,
        unit: &'static str,
    },

    /// An internal fit failed to converge or produced a degenerate result
    #[error("Numerical fit failed: {0}")]
    NumericalFitting(&'static str),

    /// Caller-supplied parameters are out of valid range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

// ============================================================
// CALENDAR TYPES
// ============================================================

use chrono::{Datelike, NaiveDate};

/// Fixed non-leap reference year used for calendar-day enumeration and
/// day-of-year arithmetic. Feb 29 never exists on this calendar, keeping
/// per-day sample counts consistent across leap years.
pub const REF_YEAR: i32 = 2023;

/// A (month, day) pair validated against the non-leap reference calendar.
///
/// Ordering is calendar order within a year, so a pair of `MonthDay`s can
/// describe a wrap-around range (e.g. Dec 15 .. Feb 10) when end < start.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    /// Create a new MonthDay, validating it exists in a non-leap year
    pub fn new(month: u32, day: u32) -> Result<Self> {
        if NaiveDate::from_ymd_opt(REF_YEAR, month, day).is_none() {
            return Err(AnalysisError::InvalidConfig(format!(
                "invalid month-day {month:02}-{day:02}"
            )));
        }
        Ok(Self { month, day })
    }

    /// Create a MonthDay from a compile-time-known pair (library internal use)
    #[doc(hidden)]
    pub const fn new_const(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    /// The month-day of a concrete date. Feb 29 folds to Feb 28 so the
    /// result is always valid on the reference calendar.
    pub fn from_date(date: NaiveDate) -> Self {
        let (month, mut day) = (date.month(), date.day());
        if month == 2 && day == 29 {
            day = 28;
        }
        Self { month, day }
    }

    #[inline]
    pub fn month(self) -> u32 {
        self.month
    }

    #[inline]
    pub fn day(self) -> u32 {
        self.day
    }

    /// Resolve to a concrete date in `year`. Always `Some` for a validated
    /// MonthDay, since the reference calendar has no Feb 29.
    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }

    /// 1-based day of year on the reference (non-leap) calendar
    pub fn day_of_year(self) -> u32 {
        NaiveDate::from_ymd_opt(REF_YEAR, self.month, self.day)
            .map(|d| d.ordinal())
            .unwrap_or(1)
    }

    /// Short display label, e.g. "Mar 01"
    pub fn label(self) -> String {
        const MONTHS: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        format!("{} {:02}", MONTHS[(self.month - 1) as usize], self.day)
    }
}

/// US election-cycle phase, keyed on `year % 4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ElectionPhase {
    /// Election years (remainder 0, e.g. 2020, 2024)
    Election,
    /// Post-election years (remainder 1, e.g. 2021, 2025)
    PostElection,
    /// Midterm years (remainder 2, e.g. 2022, 2026)
    Midterm,
    /// Pre-election years (remainder 3, e.g. 2023, 2027)
    PreElection,
}

impl ElectionPhase {
    #[inline]
    fn remainder(self) -> i32 {
        match self {
            ElectionPhase::Election => 0,
            ElectionPhase::PostElection => 1,
            ElectionPhase::Midterm => 2,
            ElectionPhase::PreElection => 3,
        }
    }
}

/// Composable calendar-year predicate shared by the seasonality scanner,
/// the trend aggregator, and the window evaluator.
///
/// All configured conditions combine with logical AND; the default filter
/// accepts every year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct YearFilter {
    pub exclude_year: Option<i32>,
    pub odd_years_only: bool,
    pub election_phase: Option<ElectionPhase>,
}

impl YearFilter {
    /// Accepts every year
    pub fn all() -> Self {
        Self::default()
    }

    /// Exclude one specific year (e.g. 2020)
    pub fn exclude(mut self, year: i32) -> Self {
        self.exclude_year = Some(year);
        self
    }

    /// Keep odd calendar years only
    pub fn odd_years(mut self) -> Self {
        self.odd_years_only = true;
        self
    }

    /// Keep only years in the given election-cycle phase
    pub fn phase(mut self, phase: ElectionPhase) -> Self {
        self.election_phase = Some(phase);
        self
    }

    /// True if `year` passes every configured condition
    pub fn accepts(&self, year: i32) -> bool {
        if self.exclude_year == Some(year) {
            return false;
        }
        if self.odd_years_only && year % 2 == 0 {
            return false;
        }
        if let Some(phase) = self.election_phase {
            if year.rem_euclid(4) != phase.remainder() {
                return false;
            }
        }
        true
    }
}

// ============================================================
// CORE DATA MODEL
// ============================================================

/// One daily observation. Only `date` and `close` are required; the
/// analytical engines never read the optional fields, but the normalizer
/// preserves them when present.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close,
            open: None,
            high: None,
            low: None,
            volume: None,
        }
    }
}

/// Canonical ordered daily price series.
///
/// Invariants (enforced at construction): strictly increasing dates, no
/// duplicates (first occurrence wins), all closes finite. Immutable after
/// construction; every engine consumes it read-only.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from raw points: drops non-finite closes, keeps the
    /// first occurrence per date, sorts ascending.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut cleaned: Vec<PricePoint> = points
            .into_iter()
            .filter(|p| p.close.is_finite())
            .filter(|p| seen.insert(p.date))
            .collect();
        cleaned.sort_by_key(|p| p.date);

        if cleaned.len() < 2 {
            return Err(AnalysisError::DataFormat(format!(
                "only {} usable rows after cleaning (need at least 2)",
                cleaned.len()
            )));
        }
        Ok(Self { points: cleaned })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn first(&self) -> &PricePoint {
        &self.points[0]
    }

    pub fn last(&self) -> &PricePoint {
        &self.points[self.points.len() - 1]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Points dated at or after `cutoff`. The result may be shorter than 2
    /// points; callers apply their own sample-size floors.
    pub fn since(&self, cutoff: NaiveDate) -> &[PricePoint] {
        let start = self.points.partition_point(|p| p.date < cutoff);
        &self.points[start..]
    }

    /// Distinct calendar years present, ascending
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.points.iter().map(|p| p.date.year()).collect();
        years.dedup();
        years
    }

    /// Index of the first point dated at or after `target` (searchsorted,
    /// left bias). `None` when every point is earlier.
    pub fn snap_at_or_after(&self, target: NaiveDate) -> Option<usize> {
        let idx = self.points.partition_point(|p| p.date < target);
        (idx < self.points.len()).then_some(idx)
    }
}

// ============================================================
// BATCH PARALLELISM
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single symbol in a batch
#[derive(Debug)]
pub struct BatchResult<T> {
    pub symbol: String,
    pub output: T,
}

/// Error from analyzing a single symbol in a batch
#[derive(Debug)]
pub struct BatchError {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Run one analytical function across many independent (symbol, series)
/// pairs in parallel. Each invocation is pure and shares no state, so
/// failures stay isolated per symbol.
pub fn batch_analyze<'a, T, I, F>(inputs: I, analyze: F) -> (Vec<BatchResult<T>>, Vec<BatchError>)
where
    T: Send,
    I: IntoParallelIterator<Item = (&'a str, &'a PriceSeries)>,
    F: Fn(&PriceSeries) -> Result<T> + Sync,
{
    let results: Vec<_> = inputs
        .into_par_iter()
        .map(|(symbol, series)| {
            analyze(series)
                .map(|output| BatchResult {
                    symbol: symbol.to_string(),
                    output,
                })
                .map_err(|error| BatchError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }
    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
