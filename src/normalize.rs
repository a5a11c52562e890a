//! Raw tabular input → canonical [`PriceSeries`] normalization.
//!
//! Accepts rows with unknown column naming/ordering and a date encoding of
//! unknown format (structured dates, epoch seconds/milliseconds, `YYYYMMDD`
//! integers, or locale strings with day-first preference) and produces a
//! deduplicated, ascending, date-only series.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::{AnalysisError, PricePoint, PriceSeries, Result};

/// One loosely-typed cell of tabular input
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Date(NaiveDate),
    Number(f64),
    Text(String),
    Empty,
}

/// A raw table: header row plus data rows. Rows shorter than the header are
/// tolerated; missing cells read as [`Cell::Empty`].
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

// Case-insensitive substring hints for column inference
const DATE_HINTS: &[&str] = &["date", "datum", "zeit", "time"];
const PRICE_HINTS: &[&str] = &["close", "kurs", "price", "wert"];

// Sane epoch ranges: 2000-01-01 .. 2100-01-01
const EPOCH_SEC_MIN: f64 = 946_684_800.0;
const EPOCH_SEC_MAX: f64 = 4_102_444_800.0;

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Normalize into a canonical [`PriceSeries`].
    ///
    /// Unparseable rows are dropped; fails with a `DataFormat` error when
    /// fewer than 2 usable date+price rows remain.
    pub fn normalize(&self) -> Result<PriceSeries> {
        if self.headers.is_empty() {
            return Err(AnalysisError::DataFormat("table has no columns".into()));
        }
        let (date_col, price_col) = infer_columns(&self.headers);

        let points: Vec<PricePoint> = self
            .rows
            .iter()
            .filter_map(|row| {
                let date = decode_date(row.get(date_col).unwrap_or(&Cell::Empty))?;
                let close = coerce_price(row.get(price_col).unwrap_or(&Cell::Empty))?;
                Some(PricePoint::new(date, close))
            })
            .collect();

        PriceSeries::new(points)
    }
}

/// Pick (date column, price column) indices by case-insensitive substring
/// match; fall back to first column as date and last column as price.
fn infer_columns(headers: &[String]) -> (usize, usize) {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let date_col = lowered
        .iter()
        .position(|h| DATE_HINTS.iter().any(|hint| h.contains(hint)))
        .unwrap_or(0);

    // Exact "close" takes priority over fuzzy matches like "closing bid"
    let price_col = lowered
        .iter()
        .position(|h| h == "close")
        .or_else(|| {
            lowered
                .iter()
                .enumerate()
                .position(|(i, h)| i != date_col && PRICE_HINTS.iter().any(|hint| h.contains(hint)))
        })
        .unwrap_or_else(|| {
            if headers.len() > 1 {
                headers.len() - 1
            } else {
                0
            }
        });

    (date_col, price_col)
}

/// Decode a cell into a date, trying rules in order: structured value,
/// epoch seconds, epoch milliseconds, `YYYYMMDD` integer, locale string.
fn decode_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Number(v) => decode_numeric_date(*v),
        Cell::Text(s) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<f64>() {
                decode_numeric_date(v)
            } else {
                parse_date_string(s)
            }
        }
        Cell::Empty => None,
    }
}

fn decode_numeric_date(v: f64) -> Option<NaiveDate> {
    if !v.is_finite() {
        return None;
    }
    if v > EPOCH_SEC_MIN && v < EPOCH_SEC_MAX {
        return DateTime::from_timestamp(v as i64, 0).map(|dt| dt.date_naive());
    }
    if v > EPOCH_SEC_MIN * 1000.0 && v < EPOCH_SEC_MAX * 1000.0 {
        return DateTime::from_timestamp_millis(v as i64).map(|dt| dt.date_naive());
    }
    decode_yyyymmdd(v)
}

fn decode_yyyymmdd(v: f64) -> Option<NaiveDate> {
    if v.fract() != 0.0 || !(19_000_101.0..=21_001_231.0).contains(&v) {
        return None;
    }
    let n = v as i64;
    let (year, month, day) = ((n / 10_000) as i32, ((n / 100) % 100) as u32, (n % 100) as u32);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a locale date string with day-first preference
fn parse_date_string(s: &str) -> Option<NaiveDate> {
    // Day-first formats are tried before month-first
    const DATE_FORMATS: &[&str] = &[
        "%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%y",
    ];
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
    ];

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // Strip time-of-day to date-only granularity
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Coerce a cell into a finite price; anything else becomes `None` and the
/// row is dropped upstream.
fn coerce_price(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) if v.is_finite() => Some(*v),
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
