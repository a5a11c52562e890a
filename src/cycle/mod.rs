//! Cycle analysis: detrend, spectral scan, validation, ranking, and
//! composite-wave forecasting.
//!
//! Pipeline: HP-filter detrend (linear fallback) -> Goertzel amplitude
//! spectrum over integer periods -> local-maxima candidates -> Bartels
//! genuineness validation with least-squares sinusoid fitting -> strength
//! ranking with cluster pruning -> composite reconstruction of the top
//! cycles across the history plus a forecast horizon.

mod detrend;
mod spectrum;

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, PriceSeries, Result};

/// Minimum series length the engine accepts
const MIN_POINTS: usize = 20;

/// Floor of the scanned period range, in bars
const MIN_PERIOD: usize = 5;

/// Candidate peaks taken into Bartels validation
const MAX_CANDIDATES: usize = 100;

/// Peak height threshold as a fraction of the mean spectral amplitude
const PEAK_HEIGHT_FRAC: f64 = 0.5;

/// Amplitudes below this are treated as numerically zero
const MIN_AMPLITUDE: f64 = 1e-9;

// ============================================================
// TYPES
// ============================================================

/// One validated cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub period_days: f64,
    /// Full-series least-squares amplitude, in detrended price units
    pub amplitude: f64,
    /// Phase of the `A*cos(omega*t + phase)` form, t = 0 at the series start
    pub phase_radians: f64,
    /// Bartels genuineness in [0, 99.9]
    pub bartels_genuineness_pct: f64,
    /// amplitude / period; the ranking key
    pub strength: f64,
    /// Bars from the last observation to the next cycle crest
    pub next_peak_offset_days: f64,
    /// Bars from the last observation to the next cycle trough
    pub next_trough_offset_days: f64,
}

/// One slot of the amplitude spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    pub period: f64,
    pub amplitude: f64,
}

/// Full output of [`analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleAnalysis {
    /// Validated cycles, strongest first
    pub cycles: Vec<Cycle>,
    /// Goertzel amplitude per scanned integer period
    pub spectrum: Vec<SpectrumPoint>,
    /// Sum of the top cycles over history plus the forecast horizon
    pub composite_wave: Vec<f64>,
    /// Extracted trend component, aligned with the input series
    pub trend: Vec<f64>,
    /// Detrended residual the spectral scan ran on
    pub detrended: Vec<f64>,
    pub forecast_horizon_days: usize,
    pub data_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Cap on the scanned period; effective cap is `min(N/2, max_period)`,
    /// defaulting to 400 bars
    pub max_period: Option<usize>,
    /// Number of validated cycles to report
    pub top_n: usize,
    /// HP filter smoothing; the default suits daily bars
    pub hp_lambda: f64,
    /// Minimum Bartels genuineness a cycle must reach, percent
    pub genuineness_floor_pct: f64,
    /// Relative period distance under which cycles count as one cluster
    pub cluster_tolerance: f64,
    pub forecast_horizon_days: usize,
    /// At most this many top cycles enter the composite wave
    pub max_composite_cycles: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_period: None,
            top_n: 50,
            hp_lambda: 6_250_000.0,
            genuineness_floor_pct: 49.0,
            cluster_tolerance: 0.15,
            forecast_horizon_days: 200,
            max_composite_cycles: 10,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(AnalysisError::InvalidConfig(
                "top_n must be at least 1".into(),
            ));
        }
        if !(self.hp_lambda.is_finite() && self.hp_lambda > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "hp_lambda {} must be positive",
                self.hp_lambda
            )));
        }
        if !(0.0..=99.9).contains(&self.genuineness_floor_pct) {
            return Err(AnalysisError::InvalidConfig(format!(
                "genuineness_floor_pct {} outside 0..=99.9",
                self.genuineness_floor_pct
            )));
        }
        if !(0.0..1.0).contains(&self.cluster_tolerance) {
            return Err(AnalysisError::InvalidConfig(format!(
                "cluster_tolerance {} outside 0..1",
                self.cluster_tolerance
            )));
        }
        if let Some(max_period) = self.max_period {
            if max_period <= MIN_PERIOD {
                return Err(AnalysisError::InvalidConfig(format!(
                    "max_period {max_period} must exceed {MIN_PERIOD}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Run the full cycle-analysis pipeline on a price series
pub fn analyze(series: &PriceSeries, config: &CycleConfig) -> Result<CycleAnalysis> {
    config.validate()?;

    let n = series.len();
    if n < MIN_POINTS {
        return Err(AnalysisError::InsufficientData {
            need: MIN_POINTS,
            got: n,
            unit: "points",
        });
    }

    let closes = series.closes();
    let (trend, detrended) = detrend::detrend(&closes, config.hp_lambda)?;

    let max_period = config.max_period.unwrap_or(400).min(n / 2);
    let spectrum_raw = spectrum::scan_periods(&detrended, MIN_PERIOD, max_period);
    let candidates = spectrum::find_peaks(&spectrum_raw, PEAK_HEIGHT_FRAC, MAX_CANDIDATES);

    let mut verified: Vec<Cycle> = Vec::new();
    for period in candidates {
        let genuineness = spectrum::bartels_genuineness(&detrended, period as usize);
        if genuineness < config.genuineness_floor_pct {
            continue;
        }
        // Reported amplitude and phase come from the full-series fit
        let Some((amplitude, phase)) = spectrum::fit_sinusoid(&detrended, 0, period) else {
            continue;
        };
        if amplitude <= MIN_AMPLITUDE {
            continue;
        }
        let (next_peak, next_trough) = next_extrema_offsets(period, phase, n);
        verified.push(Cycle {
            period_days: period,
            amplitude,
            phase_radians: phase,
            bartels_genuineness_pct: genuineness,
            strength: amplitude / period,
            next_peak_offset_days: next_peak,
            next_trough_offset_days: next_trough,
        });
    }

    let mut cycles = prune_clusters(verified, config.cluster_tolerance);
    cycles.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    cycles.truncate(config.top_n);

    let composite_wave = composite(
        &cycles,
        n + config.forecast_horizon_days,
        config.max_composite_cycles,
    );

    let analysis = CycleAnalysis {
        cycles,
        spectrum: spectrum_raw
            .into_iter()
            .map(|(period, amplitude)| SpectrumPoint { period, amplitude })
            .collect(),
        composite_wave,
        trend,
        detrended,
        forecast_horizon_days: config.forecast_horizon_days,
        data_len: n,
    };
    debug_assert!(analysis_is_finite(&analysis));
    Ok(analysis)
}

// ============================================================
// INTERNALS
// ============================================================

/// Bars from the last observation (t = n-1) to the next crest and trough
/// of `cos(omega*t + phase)`
fn next_extrema_offsets(period: f64, phase: f64, n: usize) -> (f64, f64) {
    let omega = TAU / period;
    let pos = (omega * (n - 1) as f64 + phase).rem_euclid(TAU);

    let to_peak = if pos <= 0.0 {
        -pos / omega
    } else {
        (TAU - pos) / omega
    };
    let to_trough = if pos <= PI {
        (PI - pos) / omega
    } else {
        (3.0 * PI - pos) / omega
    };
    (to_peak, to_trough)
}

/// Keep only the strongest cycle within each 15%-relative-period cluster
fn prune_clusters(cycles: Vec<Cycle>, tolerance: f64) -> Vec<Cycle> {
    let mut by_strength = cycles;
    by_strength.sort_by(|a, b| b.strength.total_cmp(&a.strength));

    let mut kept: Vec<Cycle> = Vec::new();
    for cycle in by_strength {
        let clustered = kept.iter().any(|existing| {
            let rel = (cycle.period_days - existing.period_days).abs()
                / cycle.period_days.max(existing.period_days);
            rel < tolerance
        });
        if !clustered {
            kept.push(cycle);
        }
    }
    kept
}

/// Sum of the top `max_cycles` waves over `total_len` bars
fn composite(cycles: &[Cycle], total_len: usize, max_cycles: usize) -> Vec<f64> {
    let active = &cycles[..cycles.len().min(max_cycles)];
    (0..total_len)
        .map(|t| {
            active
                .iter()
                .map(|c| {
                    let omega = TAU / c.period_days;
                    c.amplitude * (omega * t as f64 + c.phase_radians).cos()
                })
                .sum()
        })
        .collect()
}

fn analysis_is_finite(analysis: &CycleAnalysis) -> bool {
    analysis.composite_wave.iter().all(|v| v.is_finite())
        && analysis.trend.iter().all(|v| v.is_finite())
        && analysis.detrended.iter().all(|v| v.is_finite())
        && analysis.spectrum.iter().all(|s| s.amplitude.is_finite())
        && analysis.cycles.iter().all(|c| {
            c.amplitude.is_finite()
                && c.phase_radians.is_finite()
                && c.next_peak_offset_days.is_finite()
                && c.next_trough_offset_days.is_finite()
        })
}

// ============================================================
// TESTS
// ============================================================
