//! Frequency-domain scan and cycle validation primitives.
//!
//! The scan runs a single-frequency Goertzel DFT per candidate integer
//! period. Candidates are validated with a Bartels-style circular test: the
//! series is cut into period-length blocks, each block gets its own
//! least-squares sinusoid fit, and the spread of the per-block phase vectors
//! measures how consistently the cycle repeats.

use std::f64::consts::TAU;

/// Genuineness scores are capped here; 100 would claim certainty
const GENUINENESS_CAP_PCT: f64 = 99.9;

/// Goertzel single-frequency DFT amplitude of `x` at `period` samples
pub(crate) fn goertzel_amplitude(x: &[f64], period: f64) -> f64 {
    let n = x.len();
    if n == 0 || period <= 0.0 {
        return 0.0;
    }
    let omega = TAU / period;
    let coeff = 2.0 * omega.cos();

    let mut s_prev = 0.0;
    let mut s_prev2 = 0.0;
    for &v in x {
        let s = v + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    let power = s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2;
    2.0 * power.max(0.0).sqrt() / n as f64
}

/// Amplitude spectrum over every integer period in `min_period..=max_period`
pub(crate) fn scan_periods(x: &[f64], min_period: usize, max_period: usize) -> Vec<(f64, f64)> {
    (min_period..=max_period)
        .map(|p| (p as f64, goertzel_amplitude(x, p as f64)))
        .collect()
}

/// Local spectral maxima above `height_frac` of the mean amplitude,
/// strongest first, truncated to `limit`
pub(crate) fn find_peaks(spectrum: &[(f64, f64)], height_frac: f64, limit: usize) -> Vec<f64> {
    if spectrum.len() < 3 {
        return Vec::new();
    }
    let mean = spectrum.iter().map(|(_, a)| a).sum::<f64>() / spectrum.len() as f64;
    let floor = mean * height_frac;

    let mut peaks: Vec<(f64, f64)> = spectrum
        .windows(3)
        .filter_map(|w| {
            let (_, left) = w[0];
            let (period, amp) = w[1];
            let (_, right) = w[2];
            (amp > left && amp >= right && amp >= floor).then_some((period, amp))
        })
        .collect();

    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    peaks.truncate(limit);
    peaks.into_iter().map(|(p, _)| p).collect()
}

/// Least-squares fit of `x[t] ~ a*cos(omega*t) + b*sin(omega*t) + c` with
/// `t` starting at `t0`. Returns (amplitude, phase) for the equivalent
/// `A*cos(omega*t + phase)` form, or `None` on a degenerate system.
pub(crate) fn fit_sinusoid(x: &[f64], t0: usize, period: f64) -> Option<(f64, f64)> {
    if x.len() < 3 || period <= 0.0 {
        return None;
    }
    let n = x.len() as f64;
    let omega = TAU / period;

    // Normal equations of the 3-column design [cos, sin, 1]
    let mut s_cc = 0.0;
    let mut s_cs = 0.0;
    let mut s_ss = 0.0;
    let mut s_c = 0.0;
    let mut s_s = 0.0;
    let mut r_c = 0.0;
    let mut r_s = 0.0;
    let mut r_1 = 0.0;
    for (i, &v) in x.iter().enumerate() {
        let arg = omega * (t0 + i) as f64;
        let (sin, cos) = arg.sin_cos();
        s_cc += cos * cos;
        s_cs += cos * sin;
        s_ss += sin * sin;
        s_c += cos;
        s_s += sin;
        r_c += v * cos;
        r_s += v * sin;
        r_1 += v;
    }

    // Cramer's rule on the symmetric 3x3 system
    let det = s_cc * (s_ss * n - s_s * s_s) - s_cs * (s_cs * n - s_s * s_c)
        + s_c * (s_cs * s_s - s_ss * s_c);
    if det.abs() < 1e-9 {
        return None;
    }
    let det_a = r_c * (s_ss * n - s_s * s_s) - s_cs * (r_s * n - s_s * r_1)
        + s_c * (r_s * s_s - s_ss * r_1);
    let det_b = s_cc * (r_s * n - s_s * r_1) - r_c * (s_cs * n - s_s * s_c)
        + s_c * (s_cs * r_1 - r_s * s_c);
    let a = det_a / det;
    let b = det_b / det;

    let amplitude = a.hypot(b);
    let phase = (-b).atan2(a);
    (amplitude.is_finite() && phase.is_finite()).then_some((amplitude, phase))
}

/// Bartels genuineness of an integer `period` in `x`, in percent.
///
/// The series is split into consecutive period-length blocks, each block's
/// phase vector is normalized to unit length, and the resultant length `R`
/// of the vector sum feeds `z = k * R^2` into `(1 - e^-z) * 100`. Fewer
/// than 2 fittable blocks scores 0.
pub(crate) fn bartels_genuineness(x: &[f64], period: usize) -> f64 {
    if period == 0 {
        return 0.0;
    }
    let blocks = x.len() / period;
    if blocks < 2 {
        return 0.0;
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut fitted = 0usize;
    for b in 0..blocks {
        let start = b * period;
        let block = &x[start..start + period];
        if let Some((amplitude, phase)) = fit_sinusoid(block, start, period as f64) {
            if amplitude > 0.0 {
                sum_x += phase.cos();
                sum_y += phase.sin();
                fitted += 1;
            }
        }
    }
    if fitted < 2 {
        return 0.0;
    }

    let resultant = sum_x.hypot(sum_y) / fitted as f64;
    let z = fitted as f64 * resultant * resultant;
    ((1.0 - (-z).exp()) * 100.0).min(GENUINENESS_CAP_PCT)
}
