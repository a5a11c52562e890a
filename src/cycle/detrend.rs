//! Trend extraction: Hodrick-Prescott filter with a linear-regression
//! fallback.
//!
//! The HP filter solves `(I + lambda * D'D) t = y` where `D` is the second
//! difference operator. The system matrix is pentadiagonal, symmetric and
//! positive definite, so a banded Cholesky factorization solves it in O(n)
//! without forming the full matrix.

use crate::{AnalysisError, Result};

/// Replace zero or non-finite values by the previous valid value, then
/// back-fill the head from the first valid value. `None` when no valid
/// value exists at all.
pub(crate) fn fill_invalid(values: &[f64]) -> Option<Vec<f64>> {
    let first_valid = values.iter().copied().find(|v| v.is_finite() && *v != 0.0)?;

    let mut filled = Vec::with_capacity(values.len());
    let mut last = first_valid;
    for &v in values {
        if v.is_finite() && v != 0.0 {
            last = v;
        }
        filled.push(last);
    }
    Some(filled)
}

/// Hodrick-Prescott trend component of `y` with smoothing `lambda`
pub(crate) fn hp_filter(y: &[f64], lambda: f64) -> Result<Vec<f64>> {
    let n = y.len();
    if n < 4 {
        return Err(AnalysisError::InsufficientData {
            need: 4,
            got: n,
            unit: "points",
        });
    }
    if !(lambda.is_finite() && lambda > 0.0) {
        return Err(AnalysisError::InvalidConfig(format!(
            "hp lambda {lambda} must be positive"
        )));
    }

    // Bands of I + lambda * D'D (symmetric, main + two upper diagonals)
    let mut a0 = vec![1.0 + 6.0 * lambda; n];
    a0[0] = 1.0 + lambda;
    a0[n - 1] = 1.0 + lambda;
    a0[1] = 1.0 + 5.0 * lambda;
    a0[n - 2] = 1.0 + 5.0 * lambda;

    let mut a1 = vec![-4.0 * lambda; n - 1];
    a1[0] = -2.0 * lambda;
    a1[n - 2] = -2.0 * lambda;

    let a2 = vec![lambda; n - 2];

    // Banded Cholesky: A = L L' with L lower-triangular, bandwidth 2
    let mut l0 = vec![0.0; n];
    let mut l1 = vec![0.0; n - 1];
    let mut l2 = vec![0.0; n - 2];

    for i in 0..n {
        let mut d = a0[i];
        if i >= 1 {
            d -= l1[i - 1] * l1[i - 1];
        }
        if i >= 2 {
            d -= l2[i - 2] * l2[i - 2];
        }
        if d <= 0.0 || !d.is_finite() {
            return Err(AnalysisError::NumericalFitting(
                "hp filter system not positive definite",
            ));
        }
        l0[i] = d.sqrt();

        if i + 1 < n {
            let mut e = a1[i];
            if i >= 1 {
                e -= l2[i - 1] * l1[i - 1];
            }
            l1[i] = e / l0[i];
        }
        if i + 2 < n {
            l2[i] = a2[i] / l0[i];
        }
    }

    // Forward solve L z = y
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut s = y[i];
        if i >= 1 {
            s -= l1[i - 1] * z[i - 1];
        }
        if i >= 2 {
            s -= l2[i - 2] * z[i - 2];
        }
        z[i] = s / l0[i];
    }

    // Back solve L' t = z
    let mut t = vec![0.0; n];
    for i in (0..n).rev() {
        let mut s = z[i];
        if i + 1 < n {
            s -= l1[i] * t[i + 1];
        }
        if i + 2 < n {
            s -= l2[i] * t[i + 2];
        }
        t[i] = s / l0[i];
    }

    if t.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NumericalFitting("hp trend is non-finite"));
    }
    Ok(t)
}

/// Ordinary least-squares line through `y`
pub(crate) fn linear_trend(y: &[f64]) -> Result<Vec<f64>> {
    let n = y.len();
    if n < 2 {
        return Err(AnalysisError::InsufficientData {
            need: 2,
            got: n,
            unit: "points",
        });
    }

    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, &v) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxx += dx * dx;
        sxy += dx * (v - y_mean);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

    let trend: Vec<f64> = (0..n)
        .map(|i| y_mean + slope * (i as f64 - x_mean))
        .collect();
    if trend.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NumericalFitting("linear trend is non-finite"));
    }
    Ok(trend)
}

/// Detrend `closes`: HP filter first, linear regression when it fails.
/// Returns (trend, detrended).
pub(crate) fn detrend(closes: &[f64], lambda: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    let filled = fill_invalid(closes).ok_or_else(|| {
        AnalysisError::DataFormat("series has no usable close values".into())
    })?;

    let trend = match hp_filter(&filled, lambda) {
        Ok(t) => t,
        Err(err) => {
            log::warn!("hp filter failed ({err}), falling back to linear detrend");
            linear_trend(&filled)?
        }
    };

    let detrended: Vec<f64> = filled.iter().zip(&trend).map(|(y, t)| y - t).collect();
    Ok((trend, detrended))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_invalid() {
        let filled = fill_invalid(&[0.0, 1.0, f64::NAN, 3.0, 0.0]).unwrap();
        assert_eq!(filled, vec![1.0, 1.0, 1.0, 3.0, 3.0]);
        assert!(fill_invalid(&[0.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_hp_recovers_linear_trend() {
        // A pure line is its own trend for any lambda
        let y: Vec<f64> = (0..200).map(|i| 5.0 + 0.3 * i as f64).collect();
        let trend = hp_filter(&y, 1600.0).unwrap();
        for (t, v) in trend.iter().zip(&y) {
            assert!((t - v).abs() < 1e-6, "trend {t} vs {v}");
        }
    }

    #[test]
    fn test_hp_smooths_oscillation() {
        // Line plus fast sine: high lambda should strip most of the sine
        let y: Vec<f64> = (0..500)
            .map(|i| {
                let t = i as f64;
                100.0 + 0.1 * t + 5.0 * (t * std::f64::consts::TAU / 20.0).sin()
            })
            .collect();
        let trend = hp_filter(&y, 6_250_000.0).unwrap();
        let residual_amp = y
            .iter()
            .zip(&trend)
            .map(|(v, t)| (v - t).abs())
            .fold(0.0f64, f64::max);
        assert!(residual_amp < 6.0);
        // Trend stays near the line
        for (i, t) in trend.iter().enumerate() {
            let line = 100.0 + 0.1 * i as f64;
            assert!((t - line).abs() < 6.0);
        }
    }

    #[test]
    fn test_hp_too_short() {
        assert!(matches!(
            hp_filter(&[1.0, 2.0, 3.0], 1600.0),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_linear_trend_exact() {
        let y: Vec<f64> = (0..50).map(|i| 2.0 + 1.5 * i as f64).collect();
        let trend = linear_trend(&y).unwrap();
        for (t, v) in trend.iter().zip(&y) {
            assert!((t - v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_detrend_removes_mean_structure() {
        let y: Vec<f64> = (0..300).map(|i| 50.0 + 0.2 * i as f64).collect();
        let (trend, detrended) = detrend(&y, 6_250_000.0).unwrap();
        assert_eq!(trend.len(), y.len());
        let max_resid = detrended.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(max_resid < 1e-6);
    }

    #[test]
    fn test_detrend_short_series_falls_back() {
        // Too short for the HP filter but fine for the linear fallback
        let (trend, detrended) = detrend(&[1.0, 2.0, 3.0], 1600.0).unwrap();
        assert_eq!(trend.len(), 3);
        assert!(detrended.iter().all(|v| v.abs() < 1e-9));
    }
}
