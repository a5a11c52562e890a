//! Market-regime modeling: feature engineering, Gaussian HMM fitting,
//! semantic state labeling, and posterior decoding.
//!
//! Labels are assigned after fitting by inspecting state parameters: the
//! state with the highest mean return is Bull, the one with the highest
//! mean volatility is Crash Risk (the same state may win both, Bull takes
//! precedence), and every remaining state is Bear when its mean return is
//! negative, Neutral otherwise.

pub mod backtest;
mod hmm;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, PriceSeries, Result};
use hmm::{GaussianHmm, Obs};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Rolling window for the volatility feature, in trading days
const VOL_WINDOW: usize = 20;

/// Minimum feature rows required for training
const MIN_TRAINING_OBS: usize = 500;

// ============================================================
// TYPES
// ============================================================

/// Semantic regime assigned to a hidden state after fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeLabel {
    Bull,
    Bear,
    CrashRisk,
    Neutral,
}

impl RegimeLabel {
    /// Display color tag
    pub fn color(self) -> &'static str {
        match self {
            RegimeLabel::Bull => "green",
            RegimeLabel::Bear => "red",
            RegimeLabel::CrashRisk => "orange",
            RegimeLabel::Neutral => "grey",
        }
    }
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RegimeLabel::Bull => "Bull",
            RegimeLabel::Bear => "Bear",
            RegimeLabel::CrashRisk => "Crash Risk",
            RegimeLabel::Neutral => "Neutral",
        };
        f.write_str(name)
    }
}

/// Fitted parameters of one hidden state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateStats {
    pub state: usize,
    pub mean_return: f64,
    pub mean_volatility: f64,
    pub label: RegimeLabel,
}

/// One decoded day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeDay {
    pub date: NaiveDate,
    pub state: usize,
    pub label: RegimeLabel,
    /// Posterior mass of the Bull-labeled state(s)
    pub bull_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Number of hidden states, 2 or 3
    pub n_states: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Seed for the deterministic initialization
    pub seed: u64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            n_states: 2,
            max_iterations: 500,
            tolerance: 1e-6,
            seed: 42,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(2..=3).contains(&self.n_states) {
            return Err(AnalysisError::InvalidConfig(format!(
                "n_states must be 2 or 3, got {}",
                self.n_states
            )));
        }
        if self.max_iterations == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "tolerance {} must be positive",
                self.tolerance
            )));
        }
        Ok(())
    }
}

// ============================================================
// MODEL
// ============================================================

/// A trained regime model. Immutable after [`RegimeModel::train`];
/// [`RegimeModel::predict`] decodes without refitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeModel {
    hmm: GaussianHmm,
    stats: Vec<StateStats>,
}

impl RegimeModel {
    /// Fit on return/volatility features of `series`
    pub fn train(series: &PriceSeries, config: &RegimeConfig) -> Result<Self> {
        config.validate()?;

        let features = compute_features(series)?;
        if features.len() < MIN_TRAINING_OBS {
            return Err(AnalysisError::InsufficientData {
                need: MIN_TRAINING_OBS,
                got: features.len(),
                unit: "feature rows",
            });
        }

        let obs: Vec<Obs> = features.iter().map(|(_, o)| *o).collect();
        let hmm = GaussianHmm::fit(
            &obs,
            config.n_states,
            config.max_iterations,
            config.tolerance,
            config.seed,
        )?;
        let stats = label_states(&hmm);
        Ok(Self { hmm, stats })
    }

    /// Decode a series into per-day regime assignments
    pub fn predict(&self, series: &PriceSeries) -> Result<Vec<RegimeDay>> {
        let features = compute_features(series)?;
        if features.is_empty() {
            return Err(AnalysisError::InsufficientData {
                need: VOL_WINDOW + 1,
                got: series.len(),
                unit: "points",
            });
        }

        let obs: Vec<Obs> = features.iter().map(|(_, o)| *o).collect();
        let path = self.hmm.viterbi(&obs)?;
        let posteriors = self.hmm.posteriors(&obs)?;

        let bull_states: Vec<usize> = self
            .stats
            .iter()
            .filter(|s| s.label == RegimeLabel::Bull)
            .map(|s| s.state)
            .collect();

        Ok(features
            .iter()
            .zip(path)
            .zip(posteriors)
            .map(|(((date, _), state), posterior)| RegimeDay {
                date: *date,
                state,
                label: self.stats[state].label,
                bull_probability: bull_states.iter().map(|&i| posterior[i]).sum(),
            })
            .collect())
    }

    pub fn n_states(&self) -> usize {
        self.hmm.n_states
    }

    /// Per-state fitted parameters and labels
    pub fn state_stats(&self) -> &[StateStats] {
        &self.stats
    }

    /// Row-stochastic transition matrix
    pub fn transition_matrix(&self) -> &[Vec<f64>] {
        &self.hmm.transition
    }
}

// ============================================================
// FEATURES
// ============================================================

/// Daily log return plus 20-day rolling annualized volatility, with the
/// warm-up rows dropped. Each entry is dated at the observation day.
pub fn compute_features(series: &PriceSeries) -> Result<Vec<(NaiveDate, Obs)>> {
    let points = series.points();
    if points.iter().any(|p| p.close <= 0.0) {
        return Err(AnalysisError::DataFormat(
            "non-positive close prevents log returns".into(),
        ));
    }

    let returns: Vec<f64> = points
        .windows(2)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect();

    let mut features = Vec::new();
    for t in (VOL_WINDOW - 1)..returns.len() {
        let window = &returns[t + 1 - VOL_WINDOW..=t];
        let vol = sample_std(window) * TRADING_DAYS_PER_YEAR.sqrt();
        // returns[t] spans points[t] -> points[t + 1]
        features.push((points[t + 1].date, [returns[t], vol]));
    }
    Ok(features)
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Assign semantic labels from fitted state parameters
fn label_states(hmm: &GaussianHmm) -> Vec<StateStats> {
    // First state wins ties, so labeling is stable across equal means
    let argmax = |feature: usize| {
        (0..hmm.n_states)
            .reduce(|best, s| {
                if hmm.means[s][feature] > hmm.means[best][feature] {
                    s
                } else {
                    best
                }
            })
            .unwrap_or(0)
    };
    let bull = argmax(0);
    let crash = argmax(1);

    (0..hmm.n_states)
        .map(|state| {
            let mean_return = hmm.means[state][0];
            let label = if state == bull {
                RegimeLabel::Bull
            } else if state == crash {
                RegimeLabel::CrashRisk
            } else if mean_return < 0.0 {
                RegimeLabel::Bear
            } else {
                RegimeLabel::Neutral
            };
            StateStats {
                state,
                mean_return,
                mean_volatility: hmm.means[state][1],
                label,
            }
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PricePoint;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Deterministic pseudo-random value in [-1, 1]
    fn wobble(state: &mut u64) -> f64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        (*state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }

    /// Calm uptrend with a violent drawdown segment in the middle
    fn crash_series(n: usize, crash_from: usize, crash_len: usize) -> PriceSeries {
        let mut rng = 99u64;
        let mut price = 100.0f64;
        let start = date(2015, 1, 2);
        let points = (0..n)
            .map(|i| {
                let daily = if i >= crash_from && i < crash_from + crash_len {
                    -0.02 + 0.03 * wobble(&mut rng)
                } else {
                    0.0005 + 0.005 * wobble(&mut rng)
                };
                price *= daily.exp();
                PricePoint::new(start + Duration::days(i as i64), price)
            })
            .collect();
        PriceSeries::new(points).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(RegimeConfig::default().validate().is_ok());
        assert!(RegimeConfig {
            n_states: 1,
            ..RegimeConfig::default()
        }
        .validate()
        .is_err());
        assert!(RegimeConfig {
            n_states: 4,
            ..RegimeConfig::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_features_shape_and_dates() {
        let series = crash_series(100, 60, 10);
        let features = compute_features(&series).unwrap();
        // n points -> n-1 returns -> warm-up of 19 returns dropped
        assert_eq!(features.len(), 100 - VOL_WINDOW);
        assert_eq!(features[0].0, series.points()[VOL_WINDOW].date);
        assert!(features.iter().all(|(_, o)| o[1] >= 0.0));
    }

    #[test]
    fn test_features_reject_non_positive_close() {
        let points = vec![
            PricePoint::new(date(2020, 1, 1), 10.0),
            PricePoint::new(date(2020, 1, 2), -5.0),
            PricePoint::new(date(2020, 1, 3), 10.0),
        ];
        let series = PriceSeries::new(points).unwrap();
        assert!(matches!(
            compute_features(&series),
            Err(AnalysisError::DataFormat(_))
        ));
    }

    #[test]
    fn test_sample_std() {
        assert_eq!(sample_std(&[1.0]), 0.0);
        let s = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((s - 2.138).abs() < 0.01);
    }

    #[test]
    fn test_train_needs_enough_rows() {
        let series = crash_series(200, 100, 20);
        assert!(matches!(
            RegimeModel::train(&series, &RegimeConfig::default()),
            Err(AnalysisError::InsufficientData { need: 500, .. })
        ));
    }

    #[test]
    fn test_crash_segment_gets_crash_label() {
        let series = crash_series(700, 350, 60);
        let model = RegimeModel::train(&series, &RegimeConfig::default()).unwrap();
        let days = model.predict(&series).unwrap();

        // Majority of the deep-drawdown segment decodes to Crash Risk
        let in_crash: Vec<_> = days
            .iter()
            .filter(|d| {
                let i = (d.date - date(2015, 1, 2)).num_days() as usize;
                (360..400).contains(&i)
            })
            .collect();
        assert!(!in_crash.is_empty());
        let crash_days = in_crash
            .iter()
            .filter(|d| d.label == RegimeLabel::CrashRisk)
            .count();
        assert!(
            crash_days * 2 > in_crash.len(),
            "{crash_days}/{} crash-labeled",
            in_crash.len()
        );
    }

    #[test]
    fn test_labels_cover_bull_and_crash() {
        let series = crash_series(700, 350, 60);
        let model = RegimeModel::train(&series, &RegimeConfig::default()).unwrap();
        let stats = model.state_stats();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().any(|s| s.label == RegimeLabel::Bull));
        assert!(stats.iter().any(|s| s.label == RegimeLabel::CrashRisk));
    }

    #[test]
    fn test_bull_probability_in_unit_range() {
        let series = crash_series(700, 350, 60);
        let model = RegimeModel::train(&series, &RegimeConfig::default()).unwrap();
        for day in model.predict(&series).unwrap() {
            assert!((0.0..=1.0).contains(&day.bull_probability));
        }
    }

    #[test]
    fn test_train_deterministic() {
        let series = crash_series(700, 350, 60);
        let config = RegimeConfig::default();
        let a = RegimeModel::train(&series, &config).unwrap();
        let b = RegimeModel::train(&series, &config).unwrap();
        assert_eq!(a.state_stats(), b.state_stats());
        assert_eq!(a.transition_matrix(), b.transition_matrix());
    }

    #[test]
    fn test_three_state_labels() {
        let series = crash_series(900, 450, 80);
        let config = RegimeConfig {
            n_states: 3,
            ..RegimeConfig::default()
        };
        let model = RegimeModel::train(&series, &config).unwrap();
        let stats = model.state_stats();
        assert_eq!(stats.len(), 3);
        // Exactly one Bull; the rest are drawn from the non-Bull labels
        let bulls = stats.iter().filter(|s| s.label == RegimeLabel::Bull).count();
        assert_eq!(bulls, 1);
    }
}
