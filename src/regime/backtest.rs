//! Equity-curve backtest: buy-and-hold versus a regime-filtered strategy.
//!
//! The regime filter is long on day `t` only when the bull probability of
//! day `t - 1` exceeds the threshold. The one-day lag is structural: the
//! signal for a day can never see that day's own return.

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Result};

use super::{RegimeDay, TRADING_DAYS_PER_YEAR};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Bull-probability level above which the filter goes long
    pub threshold: f64,
    pub initial_capital: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            initial_capital: 100_000.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(AnalysisError::InvalidConfig(format!(
                "threshold {} outside 0..=1",
                self.threshold
            )));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "initial_capital {} must be positive",
                self.initial_capital
            )));
        }
        Ok(())
    }
}

/// Performance of one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// `final / first - 1` over the equity curve
    pub total_return: f64,
    /// Annualized `mean / std * sqrt(252)` of daily returns; 0 when flat
    pub sharpe_ratio: f64,
    /// Most negative `(equity - running_max) / running_max`
    pub max_drawdown: f64,
    pub final_equity: f64,
    pub equity_curve: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub buy_hold: StrategyMetrics,
    pub regime_filter: StrategyMetrics,
}

/// Run both strategies over aligned daily log returns and decoded regime
/// days. `returns[t]` and `days[t]` must describe the same trading day.
pub fn run(returns: &[f64], days: &[RegimeDay], config: &BacktestConfig) -> Result<BacktestResult> {
    config.validate()?;

    if returns.len() != days.len() {
        return Err(AnalysisError::DataFormat(format!(
            "{} returns vs {} regime days",
            returns.len(),
            days.len()
        )));
    }
    if returns.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            need: 2,
            got: returns.len(),
            unit: "days",
        });
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(AnalysisError::DataFormat("non-finite daily return".into()));
    }

    let filtered: Vec<f64> = returns
        .iter()
        .enumerate()
        .map(|(t, &r)| {
            // Day 0 has no prior signal and stays flat
            if t > 0 && days[t - 1].bull_probability > config.threshold {
                r
            } else {
                0.0
            }
        })
        .collect();

    Ok(BacktestResult {
        buy_hold: metrics(returns, config.initial_capital)?,
        regime_filter: metrics(&filtered, config.initial_capital)?,
    })
}

/// Equity curve and summary statistics for one daily log-return stream
fn metrics(returns: &[f64], initial_capital: f64) -> Result<StrategyMetrics> {
    let mut equity_curve = Vec::with_capacity(returns.len());
    let mut cum = 0.0;
    for &r in returns {
        cum += r;
        equity_curve.push(initial_capital * cum.exp());
    }

    let first = equity_curve[0];
    let last = equity_curve[equity_curve.len() - 1];
    let total_return = last / first - 1.0;

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    let sharpe_ratio = if std == 0.0 {
        0.0
    } else {
        mean / std * TRADING_DAYS_PER_YEAR.sqrt()
    };

    let mut running_max = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0f64;
    for &e in &equity_curve {
        running_max = running_max.max(e);
        max_drawdown = max_drawdown.min((e - running_max) / running_max);
    }

    let result = StrategyMetrics {
        total_return,
        sharpe_ratio,
        max_drawdown,
        final_equity: last,
        equity_curve,
    };
    if !(result.total_return.is_finite()
        && result.sharpe_ratio.is_finite()
        && result.max_drawdown.is_finite()
        && result.final_equity.is_finite())
    {
        return Err(AnalysisError::NumericalFitting("non-finite backtest metric"));
    }
    Ok(result)
}
