//! Performance metrics for backtesting.
//!
//! This module provides tools to calculate, from the equity curve of a finished run:
//! - Total return and CAGR
//! - Sharpe and Sortino ratios
//! - Max drawdown and Calmar ratio
//! - Win rate over the per-bar realized P&L
//!
//! Ratios that are undefined (empty series, zero deviation, no drawdown) are `NaN`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::FractionCalculus;
use crate::engine::BacktestReport;

/// Bars per year for hourly data on a market that never closes.
pub const BARS_PER_YEAR: f64 = 365.0 * 24.0;

/// Trading metrics computed from an equity curve.
///
/// ```rust
/// use sbt::metrics::Metrics;
///
/// let metrics = Metrics::new(vec![100.0, 120.0, 90.0, 110.0], None, 1.0, 0.0);
/// assert!((metrics.max_drawdown() + 0.25).abs() < 1e-12);
/// assert!(metrics.win_rate().is_nan());
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    equity: Vec<f64>,
    realized_pnl: Option<Vec<f64>>,
    bars_per_year: f64,
    risk_free_rate: f64,
}

impl From<&BacktestReport> for Metrics {
    fn from(report: &BacktestReport) -> Self {
        Self::with_report(report, BARS_PER_YEAR, 0.0)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    let mean = mean(values);
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

impl Metrics {
    /// Creates metrics from an equity curve, an optional realized P&L series, the number of bars
    /// per year and an annual risk-free rate.
    pub fn new(equity: Vec<f64>, realized_pnl: Option<Vec<f64>>, bars_per_year: f64, risk_free_rate: f64) -> Self {
        Self {
            equity,
            realized_pnl,
            bars_per_year,
            risk_free_rate,
        }
    }

    /// Creates metrics from a report.
    pub fn with_report(report: &BacktestReport, bars_per_year: f64, risk_free_rate: f64) -> Self {
        Self::new(
            report.equity().to_vec(),
            report.realized_pnl().map(<[f64]>::to_vec),
            bars_per_year,
            risk_free_rate,
        )
    }

    /// Returns the equity curve.
    pub fn equity(&self) -> &[f64] {
        &self.equity
    }

    /// Returns the per-bar simple returns, non-finite values dropped.
    pub fn returns(&self) -> Vec<f64> {
        self.equity
            .windows(2)
            .map(|w| w[0].change(w[1]))
            .filter(|r| r.is_finite())
            .collect()
    }

    fn excess_returns(&self) -> Vec<f64> {
        let rf_bar = self.risk_free_rate / self.bars_per_year;
        self.returns().into_iter().map(|r| r - rf_bar).collect()
    }

    /// Computes the total return (`last / first − 1`).
    pub fn total_return(&self) -> f64 {
        match (self.equity.first(), self.equity.last()) {
            (Some(first), Some(last)) => first.change(*last),
            _ => f64::NAN,
        }
    }

    /// Computes the annualized Sharpe ratio.
    pub fn sharpe_ratio(&self) -> f64 {
        let excess = self.excess_returns();
        let std = std_dev(&excess);
        if excess.is_empty() || std == 0.0 {
            return f64::NAN;
        }
        self.bars_per_year.sqrt() * mean(&excess) / std
    }

    /// Computes the annualized Sortino ratio.
    ///
    /// Only negative excess returns count in the deviation.
    pub fn sortino_ratio(&self) -> f64 {
        let excess = self.excess_returns();
        let downside = excess.iter().copied().filter(|r| *r < 0.0).collect::<Vec<_>>();
        let std = std_dev(&downside);
        if downside.is_empty() || std == 0.0 {
            return f64::NAN;
        }
        self.bars_per_year.sqrt() * mean(&excess) / std
    }

    /// Computes the maximum drawdown, a non-positive fraction (`-0.25` is a 25% drop).
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = f64::NEG_INFINITY;
        self.equity
            .iter()
            .map(|&value| {
                peak = peak.max(value);
                peak.change(value)
            })
            .fold(f64::NAN, f64::min)
    }

    /// Computes the compound annual growth rate.
    pub fn cagr(&self) -> f64 {
        if self.equity.len() < 2 {
            return f64::NAN;
        }
        let years = self.equity.len() as f64 / self.bars_per_year;
        if years <= 0.0 {
            return f64::NAN;
        }
        (1.0 + self.total_return()).powf(1.0 / years) - 1.0
    }

    /// Computes the Calmar ratio (`CAGR / |max drawdown|`).
    pub fn calmar_ratio(&self) -> f64 {
        let denom = self.max_drawdown().abs();
        if denom == 0.0 || denom.is_nan() {
            return f64::NAN;
        }
        self.cagr() / denom
    }

    /// Computes the share of winning bars among bars with a non-zero realized P&L.
    pub fn win_rate(&self) -> f64 {
        let Some(pnl) = self.realized_pnl.as_deref() else {
            return f64::NAN;
        };
        let wins = pnl.iter().filter(|p| **p > 0.0).count();
        let losses = pnl.iter().filter(|p| **p < 0.0).count();
        match wins + losses {
            0 => f64::NAN,
            total => wins as f64 / total as f64,
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Metrics ===")?;
        writeln!(f, "Bars: {}", self.equity.len())?;
        writeln!(f, "Initial Equity: {:.2}", self.equity.first().copied().unwrap_or(f64::NAN))?;
        writeln!(f, "Final Equity: {:.2}", self.equity.last().copied().unwrap_or(f64::NAN))?;
        writeln!(f)?;
        writeln!(f, "Total Return: {:.2}%", self.total_return() * 100.0)?;
        writeln!(f, "CAGR: {:.2}%", self.cagr() * 100.0)?;
        writeln!(
            f,
            "Sharpe Ratio (risk-free rate = {}): {:.2}",
            self.risk_free_rate,
            self.sharpe_ratio()
        )?;
        writeln!(f, "Sortino Ratio: {:.2}", self.sortino_ratio())?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown() * 100.0)?;
        writeln!(f, "Calmar Ratio: {:.2}", self.calmar_ratio())?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate() * 100.0)
    }
}

#[cfg(test)]
fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    let metrics = Metrics::new(vec![10000.0, 12000.0, 9000.0, 11000.0], None, BARS_PER_YEAR, 0.0);
    assert_close(metrics.max_drawdown(), -0.25); // (9000 - 12000) / 12000
}

#[cfg(test)]
#[test]
fn max_drawdown_flat_or_empty() {
    let metrics = Metrics::new(vec![100.0, 101.0, 102.0], None, BARS_PER_YEAR, 0.0);
    assert_eq!(metrics.max_drawdown(), 0.0);
    assert!(metrics.calmar_ratio().is_nan());

    let metrics = Metrics::new(vec![], None, BARS_PER_YEAR, 0.0);
    assert!(metrics.max_drawdown().is_nan());
    assert!(metrics.total_return().is_nan());
}

#[cfg(test)]
#[test]
fn sharpe_ratio() {
    let metrics = Metrics::new(vec![10000.0, 10500.0, 10300.0, 10700.0], None, 1.0, 0.0);
    let returns = metrics.returns();
    let expected = mean(&returns) / std_dev(&returns);
    assert_close(metrics.sharpe_ratio(), expected);
    assert!(metrics.sharpe_ratio() > 0.0);

    // the risk-free rate lowers the ratio
    let with_rf = Metrics::new(metrics.equity().to_vec(), None, 1.0, 0.01);
    assert!(with_rf.sharpe_ratio() < metrics.sharpe_ratio());
}

#[cfg(test)]
#[test]
fn sharpe_ratio_undefined() {
    let metrics = Metrics::new(vec![], None, BARS_PER_YEAR, 0.0);
    assert!(metrics.sharpe_ratio().is_nan());

    let metrics = Metrics::new(vec![100.0, 100.0, 100.0], None, BARS_PER_YEAR, 0.0);
    assert!(metrics.sharpe_ratio().is_nan());
}

#[cfg(test)]
#[test]
fn sortino_ratio() {
    // returns -0.1, 0.1, -0.2: downside deviation 0.05
    let metrics = Metrics::new(vec![100.0, 90.0, 99.0, 79.2], None, 1.0, 0.0);
    assert_close(metrics.sortino_ratio(), (-0.2 / 3.0) / 0.05);

    let metrics = Metrics::new(vec![100.0, 101.0, 102.0], None, 1.0, 0.0);
    assert!(metrics.sortino_ratio().is_nan());
}

#[cfg(test)]
#[test]
fn cagr_and_calmar() {
    // two bars per year, two bars: one year
    let metrics = Metrics::new(vec![100.0, 110.0], None, 2.0, 0.0);
    assert_close(metrics.cagr(), 0.1);

    let metrics = Metrics::new(vec![100.0, 80.0, 121.0], None, 3.0, 0.0);
    assert_close(metrics.cagr(), 0.21);
    assert_close(metrics.calmar_ratio(), 0.21 / 0.2);

    let metrics = Metrics::new(vec![100.0], None, 2.0, 0.0);
    assert!(metrics.cagr().is_nan());
}

#[cfg(test)]
#[test]
fn win_rate() {
    let metrics = Metrics::new(vec![], Some(vec![0.0, 5.0, -2.0, 0.0, 3.0]), BARS_PER_YEAR, 0.0);
    assert_close(metrics.win_rate(), 2.0 / 3.0);

    let metrics = Metrics::new(vec![], Some(vec![0.0, 0.0]), BARS_PER_YEAR, 0.0);
    assert!(metrics.win_rate().is_nan());
}

#[cfg(test)]
#[test]
fn from_report() {
    use std::sync::Arc;

    use crate::engine::*;

    let bars = [(100.0, 1), (104.0, 0), (103.0, -1), (98.0, 0)]
        .into_iter()
        .map(|(price, signal)| Bar::try_from((chrono::DateTime::default(), price, signal)).unwrap())
        .collect::<Arc<[Bar]>>();
    let report = run_backtest(bars, BacktestConfig::default()).unwrap();
    let metrics = Metrics::from(&report);

    assert_eq!(metrics.equity(), report.equity());
    assert_close(
        metrics.total_return(),
        report.final_cash() / report.equity()[0] - 1.0,
    );
    // one take-profit and one short closed at its target, both winners
    assert_eq!(metrics.win_rate(), 1.0);
    assert!(metrics.to_string().contains("Calmar Ratio"));
}
