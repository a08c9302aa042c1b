#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{FeeModel, SizingPolicy};
use crate::errors::{Error, Result};

/// Parameters of one simulation run.
///
/// With the `serde` feature the configuration reads from JSON; missing keys take their
/// default value:
///
/// ```json
/// {
///   "stop_loss_pct": 0.02,
///   "take_profit_pct": 0.04,
///   "sizing": { "mode": "risk_proportional", "value": 0.02 },
///   "long_fee_rate": 0.00125,
///   "short_fee_rate_addon": 0.0025,
///   "initial_cash": 1000000.0
/// }
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestConfig {
    /// Distance of the stop from the entry price, as a fraction (below for longs, above for shorts).
    pub stop_loss_pct: f64,
    /// Distance of the target from the entry price, as a fraction (above for longs, below for shorts).
    pub take_profit_pct: f64,
    /// Position sizing.
    pub sizing: SizingPolicy,
    /// Fee schedule.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub fees: FeeModel,
    /// Starting cash.
    pub initial_cash: f64,
    /// Whether to record the per-bar realized P&L series.
    pub track_realized_pnl: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            sizing: SizingPolicy::default(),
            fees: FeeModel::default(),
            initial_cash: 1_000_000.0,
            track_realized_pnl: true,
        }
    }
}

impl BacktestConfig {
    /// Checks every parameter; called by the engine before a run starts.
    pub fn validate(&self) -> Result<()> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(Error::NegZeroCash(self.initial_cash));
        }
        if !self.stop_loss_pct.is_finite() || self.stop_loss_pct <= 0.0 {
            return Err(Error::NegZeroStopLoss(self.stop_loss_pct));
        }
        if !self.take_profit_pct.is_finite() || self.take_profit_pct <= 0.0 {
            return Err(Error::NegZeroTakeProfit(self.take_profit_pct));
        }
        self.sizing.validate()?;
        self.fees.validate()
    }

    /// Returns the `(stop_loss_pct, take_profit_pct)` bracket.
    pub fn bracket(&self) -> (f64, f64) {
        (self.stop_loss_pct, self.take_profit_pct)
    }

    /// Reads a configuration from a JSON file.
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}
