//! # SBT: Signal BackTest
//!
//! **SBT** simulates the cash outcome of a discrete trading signal over a price series.
//! Each bar carries one representative price and a signal (`-1` sell, `0` hold, `1` buy);
//! the engine walks the bars once, opening and closing long or short positions under a
//! proportional fee model, and produces a bar-aligned equity curve and realized P&L series.
//!
//! ## Core Components
//! | Component          | Description                                                                    |
//! |--------------------|--------------------------------------------------------------------------------|
//! | **`Bar`**          | Timestamp, price and signal for one time step.                                 |
//! | **`Position`**     | One open long or short exposure with its stop-loss and take-profit bracket.    |
//! | **`FeeModel`**     | Proportional fee for longs, fee plus borrow cost for shorts.                   |
//! | **`SizingPolicy`** | Fixed share count or a fraction of the current cash.                           |
//! | **`PositionBook`** | Open longs and open shorts, never both at once.                                |
//! | **`Ledger`**       | Cash balance, equity curve and per-bar realized P&L.                           |
//! | **`Backtest`**     | The bar-by-bar engine with forced liquidation at the end of the series.       |
//! | **`Metrics`**      | Total return, Sharpe, Sortino, max drawdown, Calmar, win rate.                 |
//! | **`Optimizer`**    | Parallel grid search over engine and signal parameters.                        |
//!
//! ## Bar Lifecycle
//! For every bar, in order:
//! 1. Close longs that hit their take-profit or stop-loss.
//! 2. Close shorts that hit their take-profit or stop-loss.
//! 3. Open a long on a buy signal when no short is open and cash covers the cost.
//! 4. Open a short on a sell signal when no long is open and cash covers the cost.
//! 5. Mark the portfolio to market and append equity and realized P&L.
//!
//! After the last bar every remaining position is closed at the last price and the final
//! equity entry is replaced by the resulting cash.
//!
//! ## Getting Started
//! ```rust
//! use std::sync::Arc;
//!
//! use sbt::prelude::*;
//! use chrono::DateTime;
//!
//! let bar = BarBuilder::builder()
//!     .timestamp(DateTime::default())
//!     .price(100.0)
//!     .signal(Signal::Buy)
//!     .build()
//!     .unwrap();
//!
//! let mut backtest = Backtest::new(Arc::from_iter(vec![bar]), BacktestConfig::default()).unwrap();
//! let report = backtest.run().unwrap();
//!
//! // one long opened at 100 and liquidated at 100: only the round-trip fees are lost
//! assert!(report.final_cash() < 1_000_000.0);
//! assert_eq!(report.equity().last().copied(), Some(report.final_cash()));
//! ```
//!
//! ## Features
//! | Feature     | Description                                                                  |
//! |-------------|------------------------------------------------------------------------------|
//! | `metrics`   | Performance ratios over a finished report.                                   |
//! | `signals`   | RSI/EMA/MACD consensus signal generation backed by the `ta` crate.           |
//! | `optimizer` | Parallel parameter sweeps with `rayon`.                                      |
//! | `serde`     | Serialize reports, deserialize configs, read CSV/JSON bars.                  |
//! | `draws`     | Portfolio vs buy-and-hold charts with `plotters` (default).                  |
//! | `cli`       | The `sbt` binary.                                                            |
//!
//! ## Error Handling
//! Configuration and input errors are reported before the simulation starts:
//! - Non-positive initial cash, stop-loss, take-profit or sizing value.
//! - Negative fee rates.
//! - Non-finite or non-positive prices, signals outside `{-1, 0, 1}`.
//!
//! A buy or sell signal that cannot be afforded is not an error: the bar is still marked to market.
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core engine components: bars, positions, fees, sizing, book, ledger and the backtest loop.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Data sources and dataset helpers.
pub mod data;

/// Performance metrics: returns, Sharpe, Sortino, drawdown, Calmar, win rate.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Consensus signal generation from technical indicators.
#[cfg(feature = "signals")]
pub mod signals;

/// Strategy parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Draw portfolio charts to png or svg.
#[cfg(feature = "draws")]
pub mod draws;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::data::*;
    pub use crate::engine::*;
    pub use crate::errors::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;

    #[cfg(feature = "signals")]
    pub use crate::signals::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;

    #[cfg(feature = "draws")]
    pub use crate::draws::*;
}

/// Trait for performing fraction-based calculations.
///
/// Fractions are plain ratios: `0.02` is two percent.
/// The operation order is fixed so that results are reproducible bit for bit.
pub trait FractionCalculus<Rhs = Self> {
    /// Returns `self × (1 + fraction)`.
    fn grow(self, fraction: Rhs) -> Self;

    /// Returns `self × (1 − fraction)`.
    fn shrink(self, fraction: Rhs) -> Self;

    /// Returns `self × fraction`.
    fn share(self, fraction: Rhs) -> Self;

    /// Returns the relative change from `self` to `new` (`new / self − 1`).
    fn change(self, new: Self) -> Self;
}

impl FractionCalculus for f64 {
    fn grow(self, fraction: Self) -> Self {
        self * (1.0 + fraction)
    }

    fn shrink(self, fraction: Self) -> Self {
        self * (1.0 - fraction)
    }

    fn share(self, fraction: Self) -> Self {
        self * fraction
    }

    fn change(self, new: Self) -> Self {
        new / self - 1.0
    }
}

#[cfg(test)]
mod fraction {
    use super::*;

    #[test]
    fn grow() {
        assert_eq!(104.0, 100.0_f64.grow(0.04))
    }

    #[test]
    fn shrink() {
        assert_eq!(98.0, 100.0_f64.shrink(0.02))
    }

    #[test]
    fn share() {
        assert_eq!(20.0, 1000.0_f64.share(0.02))
    }

    #[test]
    fn change() {
        assert_eq!(0.5, 100.0_f64.change(150.0))
    }
}
