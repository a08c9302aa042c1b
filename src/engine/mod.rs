//! Core engine components.
//!
//! This module provides the fundamental types for backtesting:
//! - `Bar`: timestamp, price and signal of one step.
//! - `Position`: one open exposure with its exit bracket.
//! - `FeeModel` and `SizingPolicy`: pure cost and quantity rules.
//! - `PositionBook`: open longs and shorts.
//! - `Ledger`: cash and the output series.
//! - `Backtest`: the sequential simulation.

mod bar;
mod book;
mod config;
mod fees;
mod ledger;
mod position;
mod sizing;

use std::sync::Arc;

use log::{debug, info, trace};
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{FractionCalculus, errors::Result};

pub use bar::*;
pub use book::*;
pub use config::*;
pub use fees::*;
pub use ledger::*;
pub use position::*;
pub use sizing::*;

#[cfg(test)]
mod bts;

/// Backtesting engine for signal-driven strategies.
///
/// The engine owns the cash balance and the position book of a run. Bars are shared behind an
/// [`Arc`] so that many engines can read the same series.
#[derive(Debug, Clone)]
pub struct Backtest {
    data: Arc<[Bar]>,
    config: BacktestConfig,
    ledger: Ledger,
    book: PositionBook,
    trades: Vec<Trade>,
    next_id: u64,
}

impl std::ops::Deref for Backtest {
    type Target = Ledger;

    fn deref(&self) -> &Self::Target {
        &self.ledger
    }
}

impl Backtest {
    /// Creates a new backtest instance.
    ///
    /// ### Arguments
    /// * `data` - Bars in time order. An empty series is accepted and yields empty output.
    /// * `config` - Run parameters, validated here.
    ///
    /// ### Returns
    /// The new backtest instance or a configuration error.
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use sbt::prelude::*;
    /// use chrono::DateTime;
    ///
    /// let bar = Bar::new(DateTime::default(), 100.0, Signal::Hold).unwrap();
    /// let bts = Backtest::new(Arc::from_iter(vec![bar]), BacktestConfig::default()).unwrap();
    ///
    /// let config = BacktestConfig { initial_cash: -1.0, ..Default::default() };
    /// assert!(Backtest::new(Arc::from_iter(vec![bar]), config).is_err());
    /// ```
    pub fn new(data: Arc<[Bar]>, config: BacktestConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            data,
            config,
            next_id: 0,
            trades: Vec::new(),
            book: PositionBook::new(),
            ledger: Ledger::new(config.initial_cash, config.track_realized_pnl)?,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Returns a shared handle on the bars.
    pub fn data(&self) -> Arc<[Bar]> {
        Arc::clone(&self.data)
    }

    /// Returns an iterator over the bars.
    pub fn bars(&self) -> std::slice::Iter<'_, Bar> {
        self.data.iter()
    }

    /// Returns the position book.
    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    /// Returns an iterator over the closed trades.
    pub fn trades(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Closes a position at `price`: credits the proceeds, removes it from the book and records
    /// the trade. Liquidation P&L stays out of the per-bar series.
    fn settle(&mut self, position: &Position, index: usize, price: f64, exit: ExitReason) -> Result<()> {
        let fees = self.config.fees;
        self.ledger.credit(position.proceeds(price, &fees));
        self.book.remove(position)?;

        let trade = position.close(price, index, exit, &fees);
        if exit != ExitReason::Liquidation {
            self.ledger.realize(trade.pnl);
        }
        debug!(
            "bar {index}: closed {:?} #{} at {price} ({exit:?}, pnl {:.4})",
            trade.side,
            position.id(),
            trade.pnl
        );
        self.trades.push(trade);
        Ok(())
    }

    /// Closes every position of `side` whose bracket is hit at `price`.
    fn close_positions(&mut self, side: PositionSide, index: usize, price: f64) -> Result<()> {
        for (position, exit) in self.book.scan_closable(side, price) {
            self.settle(&position, index, price, exit)?;
        }
        Ok(())
    }

    /// Opens a position of `side` at `price` if the opposite side is flat and cash allows it.
    fn open_position(&mut self, side: PositionSide, index: usize, price: f64) -> Result<()> {
        if !self.book.is_direction_empty(side.opposite()) {
            trace!("bar {index}: {side:?} signal ignored, {:?} exposure open", side.opposite());
            return Ok(());
        }

        let quantity = self.config.sizing.quantity(self.ledger.cash(), price);
        let cost = (price * quantity).grow(self.config.fees.rate(side));
        if !self.ledger.can_afford(cost) {
            debug!(
                "bar {index}: {side:?} skipped, cost {cost:.4} exceeds cash {:.4}",
                self.ledger.cash()
            );
            return Ok(());
        }

        self.ledger.debit(cost);
        let id = self.next_id();
        let position = Position::open(id, side, quantity, price, self.config.bracket(), index);
        self.book.open(position)?;
        debug!("bar {index}: opened {side:?} #{id}, {quantity} @ {price}");
        Ok(())
    }

    /// Returns the portfolio value at `price`: cash plus every open position at market.
    pub fn mark_to_market(&self, price: f64) -> f64 {
        let longs = self.book.longs().map(|p| p.market_value(price)).sum::<f64>();
        let shorts = self.book.shorts().map(|p| p.market_value(price)).sum::<f64>();
        self.ledger.cash() + longs + shorts
    }

    /// Processes one bar: exits, entry, then valuation.
    fn step(&mut self, index: usize, bar: &Bar) -> Result<()> {
        let price = bar.price();

        self.close_positions(PositionSide::Long, index, price)?;
        self.close_positions(PositionSide::Short, index, price)?;

        match bar.signal() {
            Signal::Buy => self.open_position(PositionSide::Long, index, price)?,
            Signal::Sell => self.open_position(PositionSide::Short, index, price)?,
            Signal::Hold => {}
        }

        let equity = self.mark_to_market(price);
        trace!("bar {index}: price {price}, cash {:.4}, equity {equity:.4}", self.ledger.cash());
        self.ledger.record(equity);
        Ok(())
    }

    /// Closes everything at `price` after the last bar and replaces the last equity entry with
    /// the final cash.
    ///
    /// Longs are sold in one block over their total quantity, shorts are settled one by one.
    fn liquidate(&mut self, index: usize, price: f64) -> Result<()> {
        let fees = self.config.fees;

        let longs = self.book.drain(PositionSide::Long);
        if !longs.is_empty() {
            let quantity = longs.iter().map(Position::quantity).sum::<f64>();
            self.ledger.credit((price * quantity).shrink(fees.rate(PositionSide::Long)));
            self.trades
                .extend(longs.iter().map(|p| p.close(price, index, ExitReason::Liquidation, &fees)));
        }

        for position in self.book.snapshot(PositionSide::Short) {
            self.settle(&position, index, price, ExitReason::Liquidation)?;
        }

        self.ledger.settle();
        Ok(())
    }

    /// Runs the simulation over every bar, then liquidates.
    ///
    /// The state is reset first, so calling `run` twice gives identical reports.
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use sbt::prelude::*;
    /// use chrono::DateTime;
    ///
    /// let bars = [(100.0, 1), (104.0, 0), (101.0, -1)]
    ///     .into_iter()
    ///     .map(|(price, signal)| Bar::try_from((DateTime::default(), price, signal)).unwrap())
    ///     .collect::<Vec<_>>();
    ///
    /// let mut bts = Backtest::new(Arc::from_iter(bars), BacktestConfig::default()).unwrap();
    /// let report = bts.run().unwrap();
    /// assert_eq!(report.equity().len(), 3);
    /// assert_eq!(report.trades().count(), 2);
    /// assert!(bts.book().is_empty());
    /// ```
    pub fn run(&mut self) -> Result<BacktestReport> {
        self.reset();

        let bars = Arc::clone(&self.data);
        info!(
            "Running backtest: {} bars, initial cash {:.2}, sizing {:?}",
            bars.len(),
            self.ledger.initial_cash(),
            self.config.sizing
        );

        for (index, bar) in bars.iter().enumerate() {
            self.step(index, bar)?;
        }
        if let Some(last) = bars.last() {
            self.liquidate(bars.len() - 1, last.price())?;
        }

        info!(
            "Backtest finished: final cash {:.2}, {} trades",
            self.ledger.cash(),
            self.trades.len()
        );
        Ok(self.report())
    }

    /// Builds the report of the current state.
    fn report(&self) -> BacktestReport {
        BacktestReport {
            bars: Arc::clone(&self.data),
            trades: self.trades.clone(),
            final_cash: self.ledger.cash(),
            equity: self.ledger.equity().to_vec(),
            initial_cash: self.ledger.initial_cash(),
            realized_pnl: self.ledger.realized_pnl().map(<[f64]>::to_vec),
        }
    }

    /// Resets the backtest to its initial state.
    pub fn reset(&mut self) {
        self.next_id = 0;
        self.ledger.reset();
        self.book.clear();
        self.trades.clear();
    }
}

/// Runs one simulation on shared bars.
///
/// This is the pure form of [`Backtest::run`]: same inputs, same report.
pub fn run_backtest(data: Arc<[Bar]>, config: BacktestConfig) -> Result<BacktestReport> {
    Backtest::new(data, config)?.run()
}

/// The input series augmented with equity and realized P&L, plus the final cash.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone)]
pub struct BacktestReport {
    bars: Arc<[Bar]>,
    equity: Vec<f64>,
    realized_pnl: Option<Vec<f64>>,
    trades: Vec<Trade>,
    initial_cash: f64,
    final_cash: f64,
}

/// One output row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarOutcome<'a> {
    /// The input bar.
    pub bar: &'a Bar,
    /// Portfolio value after the bar.
    pub equity: f64,
    /// P&L realized on the bar, if tracked.
    pub realized_pnl: Option<f64>,
}

impl BacktestReport {
    /// Returns an iterator over the input bars.
    pub fn bars(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// Returns the equity curve, one entry per bar.
    pub fn equity(&self) -> &[f64] {
        &self.equity
    }

    /// Returns the realized P&L series, one entry per bar, if it was tracked.
    pub fn realized_pnl(&self) -> Option<&[f64]> {
        self.realized_pnl.as_deref()
    }

    /// Returns an iterator over the closed trades, liquidation included.
    pub fn trades(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }

    /// Returns the starting cash.
    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Returns the cash after liquidation.
    pub fn final_cash(&self) -> f64 {
        self.final_cash
    }

    /// Returns the output rows, aligned with the input bars.
    pub fn rows(&self) -> impl Iterator<Item = BarOutcome<'_>> + '_ {
        self.bars
            .iter()
            .zip(self.equity.iter())
            .enumerate()
            .map(|(index, (bar, equity))| BarOutcome {
                bar,
                equity: *equity,
                realized_pnl: self.realized_pnl.as_ref().and_then(|s| s.get(index).copied()),
            })
    }

    /// Writes the report as pretty JSON.
    #[cfg(feature = "serde")]
    pub fn to_json_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}
