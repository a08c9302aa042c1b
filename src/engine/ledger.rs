#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Cash balance and the per-bar output series of one run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Ledger {
    // Initial cash used for reset
    initial_cash: f64,
    // Cash balance
    cash: f64,
    // Portfolio value per bar
    equity: Vec<f64>,
    // Realized P&L per bar, when tracked
    realized_pnl: Option<Vec<f64>>,
    // Realized P&L of the bar in progress
    pending_pnl: f64,
}

impl Ledger {
    /// Creates a new ledger with the given initial cash.
    /// Non-positive balances are rejected.
    pub fn new(initial_cash: f64, track_realized_pnl: bool) -> Result<Self> {
        if !initial_cash.is_finite() || initial_cash <= 0.0 {
            return Err(Error::NegZeroCash(initial_cash));
        }

        Ok(Self {
            cash: initial_cash,
            initial_cash,
            equity: Vec::new(),
            pending_pnl: 0.0,
            realized_pnl: track_realized_pnl.then(Vec::new),
        })
    }

    /// Returns the initial cash.
    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Returns the cash balance.
    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Returns the equity curve recorded so far.
    pub fn equity(&self) -> &[f64] {
        &self.equity
    }

    /// Returns the realized P&L series recorded so far, if tracked.
    pub fn realized_pnl(&self) -> Option<&[f64]> {
        self.realized_pnl.as_deref()
    }

    /// Returns true if `cost` can be paid, strictly less than the balance.
    ///
    /// A position costing exactly all the remaining cash is refused.
    pub fn can_afford(&self, cost: f64) -> bool {
        self.cash > cost
    }

    /// Pays for an opened position.
    pub(crate) fn debit(&mut self, amount: f64) {
        self.cash -= amount;
    }

    /// Receives the proceeds of a closed position.
    pub(crate) fn credit(&mut self, amount: f64) {
        self.cash += amount;
    }

    /// Adds a realized P&L to the bar in progress.
    pub(crate) fn realize(&mut self, pnl: f64) {
        if self.realized_pnl.is_some() {
            self.pending_pnl += pnl;
        }
    }

    /// Closes the bar in progress: appends its equity and its realized P&L.
    pub(crate) fn record(&mut self, equity: f64) {
        self.equity.push(equity);
        if let Some(series) = self.realized_pnl.as_mut() {
            series.push(self.pending_pnl);
        }
        self.pending_pnl = 0.0;
    }

    /// Replaces the last equity entry with the cash balance, once everything is liquidated.
    pub(crate) fn settle(&mut self) {
        if let Some(last) = self.equity.last_mut() {
            *last = self.cash;
        }
    }

    /// Resets the ledger to its initial cash.
    pub(crate) fn reset(&mut self) {
        self.cash = self.initial_cash;
        self.equity.clear();
        self.pending_pnl = 0.0;
        if let Some(series) = self.realized_pnl.as_mut() {
            series.clear();
        }
    }
}

#[cfg(test)]
#[test]
fn new_ledger_valid_cash() {
    let ledger = Ledger::new(100.0, true).unwrap();
    assert_eq!(ledger.cash(), 100.0);
    assert!(ledger.equity().is_empty());
    assert_eq!(ledger.realized_pnl(), Some(&[][..]));
}

#[cfg(test)]
#[test]
fn new_ledger_invalid_cash() {
    let result = Ledger::new(0.0, true);
    assert!(matches!(result, Err(Error::NegZeroCash(_))));

    let result = Ledger::new(-10.0, true);
    assert!(matches!(result, Err(Error::NegZeroCash(_))));

    let result = Ledger::new(f64::INFINITY, true);
    assert!(matches!(result, Err(Error::NegZeroCash(_))));
}

#[cfg(test)]
#[test]
fn strict_affordability() {
    let ledger = Ledger::new(100.0, true).unwrap();
    assert!(ledger.can_afford(99.99));
    assert!(!ledger.can_afford(100.0));
    assert!(!ledger.can_afford(150.0));
}

#[cfg(test)]
#[test]
fn record_bars() {
    let mut ledger = Ledger::new(100.0, true).unwrap();

    // open a position
    ledger.debit(20.0);
    ledger.record(100.0);

    // close it with a gain
    ledger.credit(25.0);
    ledger.realize(5.0);
    ledger.record(105.0);

    // nothing happens
    ledger.record(105.0);

    assert_eq!(ledger.cash(), 105.0);
    assert_eq!(ledger.equity(), &[100.0, 105.0, 105.0]);
    assert_eq!(ledger.realized_pnl(), Some(&[0.0, 5.0, 0.0][..]));
}

#[cfg(test)]
#[test]
fn untracked_pnl() {
    let mut ledger = Ledger::new(100.0, false).unwrap();
    ledger.realize(5.0);
    ledger.record(100.0);
    assert!(ledger.realized_pnl().is_none());
    assert_eq!(ledger.equity().len(), 1);
}

#[cfg(test)]
#[test]
fn settle_overwrites_last_equity() {
    let mut ledger = Ledger::new(100.0, true).unwrap();
    ledger.debit(50.0);
    ledger.record(101.0);
    ledger.credit(49.0);
    ledger.settle();
    assert_eq!(ledger.equity(), &[99.0]);
}

#[cfg(test)]
#[test]
fn reset_ledger() {
    let mut ledger = Ledger::new(100.0, true).unwrap();
    ledger.debit(20.0);
    ledger.realize(1.0);
    ledger.record(80.0);

    ledger.reset();
    assert_eq!(ledger.cash(), 100.0);
    assert!(ledger.equity().is_empty());
    assert_eq!(ledger.realized_pnl(), Some(&[][..]));
}
