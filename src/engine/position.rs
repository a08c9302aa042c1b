#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::FractionCalculus;
use crate::engine::FeeModel;

/// Represents the direction of a position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionSide {
    /// Profits when the price rises.
    Long,
    /// Profits when the price falls.
    Short,
}

impl PositionSide {
    /// Returns the other direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// Why a position was closed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The price reached the target.
    TakeProfit,
    /// The price reached the stop.
    StopLoss,
    /// Closed at the last bar of the series.
    Liquidation,
}

/// One open exposure.
///
/// A position is immutable once opened: its quantity and its stop-loss/take-profit bracket are
/// fixed at entry. For longs the stop sits below the entry and the target above it, for shorts
/// the other way around.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Position {
    id: u64,
    side: PositionSide,
    quantity: f64,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    opened_at: usize,
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Position {
    /// Opens a position at `entry_price` with the bracket derived from the stop-loss and
    /// take-profit fractions.
    pub(crate) fn open(
        id: u64,
        side: PositionSide,
        quantity: f64,
        entry_price: f64,
        (stop_loss_pct, take_profit_pct): (f64, f64),
        opened_at: usize,
    ) -> Self {
        let (stop_loss, take_profit) = match side {
            PositionSide::Long => (entry_price.shrink(stop_loss_pct), entry_price.grow(take_profit_pct)),
            PositionSide::Short => (entry_price.grow(stop_loss_pct), entry_price.shrink(take_profit_pct)),
        };
        Self {
            id,
            side,
            quantity,
            entry_price,
            stop_loss,
            take_profit,
            opened_at,
        }
    }

    /// Returns the position identifier, unique within a run.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the side.
    pub fn side(&self) -> PositionSide {
        self.side
    }

    /// Returns the share quantity.
    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Returns the entry price.
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Returns the stop-loss price.
    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    /// Returns the take-profit price.
    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    /// Returns the index of the bar that opened the position.
    pub fn opened_at(&self) -> usize {
        self.opened_at
    }

    /// Returns the entry notional (`entry_price × quantity`).
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    /// Returns the exit reason if `price` is at or beyond the bracket.
    pub fn exit_reason(&self, price: f64) -> Option<ExitReason> {
        match self.side {
            PositionSide::Long if price >= self.take_profit => Some(ExitReason::TakeProfit),
            PositionSide::Long if price <= self.stop_loss => Some(ExitReason::StopLoss),
            PositionSide::Short if price <= self.take_profit => Some(ExitReason::TakeProfit),
            PositionSide::Short if price >= self.stop_loss => Some(ExitReason::StopLoss),
            _ => None,
        }
    }

    /// Returns true when `price` triggers the stop-loss or the take-profit.
    pub fn is_closable(&self, price: f64) -> bool {
        self.exit_reason(price).is_some()
    }

    /// Returns the gross P&L at `price`, before any fee.
    pub fn gross_pnl(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (price - self.entry_price) * self.quantity,
            PositionSide::Short => (self.entry_price - price) * self.quantity,
        }
    }

    /// Returns the mark-to-market value at `price`.
    ///
    /// A short is valued as its entry notional plus its unrealized gain, the same convention
    /// used by [`Position::proceeds`] so that equity does not jump when it is closed.
    pub fn market_value(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.quantity * price,
            PositionSide::Short => self.gross_pnl(price) + self.notional(),
        }
    }

    /// Returns the cash credited when closing at `price`.
    pub fn proceeds(&self, price: f64, fees: &FeeModel) -> f64 {
        let rate = fees.rate(self.side);
        match self.side {
            PositionSide::Long => (price * self.quantity).shrink(rate),
            PositionSide::Short => self.gross_pnl(price).shrink(rate) + self.notional(),
        }
    }

    /// Returns the realized P&L when closing at `price`: gross P&L minus the entry fee on the
    /// entry notional and the exit fee on the exit notional.
    pub fn realized_pnl(&self, price: f64, fees: &FeeModel) -> f64 {
        let entry_fee = fees.fee(self.side, self.notional());
        let exit_fee = fees.fee(self.side, price * self.quantity);
        self.gross_pnl(price) - entry_fee - exit_fee
    }

    /// Builds the trade record for a close at `price`.
    pub(crate) fn close(&self, price: f64, closed_at: usize, exit: ExitReason, fees: &FeeModel) -> Trade {
        Trade {
            exit,
            closed_at,
            side: self.side,
            exit_price: price,
            quantity: self.quantity,
            opened_at: self.opened_at,
            entry_price: self.entry_price,
            pnl: self.realized_pnl(price, fees),
        }
    }
}

/// A closed position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// Direction of the closed position.
    pub side: PositionSide,
    /// Share quantity.
    pub quantity: f64,
    /// Entry price.
    pub entry_price: f64,
    /// Exit price.
    pub exit_price: f64,
    /// Index of the opening bar.
    pub opened_at: usize,
    /// Index of the closing bar.
    pub closed_at: usize,
    /// Why the position was closed.
    pub exit: ExitReason,
    /// Realized P&L net of entry and exit fees.
    pub pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fees() -> FeeModel {
        FeeModel::new(0.00125, 0.0025).unwrap()
    }

    #[test]
    fn long_bracket() {
        let position = Position::open(1, PositionSide::Long, 1.0, 100.0, (0.02, 0.04), 0);
        assert_eq!(position.stop_loss(), 98.0);
        assert_eq!(position.take_profit(), 104.0);
        assert_eq!(position.exit_reason(104.0), Some(ExitReason::TakeProfit));
        assert_eq!(position.exit_reason(98.0), Some(ExitReason::StopLoss));
        assert_eq!(position.exit_reason(101.0), None);
    }

    #[test]
    fn short_bracket() {
        let position = Position::open(1, PositionSide::Short, 1.0, 100.0, (0.02, 0.04), 0);
        assert!(position.stop_loss() > 100.0);
        assert!(position.take_profit() < 100.0);
        assert_eq!(position.exit_reason(95.0), Some(ExitReason::TakeProfit));
        assert_eq!(position.exit_reason(103.0), Some(ExitReason::StopLoss));
        assert!(!position.is_closable(100.0));
    }

    #[test]
    fn short_value_matches_proceeds_without_fees() {
        let no_fees = FeeModel::new(0.0, 0.0).unwrap();
        let position = Position::open(1, PositionSide::Short, 2.0, 50.0, (0.1, 0.1), 0);
        assert_eq!(position.market_value(45.0), 110.0);
        assert_eq!(position.proceeds(45.0, &no_fees), position.market_value(45.0));
    }

    #[test]
    fn realized_pnl_charges_both_legs() {
        let fees = fees();
        let position = Position::open(1, PositionSide::Long, 1.0, 100.0, (0.02, 0.04), 0);
        let pnl = position.realized_pnl(104.0, &fees);
        let expected = 4.0 - 100.0 * 0.00125 - 104.0 * 0.00125;
        assert!((pnl - expected).abs() < 1e-12);

        let short = Position::open(2, PositionSide::Short, 1.0, 100.0, (0.02, 0.04), 0);
        let pnl = short.realized_pnl(96.0, &fees);
        let expected = 4.0 - 100.0 * 0.00375 - 96.0 * 0.00375;
        assert!((pnl - expected).abs() < 1e-12);
    }

    #[test]
    fn equality_by_id() {
        let a = Position::open(1, PositionSide::Long, 1.0, 100.0, (0.02, 0.04), 0);
        let b = Position::open(2, PositionSide::Long, 1.0, 100.0, (0.02, 0.04), 0);
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
