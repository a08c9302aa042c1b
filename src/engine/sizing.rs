#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::FractionCalculus;
use crate::errors::{Error, Result};

/// How many shares a new position gets.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", content = "value", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingPolicy {
    /// Always the same share count, whatever the cash or price.
    Fixed(f64),
    /// A fraction of the current cash converted to shares, never less than one share.
    RiskProportional(f64),
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self::Fixed(1.0)
    }
}

impl SizingPolicy {
    pub(crate) fn validate(&self) -> Result<()> {
        let value = match self {
            Self::Fixed(quantity) => *quantity,
            Self::RiskProportional(fraction) => *fraction,
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::NegZeroSizing(value));
        }
        Ok(())
    }

    /// Returns the quantity for a new position at `price` given the available `cash`.
    ///
    /// In risk-proportional mode the result is floored at one share, so a small balance still
    /// sizes a position; whether it can be afforded is decided by the engine.
    pub fn quantity(&self, cash: f64, price: f64) -> f64 {
        match self {
            Self::Fixed(quantity) => *quantity,
            Self::RiskProportional(fraction) => (cash.share(*fraction) / price).max(1.0),
        }
    }
}

#[cfg(test)]
#[test]
fn fixed_ignores_cash_and_price() {
    let sizing = SizingPolicy::Fixed(3.0);
    assert_eq!(sizing.quantity(10.0, 100.0), 3.0);
    assert_eq!(sizing.quantity(1e9, 0.5), 3.0);
}

#[cfg(test)]
#[test]
fn risk_proportional_uses_cash_fraction() {
    let sizing = SizingPolicy::RiskProportional(0.02);
    assert_eq!(sizing.quantity(1_000_000.0, 100.0), 200.0);
}

#[cfg(test)]
#[test]
fn risk_proportional_floors_at_one_share() {
    let sizing = SizingPolicy::RiskProportional(0.02);
    assert_eq!(sizing.quantity(1_000.0, 100.0), 1.0);
    assert_eq!(sizing.quantity(0.0, 100.0), 1.0);
}

#[cfg(test)]
#[test]
fn reject_non_positive_values() {
    assert!(SizingPolicy::Fixed(0.0).validate().is_err());
    assert!(SizingPolicy::RiskProportional(-0.5).validate().is_err());
    assert!(SizingPolicy::RiskProportional(0.5).validate().is_ok());
}
