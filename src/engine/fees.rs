#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::PositionSide;
use crate::errors::{Error, Result};

/// Proportional fee schedule.
///
/// Longs pay `long_fee_rate` on every traded notional. Shorts pay the same rate plus
/// `short_fee_rate_addon`, the carrying cost of borrowed shares.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeModel {
    long_fee_rate: f64,
    short_fee_rate_addon: f64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            long_fee_rate: 0.125 / 100.0,
            short_fee_rate_addon: 0.25 / 100.0,
        }
    }
}

impl FeeModel {
    /// Creates a fee model. Rates are fractions (`0.00125` is 0.125%).
    pub fn new(long_fee_rate: f64, short_fee_rate_addon: f64) -> Result<Self> {
        let fees = Self {
            long_fee_rate,
            short_fee_rate_addon,
        };
        fees.validate()?;
        Ok(fees)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.long_fee_rate.is_finite() || self.long_fee_rate < 0.0 {
            return Err(Error::NegFeeRate("long_fee_rate", self.long_fee_rate));
        }
        if !self.short_fee_rate_addon.is_finite() || self.short_fee_rate_addon < 0.0 {
            return Err(Error::NegFeeRate("short_fee_rate_addon", self.short_fee_rate_addon));
        }
        Ok(())
    }

    /// Returns the long fee rate.
    pub fn long_fee_rate(&self) -> f64 {
        self.long_fee_rate
    }

    /// Returns the borrow cost added on top of the long rate for shorts.
    pub fn short_fee_rate_addon(&self) -> f64 {
        self.short_fee_rate_addon
    }

    /// Returns the rate applied to `side`.
    pub fn rate(&self, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => self.long_fee_rate,
            PositionSide::Short => self.long_fee_rate + self.short_fee_rate_addon,
        }
    }

    /// Returns the fee charged on `notional` for `side`.
    pub fn fee(&self, side: PositionSide, notional: f64) -> f64 {
        notional * self.rate(side)
    }
}

#[cfg(test)]
#[test]
fn short_rate_adds_borrow_cost() {
    let fees = FeeModel::new(0.001, 0.002).unwrap();
    assert_eq!(fees.rate(PositionSide::Long), 0.001);
    assert_eq!(fees.rate(PositionSide::Short), 0.001 + 0.002);
    assert_eq!(fees.fee(PositionSide::Long, 1000.0), 1000.0 * 0.001);
}

#[cfg(test)]
#[test]
fn zero_fees_are_free() {
    let fees = FeeModel::new(0.0, 0.0).unwrap();
    assert_eq!(fees.fee(PositionSide::Short, 12345.0), 0.0);
}

#[cfg(test)]
#[test]
fn reject_negative_rates() {
    assert!(matches!(
        FeeModel::new(-0.1, 0.0),
        Err(Error::NegFeeRate("long_fee_rate", _))
    ));
    assert!(matches!(
        FeeModel::new(0.1, f64::NAN),
        Err(Error::NegFeeRate("short_fee_rate_addon", _))
    ));
}
