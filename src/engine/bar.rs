use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Discrete trade signal attached to a bar.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "i64"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Open a short (`-1`).
    Sell,
    /// Do nothing (`0`).
    #[default]
    Hold,
    /// Open a long (`1`).
    Buy,
}

impl TryFrom<i64> for Signal {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(Self::Sell),
            0 => Ok(Self::Hold),
            1 => Ok(Self::Buy),
            other => Err(Error::InvalidSignal(other)),
        }
    }
}

impl From<Signal> for i64 {
    fn from(value: Signal) -> Self {
        match value {
            Signal::Sell => -1,
            Signal::Hold => 0,
            Signal::Buy => 1,
        }
    }
}

/// One step of the input series: a timestamp, a single representative price and a signal.
///
/// Bars can only be built through [`BarBuilder`] or [`Bar::new`], both of which reject
/// non-finite or non-positive prices.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    timestamp: DateTime<Utc>,
    price: f64,
    signal: Signal,
}

impl Bar {
    /// Creates a validated bar.
    pub fn new(timestamp: DateTime<Utc>, price: f64, signal: Signal) -> Result<Self> {
        if !price.is_finite() || price <= 0.0 {
            return Err(Error::InvalidPrice(price));
        }
        Ok(Self {
            timestamp,
            price,
            signal,
        })
    }

    /// Returns the timestamp (used for alignment only).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the comparison price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the signal.
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Returns a copy of this bar carrying another signal.
    pub fn with_signal(&self, signal: Signal) -> Self {
        Self { signal, ..*self }
    }
}

impl TryFrom<(DateTime<Utc>, f64, i64)> for Bar {
    type Error = Error;

    fn try_from((timestamp, price, signal): (DateTime<Utc>, f64, i64)) -> Result<Self> {
        Self::new(timestamp, price, Signal::try_from(signal)?)
    }
}

/// Step-by-step bar construction.
///
/// ```rust
/// use sbt::engine::{BarBuilder, Signal};
/// use chrono::DateTime;
///
/// let bar = BarBuilder::builder()
///     .timestamp(DateTime::default())
///     .price(101.5)
///     .signal(Signal::Sell)
///     .build()
///     .unwrap();
/// assert_eq!(bar.price(), 101.5);
/// ```
#[derive(Debug, Default)]
pub struct BarBuilder {
    timestamp: Option<DateTime<Utc>>,
    price: Option<f64>,
    signal: Signal,
}

impl BarBuilder {
    /// Starts a new builder. The signal defaults to [`Signal::Hold`].
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the price.
    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the signal.
    pub fn signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Validates and builds the bar.
    pub fn build(self) -> Result<Bar> {
        let timestamp = self.timestamp.ok_or(Error::MissingField("timestamp"))?;
        let price = self.price.ok_or(Error::MissingField("price"))?;
        Bar::new(timestamp, price, self.signal)
    }
}

#[cfg(test)]
#[test]
fn signal_from_integer() {
    assert_eq!(Signal::try_from(-1).unwrap(), Signal::Sell);
    assert_eq!(Signal::try_from(0).unwrap(), Signal::Hold);
    assert_eq!(Signal::try_from(1).unwrap(), Signal::Buy);
    assert!(matches!(Signal::try_from(2), Err(Error::InvalidSignal(2))));
    assert_eq!(i64::from(Signal::Sell), -1);
}

#[cfg(test)]
#[test]
fn reject_invalid_prices() {
    for price in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let result = Bar::new(DateTime::default(), price, Signal::Hold);
        assert!(matches!(result, Err(Error::InvalidPrice(_))));
    }
}

#[cfg(test)]
#[test]
fn builder_requires_price() {
    let result = BarBuilder::builder().timestamp(DateTime::default()).build();
    assert!(matches!(result, Err(Error::MissingField("price"))));
}

#[cfg(test)]
#[test]
fn bar_from_tuple() {
    let bar = Bar::try_from((DateTime::default(), 42.0, 1)).unwrap();
    assert_eq!(bar.signal(), Signal::Buy);
    assert!(Bar::try_from((DateTime::default(), 42.0, -3)).is_err());
    assert_eq!(bar.with_signal(Signal::Sell).signal(), Signal::Sell);
}
