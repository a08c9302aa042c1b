//! Consensus signals from technical indicators.
//!
//! Three indicators vote on every bar:
//! - RSI: buy when oversold, sell when overbought, silent while warming up. Gains and losses
//!   are averaged with a simple moving average over the RSI period.
//! - EMA: sign of the short average minus the long one.
//! - MACD: sign of the MACD line minus its signal line.
//!
//! A signal is emitted when at least two votes agree.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, MovingAverageConvergenceDivergenceOutput,
    SimpleMovingAverage,
};

use crate::engine::{Bar, Signal};
use crate::errors::{Error, Result};

/// Indicator parameters of the two-of-three consensus.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusSignals {
    /// RSI period.
    pub rsi_period: usize,
    /// RSI level above which the RSI votes sell.
    pub rsi_overbought: f64,
    /// RSI level below which the RSI votes buy.
    pub rsi_oversold: f64,
    /// Short EMA period.
    pub ema_short: usize,
    /// Long EMA period.
    pub ema_long: usize,
    /// MACD fast period.
    pub macd_fast: usize,
    /// MACD slow period.
    pub macd_slow: usize,
    /// MACD signal line period.
    pub macd_signal: usize,
}

impl Default for ConsensusSignals {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            ema_short: 12,
            ema_long: 26,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

fn indicator_error(e: impl std::fmt::Display) -> Error {
    Error::Indicator(e.to_string())
}

/// Relative strength index over simple averages of the per-bar gains and losses.
///
/// The first bar counts as a zero move. The value is `NaN` until `period` bars were seen, and
/// also when the window holds neither gain nor loss.
#[derive(Debug, Clone)]
struct SimpleRsi {
    period: usize,
    seen: usize,
    previous: Option<f64>,
    gains: SimpleMovingAverage,
    losses: SimpleMovingAverage,
}

impl SimpleRsi {
    fn new(period: usize) -> Result<Self> {
        Ok(Self {
            period,
            seen: 0,
            previous: None,
            gains: SimpleMovingAverage::new(period).map_err(indicator_error)?,
            losses: SimpleMovingAverage::new(period).map_err(indicator_error)?,
        })
    }
}

impl Next<f64> for SimpleRsi {
    type Output = f64;

    fn next(&mut self, price: f64) -> Self::Output {
        let delta = self.previous.map_or(0.0, |previous| price - previous);
        self.previous = Some(price);
        self.seen += 1;

        let gain = self.gains.next(delta.max(0.0));
        let loss = self.losses.next((-delta).max(0.0));
        if self.seen < self.period {
            return f64::NAN;
        }
        // no loss in the window gives 100
        100.0 - 100.0 / (1.0 + gain / loss)
    }
}

fn vote(a: f64, b: f64) -> i8 {
    if a > b {
        1
    } else if a < b {
        -1
    } else {
        0
    }
}

impl ConsensusSignals {
    /// Buy below the oversold level, sell above the overbought one. An undefined RSI is silent.
    fn rsi_vote(&self, rsi: f64) -> i8 {
        if rsi < self.rsi_oversold {
            1
        } else if rsi > self.rsi_overbought {
            -1
        } else {
            0
        }
    }

    /// Computes one signal per price.
    ///
    /// ### Errors
    /// Returns [`Error::Indicator`] for a zero period or RSI thresholds outside `0..=100` or
    /// out of order.
    pub fn generate(&self, prices: &[f64]) -> Result<Vec<Signal>> {
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold > self.rsi_overbought
        {
            return Err(Error::Indicator(format!(
                "RSI thresholds must satisfy 0 <= oversold <= overbought <= 100 (got: {}, {})",
                self.rsi_oversold, self.rsi_overbought
            )));
        }

        let mut rsi = SimpleRsi::new(self.rsi_period)?;
        let mut ema_short = ExponentialMovingAverage::new(self.ema_short).map_err(indicator_error)?;
        let mut ema_long = ExponentialMovingAverage::new(self.ema_long).map_err(indicator_error)?;
        let mut macd = MovingAverageConvergenceDivergence::new(self.macd_fast, self.macd_slow, self.macd_signal)
            .map_err(indicator_error)?;

        let signals = prices
            .iter()
            .map(|&price| {
                let rsi_vote = self.rsi_vote(rsi.next(price));
                let ema_vote = vote(ema_short.next(price), ema_long.next(price));
                let MovingAverageConvergenceDivergenceOutput { macd, signal, .. } = macd.next(price);

                match rsi_vote + ema_vote + vote(macd, signal) {
                    sum if sum >= 2 => Signal::Buy,
                    sum if sum <= -2 => Signal::Sell,
                    _ => Signal::Hold,
                }
            })
            .collect();
        Ok(signals)
    }

    /// Returns a copy of `bars` carrying the generated signals.
    pub fn apply(&self, bars: &[Bar]) -> Result<Vec<Bar>> {
        let prices = bars.iter().map(Bar::price).collect::<Vec<_>>();
        let signals = self.generate(&prices)?;
        Ok(bars.iter().zip(signals).map(|(bar, signal)| bar.with_signal(signal)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_agreement_before_rsi_warm_up() {
        let rising = (0..40).map(|i| 100.0 + i as f64).collect::<Vec<_>>();
        let signals = ConsensusSignals::default().generate(&rising).unwrap();

        assert_eq!(signals[0], Signal::Hold);
        assert!(signals[1..13].iter().all(|s| *s == Signal::Buy));
        // overbought RSI cancels one of the two trend votes
        assert!(signals[13..].iter().all(|s| *s == Signal::Hold));

        let falling = (0..40).map(|i| 200.0 - i as f64).collect::<Vec<_>>();
        let signals = ConsensusSignals::default().generate(&falling).unwrap();
        assert!(signals[1..13].iter().all(|s| *s == Signal::Sell));
        assert!(signals[13..].iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn rsi_over_simple_averages() {
        // moves 0, +1, +1, -1, -2, +1
        let prices = [10.0, 11.0, 12.0, 11.0, 9.0, 10.0];
        let mut rsi = SimpleRsi::new(3).unwrap();
        let values = prices.iter().map(|&p| rsi.next(p)).collect::<Vec<_>>();

        assert!(values[0].is_nan() && values[1].is_nan());
        assert_eq!(values[2], 100.0);
        assert!((values[3] - 200.0 / 3.0).abs() < 1e-9);
        assert!((values[4] - 25.0).abs() < 1e-9);
        assert!((values[5] - 25.0).abs() < 1e-9);

        let mut rsi = SimpleRsi::new(3).unwrap();
        assert!([5.0, 5.0, 5.0].iter().map(|&p| rsi.next(p)).last().unwrap().is_nan());
    }

    #[test]
    fn rsi_votes() {
        let signals = ConsensusSignals {
            rsi_period: 3,
            ..Default::default()
        };
        let prices = [10.0, 11.0, 12.0, 11.0, 9.0, 10.0];
        let mut rsi = SimpleRsi::new(3).unwrap();
        let votes = prices
            .iter()
            .map(|&p| signals.rsi_vote(rsi.next(p)))
            .collect::<Vec<_>>();
        assert_eq!(votes, vec![0, 0, -1, 0, 1, 1]);

        // the overbought RSI at bar 2 cancels the rising trend
        let generated = signals.generate(&prices).unwrap();
        assert_eq!(generated[1], Signal::Buy);
        assert_eq!(generated[2], Signal::Hold);
    }

    #[test]
    fn flat_prices_hold() {
        let signals = ConsensusSignals::default().generate(&[50.0; 30]).unwrap();
        assert!(signals.iter().all(|s| *s == Signal::Hold));
        assert!(ConsensusSignals::default().generate(&[]).unwrap().is_empty());
    }

    #[test]
    fn reject_invalid_parameters() {
        let signals = ConsensusSignals {
            ema_short: 0,
            ..Default::default()
        };
        assert!(matches!(signals.generate(&[1.0]), Err(Error::Indicator(_))));

        let signals = ConsensusSignals {
            rsi_oversold: 80.0,
            ..Default::default()
        };
        assert!(matches!(signals.generate(&[1.0]), Err(Error::Indicator(_))));
    }

    #[test]
    fn apply_keeps_prices() {
        let bars = (0..20)
            .map(|i| Bar::new(chrono::DateTime::default(), 10.0 + i as f64, Signal::Sell).unwrap())
            .collect::<Vec<_>>();
        let with_signals = ConsensusSignals::default().apply(&bars).unwrap();

        assert_eq!(with_signals.len(), bars.len());
        assert_eq!(with_signals[0].signal(), Signal::Hold);
        assert_eq!(with_signals[5].signal(), Signal::Buy);
        assert!(bars.iter().zip(&with_signals).all(|(a, b)| a.price() == b.price()));
    }
}
