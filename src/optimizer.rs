//! Strategy parameter optimization.
//!
//! This module provides tools to optimize backtest parameters by testing different combinations.
//! The `Optimizer` struct runs one backtest per combination in parallel, while the
//! `ParameterCombination` trait defines how to generate parameter sets.

use std::marker::PhantomData;
use std::sync::Arc;

use log::info;
use rayon::prelude::*;

use crate::engine::{Backtest, BacktestConfig, BacktestReport, Bar, run_backtest};
use crate::errors::Result;

/// Trait defining how to generate parameter combinations for optimization.
///
/// Implement this trait for your parameter types to define how combinations should be generated.
/// The associated type `Output` represents a single parameter combination (e.g., a tuple of values).
pub trait ParameterCombination: Sync {
    /// Type representing a single parameter combination (e.g., `(f64, f64)`).
    type Output: Clone + Send + Sync;

    /// Generates all possible parameter combinations to test.
    ///
    /// # Returns
    /// A vector containing all parameter combinations.
    fn generate() -> Vec<Self::Output>;
}

/// Optimizer for testing backtest parameters.
///
/// Every combination is turned into a `(bars, config)` pair by a combinator, simulated, and
/// scored by an objective over the finished report.
pub struct Optimizer<PC: ParameterCombination> {
    data: Arc<[Bar]>,
    config: BacktestConfig,
    _marker: PhantomData<PC>,
}

impl<PC: ParameterCombination> From<&Backtest> for Optimizer<PC> {
    fn from(value: &Backtest) -> Self {
        Self::new(value.data(), *value.config())
    }
}

impl<PC: ParameterCombination> Optimizer<PC> {
    /// Creates a new `Optimizer` with the given data and base configuration.
    ///
    /// # Arguments
    /// * `data` - Bars shared by every run.
    /// * `config` - Base configuration handed to the combinator.
    pub fn new(data: Arc<[Bar]>, config: BacktestConfig) -> Self {
        Self {
            data,
            config,
            _marker: PhantomData,
        }
    }

    /// Runs and scores every parameter combination.
    ///
    /// # Arguments
    /// * `combinator` - Builds the bars and configuration of one run from the base data, the base
    ///   configuration and a combination (e.g. regenerates signals, changes the stop-loss).
    /// * `objective` - Scores a finished run; higher is better.
    ///
    /// # Returns
    /// Each parameter combination with its score, in generation order.
    ///
    /// # Errors
    /// Returns the first combinator or backtest error.
    pub fn with<C, O>(&self, combinator: C, objective: O) -> Result<Vec<(PC::Output, f64)>>
    where
        C: Fn(&Arc<[Bar]>, &BacktestConfig, &PC::Output) -> Result<(Arc<[Bar]>, BacktestConfig)> + Sync,
        O: Fn(&BacktestReport) -> f64 + Sync,
    {
        let num_cpus = num_cpus::get();
        let combinations = PC::generate();
        let chunk_size = combinations.len().div_ceil(num_cpus).max(1);
        info!(
            "Optimizing {} combinations over {} bars on {num_cpus} threads",
            combinations.len(),
            self.data.len()
        );

        let results = combinations
            .par_chunks(chunk_size)
            .map::<_, Result<_>>(|par_combinations| {
                let mut local_results = Vec::with_capacity(par_combinations.len());
                for param_set in par_combinations {
                    let (data, config) = combinator(&self.data, &self.config, param_set)?;
                    let report = run_backtest(data, config)?;
                    local_results.push((param_set.clone(), objective(&report)));
                }
                Ok(local_results)
            })
            .collect::<Result<Vec<_>>>()
            .map(|chunks| chunks.into_iter().flatten().collect::<Vec<_>>())?;

        if let Some((_, score)) = best(&results) {
            info!("Best score: {score:.6}");
        }
        Ok(results)
    }
}

/// Returns the combination with the highest finite score.
pub fn best<T>(results: &[(T, f64)]) -> Option<&(T, f64)> {
    results
        .iter()
        .filter(|(_, score)| score.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
struct StopTake;

#[cfg(test)]
impl ParameterCombination for StopTake {
    type Output = (f64, f64);

    fn generate() -> Vec<Self::Output> {
        let stops = [0.01, 0.02, 0.05];
        let takes = [0.02, 0.04, 0.08, 0.16];
        stops
            .iter()
            .flat_map(|&sl| takes.iter().map(move |&tp| (sl, tp)))
            .collect()
    }
}

#[cfg(test)]
fn get_data() -> Arc<[Bar]> {
    use crate::data::{DataSource, RandomWalk};
    use crate::engine::Signal;

    let walk = RandomWalk {
        len: 300,
        seed: 3,
        ..Default::default()
    };
    let signals = [Signal::Buy, Signal::Hold, Signal::Hold, Signal::Sell, Signal::Hold];
    walk.load()
        .unwrap()
        .into_iter()
        .enumerate()
        .map(|(i, bar)| bar.with_signal(signals[i % signals.len()]))
        .collect()
}

#[cfg(test)]
#[test]
fn optimizer_stop_and_take() {
    let data = get_data();
    let opt = Optimizer::<StopTake>::new(data.clone(), BacktestConfig::default());

    let result = opt
        .with(
            |data, config, &(stop_loss_pct, take_profit_pct)| {
                let config = BacktestConfig {
                    stop_loss_pct,
                    take_profit_pct,
                    ..*config
                };
                Ok((Arc::clone(data), config))
            },
            BacktestReport::final_cash,
        )
        .unwrap();

    assert_eq!(result.len(), 12);
    assert_eq!(result[0].0, (0.01, 0.02));

    // scores match a direct run
    let (params, score) = best(&result).unwrap();
    let config = BacktestConfig {
        stop_loss_pct: params.0,
        take_profit_pct: params.1,
        ..Default::default()
    };
    assert_eq!(run_backtest(data, config).unwrap().final_cash(), *score);
}

#[cfg(test)]
#[test]
fn optimizer_propagates_errors() {
    let opt = Optimizer::<StopTake>::new(get_data(), BacktestConfig::default());
    let result = opt.with(
        |data, config, &(stop_loss_pct, _)| {
            let config = BacktestConfig {
                stop_loss_pct: -stop_loss_pct,
                ..*config
            };
            Ok((Arc::clone(data), config))
        },
        BacktestReport::final_cash,
    );
    assert!(result.is_err());
}

#[cfg(test)]
#[test]
fn best_skips_undefined_scores() {
    let results = vec![("a", 1.0), ("b", f64::NAN), ("c", 3.0), ("d", f64::INFINITY)];
    assert_eq!(best(&results), Some(&("c", 3.0)));
    assert_eq!(best::<&str>(&[]), None);
}

#[cfg(all(test, feature = "signals", feature = "metrics"))]
#[test]
fn optimizer_with_consensus_signals() {
    use crate::signals::ConsensusSignals;

    struct Periods;

    impl ParameterCombination for Periods {
        type Output = (usize, usize);

        fn generate() -> Vec<Self::Output> {
            (5..=8).flat_map(|short| (20..=22).map(move |long| (short, long))).collect()
        }
    }

    let opt = Optimizer::<Periods>::new(get_data(), BacktestConfig::default());
    let result = opt
        .with(
            |data, config, &(ema_short, ema_long)| {
                let signals = ConsensusSignals {
                    ema_short,
                    ema_long,
                    ..Default::default()
                };
                Ok((Arc::from(signals.apply(data)?), *config))
            },
            |report| crate::metrics::Metrics::from(report).total_return(),
        )
        .unwrap();

    assert_eq!(result.len(), 12);
}
