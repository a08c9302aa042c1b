//! # Stop-loss / take-profit sweep
//!
//! Runs every stop-loss and take-profit pair of a small grid in parallel over the same bars and
//! prints the five best pairs by Calmar ratio.

use std::sync::Arc;

use sbt::prelude::*;

struct StopTake;

impl ParameterCombination for StopTake {
    type Output = (f64, f64);

    fn generate() -> Vec<Self::Output> {
        let stops = (1..=10).map(|i| i as f64 / 100.0).collect::<Vec<_>>();
        let takes = (1..=10).map(|i| i as f64 / 50.0).collect::<Vec<_>>();
        stops
            .iter()
            .flat_map(|&sl| takes.iter().map(move |&tp| (sl, tp)))
            .collect()
    }
}

fn main() -> Result<()> {
    // a buy every 24 bars, a sell 12 bars later
    let bars = RandomWalk {
        len: 5_000,
        seed: 7,
        ..Default::default()
    }
    .load()?
    .into_iter()
    .enumerate()
    .map(|(i, bar)| match i % 24 {
        0 => bar.with_signal(Signal::Buy),
        12 => bar.with_signal(Signal::Sell),
        _ => bar,
    })
    .collect::<Arc<[Bar]>>();

    let optimizer = Optimizer::<StopTake>::new(bars, BacktestConfig::default());
    let mut results = optimizer.with(
        |data, config, &(stop_loss_pct, take_profit_pct)| {
            let config = BacktestConfig {
                stop_loss_pct,
                take_profit_pct,
                ..*config
            };
            Ok((Arc::clone(data), config))
        },
        |report| Metrics::from(report).calmar_ratio(),
    )?;

    results.retain(|(_, calmar)| calmar.is_finite());
    results.sort_by(|a, b| b.1.total_cmp(&a.1));
    for ((stop_loss, take_profit), calmar) in results.iter().take(5) {
        println!("stop loss {stop_loss:.2}, take profit {take_profit:.2}: calmar {calmar:.4}");
    }

    Ok(())
}
