//! # Consensus strategy on a random walk
//!
//! Generates RSI/EMA/MACD two-of-three signals over a seeded random walk, backtests them with
//! risk-proportional sizing and compares the result with buy-and-hold.

use sbt::prelude::*;

fn main() -> Result<()> {
    let walk = RandomWalk {
        len: 3_000,
        seed: 42,
        volatility: 0.015,
        ..Default::default()
    };
    let bars = ConsensusSignals::default().apply(&walk.load()?)?;

    let config = BacktestConfig {
        sizing: SizingPolicy::RiskProportional(0.02),
        ..Default::default()
    };
    let mut bt = Backtest::new(bars.into(), config)?;
    let report = bt.run()?;

    println!("{}", Metrics::from(&report));

    let first_price = bt.bars().next().map(Bar::price).unwrap_or(f64::NAN);
    let last_price = bt.bars().last().map(Bar::price).unwrap_or(f64::NAN);
    let buy_and_hold_perf = first_price.change(last_price) * 100.0;
    println!("trades {}", report.trades().count());
    println!("buy and hold {buy_and_hold_perf:.2}%");

    #[cfg(feature = "draws")]
    Draw::with_report(&report)
        .with_options(
            DrawOptions::default()
                .title("Consensus vs Buy & Hold")
                .draw_output(DrawOutput::Svg("consensus.svg".into())),
        )
        .plot()?;

    Ok(())
}
