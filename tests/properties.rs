//! Property tests over the public engine API.
//!
//! 1. Replays: the same bars and configuration always give the same report.
//! 2. Alignment: one equity entry per bar, the last one equal to the final cash.
//! 3. Accounting: without fees the final cash is the initial cash plus every trade's P&L.
//! 4. Exposure: a trade never overlaps a trade of the opposite side.

use std::sync::Arc;

use chrono::{DateTime, Duration};
use proptest::prelude::*;
use sbt::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_bars() -> impl Strategy<Value = Arc<[Bar]>> {
    prop::collection::vec((-0.04..0.04_f64, -1..=1_i64), 1..120).prop_map(|steps| {
        let start = DateTime::default();
        let mut price = 50.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (change, signal))| {
                price *= 1.0 + change;
                Bar::try_from((start + Duration::minutes(i as i64), price, signal)).unwrap()
            })
            .collect()
    })
}

fn arb_sizing() -> impl Strategy<Value = SizingPolicy> {
    prop_oneof![
        (1.0..500.0_f64).prop_map(SizingPolicy::Fixed),
        (0.001..0.9_f64).prop_map(SizingPolicy::RiskProportional),
    ]
}

fn arb_config() -> impl Strategy<Value = BacktestConfig> {
    (arb_sizing(), 0.005..0.2_f64, 0.005..0.3_f64, any::<bool>()).prop_map(
        |(sizing, stop_loss_pct, take_profit_pct, track_realized_pnl)| BacktestConfig {
            sizing,
            stop_loss_pct,
            take_profit_pct,
            track_realized_pnl,
            ..Default::default()
        },
    )
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn replays_are_identical(bars in arb_bars(), config in arb_config()) {
        let first = run_backtest(bars.clone(), config).unwrap();
        let second = run_backtest(bars.clone(), config).unwrap();
        prop_assert_eq!(first.equity(), second.equity());
        prop_assert_eq!(first.realized_pnl(), second.realized_pnl());
        prop_assert_eq!(first.final_cash(), second.final_cash());

        let mut backtest = Backtest::new(bars, config).unwrap();
        let third = backtest.run().unwrap();
        let fourth = backtest.run().unwrap();
        prop_assert_eq!(third.equity(), first.equity());
        prop_assert_eq!(fourth.trades().count(), first.trades().count());
    }

    #[test]
    fn outputs_are_bar_aligned(bars in arb_bars(), config in arb_config()) {
        let report = run_backtest(bars.clone(), config).unwrap();

        prop_assert_eq!(report.rows().count(), bars.len());
        prop_assert_eq!(report.equity().last().copied(), Some(report.final_cash()));
        match report.realized_pnl() {
            Some(pnl) => {
                prop_assert!(config.track_realized_pnl);
                prop_assert_eq!(pnl.len(), bars.len());
            }
            None => prop_assert!(!config.track_realized_pnl),
        }
    }

    #[test]
    fn fee_free_cash_matches_trades(bars in arb_bars(), config in arb_config()) {
        let config = BacktestConfig {
            fees: FeeModel::new(0.0, 0.0).unwrap(),
            ..config
        };
        let report = run_backtest(bars, config).unwrap();

        let pnl = report.trades().map(|t| t.pnl).sum::<f64>();
        let expected = report.initial_cash() + pnl;
        prop_assert!(
            (report.final_cash() - expected).abs() <= 1e-6 * expected.abs().max(1.0),
            "{} != {}", report.final_cash(), expected
        );
    }

    #[test]
    fn sides_never_overlap(bars in arb_bars(), config in arb_config()) {
        let report = run_backtest(bars, config).unwrap();
        let trades = report.trades().collect::<Vec<_>>();

        for long in trades.iter().filter(|t| t.side == PositionSide::Long) {
            for short in trades.iter().filter(|t| t.side == PositionSide::Short) {
                // a position closed on a bar frees that bar for the other side
                let disjoint = long.closed_at <= short.opened_at || short.closed_at <= long.opened_at;
                prop_assert!(disjoint, "{long:?} overlaps {short:?}");
            }
        }
    }
}
