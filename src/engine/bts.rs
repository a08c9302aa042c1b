use std::sync::Arc;

use chrono::DateTime;
use proptest::prelude::*;

use crate::engine::*;

fn get_data(rows: &[(f64, i64)]) -> Arc<[Bar]> {
    rows.iter()
        .enumerate()
        .map(|(i, &(price, signal))| {
            let timestamp = DateTime::from_timestamp_secs(1515151515 + 3600 * i as i64).unwrap();
            Bar::try_from((timestamp, price, signal)).unwrap()
        })
        .collect()
}

fn no_fees() -> BacktestConfig {
    BacktestConfig {
        fees: FeeModel::new(0.0, 0.0).unwrap(),
        ..Default::default()
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
}

#[test]
fn scenario_single_bar_round_trip() {
    let data = get_data(&[(100.0, 1)]);
    let mut bt = Backtest::new(data, BacktestConfig::default()).unwrap();
    let report = bt.run().unwrap();

    // 1_000_000 - 100 × 1.00125 + 100 × 0.99875
    assert_close(report.final_cash(), 999_999.75);
    assert_eq!(report.equity(), &[report.final_cash()]);
    assert_eq!(report.realized_pnl(), Some(&[0.0][..]));

    let trades = report.trades().collect::<Vec<_>>();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit, ExitReason::Liquidation);
    assert_close(trades[0].pnl, -0.25);
}

#[test]
fn scenario_open_long_position_and_take_profit() {
    let data = get_data(&[(100.0, 1), (104.0, 0)]);
    let mut bt = Backtest::new(data, BacktestConfig::default()).unwrap();
    let report = bt.run().unwrap();

    let equity = report.equity();
    assert_close(equity[0], 999_899.875 + 100.0);
    assert_close(equity[1], 1_000_003.745);
    assert_close(report.final_cash(), 1_000_003.745);

    let pnl = report.realized_pnl().unwrap();
    assert_eq!(pnl[0], 0.0);
    assert_close(pnl[1], 4.0 - 0.125 - 0.13);

    let trade = report.trades().next().unwrap();
    assert_eq!(trade.exit, ExitReason::TakeProfit);
    assert_eq!((trade.opened_at, trade.closed_at), (0, 1));
}

#[test]
fn scenario_open_short_position_and_stop_loss() {
    let data = get_data(&[(100.0, -1), (102.0, 0)]);
    let mut bt = Backtest::new(data, BacktestConfig::default()).unwrap();
    let report = bt.run().unwrap();

    // entry 100 × 1.00375, exit (-2) × 0.99625 + 100
    assert_close(report.final_cash(), 1_000_000.0 - 100.375 + 98.0075);
    assert_close(report.realized_pnl().unwrap()[1], -2.0 - 0.375 - 0.3825);
    assert_eq!(report.trades().next().unwrap().exit, ExitReason::StopLoss);
}

#[test]
fn scenario_open_short_position_and_take_profit() {
    let data = get_data(&[(100.0, -1), (97.0, 0), (95.0, 0)]);
    let mut bt = Backtest::new(data, no_fees()).unwrap();
    let report = bt.run().unwrap();

    // the short is worth its notional plus its gain, before and after the close
    assert_eq!(report.equity(), &[1_000_000.0, 1_000_003.0, 1_000_005.0]);
    assert_eq!(report.realized_pnl().unwrap(), &[0.0, 0.0, 5.0]);
    assert_eq!(report.trades().next().unwrap().exit, ExitReason::TakeProfit);
}

#[test]
fn scenario_opposite_signal_ignored() {
    let data = get_data(&[(100.0, 1), (101.0, -1)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();

    bt.step(0, &data[0]).unwrap();
    bt.step(1, &data[1]).unwrap();
    assert_eq!(bt.book().longs().count(), 1);
    assert!(bt.book().is_direction_empty(PositionSide::Short));

    let report = bt.run().unwrap();
    let trades = report.trades().collect::<Vec<_>>();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].side, PositionSide::Long);
}

#[test]
fn scenario_exit_then_entry_on_same_bar() {
    // the short stops out at 102, then the buy signal opens a long
    let data = get_data(&[(100.0, -1), (102.0, 1)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();

    bt.step(0, &data[0]).unwrap();
    bt.step(1, &data[1]).unwrap();
    assert!(bt.book().is_direction_empty(PositionSide::Short));
    assert_eq!(bt.book().longs().next().unwrap().entry_price(), 102.0);
}

#[test]
fn scenario_cash_conservation_at_open() {
    let data = get_data(&[(250.0, 1)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();

    bt.step(0, &data[0]).unwrap();
    assert_eq!(bt.cash(), 1_000_000.0 - 250.0 * (1.0 + 0.00125));
    assert_eq!(bt.equity(), &[bt.cash() + 250.0]);
}

#[test]
fn scenario_cash_conservation_at_short_open() {
    let data = get_data(&[(100.0, -1)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();
    let rate = FeeModel::default().rate(PositionSide::Short);

    bt.step(0, &data[0]).unwrap();
    assert_eq!(rate, 0.00125 + 0.0025);
    assert_eq!(bt.cash(), 1_000_000.0 - 100.0 * (1.0 + rate));
    // a fresh short is valued at its entry notional
    assert_eq!(bt.equity(), &[bt.cash() + 100.0]);
}

#[test]
fn scenario_equity_continuity_at_long_close() {
    let data = get_data(&[(100.0, 1), (104.0, 0)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();
    bt.step(0, &data[0]).unwrap();

    let before = bt.mark_to_market(104.0);
    bt.close_positions(PositionSide::Long, 1, 104.0).unwrap();
    let after = bt.mark_to_market(104.0);

    assert!(bt.book().is_empty());
    assert_close(before - after, 104.0 * 0.00125);
}

#[test]
fn scenario_equity_continuity_at_short_close() {
    let data = get_data(&[(100.0, -1), (95.0, 0)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();
    bt.step(0, &data[0]).unwrap();

    let before = bt.mark_to_market(95.0);
    bt.close_positions(PositionSide::Short, 1, 95.0).unwrap();
    let after = bt.mark_to_market(95.0);

    assert!(bt.book().is_empty());
    assert_close(before, 1_000_000.0 - 100.0 * 1.00375 + 105.0);
    // only the fee on the gross gain leaves the portfolio
    assert_close(before - after, 5.0 * 0.00375);
}

#[test]
fn scenario_terminal_liquidation() {
    let data = get_data(&[(100.0, 1), (101.0, 1), (102.0, 0)]);
    let mut bt = Backtest::new(data, BacktestConfig::default()).unwrap();
    let report = bt.run().unwrap();

    assert!(bt.book().is_empty());
    assert_eq!(report.equity().last().copied(), Some(report.final_cash()));
    assert_eq!(report.realized_pnl().unwrap(), &[0.0, 0.0, 0.0]);

    let trades = report.trades().collect::<Vec<_>>();
    assert_eq!(trades.len(), 2);
    assert!(trades.iter().all(|t| t.exit == ExitReason::Liquidation && t.closed_at == 2));

    let cost = 100.0 * 1.00125 + 101.0 * 1.00125;
    assert_close(report.final_cash(), 1_000_000.0 - cost + 102.0 * 2.0 * 0.99875);
}

#[test]
fn scenario_run_is_idempotent() {
    let data = get_data(&[(100.0, 1), (99.0, -1), (97.0, 0), (98.0, -1), (103.0, 1), (99.0, 0)]);
    let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();

    let first = bt.run().unwrap();
    let second = bt.run().unwrap();
    let other = run_backtest(data, BacktestConfig::default()).unwrap();

    assert_eq!(first.equity(), second.equity());
    assert_eq!(first.realized_pnl(), second.realized_pnl());
    assert_eq!(first.trades().collect::<Vec<_>>(), second.trades().collect::<Vec<_>>());
    assert_eq!(first.final_cash(), other.final_cash());
}

#[test]
fn scenario_risk_proportional_sizing() {
    let data = get_data(&[(100.0, 1)]);

    // 1_000 × 0.0001 / 100 rounds up to one share
    let config = BacktestConfig {
        initial_cash: 1_000.0,
        sizing: SizingPolicy::RiskProportional(0.0001),
        ..Default::default()
    };
    let report = run_backtest(data.clone(), config).unwrap();
    assert_eq!(report.trades().next().unwrap().quantity, 1.0);

    let config = BacktestConfig {
        sizing: SizingPolicy::RiskProportional(0.5),
        ..Default::default()
    };
    let report = run_backtest(data, config).unwrap();
    assert_eq!(report.trades().next().unwrap().quantity, 5_000.0);
}

#[test]
fn scenario_insufficient_cash() {
    let data = get_data(&[(100.0, 1), (100.0, 1)]);

    let config = BacktestConfig {
        initial_cash: 100.0,
        ..Default::default()
    };
    let report = run_backtest(data.clone(), config).unwrap();
    assert_eq!(report.equity(), &[100.0, 100.0]);
    assert_eq!(report.trades().count(), 0);

    // a cost equal to the cash is refused too
    let config = BacktestConfig {
        initial_cash: 100.0,
        ..no_fees()
    };
    let report = run_backtest(data, config).unwrap();
    assert_eq!(report.trades().count(), 0);
    assert_eq!(report.final_cash(), 100.0);
}

#[test]
fn scenario_untracked_realized_pnl() {
    let data = get_data(&[(100.0, 1), (104.0, 0)]);
    let config = BacktestConfig {
        track_realized_pnl: false,
        ..Default::default()
    };
    let report = run_backtest(data, config).unwrap();
    assert!(report.realized_pnl().is_none());
    assert_eq!(report.equity().len(), 2);
    assert!(report.rows().all(|row| row.realized_pnl.is_none()));
}

#[test]
fn scenario_empty_data() {
    let mut bt = Backtest::new(Arc::from_iter(Vec::<Bar>::new()), BacktestConfig::default()).unwrap();
    let report = bt.run().unwrap();
    assert!(report.equity().is_empty());
    assert_eq!(report.realized_pnl(), Some(&[][..]));
    assert_eq!(report.final_cash(), 1_000_000.0);
}

#[test]
fn scenario_rows_are_aligned() {
    let data = get_data(&[(100.0, 1), (104.0, 0), (103.0, -1)]);
    let report = run_backtest(data.clone(), BacktestConfig::default()).unwrap();

    let rows = report.rows().collect::<Vec<_>>();
    assert_eq!(rows.len(), 3);
    for (row, bar) in rows.iter().zip(data.iter()) {
        assert_eq!(row.bar, bar);
    }
    assert_eq!(rows[2].equity, report.final_cash());
}

fn price_path() -> impl Strategy<Value = Vec<(f64, i64)>> {
    prop::collection::vec((-0.05f64..0.05, -1i64..=1), 1..80).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|(change, signal)| {
                price *= 1.0 + change;
                (price, signal)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn never_long_and_short_at_once(rows in price_path()) {
        let data = get_data(&rows);
        let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();
        for (index, bar) in data.iter().enumerate() {
            bt.step(index, bar).unwrap();
            prop_assert!(
                bt.book().is_direction_empty(PositionSide::Long)
                    || bt.book().is_direction_empty(PositionSide::Short)
            );
        }
    }

    #[test]
    fn equity_equals_cash_when_flat(rows in price_path()) {
        let data = get_data(&rows);
        let mut bt = Backtest::new(data.clone(), BacktestConfig::default()).unwrap();
        for (index, bar) in data.iter().enumerate() {
            bt.step(index, bar).unwrap();
            if bt.book().is_empty() {
                prop_assert_eq!(bt.equity().last().copied(), Some(bt.cash()));
            }
        }
    }

    #[test]
    fn outputs_align_and_end_in_cash(rows in price_path(), risk in 0.01f64..0.5, track in any::<bool>()) {
        let data = get_data(&rows);
        let config = BacktestConfig {
            sizing: SizingPolicy::RiskProportional(risk),
            track_realized_pnl: track,
            ..Default::default()
        };
        let mut bt = Backtest::new(data.clone(), config).unwrap();
        let report = bt.run().unwrap();

        prop_assert_eq!(report.equity().len(), data.len());
        prop_assert_eq!(report.realized_pnl().map(<[f64]>::len), track.then_some(data.len()));
        prop_assert_eq!(report.equity().last().copied(), Some(report.final_cash()));
        prop_assert!(bt.book().is_empty());

        let again = bt.run().unwrap();
        prop_assert_eq!(again.equity(), report.equity());
        prop_assert_eq!(again.final_cash(), report.final_cash());
    }

    #[test]
    fn equity_moves_by_fee_drag_at_close(rows in price_path(), risk in 0.01f64..0.3) {
        let data = get_data(&rows);
        let config = BacktestConfig {
            sizing: SizingPolicy::RiskProportional(risk),
            ..Default::default()
        };
        let fees = config.fees;
        let mut bt = Backtest::new(data.clone(), config).unwrap();

        for (index, bar) in data.iter().enumerate() {
            let price = bar.price();
            for side in [PositionSide::Long, PositionSide::Short] {
                let drag = bt
                    .book()
                    .scan_closable(side, price)
                    .iter()
                    .map(|(position, _)| match side {
                        PositionSide::Long => price * position.quantity() * fees.rate(side),
                        PositionSide::Short => position.gross_pnl(price) * fees.rate(side),
                    })
                    .sum::<f64>();

                let before = bt.mark_to_market(price);
                bt.close_positions(side, index, price).unwrap();
                let after = bt.mark_to_market(price);
                prop_assert!((before - after - drag).abs() < 1e-6, "{before} - {after} != {drag}");
            }
            bt.step(index, bar).unwrap();
        }
    }
}
