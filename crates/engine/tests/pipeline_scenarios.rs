//! End-to-end scenarios over the pure pipeline cores: plan a signal, turn
//! the plan into a ledger entry, replay the ledger. No database required.

use chrono::{NaiveDate, Utc};
use core_types::{
    PortfolioSnapshot, PriceBar, Signal, SignalAction, SignalStatus, Simulator, StrategyId, Trade,
    TradeSide,
};
use engine::{FailReason, Planned, PlannedFill, SkipReason, plan_signal, replay_ledger};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use sizing::build_sizing_rule;
use std::collections::BTreeMap;
use uuid::Uuid;

const MAX_PRICE_AGE_DAYS: i64 = 3;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn simulator(fee_rate: Decimal, slippage_rate: Decimal) -> Simulator {
    Simulator {
        simulator_id: Uuid::new_v4(),
        name: "scenario".to_string(),
        enabled: true,
        strategy_id: StrategyId::SmaCrossover,
        strategy_params: json!({}),
        sizing: json!({"rule": "fixed_shares", "shares": "10"}),
        starting_cash: dec!(10000),
        cash_balance: dec!(10000),
        fee_rate,
        slippage_rate,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn signal(simulator: &Simulator, action: SignalAction) -> Signal {
    Signal {
        signal_id: Uuid::new_v4(),
        simulator_id: simulator.simulator_id,
        symbol: "AAPL".to_string(),
        action,
        reason: "scenario".to_string(),
        confidence: dec!(0.5),
        strategy_id: simulator.strategy_id,
        ref_price: dec!(100),
        status: SignalStatus::Pending,
        status_reason: None,
        created_at: Utc::now(),
        executed_at: None,
    }
}

fn bar(close: Decimal, day: NaiveDate) -> PriceBar {
    PriceBar {
        bar_id: Uuid::new_v4(),
        symbol: "AAPL".to_string(),
        day,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(1000),
        source: "test".to_string(),
        fetched_at: Utc::now(),
    }
}

fn snapshot(simulator: &Simulator, cash: Decimal) -> PortfolioSnapshot {
    PortfolioSnapshot {
        simulator_id: simulator.simulator_id,
        cash,
        positions: BTreeMap::new(),
        as_of: Utc::now(),
    }
}

fn trade_from_fill(simulator: &Simulator, signal: &Signal, fill: &PlannedFill) -> Trade {
    Trade {
        trade_id: Uuid::new_v4(),
        simulator_id: simulator.simulator_id,
        signal_id: signal.signal_id,
        symbol: signal.symbol.clone(),
        side: fill.side,
        quantity: fill.quantity,
        price: fill.price,
        fee: fill.fee,
        executed_at: Utc::now(),
    }
}

#[test]
fn buy_plan_and_replay_match_the_worked_example() {
    // $10,000 cash, buy 10 shares at $100 with a 1% fee and no slippage.
    let simulator = simulator(dec!(0.01), Decimal::ZERO);
    let signal = signal(&simulator, SignalAction::Buy);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());
    let working = snapshot(&simulator, dec!(10000));

    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();

    let Planned::Execute(Some(fill)) = planned else {
        panic!("expected an executable fill, got {planned:?}");
    };
    assert_eq!(fill.quantity, dec!(10));
    assert_eq!(fill.price, dec!(100));
    assert_eq!(fill.fee, dec!(10));
    assert_eq!(fill.cash_delta, dec!(-1010));

    let trade = trade_from_fill(&simulator, &signal, &fill);
    let state = replay_ledger(simulator.simulator_id, simulator.starting_cash, &[trade]).unwrap();
    assert_eq!(state.cash, dec!(8990));
    assert_eq!(state.positions["AAPL"].quantity, dec!(10));
    assert_eq!(state.positions["AAPL"].avg_cost, dec!(100));
}

#[test]
fn buy_without_enough_cash_is_skipped() {
    let simulator = simulator(dec!(0.01), Decimal::ZERO);
    let signal = signal(&simulator, SignalAction::Buy);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());
    let working = snapshot(&simulator, dec!(500));

    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();
    assert_eq!(planned, Planned::Skip(SkipReason::InsufficientCash));
}

#[test]
fn sell_without_a_position_is_skipped() {
    let simulator = simulator(dec!(0.01), Decimal::ZERO);
    let signal = signal(&simulator, SignalAction::Sell);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());
    let working = snapshot(&simulator, dec!(10000));

    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();
    assert_eq!(planned, Planned::Skip(SkipReason::NoPosition));
}

#[test]
fn hold_executes_with_no_fill() {
    let simulator = simulator(dec!(0.01), Decimal::ZERO);
    let signal = signal(&simulator, SignalAction::Hold);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());
    let working = snapshot(&simulator, dec!(10000));

    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();
    assert_eq!(planned, Planned::Execute(None));
}

#[test]
fn missing_and_stale_prices_fail_the_signal() {
    let simulator = simulator(dec!(0.01), Decimal::ZERO);
    let signal = signal(&simulator, SignalAction::Buy);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let working = snapshot(&simulator, dec!(10000));

    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        None,
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();
    assert_eq!(planned, Planned::Fail(FailReason::NoUsablePrice));

    let stale = bar(dec!(100), today() - chrono::Duration::days(MAX_PRICE_AGE_DAYS + 1));
    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        Some(&stale),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();
    assert_eq!(planned, Planned::Fail(FailReason::NoUsablePrice));
}

#[test]
fn slippage_moves_buys_up_and_sells_down() {
    let mut simulator = simulator(Decimal::ZERO, dec!(0.01));
    simulator.sizing = json!({"rule": "fixed_shares", "shares": "5"});
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());

    let buy = signal(&simulator, SignalAction::Buy);
    let working = snapshot(&simulator, dec!(10000));
    let Planned::Execute(Some(fill)) = plan_signal(
        &buy,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap() else {
        panic!("expected a buy fill");
    };
    assert_eq!(fill.price, dec!(101));

    // Hold the shares, then sell them back.
    let trade = trade_from_fill(&simulator, &buy, &fill);
    let held = replay_ledger(simulator.simulator_id, dec!(10000), &[trade]).unwrap();

    let sell = signal(&simulator, SignalAction::Sell);
    let Planned::Execute(Some(fill)) = plan_signal(
        &sell,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &held,
    )
    .unwrap() else {
        panic!("expected a sell fill");
    };
    assert_eq!(fill.price, dec!(99));
    assert_eq!(fill.cash_delta, dec!(495));
}

#[test]
fn sell_quantity_clamps_to_shares_held() {
    // Sized for 10 shares but only 4 are held.
    let simulator = simulator(Decimal::ZERO, Decimal::ZERO);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());

    let buy_trade = Trade {
        trade_id: Uuid::new_v4(),
        simulator_id: simulator.simulator_id,
        signal_id: Uuid::new_v4(),
        symbol: "AAPL".to_string(),
        side: TradeSide::Buy,
        quantity: dec!(4),
        price: dec!(100),
        fee: Decimal::ZERO,
        executed_at: Utc::now(),
    };
    let held = replay_ledger(simulator.simulator_id, dec!(10000), &[buy_trade]).unwrap();

    let sell = signal(&simulator, SignalAction::Sell);
    let Planned::Execute(Some(fill)) = plan_signal(
        &sell,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &held,
    )
    .unwrap() else {
        panic!("expected a sell fill");
    };
    assert_eq!(fill.quantity, dec!(4));
}

#[test]
fn cash_fraction_of_nothing_fails_as_non_positive() {
    let mut simulator = simulator(Decimal::ZERO, Decimal::ZERO);
    simulator.sizing = json!({"rule": "cash_fraction", "fraction": "0.5"});
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());
    let working = snapshot(&simulator, dec!(0.00001));

    let signal = signal(&simulator, SignalAction::Buy);
    let planned = plan_signal(
        &signal,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap();
    assert_eq!(planned, Planned::Fail(FailReason::NonPositiveQuantity));
}

#[test]
fn second_buy_is_skipped_once_working_cash_runs_out() {
    // Fixed 10 shares at $100: the first buy costs $1,000 and leaves $400,
    // which cannot cover a second identical order.
    let simulator = simulator(Decimal::ZERO, Decimal::ZERO);
    let sizing_rule = build_sizing_rule(&simulator.sizing).unwrap();
    let bar = bar(dec!(100), today());

    let first = signal(&simulator, SignalAction::Buy);
    let working = snapshot(&simulator, dec!(1400));
    let Planned::Execute(Some(fill)) = plan_signal(
        &first,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &working,
    )
    .unwrap() else {
        panic!("expected the first buy to fill");
    };

    let trade = trade_from_fill(&simulator, &first, &fill);
    let after_first = replay_ledger(simulator.simulator_id, dec!(1400), &[trade]).unwrap();
    assert_eq!(after_first.cash, dec!(400));

    let second = signal(&simulator, SignalAction::Buy);
    let planned = plan_signal(
        &second,
        &simulator,
        sizing_rule.as_ref(),
        Some(&bar),
        today(),
        MAX_PRICE_AGE_DAYS,
        &after_first,
    )
    .unwrap();
    assert_eq!(planned, Planned::Skip(SkipReason::InsufficientCash));
}
