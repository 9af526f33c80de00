//! Property tests for the ledger replay fold: determinism, cash
//! conservation, and long-only position invariants over generated ledgers.

use chrono::Utc;
use core_types::{Trade, TradeSide};
use engine::{EngineError, replay_ledger};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

const STARTING_CASH: Decimal = dec!(1000000);

fn make_trade(symbol: &str, side: TradeSide, quantity: Decimal, price: Decimal, fee: Decimal) -> Trade {
    Trade {
        trade_id: Uuid::new_v4(),
        simulator_id: Uuid::nil(),
        signal_id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        side,
        quantity,
        price,
        fee,
        executed_at: Utc::now(),
    }
}

prop_compose! {
    fn arb_trade()(
        symbol in prop::sample::select(vec!["AAA", "BBB", "CCC"]),
        is_buy in any::<bool>(),
        quantity_cents in 1i64..=10_000,
        price_cents in 1i64..=1_000_000,
        fee_cents in 0i64..=5_000,
    ) -> Trade {
        make_trade(
            symbol,
            if is_buy { TradeSide::Buy } else { TradeSide::Sell },
            Decimal::new(quantity_cents, 2),
            Decimal::new(price_cents, 2),
            Decimal::new(fee_cents, 2),
        )
    }
}

proptest! {
    /// Replaying the same ledger twice always produces the same state.
    #[test]
    fn replay_is_deterministic(trades in prop::collection::vec(arb_trade(), 0..40)) {
        let first = replay_ledger(Uuid::nil(), STARTING_CASH, &trades);
        let second = replay_ledger(Uuid::nil(), STARTING_CASH, &trades);

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.cash, b.cash);
                prop_assert_eq!(a.positions, b.positions);
            }
            (Err(EngineError::CorruptLedger { .. }), Err(EngineError::CorruptLedger { .. })) => {}
            (a, b) => prop_assert!(false, "diverging outcomes: {a:?} vs {b:?}"),
        }
    }

    /// When a ledger replays cleanly, every cash movement is accounted for:
    /// final cash equals starting cash minus buy costs plus sell proceeds.
    #[test]
    fn clean_replay_conserves_cash(trades in prop::collection::vec(arb_trade(), 0..40)) {
        if let Ok(state) = replay_ledger(Uuid::nil(), STARTING_CASH, &trades) {
            let mut expected = STARTING_CASH;
            for trade in &trades {
                let gross = (trade.quantity * trade.price).round_dp(4);
                match trade.side {
                    TradeSide::Buy => expected -= gross + trade.fee,
                    TradeSide::Sell => expected += gross - trade.fee,
                }
            }
            prop_assert_eq!(state.cash, expected);

            for holding in state.positions.values() {
                prop_assert!(holding.quantity > Decimal::ZERO);
                prop_assert!(holding.avg_cost >= Decimal::ZERO);
            }
        }
    }

    /// A buys-only ledger always replays, and holds exactly the summed
    /// quantity per symbol.
    #[test]
    fn buys_only_always_replays(trades in prop::collection::vec(arb_trade(), 1..40)) {
        let buys: Vec<Trade> = trades
            .into_iter()
            .map(|mut trade| { trade.side = TradeSide::Buy; trade })
            .collect();

        let state = replay_ledger(Uuid::nil(), STARTING_CASH, &buys).unwrap();

        for symbol in ["AAA", "BBB", "CCC"] {
            let bought: Decimal = buys
                .iter()
                .filter(|t| t.symbol == symbol)
                .map(|t| t.quantity)
                .sum();
            let held = state
                .positions
                .get(symbol)
                .map(|h| h.quantity)
                .unwrap_or(Decimal::ZERO);
            prop_assert_eq!(held, bought);
        }
    }

    /// Liquidating every accumulated share leaves no open positions.
    #[test]
    fn full_liquidation_flattens_the_book(trades in prop::collection::vec(arb_trade(), 1..20)) {
        let buys: Vec<Trade> = trades
            .into_iter()
            .map(|mut trade| { trade.side = TradeSide::Buy; trade })
            .collect();

        let mut ledger = buys.clone();
        for symbol in ["AAA", "BBB", "CCC"] {
            let bought: Decimal = buys
                .iter()
                .filter(|t| t.symbol == symbol)
                .map(|t| t.quantity)
                .sum();
            if bought > Decimal::ZERO {
                ledger.push(make_trade(symbol, TradeSide::Sell, bought, dec!(50), Decimal::ZERO));
            }
        }

        let state = replay_ledger(Uuid::nil(), STARTING_CASH, &ledger).unwrap();
        prop_assert!(state.positions.is_empty());
    }

    /// Selling one share more than was ever bought is always a corrupt
    /// ledger, never a negative position.
    #[test]
    fn oversell_is_always_rejected(trades in prop::collection::vec(arb_trade(), 1..20)) {
        let buys: Vec<Trade> = trades
            .into_iter()
            .map(|mut trade| { trade.side = TradeSide::Buy; trade })
            .collect();

        let bought: Decimal = buys
            .iter()
            .filter(|t| t.symbol == "AAA")
            .map(|t| t.quantity)
            .sum();

        let mut ledger = buys;
        ledger.push(make_trade("AAA", TradeSide::Sell, bought + dec!(1), dec!(50), Decimal::ZERO));

        let err = replay_ledger(Uuid::nil(), STARTING_CASH, &ledger).unwrap_err();
        prop_assert!(matches!(err, EngineError::CorruptLedger { .. }), "expected CorruptLedger, got {err:?}");
    }
}
