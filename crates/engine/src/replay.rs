use crate::error::EngineError;
use chrono::Utc;
use core_types::{Holding, PortfolioSnapshot, Trade, TradeSide};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Replays a simulator's full trade ledger from its starting cash.
///
/// The fold is pure and deterministic. Trades must arrive in
/// (executed_at, trade_id) order, which is the order the repository returns
/// them in; replaying the same ledger twice always produces the same state.
pub fn replay_ledger(
    simulator_id: Uuid,
    starting_cash: Decimal,
    trades: &[Trade],
) -> Result<PortfolioSnapshot, EngineError> {
    let mut cash = starting_cash;
    let mut positions: BTreeMap<String, Holding> = BTreeMap::new();

    for trade in trades {
        apply_trade(simulator_id, &mut cash, &mut positions, trade)?;
    }

    Ok(PortfolioSnapshot {
        simulator_id,
        cash,
        positions,
        as_of: Utc::now(),
    })
}

/// Applies one trade to a cash balance and position map.
///
/// Buys debit `quantity * price + fee` and fold the fill into the position's
/// volume-weighted average cost; fees never enter the basis. Sells credit
/// `quantity * price - fee` and leave the basis untouched. A sell that
/// exceeds the held quantity means the ledger is corrupt, and the caller's
/// replay must abort rather than invent shares.
pub(crate) fn apply_trade(
    simulator_id: Uuid,
    cash: &mut Decimal,
    positions: &mut BTreeMap<String, Holding>,
    trade: &Trade,
) -> Result<(), EngineError> {
    if trade.quantity <= Decimal::ZERO {
        return Err(EngineError::CorruptLedger {
            simulator_id,
            detail: format!("non-positive quantity on trade {}", trade.trade_id),
        });
    }

    let gross = (trade.quantity * trade.price).round_dp(4);

    match trade.side {
        TradeSide::Buy => {
            *cash -= gross + trade.fee;
            let holding = positions.entry(trade.symbol.clone()).or_insert(Holding {
                quantity: Decimal::ZERO,
                avg_cost: Decimal::ZERO,
            });
            let total_quantity = holding.quantity + trade.quantity;
            holding.avg_cost =
                ((holding.avg_cost * holding.quantity + gross) / total_quantity).round_dp(4);
            holding.quantity = total_quantity;
        }
        TradeSide::Sell => {
            let holding =
                positions
                    .get_mut(&trade.symbol)
                    .ok_or_else(|| EngineError::CorruptLedger {
                        simulator_id,
                        detail: format!(
                            "sell of {} {} with no open position (trade {})",
                            trade.quantity, trade.symbol, trade.trade_id
                        ),
                    })?;
            if trade.quantity > holding.quantity {
                return Err(EngineError::CorruptLedger {
                    simulator_id,
                    detail: format!(
                        "sell of {} {} exceeds held {} (trade {})",
                        trade.quantity, trade.symbol, holding.quantity, trade.trade_id
                    ),
                });
            }
            *cash += gross - trade.fee;
            holding.quantity -= trade.quantity;
            if holding.quantity.is_zero() {
                positions.remove(&trade.symbol);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(symbol: &str, side: TradeSide, quantity: Decimal, price: Decimal, fee: Decimal) -> Trade {
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

    #[test]
    fn buy_debits_cash_and_sets_basis_without_fee() {
        // $10,000, buy 10 @ $100 with a 1% fee: $8,990 cash, basis $100.
        let trades = vec![trade("AAPL", TradeSide::Buy, dec!(10), dec!(100), dec!(10))];
        let state = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap();

        assert_eq!(state.cash, dec!(8990));
        let holding = &state.positions["AAPL"];
        assert_eq!(holding.quantity, dec!(10));
        assert_eq!(holding.avg_cost, dec!(100));
    }

    #[test]
    fn repeated_buys_blend_the_basis() {
        let trades = vec![
            trade("AAPL", TradeSide::Buy, dec!(10), dec!(100), Decimal::ZERO),
            trade("AAPL", TradeSide::Buy, dec!(10), dec!(200), Decimal::ZERO),
        ];
        let state = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap();

        let holding = &state.positions["AAPL"];
        assert_eq!(holding.quantity, dec!(20));
        assert_eq!(holding.avg_cost, dec!(150));
        assert_eq!(state.cash, dec!(7000));
    }

    #[test]
    fn sell_credits_cash_and_keeps_basis() {
        let trades = vec![
            trade("AAPL", TradeSide::Buy, dec!(10), dec!(100), Decimal::ZERO),
            trade("AAPL", TradeSide::Sell, dec!(4), dec!(110), dec!(1)),
        ];
        let state = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap();

        assert_eq!(state.cash, dec!(10000) - dec!(1000) + dec!(440) - dec!(1));
        let holding = &state.positions["AAPL"];
        assert_eq!(holding.quantity, dec!(6));
        assert_eq!(holding.avg_cost, dec!(100));
    }

    #[test]
    fn position_is_removed_at_zero_shares() {
        let trades = vec![
            trade("AAPL", TradeSide::Buy, dec!(10), dec!(100), Decimal::ZERO),
            trade("AAPL", TradeSide::Sell, dec!(10), dec!(90), Decimal::ZERO),
        ];
        let state = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap();

        assert!(state.positions.is_empty());
        assert_eq!(state.cash, dec!(9900));
    }

    #[test]
    fn oversell_is_a_corrupt_ledger() {
        let trades = vec![
            trade("AAPL", TradeSide::Buy, dec!(5), dec!(100), Decimal::ZERO),
            trade("AAPL", TradeSide::Sell, dec!(6), dec!(100), Decimal::ZERO),
        ];
        let err = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap_err();
        assert!(matches!(err, EngineError::CorruptLedger { .. }));
    }

    #[test]
    fn sell_with_no_position_is_a_corrupt_ledger() {
        let trades = vec![trade("AAPL", TradeSide::Sell, dec!(1), dec!(100), Decimal::ZERO)];
        let err = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap_err();
        assert!(matches!(err, EngineError::CorruptLedger { .. }));
    }

    #[test]
    fn non_positive_quantity_is_a_corrupt_ledger() {
        let trades = vec![trade("AAPL", TradeSide::Buy, Decimal::ZERO, dec!(100), Decimal::ZERO)];
        let err = replay_ledger(Uuid::nil(), dec!(10000), &trades).unwrap_err();
        assert!(matches!(err, EngineError::CorruptLedger { .. }));
    }

    #[test]
    fn fractional_quantities_settle_exactly() {
        let trades = vec![trade("AAPL", TradeSide::Buy, dec!(2.5), dec!(41.1234), dec!(0.1028))];
        let state = replay_ledger(Uuid::nil(), dec!(1000), &trades).unwrap();

        // gross = 2.5 * 41.1234 = 102.8085
        assert_eq!(state.cash, dec!(1000) - dec!(102.8085) - dec!(0.1028));
        assert_eq!(state.positions["AAPL"].avg_cost, dec!(41.1234));
    }
}
