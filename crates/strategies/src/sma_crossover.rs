use configuration::SmaCrossoverParams;
use core_types::{Decision, PortfolioSnapshot, PriceBar, SignalAction};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use ta::Next;
use ta::indicators::SimpleMovingAverage as Sma;

use crate::Strategy;
use crate::error::StrategyError;

/// The simple moving average crossover strategy.
///
/// Buys when the short SMA crosses above the long SMA, sells the position on
/// the cross back down, and otherwise records an explicit hold. A bearish
/// cross with nothing to sell is a hold too, with its own reason, so the
/// signal trail explains why no trade happened.
pub struct SmaCrossover {
    params: SmaCrossoverParams,
}

impl SmaCrossover {
    /// Creates a new `SmaCrossover` with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(params: SmaCrossoverParams) -> Result<Self, StrategyError> {
        if params.short_window == 0 {
            return Err(StrategyError::InvalidParameters(
                "short_window must be positive".to_string(),
            ));
        }
        if params.short_window >= params.long_window {
            return Err(StrategyError::InvalidParameters(
                "short_window must be smaller than long_window".to_string(),
            ));
        }
        Ok(Self { params })
    }

    /// Bars required before a crossover can even be detected: a full long
    /// window ending at the previous bar, plus the evaluation bar itself.
    fn min_bars(&self) -> usize {
        self.params.long_window + 1
    }
}

impl Strategy for SmaCrossover {
    fn decide(
        &self,
        bars: &[PriceBar],
        snapshot: &PortfolioSnapshot,
        symbol: &str,
    ) -> Result<Option<Decision>, StrategyError> {
        if bars.len() < self.min_bars() {
            tracing::debug!(
                "SmaCrossover: {} has {}/{} bars, not evaluating",
                symbol,
                bars.len(),
                self.min_bars()
            );
            return Ok(None);
        }

        let mut short = Sma::new(self.params.short_window)
            .map_err(|e| StrategyError::IndicatorError(e.to_string()))?;
        let mut long = Sma::new(self.params.long_window)
            .map_err(|e| StrategyError::IndicatorError(e.to_string()))?;

        // The `ta` crate uses `f64`. We must convert from our high-precision
        // `Decimal` type. This is a controlled and accepted precision
        // trade-off for using the library.
        let mut prev: Option<(f64, f64)> = None;
        let mut curr: Option<(f64, f64)> = None;
        for bar in bars {
            let close = bar.close.to_f64().ok_or_else(|| {
                StrategyError::IndicatorError(format!(
                    "close {} for {} cannot be converted to f64",
                    bar.close, symbol
                ))
            })?;
            prev = curr;
            curr = Some((short.next(close), long.next(close)));
        }
        let (Some((prev_short, prev_long)), Some((curr_short, curr_long))) = (prev, curr) else {
            return Ok(None);
        };

        let shares_held = snapshot.shares(symbol);
        let crossed_up = prev_short <= prev_long && curr_short > curr_long;
        let crossed_down = prev_short >= prev_long && curr_short < curr_long;

        let (action, reason) = if crossed_up {
            (SignalAction::Buy, "Short SMA crossed above long SMA")
        } else if crossed_down && shares_held > dec!(0) {
            (SignalAction::Sell, "Short SMA crossed below long SMA")
        } else if crossed_down {
            (SignalAction::Hold, "Bearish crossover but no position to sell")
        } else {
            (SignalAction::Hold, "No crossover signal")
        };

        tracing::debug!(
            "SmaCrossover: {} -> {:?} (short SMA {}, long SMA {})",
            symbol,
            action,
            curr_short,
            curr_long
        );

        Ok(Some(Decision {
            action,
            reason: reason.to_string(),
            confidence: confidence_from_spread(curr_short, curr_long),
        }))
    }
}

/// Conviction scales with how far the averages have separated, capped at 1.
fn confidence_from_spread(short_sma: f64, long_sma: f64) -> Decimal {
    if long_sma == 0.0 {
        return Decimal::ZERO;
    }
    let ratio = ((short_sma - long_sma).abs() / long_sma.abs()).min(1.0);
    Decimal::from_f64(ratio).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate, Utc};
    use core_types::Holding;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn bar(day: u64, close: Decimal) -> PriceBar {
        PriceBar {
            bar_id: Uuid::new_v4(),
            symbol: "ACME".to_string(),
            day: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .checked_add_days(Days::new(day))
                .unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
            source: "test".to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn bars(closes: &[i64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| bar(i as u64, Decimal::from(*c)))
            .collect()
    }

    fn snapshot_holding(symbol: &str, quantity: Decimal) -> PortfolioSnapshot {
        let mut positions = BTreeMap::new();
        if quantity > dec!(0) {
            positions.insert(
                symbol.to_string(),
                Holding {
                    quantity,
                    avg_cost: dec!(10),
                },
            );
        }
        PortfolioSnapshot {
            simulator_id: Uuid::new_v4(),
            cash: dec!(10000),
            positions,
            as_of: Utc::now(),
        }
    }

    fn strategy(short: usize, long: usize) -> SmaCrossover {
        SmaCrossover::new(SmaCrossoverParams {
            short_window: short,
            long_window: long,
        })
        .unwrap()
    }

    #[test]
    fn too_little_history_yields_nothing() {
        let s = strategy(2, 3);
        // Exactly long_window bars is still one short of a crossover check.
        let decision = s
            .decide(&bars(&[10, 10, 10]), &snapshot_holding("ACME", dec!(0)), "ACME")
            .unwrap();
        assert!(decision.is_none());
    }

    #[test]
    fn bullish_cross_buys() {
        let s = strategy(2, 3);
        let decision = s
            .decide(
                &bars(&[10, 10, 10, 20]),
                &snapshot_holding("ACME", dec!(0)),
                "ACME",
            )
            .unwrap()
            .unwrap();
        assert_eq!(decision.action, SignalAction::Buy);
        assert!(decision.confidence > dec!(0));
        assert!(decision.confidence <= dec!(1));
    }

    #[test]
    fn bearish_cross_sells_only_when_holding() {
        let s = strategy(2, 3);
        let closes = [20, 20, 20, 5];

        let held = s
            .decide(&bars(&closes), &snapshot_holding("ACME", dec!(4)), "ACME")
            .unwrap()
            .unwrap();
        assert_eq!(held.action, SignalAction::Sell);

        let flat = s
            .decide(&bars(&closes), &snapshot_holding("ACME", dec!(0)), "ACME")
            .unwrap()
            .unwrap();
        assert_eq!(flat.action, SignalAction::Hold);
        assert!(flat.reason.contains("no position"));
    }

    #[test]
    fn flat_tape_holds() {
        let s = strategy(2, 3);
        let decision = s
            .decide(
                &bars(&[10, 10, 10, 10]),
                &snapshot_holding("ACME", dec!(0)),
                "ACME",
            )
            .unwrap()
            .unwrap();
        assert_eq!(decision.action, SignalAction::Hold);
        assert_eq!(decision.confidence, dec!(0));
    }

    #[test]
    fn rejects_illogical_windows() {
        assert!(
            SmaCrossover::new(SmaCrossoverParams {
                short_window: 20,
                long_window: 5,
            })
            .is_err()
        );
        assert!(
            SmaCrossover::new(SmaCrossoverParams {
                short_window: 0,
                long_window: 5,
            })
            .is_err()
        );
    }
}
