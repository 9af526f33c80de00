use crate::error::AnalyticsError;
use crate::snapshot::PerformanceSnapshot;
use chrono::Utc;
use core_types::PortfolioSnapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A stateless calculator for valuing a reconciled portfolio.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values a portfolio against the latest stored close per symbol.
    ///
    /// Every held symbol must have an entry in `latest_closes`; a missing
    /// price is an error rather than a silent zero so a valuation can never
    /// quietly understate equity.
    pub fn snapshot(
        &self,
        portfolio: &PortfolioSnapshot,
        latest_closes: &BTreeMap<String, Decimal>,
        starting_cash: Decimal,
    ) -> Result<PerformanceSnapshot, AnalyticsError> {
        let mut market_value = Decimal::ZERO;
        let mut unrealized_pnl = Decimal::ZERO;

        for (symbol, holding) in &portfolio.positions {
            let close = *latest_closes
                .get(symbol)
                .ok_or_else(|| AnalyticsError::MissingPrice {
                    symbol: symbol.clone(),
                })?;
            market_value += holding.quantity * close;
            unrealized_pnl += holding.quantity * (close - holding.avg_cost);
        }

        let equity = portfolio.cash + market_value;
        let return_since_inception_pct = if starting_cash > Decimal::ZERO {
            Some(((equity - starting_cash) / starting_cash * Decimal::from(100)).round_dp(4))
        } else {
            None
        };

        Ok(PerformanceSnapshot {
            as_of: Utc::now(),
            cash: portfolio.cash,
            market_value: market_value.round_dp(4),
            equity: equity.round_dp(4),
            unrealized_pnl: unrealized_pnl.round_dp(4),
            return_since_inception_pct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::Holding;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn portfolio(cash: Decimal, positions: &[(&str, Decimal, Decimal)]) -> PortfolioSnapshot {
        PortfolioSnapshot {
            simulator_id: Uuid::new_v4(),
            cash,
            positions: positions
                .iter()
                .map(|(symbol, quantity, avg_cost)| {
                    (
                        symbol.to_string(),
                        Holding {
                            quantity: *quantity,
                            avg_cost: *avg_cost,
                        },
                    )
                })
                .collect(),
            as_of: Utc::now(),
        }
    }

    #[test]
    fn values_holdings_at_latest_close() {
        let portfolio = portfolio(dec!(8990), &[("AAPL", dec!(10), dec!(100))]);
        let closes = BTreeMap::from([("AAPL".to_string(), dec!(110))]);

        let snapshot = AnalyticsEngine::new()
            .snapshot(&portfolio, &closes, dec!(10000))
            .unwrap();

        assert_eq!(snapshot.cash, dec!(8990));
        assert_eq!(snapshot.market_value, dec!(1100));
        assert_eq!(snapshot.equity, dec!(10090));
        assert_eq!(snapshot.unrealized_pnl, dec!(100));
        assert_eq!(snapshot.return_since_inception_pct, Some(dec!(0.9)));
    }

    #[test]
    fn missing_price_is_an_error() {
        let portfolio = portfolio(dec!(1000), &[("MSFT", dec!(5), dec!(200))]);
        let closes = BTreeMap::from([("AAPL".to_string(), dec!(110))]);

        let err = AnalyticsEngine::new()
            .snapshot(&portfolio, &closes, dec!(10000))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::MissingPrice { symbol } if symbol == "MSFT"));
    }

    #[test]
    fn empty_portfolio_is_all_cash() {
        let portfolio = portfolio(dec!(10000), &[]);
        let closes = BTreeMap::new();

        let snapshot = AnalyticsEngine::new()
            .snapshot(&portfolio, &closes, dec!(10000))
            .unwrap();

        assert_eq!(snapshot.market_value, Decimal::ZERO);
        assert_eq!(snapshot.equity, dec!(10000));
        assert_eq!(snapshot.return_since_inception_pct, Some(Decimal::ZERO));
    }

    #[test]
    fn non_positive_starting_cash_has_no_return_pct() {
        let portfolio = portfolio(dec!(500), &[]);
        let closes = BTreeMap::new();

        let snapshot = AnalyticsEngine::new()
            .snapshot(&portfolio, &closes, Decimal::ZERO)
            .unwrap();
        assert_eq!(snapshot.return_since_inception_pct, None);
    }
}
