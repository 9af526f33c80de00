use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::SizingRule;
use crate::error::SizingError;

/// Always orders the same number of shares, the simplest possible rule.
/// Whether the order is affordable is the execution engine's problem.
#[derive(Debug, Clone)]
pub struct FixedShares {
    shares: Decimal,
}

impl FixedShares {
    pub fn new(shares: Decimal) -> Result<Self, SizingError> {
        if shares <= dec!(0) {
            return Err(SizingError::InvalidParameters(
                "shares must be greater than 0".to_string(),
            ));
        }
        Ok(Self { shares })
    }
}

impl SizingRule for FixedShares {
    fn order_quantity(
        &self,
        _fill_price: Decimal,
        _working_cash: Decimal,
    ) -> Result<Decimal, SizingError> {
        Ok(self.shares)
    }
}

/// Spends a fixed fraction of the working cash balance on each buy, so order
/// sizes shrink as the account deploys capital and grow as it takes profits.
#[derive(Debug, Clone)]
pub struct CashFraction {
    fraction: Decimal,
}

impl CashFraction {
    pub fn new(fraction: Decimal) -> Result<Self, SizingError> {
        if fraction <= dec!(0) || fraction > dec!(1) {
            return Err(SizingError::InvalidParameters(
                "fraction must be in (0, 1]".to_string(),
            ));
        }
        Ok(Self { fraction })
    }
}

impl SizingRule for CashFraction {
    fn order_quantity(
        &self,
        fill_price: Decimal,
        working_cash: Decimal,
    ) -> Result<Decimal, SizingError> {
        if fill_price <= dec!(0) {
            return Err(SizingError::InvalidFillPrice(fill_price));
        }

        let budget = working_cash * self.fraction;
        // Round toward zero so the quantity never overshoots the budget.
        let quantity =
            (budget / fill_price).round_dp_with_strategy(6, RoundingStrategy::ToZero);

        Ok(quantity)
    }
}
