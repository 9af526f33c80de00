//! # Vellum Sizing Library
//!
//! Pluggable position sizing for the execution engine. A `SizingRule` answers
//! one question: given the fill price and the cash the pass still has to work
//! with, how many shares should this order be?
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** No knowledge of databases or signals. The engine feeds a
//!   rule the working balance; the rule returns a quantity.
//! - **Per-simulator configuration:** Each simulator stores a `SizingConfig`
//!   JSON bag; `build_sizing_rule` turns it into a trait object.
//! - **Quantities are proposals:** A rule never checks affordability or
//!   inventory. The execution engine applies the skip/fail taxonomy.

pub mod error;
pub mod rules;

pub use error::SizingError;
pub use rules::{CashFraction, FixedShares};

use configuration::SizingConfig;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// The trait every sizing rule implements.
///
/// `Send + Sync` is required because the execution engine fans out across
/// simulators on tokio tasks.
pub trait SizingRule: Send + Sync {
    /// Proposed order quantity in shares. May legitimately be zero (e.g. no
    /// budget left); the caller decides what zero means.
    fn order_quantity(
        &self,
        fill_price: Decimal,
        working_cash: Decimal,
    ) -> Result<Decimal, SizingError>;
}

/// Builds a sizing rule from a simulator's stored JSON configuration.
pub fn build_sizing_rule(config: &JsonValue) -> Result<Box<dyn SizingRule>, SizingError> {
    let config: SizingConfig = serde_json::from_value(config.clone())
        .map_err(|e| SizingError::InvalidParameters(e.to_string()))?;

    match config {
        SizingConfig::FixedShares { shares } => Ok(Box::new(FixedShares::new(shares)?)),
        SizingConfig::CashFraction { fraction } => Ok(Box::new(CashFraction::new(fraction)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn factory_builds_rules_from_json_bags() {
        let rule = build_sizing_rule(&json!({"rule": "fixed_shares", "shares": "7"})).unwrap();
        assert_eq!(rule.order_quantity(dec!(50), dec!(0)).unwrap(), dec!(7));

        let rule =
            build_sizing_rule(&json!({"rule": "cash_fraction", "fraction": "0.1"})).unwrap();
        assert_eq!(
            rule.order_quantity(dec!(10), dec!(1000)).unwrap(),
            dec!(10)
        );
    }

    #[test]
    fn factory_rejects_malformed_bags() {
        assert!(build_sizing_rule(&json!({"rule": "kelly"})).is_err());
        assert!(build_sizing_rule(&json!({"rule": "fixed_shares", "shares": "0"})).is_err());
        assert!(build_sizing_rule(&json!({})).is_err());
    }
}
