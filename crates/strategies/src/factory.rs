use configuration::{SmaCrossoverParams, ThresholdRuleParams};
use core_types::enums::StrategyId;
use serde_json::Value as JsonValue;

use crate::Strategy;
use crate::error::StrategyError;
use crate::sma_crossover::SmaCrossover;
use crate::threshold_rule::ThresholdRule;

/// Creates a new strategy instance from its id and the simulator's stored
/// JSON parameter bag.
///
/// The match is exhaustive on purpose: the compiler will error if a new
/// `StrategyId` is added but not handled here.
pub fn build_strategy(
    id: StrategyId,
    params: &JsonValue,
) -> Result<Box<dyn Strategy>, StrategyError> {
    match id {
        StrategyId::SmaCrossover => {
            let params: SmaCrossoverParams = decode_params(params)?;
            Ok(Box::new(SmaCrossover::new(params)?))
        }
        StrategyId::ThresholdRule => {
            let params: ThresholdRuleParams = decode_params(params)?;
            Ok(Box::new(ThresholdRule::new(params)?))
        }
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(params: &JsonValue) -> Result<T, StrategyError> {
    serde_json::from_value(params.clone()).map_err(|e| StrategyError::InvalidParameters(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_bag_builds_with_defaults() {
        assert!(build_strategy(StrategyId::SmaCrossover, &json!({})).is_ok());
        assert!(build_strategy(StrategyId::ThresholdRule, &json!({})).is_ok());
    }

    #[test]
    fn malformed_bag_is_rejected() {
        let result = build_strategy(StrategyId::SmaCrossover, &json!({"short_window": "fast"}));
        assert!(result.is_err());

        let result = build_strategy(
            StrategyId::SmaCrossover,
            &json!({"short_window": 50, "long_window": 10}),
        );
        assert!(result.is_err());
    }
}
