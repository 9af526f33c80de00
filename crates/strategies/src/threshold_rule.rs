use configuration::ThresholdRuleParams;
use core_types::{Decision, PortfolioSnapshot, PriceBar, SignalAction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::Strategy;
use crate::error::StrategyError;

/// A mean-reversion rule against the trailing simple average.
///
/// Buys when the close dips a configured percentage below the trailing mean
/// and sells (while holding) when it stretches the configured percentage
/// above it. All arithmetic stays in `Decimal`; no indicator library is
/// needed for a plain windowed mean.
pub struct ThresholdRule {
    params: ThresholdRuleParams,
}

impl ThresholdRule {
    pub fn new(params: ThresholdRuleParams) -> Result<Self, StrategyError> {
        if params.lookback == 0 {
            return Err(StrategyError::InvalidParameters(
                "lookback must be positive".to_string(),
            ));
        }
        if params.buy_below_pct < dec!(0) || params.buy_below_pct >= dec!(1) {
            return Err(StrategyError::InvalidParameters(
                "buy_below_pct must be in [0, 1)".to_string(),
            ));
        }
        if params.sell_above_pct < dec!(0) {
            return Err(StrategyError::InvalidParameters(
                "sell_above_pct must not be negative".to_string(),
            ));
        }
        Ok(Self { params })
    }
}

impl Strategy for ThresholdRule {
    fn decide(
        &self,
        bars: &[PriceBar],
        snapshot: &PortfolioSnapshot,
        symbol: &str,
    ) -> Result<Option<Decision>, StrategyError> {
        if bars.len() < self.params.lookback {
            tracing::debug!(
                "ThresholdRule: {} has {}/{} bars, not evaluating",
                symbol,
                bars.len(),
                self.params.lookback
            );
            return Ok(None);
        }
        let Some(latest) = bars.last() else {
            return Ok(None);
        };

        let window = &bars[bars.len() - self.params.lookback..];
        let sum: Decimal = window.iter().map(|bar| bar.close).sum();
        let mean = sum / Decimal::from(self.params.lookback as u64);
        if mean <= dec!(0) {
            return Err(StrategyError::IndicatorError(format!(
                "non-positive trailing mean {mean} for {symbol}"
            )));
        }

        let close = latest.close;
        let buy_line = mean * (dec!(1) - self.params.buy_below_pct);
        let sell_line = mean * (dec!(1) + self.params.sell_above_pct);
        let shares_held = snapshot.shares(symbol);

        let (action, reason) = if close <= buy_line {
            (
                SignalAction::Buy,
                format!("Close {close} at or below buy threshold {buy_line}"),
            )
        } else if close >= sell_line && shares_held > dec!(0) {
            (
                SignalAction::Sell,
                format!("Close {close} at or above sell threshold {sell_line}"),
            )
        } else if close >= sell_line {
            (
                SignalAction::Hold,
                "Stretched above mean but no position to sell".to_string(),
            )
        } else {
            (
                SignalAction::Hold,
                "Close within mean-reversion thresholds".to_string(),
            )
        };

        Ok(Some(Decision {
            action,
            reason,
            confidence: confidence_from_stretch(close, mean),
        }))
    }
}

/// Conviction scales with how far the close sits from the mean, capped at 1.
fn confidence_from_stretch(close: Decimal, mean: Decimal) -> Decimal {
    if mean.is_zero() {
        return Decimal::ZERO;
    }
    ((close - mean).abs() / mean.abs()).min(dec!(1))
}
