use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// The database stores all of these enums as lowercase text, so the
// Display/FromStr pairs below are the single source of truth for the wire
// form. Serde reuses the same names via `rename_all`.

/// What a strategy wants done with a symbol. `Hold` is a first-class action:
/// it produces a signal (audit trail) but never a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    /// The trade side this action maps to, if it trades at all.
    pub fn trade_side(&self) -> Option<TradeSide> {
        match self {
            SignalAction::Buy => Some(TradeSide::Buy),
            SignalAction::Sell => Some(TradeSide::Sell),
            SignalAction::Hold => None,
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "buy"),
            SignalAction::Sell => write!(f, "sell"),
            SignalAction::Hold => write!(f, "hold"),
        }
    }
}

impl FromStr for SignalAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            "hold" => Ok(SignalAction::Hold),
            other => Err(CoreError::InvalidInput(
                "signal action".to_string(),
                other.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for TradeSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(CoreError::InvalidInput(
                "trade side".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Lifecycle of a signal. A signal leaves `Pending` exactly once and the
/// terminal states are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    /// Processed to completion. Holds land here too, with no trade effect.
    Executed,
    /// Declined by a business rule (insufficient cash, nothing to sell).
    Skipped,
    /// Could not be processed validly (no usable price, bad quantity).
    Failed,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalStatus::Pending)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "pending"),
            SignalStatus::Executed => write!(f, "executed"),
            SignalStatus::Skipped => write!(f, "skipped"),
            SignalStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SignalStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignalStatus::Pending),
            "executed" => Ok(SignalStatus::Executed),
            "skipped" => Ok(SignalStatus::Skipped),
            "failed" => Ok(SignalStatus::Failed),
            other => Err(CoreError::InvalidInput(
                "signal status".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Closed set of strategies a simulator can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    SmaCrossover,
    ThresholdRule,
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyId::SmaCrossover => write!(f, "sma_crossover"),
            StrategyId::ThresholdRule => write!(f, "threshold_rule"),
        }
    }
}

impl FromStr for StrategyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sma_crossover" => Ok(StrategyId::SmaCrossover),
            "threshold_rule" => Ok(StrategyId::ThresholdRule),
            other => Err(CoreError::InvalidInput(
                "strategy id".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// The four pipeline stages, used to key checkpoint rows and advisory locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    PriceIngest,
    Evaluation,
    Execution,
    Reconciliation,
}

impl PipelineStage {
    /// Stable numeric class for this stage, used as the first half of a
    /// Postgres advisory lock key.
    pub fn lock_class(&self) -> i32 {
        match self {
            PipelineStage::PriceIngest => 1,
            PipelineStage::Evaluation => 2,
            PipelineStage::Execution => 3,
            PipelineStage::Reconciliation => 4,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::PriceIngest => write!(f, "price_ingest"),
            PipelineStage::Evaluation => write!(f, "evaluation"),
            PipelineStage::Execution => write!(f, "execution"),
            PipelineStage::Reconciliation => write!(f, "reconciliation"),
        }
    }
}

impl FromStr for PipelineStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_ingest" => Ok(PipelineStage::PriceIngest),
            "evaluation" => Ok(PipelineStage::Evaluation),
            "execution" => Ok(PipelineStage::Execution),
            "reconciliation" => Ok(PipelineStage::Reconciliation),
            other => Err(CoreError::InvalidInput(
                "pipeline stage".to_string(),
                other.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [
            SignalStatus::Pending,
            SignalStatus::Executed,
            SignalStatus::Skipped,
            SignalStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<SignalStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_text_is_rejected() {
        assert!("cancelled".parse::<SignalStatus>().is_err());
        assert!("momentum".parse::<StrategyId>().is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!SignalStatus::Pending.is_terminal());
        assert!(SignalStatus::Executed.is_terminal());
        assert!(SignalStatus::Skipped.is_terminal());
        assert!(SignalStatus::Failed.is_terminal());
    }

    #[test]
    fn hold_has_no_trade_side() {
        assert_eq!(SignalAction::Buy.trade_side(), Some(TradeSide::Buy));
        assert_eq!(SignalAction::Sell.trade_side(), Some(TradeSide::Sell));
        assert_eq!(SignalAction::Hold.trade_side(), None);
    }
}
