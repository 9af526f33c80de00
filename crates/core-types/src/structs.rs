use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::enums::{PipelineStage, SignalAction, SignalStatus, StrategyId, TradeSide};

/// One daily OHLCV bar for one symbol. Unique on (symbol, day); re-ingesting
/// the same day overwrites in place so corrections propagate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceBar {
    pub bar_id: Uuid,
    pub symbol: String,
    pub day: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Provenance of the bar, e.g. "yahoo".
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// A paper-trading account: strategy configuration plus the canonical
/// portfolio state. `cash_balance` is only ever written by reconciliation;
/// everything else about the portfolio is derived from the trade ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulator {
    pub simulator_id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub strategy_id: StrategyId,
    /// Strategy parameter bag, decoded by the strategy factory.
    pub strategy_params: JsonValue,
    /// Sizing rule configuration, decoded by the sizing factory.
    pub sizing: JsonValue,
    pub starting_cash: Decimal,
    pub cash_balance: Decimal,
    pub fee_rate: Decimal,
    pub slippage_rate: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation parameters for a simulator; the store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSimulator {
    pub name: String,
    pub strategy_id: StrategyId,
    pub strategy_params: JsonValue,
    pub sizing: JsonValue,
    pub starting_cash: Decimal,
    pub fee_rate: Decimal,
    pub slippage_rate: Decimal,
}

/// Watchlist entry: a symbol a simulator evaluates. Unique on
/// (simulator, symbol).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackedSymbol {
    pub simulator_id: Uuid,
    pub symbol: String,
    pub enabled: bool,
    pub added_at: DateTime<Utc>,
}

/// A strategy's recommendation for one symbol on one evaluation pass.
/// Persisted `pending` and transitioned exactly once by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Uuid,
    pub simulator_id: Uuid,
    pub symbol: String,
    pub action: SignalAction,
    pub reason: String,
    /// Strategy conviction in [0, 1].
    pub confidence: Decimal,
    pub strategy_id: StrategyId,
    /// Closing price the strategy saw when it decided.
    pub ref_price: Decimal,
    pub status: SignalStatus,
    /// Why the signal left `pending` the way it did (skip or failure detail).
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the signal left `pending`, whichever terminal status it took.
    pub executed_at: Option<DateTime<Utc>>,
}

/// One immutable ledger entry. Trades are append-only: no updates, no
/// deletes, and at most one trade per originating signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub simulator_id: Uuid,
    pub signal_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    /// Fill price after slippage.
    pub price: Decimal,
    pub fee: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Current holding for one (simulator, symbol). Wholly recomputed from the
/// trade ledger by reconciliation; never trusted as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Position {
    pub simulator_id: Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    /// Volume-weighted average fill price of the open lot, fees excluded.
    pub avg_cost: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Append-only cash audit trail, one row per cash movement. Written in the
/// same transaction as the trade it explains; non-authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CashLedgerEntry {
    pub entry_id: Uuid,
    pub simulator_id: Uuid,
    pub trade_id: Option<Uuid>,
    pub delta: Decimal,
    pub reason: String,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Last completed run of a stage, keyed (stage, simulator). Stages that are
/// not per-simulator use the nil UUID. Makes every pass resumable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub stage: PipelineStage,
    pub simulator_id: Uuid,
    pub last_run_on: NaiveDate,
    pub outcome: String,
    /// Stage summary as JSON, for operators.
    pub detail: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// What a simulator holds in one symbol, as seen by strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: Decimal,
    pub avg_cost: Decimal,
}

/// Read-only projection of a simulator's portfolio at a point in time.
/// Strategies receive this instead of touching the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub simulator_id: Uuid,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Holding>,
    pub as_of: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// Shares held in `symbol`, zero when there is no position.
    pub fn shares(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|h| h.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

/// A strategy's verdict for one symbol. Pure data; the evaluator turns it
/// into a persisted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: SignalAction,
    pub reason: String,
    pub confidence: Decimal,
}
