use crate::error::DbError;
use chrono::{NaiveDate, Utc};
use core_types::{
    CashLedgerEntry, Holding, NewSimulator, PipelineCheckpoint, PipelineStage, Position, PriceBar,
    Signal, SignalStatus, Simulator, TrackedSymbol, Trade,
};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

/// All database access goes through this repository. It is cheap to clone
/// and shares the underlying connection pool.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // --- Price bars ---

    /// Inserts a batch of daily bars, overwriting any bar already stored for
    /// the same (symbol, day). Returns the number of rows written.
    pub async fn upsert_price_bars(&self, bars: &[PriceBar]) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for bar in bars {
            let result = sqlx::query(
                r#"
                INSERT INTO price_bars (bar_id, symbol, day, open, high, low, close, volume, source, fetched_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (symbol, day) DO UPDATE SET
                    open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    source = EXCLUDED.source,
                    fetched_at = EXCLUDED.fetched_at
                "#,
            )
            .bind(bar.bar_id)
            .bind(&bar.symbol)
            .bind(bar.day)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(&bar.source)
            .bind(bar.fetched_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    /// Fetches the bars for one symbol between two dates (inclusive),
    /// oldest first.
    pub async fn price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DbError> {
        let bars = sqlx::query_as::<_, PriceBar>(
            r#"
            SELECT * FROM price_bars
            WHERE symbol = $1 AND day >= $2 AND day <= $3
            ORDER BY day ASC
            "#,
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(bars)
    }

    /// Most recent stored bar for one symbol, if any.
    pub async fn latest_price_bar(&self, symbol: &str) -> Result<Option<PriceBar>, DbError> {
        let bar = sqlx::query_as::<_, PriceBar>(
            "SELECT * FROM price_bars WHERE symbol = $1 ORDER BY day DESC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bar)
    }

    /// Most recent stored bar for each of the given symbols. Symbols with no
    /// bars at all are simply absent from the result.
    pub async fn latest_bars(&self, symbols: &[String]) -> Result<Vec<PriceBar>, DbError> {
        let bars = sqlx::query_as::<_, PriceBar>(
            r#"
            SELECT DISTINCT ON (symbol) * FROM price_bars
            WHERE symbol = ANY($1)
            ORDER BY symbol, day DESC
            "#,
        )
        .bind(symbols)
        .fetch_all(&self.pool)
        .await?;
        Ok(bars)
    }

    // --- Simulators ---

    /// Creates a simulator and writes its opening cash ledger entry in the
    /// same transaction.
    pub async fn create_simulator(&self, new: &NewSimulator) -> Result<Simulator, DbError> {
        let now = Utc::now();
        let simulator = Simulator {
            simulator_id: Uuid::new_v4(),
            name: new.name.clone(),
            enabled: true,
            strategy_id: new.strategy_id,
            strategy_params: new.strategy_params.clone(),
            sizing: new.sizing.clone(),
            starting_cash: new.starting_cash,
            cash_balance: new.starting_cash,
            fee_rate: new.fee_rate,
            slippage_rate: new.slippage_rate,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO simulators (simulator_id, name, enabled, strategy_id, strategy_params,
                                    sizing, starting_cash, cash_balance, fee_rate, slippage_rate,
                                    created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(simulator.simulator_id)
        .bind(&simulator.name)
        .bind(simulator.enabled)
        .bind(simulator.strategy_id.to_string())
        .bind(&simulator.strategy_params)
        .bind(&simulator.sizing)
        .bind(simulator.starting_cash)
        .bind(simulator.cash_balance)
        .bind(simulator.fee_rate)
        .bind(simulator.slippage_rate)
        .bind(simulator.created_at)
        .bind(simulator.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO cash_ledger (entry_id, simulator_id, trade_id, delta, reason, balance_after, created_at)
            VALUES ($1, $2, NULL, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(simulator.simulator_id)
        .bind(simulator.starting_cash)
        .bind("starting cash")
        .bind(simulator.starting_cash)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(simulator)
    }

    pub async fn simulator_by_id(&self, simulator_id: Uuid) -> Result<Simulator, DbError> {
        let row = sqlx::query("SELECT * FROM simulators WHERE simulator_id = $1")
            .bind(simulator_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;
        map_simulator(&row)
    }

    pub async fn enabled_simulators(&self) -> Result<Vec<Simulator>, DbError> {
        let rows = sqlx::query("SELECT * FROM simulators WHERE enabled ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_simulator).collect()
    }

    pub async fn all_simulators(&self) -> Result<Vec<Simulator>, DbError> {
        let rows = sqlx::query("SELECT * FROM simulators ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_simulator).collect()
    }

    // --- Tracked symbols ---

    /// Adds a symbol to a simulator's watch list, or flips its enabled flag
    /// if it is already tracked.
    pub async fn track_symbol(
        &self,
        simulator_id: Uuid,
        symbol: &str,
        enabled: bool,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO tracked_symbols (simulator_id, symbol, enabled, added_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (simulator_id, symbol) DO UPDATE SET enabled = EXCLUDED.enabled
            "#,
        )
        .bind(simulator_id)
        .bind(symbol)
        .bind(enabled)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn tracked_symbols(&self, simulator_id: Uuid) -> Result<Vec<TrackedSymbol>, DbError> {
        let symbols = sqlx::query_as::<_, TrackedSymbol>(
            "SELECT * FROM tracked_symbols WHERE simulator_id = $1 ORDER BY symbol ASC",
        )
        .bind(simulator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    /// Enabled symbols for one simulator, in stable alphabetical order.
    pub async fn enabled_symbols(&self, simulator_id: Uuid) -> Result<Vec<String>, DbError> {
        let symbols = sqlx::query_scalar::<_, String>(
            "SELECT symbol FROM tracked_symbols WHERE simulator_id = $1 AND enabled ORDER BY symbol ASC",
        )
        .bind(simulator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    /// Union of enabled symbols across all enabled simulators. This is the
    /// ingestor's fetch universe.
    pub async fn all_enabled_symbols(&self) -> Result<Vec<String>, DbError> {
        let symbols = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT t.symbol FROM tracked_symbols t
            JOIN simulators s ON s.simulator_id = t.simulator_id
            WHERE t.enabled AND s.enabled
            ORDER BY t.symbol ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    // --- Signals ---

    /// Inserts an evaluation batch of signals atomically.
    pub async fn insert_signals(&self, signals: &[Signal]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for signal in signals {
            sqlx::query(
                r#"
                INSERT INTO signals (signal_id, simulator_id, symbol, action, reason, confidence,
                                     strategy_id, ref_price, status, status_reason, created_at, executed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(signal.signal_id)
            .bind(signal.simulator_id)
            .bind(&signal.symbol)
            .bind(signal.action.to_string())
            .bind(&signal.reason)
            .bind(signal.confidence)
            .bind(signal.strategy_id.to_string())
            .bind(signal.ref_price)
            .bind(signal.status.to_string())
            .bind(signal.status_reason.as_deref())
            .bind(signal.created_at)
            .bind(signal.executed_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Pending signals for one simulator in execution order: creation time,
    /// then signal id as the tie-break within a batch.
    pub async fn pending_signals(
        &self,
        simulator_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Signal>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE simulator_id = $1 AND status = 'pending'
            ORDER BY created_at ASC, signal_id ASC
            LIMIT $2
            "#,
        )
        .bind(simulator_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_signal).collect()
    }

    pub async fn has_pending_signal(
        &self,
        simulator_id: Uuid,
        symbol: &str,
    ) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM signals
                WHERE simulator_id = $1 AND symbol = $2 AND status = 'pending'
            )
            "#,
        )
        .bind(simulator_id)
        .bind(symbol)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Simulators that currently have at least one pending signal.
    pub async fn simulators_with_pending_signals(&self) -> Result<Vec<Uuid>, DbError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT simulator_id FROM signals WHERE status = 'pending'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Moves a pending signal into a terminal status. Returns `false` when
    /// the signal was not pending, so a concurrent or repeated run cannot
    /// settle the same signal twice.
    pub async fn transition_signal(
        &self,
        signal_id: Uuid,
        to: SignalStatus,
        reason: Option<&str>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE signals
            SET status = $2, status_reason = $3, executed_at = $4
            WHERE signal_id = $1 AND status = 'pending'
            "#,
        )
        .bind(signal_id)
        .bind(to.to_string())
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Recent signals for one simulator, newest first.
    pub async fn signals_for(&self, simulator_id: Uuid, limit: i64) -> Result<Vec<Signal>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE simulator_id = $1
            ORDER BY created_at DESC, signal_id DESC
            LIMIT $2
            "#,
        )
        .bind(simulator_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_signal).collect()
    }

    // --- Trades and cash ---

    /// Settles one fill: claims the pending signal, appends the trade, and
    /// writes the cash ledger entry, all in one transaction. Returns `false`
    /// without writing anything if the signal had already left pending.
    pub async fn record_execution(
        &self,
        trade: &Trade,
        cash_delta: Decimal,
        balance_after: Decimal,
        reason: &str,
    ) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE signals
            SET status = 'executed', status_reason = NULL, executed_at = $2
            WHERE signal_id = $1 AND status = 'pending'
            "#,
        )
        .bind(trade.signal_id)
        .bind(trade.executed_at)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO trades (trade_id, simulator_id, signal_id, symbol, side, quantity, price, fee, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trade.trade_id)
        .bind(trade.simulator_id)
        .bind(trade.signal_id)
        .bind(&trade.symbol)
        .bind(trade.side.to_string())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(trade.fee)
        .bind(trade.executed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO cash_ledger (entry_id, simulator_id, trade_id, delta, reason, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(trade.simulator_id)
        .bind(trade.trade_id)
        .bind(cash_delta)
        .bind(reason)
        .bind(balance_after)
        .bind(trade.executed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Simulators that have at least one trade on the ledger. This is the
    /// reconciler's default work list.
    pub async fn simulators_with_trades(&self) -> Result<Vec<Uuid>, DbError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT DISTINCT simulator_id FROM trades")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Full trade ledger for one simulator in replay order: execution time,
    /// then trade id as the tie-break.
    pub async fn trades_for(&self, simulator_id: Uuid) -> Result<Vec<Trade>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM trades
            WHERE simulator_id = $1
            ORDER BY executed_at ASC, trade_id ASC
            "#,
        )
        .bind(simulator_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_trade).collect()
    }

    pub async fn cash_ledger_for(
        &self,
        simulator_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CashLedgerEntry>, DbError> {
        let entries = sqlx::query_as::<_, CashLedgerEntry>(
            r#"
            SELECT * FROM cash_ledger
            WHERE simulator_id = $1
            ORDER BY created_at DESC, entry_id DESC
            LIMIT $2
            "#,
        )
        .bind(simulator_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    // --- Positions ---

    pub async fn positions_for(&self, simulator_id: Uuid) -> Result<Vec<Position>, DbError> {
        let positions = sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE simulator_id = $1 ORDER BY symbol ASC",
        )
        .bind(simulator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(positions)
    }

    /// Overwrites a simulator's reconciled state: cash balance plus the full
    /// positions table, replaced in one transaction.
    pub async fn apply_reconciliation(
        &self,
        simulator_id: Uuid,
        cash: Decimal,
        positions: &BTreeMap<String, Holding>,
    ) -> Result<(), DbError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE simulators SET cash_balance = $2, updated_at = $3 WHERE simulator_id = $1",
        )
        .bind(simulator_id)
        .bind(cash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM positions WHERE simulator_id = $1")
            .bind(simulator_id)
            .execute(&mut *tx)
            .await?;

        for (symbol, holding) in positions {
            sqlx::query(
                r#"
                INSERT INTO positions (simulator_id, symbol, quantity, avg_cost, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(simulator_id)
            .bind(symbol)
            .bind(holding.quantity)
            .bind(holding.avg_cost)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // --- Pipeline checkpoints ---

    pub async fn upsert_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_checkpoints (stage, simulator_id, last_run_on, outcome, detail, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (stage, simulator_id) DO UPDATE SET
                last_run_on = EXCLUDED.last_run_on,
                outcome = EXCLUDED.outcome,
                detail = EXCLUDED.detail,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(checkpoint.stage.to_string())
        .bind(checkpoint.simulator_id)
        .bind(checkpoint.last_run_on)
        .bind(&checkpoint.outcome)
        .bind(&checkpoint.detail)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn checkpoint(
        &self,
        stage: PipelineStage,
        simulator_id: Uuid,
    ) -> Result<Option<PipelineCheckpoint>, DbError> {
        let row = sqlx::query(
            "SELECT * FROM pipeline_checkpoints WHERE stage = $1 AND simulator_id = $2",
        )
        .bind(stage.to_string())
        .bind(simulator_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_checkpoint).transpose()
    }

    // --- Advisory locks ---

    /// Tries to take the per-simulator advisory lock for one pipeline stage.
    /// Returns `None` when another session already holds it.
    pub async fn lock_simulator(
        &self,
        stage: PipelineStage,
        simulator_id: Uuid,
    ) -> Result<Option<SimulatorLock>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let class = stage.lock_class();
        let key = lock_key(simulator_id);
        let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1, $2)")
            .bind(class)
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            Ok(Some(SimulatorLock {
                conn: Some(conn),
                class,
                key,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Holds a Postgres advisory lock for one (stage, simulator) pair on a
/// dedicated pool connection. Call [`SimulatorLock::release`] when the stage
/// finishes; a guard dropped without releasing closes its connection instead
/// of returning it to the pool, which makes Postgres free the lock.
pub struct SimulatorLock {
    conn: Option<PoolConnection<Postgres>>,
    class: i32,
    key: i32,
}

impl SimulatorLock {
    pub async fn release(mut self) -> Result<(), DbError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                .bind(self.class)
                .bind(self.key)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for SimulatorLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

/// Folds a simulator id into the 32-bit key space of a two-argument
/// advisory lock.
fn lock_key(simulator_id: Uuid) -> i32 {
    let mut folded = [0u8; 4];
    for (i, byte) in simulator_id.as_bytes().iter().enumerate() {
        folded[i % 4] ^= byte;
    }
    i32::from_le_bytes(folded)
}

// Rows whose structs contain domain enums are mapped by hand; the plain
// data-carrier structs derive FromRow instead.

fn map_simulator(row: &PgRow) -> Result<Simulator, DbError> {
    Ok(Simulator {
        simulator_id: row.try_get("simulator_id")?,
        name: row.try_get("name")?,
        enabled: row.try_get("enabled")?,
        strategy_id: row.try_get::<String, _>("strategy_id")?.parse()?,
        strategy_params: row.try_get("strategy_params")?,
        sizing: row.try_get("sizing")?,
        starting_cash: row.try_get("starting_cash")?,
        cash_balance: row.try_get("cash_balance")?,
        fee_rate: row.try_get("fee_rate")?,
        slippage_rate: row.try_get("slippage_rate")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_signal(row: &PgRow) -> Result<Signal, DbError> {
    Ok(Signal {
        signal_id: row.try_get("signal_id")?,
        simulator_id: row.try_get("simulator_id")?,
        symbol: row.try_get("symbol")?,
        action: row.try_get::<String, _>("action")?.parse()?,
        reason: row.try_get("reason")?,
        confidence: row.try_get("confidence")?,
        strategy_id: row.try_get::<String, _>("strategy_id")?.parse()?,
        ref_price: row.try_get("ref_price")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        status_reason: row.try_get("status_reason")?,
        created_at: row.try_get("created_at")?,
        executed_at: row.try_get("executed_at")?,
    })
}

fn map_trade(row: &PgRow) -> Result<Trade, DbError> {
    Ok(Trade {
        trade_id: row.try_get("trade_id")?,
        simulator_id: row.try_get("simulator_id")?,
        signal_id: row.try_get("signal_id")?,
        symbol: row.try_get("symbol")?,
        side: row.try_get::<String, _>("side")?.parse()?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        fee: row.try_get("fee")?,
        executed_at: row.try_get("executed_at")?,
    })
}

fn map_checkpoint(row: &PgRow) -> Result<PipelineCheckpoint, DbError> {
    Ok(PipelineCheckpoint {
        stage: row.try_get::<String, _>("stage")?.parse()?,
        simulator_id: row.try_get("simulator_id")?,
        last_run_on: row.try_get("last_run_on")?,
        outcome: row.try_get("outcome")?,
        detail: row.try_get("detail")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(lock_key(id), lock_key(id));
    }

    #[test]
    fn lock_key_nil_folds_to_zero() {
        assert_eq!(lock_key(Uuid::nil()), 0);
    }

    #[test]
    fn lock_key_distinguishes_ids() {
        let a = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_ne!(lock_key(a), lock_key(Uuid::nil()));
    }
}
