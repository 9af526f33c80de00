use crate::error::EngineError;
use crate::replay::replay_ledger;
use crate::summary::ReconcileSummary;
use analytics::AnalyticsEngine;
use chrono::Utc;
use core_types::{PipelineCheckpoint, PipelineStage};
use database::Repository;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Rebuilds each simulator's canonical cash and positions by replaying its
/// trade ledger, then values the result. Any drift the execution pass's
/// working balances introduced is overwritten here.
#[derive(Clone)]
pub struct Reconciler {
    repository: Repository,
    analytics: AnalyticsEngine,
}

enum SimulatorReconcile {
    LockedOut,
    Reconciled {
        trades_replayed: usize,
        positions_written: usize,
    },
}

impl Reconciler {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            analytics: AnalyticsEngine::new(),
        }
    }

    /// Reconciles every simulator that has trades, or one on demand.
    pub async fn run(
        &self,
        simulator_filter: Option<Uuid>,
    ) -> Result<ReconcileSummary, EngineError> {
        let simulator_ids = match simulator_filter {
            Some(id) => vec![id],
            None => self.repository.simulators_with_trades().await?,
        };

        let mut handles = Vec::new();
        for simulator_id in simulator_ids {
            let reconciler = self.clone();
            handles.push(tokio::spawn(async move {
                reconciler.run_for_simulator(simulator_id).await
            }));
        }

        let mut summary = ReconcileSummary::default();
        let mut first_error: Option<EngineError> = None;
        for result in join_all(handles).await {
            match result {
                Ok(Ok(SimulatorReconcile::LockedOut)) => summary.simulators_locked_out += 1,
                Ok(Ok(SimulatorReconcile::Reconciled {
                    trades_replayed,
                    positions_written,
                })) => {
                    summary.simulators_reconciled += 1;
                    summary.trades_replayed += trades_replayed;
                    summary.positions_written += positions_written;
                }
                Ok(Err(e)) => {
                    error!(error = %e, "reconciliation failed for a simulator");
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    first_error.get_or_insert(EngineError::TaskPanic(join_err.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            simulators = summary.simulators_reconciled,
            trades = summary.trades_replayed,
            "reconciliation pass complete"
        );
        Ok(summary)
    }

    async fn run_for_simulator(&self, simulator_id: Uuid) -> Result<SimulatorReconcile, EngineError> {
        let Some(lock) = self
            .repository
            .lock_simulator(PipelineStage::Reconciliation, simulator_id)
            .await?
        else {
            warn!(%simulator_id, "another session is reconciling this simulator, skipping");
            return Ok(SimulatorReconcile::LockedOut);
        };

        let result = self.reconcile_simulator(simulator_id).await;
        lock.release().await?;
        result
    }

    async fn reconcile_simulator(
        &self,
        simulator_id: Uuid,
    ) -> Result<SimulatorReconcile, EngineError> {
        let simulator = self.repository.simulator_by_id(simulator_id).await?;
        let trades = self.repository.trades_for(simulator_id).await?;
        let replayed = replay_ledger(simulator_id, simulator.starting_cash, &trades)?;

        self.repository
            .apply_reconciliation(simulator_id, replayed.cash, &replayed.positions)
            .await?;

        // Mark-to-market valuation is derived, not stored: log it and move on.
        // A symbol without any stored bar only blocks the valuation, never
        // the reconciliation itself.
        let symbols: Vec<String> = replayed.positions.keys().cloned().collect();
        let latest = self.repository.latest_bars(&symbols).await?;
        let closes: BTreeMap<String, Decimal> =
            latest.into_iter().map(|bar| (bar.symbol, bar.close)).collect();
        match self
            .analytics
            .snapshot(&replayed, &closes, simulator.starting_cash)
        {
            Ok(snapshot) => info!(
                %simulator_id,
                cash = %snapshot.cash,
                equity = %snapshot.equity,
                unrealized_pnl = %snapshot.unrealized_pnl,
                "simulator reconciled"
            ),
            Err(e) => warn!(%simulator_id, error = %e, "reconciled but could not value portfolio"),
        }

        let checkpoint = PipelineCheckpoint {
            stage: PipelineStage::Reconciliation,
            simulator_id,
            last_run_on: Utc::now().date_naive(),
            outcome: "ok".to_string(),
            detail: serde_json::json!({
                "trades_replayed": trades.len(),
                "positions_written": replayed.positions.len(),
                "cash": replayed.cash,
            }),
            updated_at: Utc::now(),
        };
        self.repository.upsert_checkpoint(&checkpoint).await?;

        Ok(SimulatorReconcile::Reconciled {
            trades_replayed: trades.len(),
            positions_written: replayed.positions.len(),
        })
    }
}
