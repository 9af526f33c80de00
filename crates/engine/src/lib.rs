//! # Vellum Engine
//!
//! The four pipeline stages: price ingest, strategy evaluation, signal
//! execution, and ledger reconciliation. Each stage is an independently
//! triggerable batch job that reads the previous stage's persisted output,
//! so any stage can be re-run safely at any time.
//!
//! ## Architectural Principles
//!
//! - **Stages communicate only through the store.** There is no in-process
//!   handoff; a crashed pass leaves `pending` signals and checkpoint rows
//!   for the next pass to pick up.
//! - **Pure cores, thin services.** Execution planning (`plan_signal`) and
//!   ledger replay (`replay_ledger`) are pure functions; the stage services
//!   around them only move rows and hold locks.
//! - **Replay is authoritative.** Working balances inside an execution pass
//!   are optimistic and never persisted; the reconciler's full-ledger replay
//!   overwrites whatever drift they caused.

use configuration::Config;
use database::Repository;
use price_feed::DailyBarProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use uuid::Uuid;

pub mod error;
pub mod evaluate;
pub mod execute;
pub mod ingest;
pub mod reconcile;
pub mod replay;
pub mod summary;

pub use error::EngineError;
pub use evaluate::StrategyEvaluator;
pub use execute::{ExecutionEngine, FailReason, Planned, PlannedFill, SkipReason, plan_signal};
pub use ingest::PriceIngestor;
pub use reconcile::Reconciler;
pub use replay::replay_ledger;
pub use summary::{
    CycleSummary, EvaluationSummary, ExecutionSummary, IngestSummary, ReconcileSummary,
};

/// All four stages wired together for the `run-cycle` convenience command.
pub struct Pipeline {
    ingestor: PriceIngestor,
    evaluator: StrategyEvaluator,
    executor: ExecutionEngine,
    reconciler: Reconciler,
    inter_stage_delay: Duration,
}

impl Pipeline {
    pub fn new(
        repository: Repository,
        provider: Arc<dyn DailyBarProvider>,
        config: &Config,
    ) -> Self {
        Self {
            ingestor: PriceIngestor::new(repository.clone(), provider),
            evaluator: StrategyEvaluator::new(repository.clone(), config.pipeline.clone()),
            executor: ExecutionEngine::new(repository.clone(), config.pipeline.clone()),
            reconciler: Reconciler::new(repository),
            inter_stage_delay: Duration::from_secs(config.pipeline.inter_stage_delay_secs),
        }
    }

    /// Runs ingest, evaluation, execution, and reconciliation in order with
    /// a short pause between stages. The cycle is only a convenience; each
    /// stage stays independently re-runnable.
    pub async fn run_cycle(
        &self,
        simulator_filter: Option<Uuid>,
    ) -> Result<CycleSummary, EngineError> {
        info!("pipeline cycle starting");
        let ingest = self.ingestor.run(simulator_filter, None).await?;
        sleep(self.inter_stage_delay).await;
        let evaluation = self.evaluator.run(simulator_filter, None).await?;
        sleep(self.inter_stage_delay).await;
        let execution = self.executor.run(simulator_filter).await?;
        sleep(self.inter_stage_delay).await;
        let reconcile = self.reconciler.run(simulator_filter).await?;
        info!("pipeline cycle complete");
        Ok(CycleSummary {
            ingest,
            evaluation,
            execution,
            reconcile,
        })
    }
}
