use crate::error::EngineError;
use crate::summary::EvaluationSummary;
use chrono::{Duration, NaiveDate, Utc};
use configuration::PipelineSettings;
use core_types::{
    Holding, PipelineCheckpoint, PipelineStage, PortfolioSnapshot, Signal, SignalStatus, Simulator,
};
use database::Repository;
use futures::future::join_all;
use strategies::build_strategy;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Runs the configured strategy over every enabled simulator's watchlist and
/// persists the resulting pending signals.
#[derive(Clone)]
pub struct StrategyEvaluator {
    repository: Repository,
    settings: PipelineSettings,
}

enum SimulatorEvaluation {
    /// A checkpoint shows this simulator was already evaluated for the date.
    AlreadyRan,
    /// The strategy could not be constructed from the stored parameters.
    Failed,
    Evaluated {
        signals_created: usize,
        symbols_skipped: usize,
    },
}

impl StrategyEvaluator {
    pub fn new(repository: Repository, settings: PipelineSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Evaluates every enabled simulator (or just one) for a date, today by
    /// default. Re-running for the same date is a no-op per simulator.
    pub async fn run(
        &self,
        simulator_filter: Option<Uuid>,
        evaluation_date: Option<NaiveDate>,
    ) -> Result<EvaluationSummary, EngineError> {
        let eval_date = evaluation_date.unwrap_or_else(|| Utc::now().date_naive());

        let simulators = match simulator_filter {
            Some(id) => vec![self.repository.simulator_by_id(id).await?],
            None => self.repository.enabled_simulators().await?,
        };

        let mut summary = EvaluationSummary::default();
        let mut handles = Vec::new();
        for simulator in simulators {
            if !simulator.enabled {
                warn!(simulator_id = %simulator.simulator_id, "simulator is disabled, not evaluating");
                summary.simulators_skipped += 1;
                continue;
            }
            let evaluator = self.clone();
            handles.push(tokio::spawn(async move {
                evaluator.evaluate_simulator(simulator, eval_date).await
            }));
        }

        let mut first_error: Option<EngineError> = None;
        for result in join_all(handles).await {
            match result {
                Ok(Ok(SimulatorEvaluation::AlreadyRan)) => summary.simulators_skipped += 1,
                Ok(Ok(SimulatorEvaluation::Failed)) => summary.simulators_failed += 1,
                Ok(Ok(SimulatorEvaluation::Evaluated {
                    signals_created,
                    symbols_skipped,
                })) => {
                    summary.simulators_evaluated += 1;
                    summary.signals_created += signals_created;
                    summary.symbols_skipped += symbols_skipped;
                }
                Ok(Err(e)) => {
                    error!(error = %e, "evaluation failed for a simulator");
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
            %eval_date,
            evaluated = summary.simulators_evaluated,
            signals = summary.signals_created,
            symbols_skipped = summary.symbols_skipped,
            "evaluation pass complete"
        );
        Ok(summary)
    }

    async fn evaluate_simulator(
        &self,
        simulator: Simulator,
        eval_date: NaiveDate,
    ) -> Result<SimulatorEvaluation, EngineError> {
        let simulator_id = simulator.simulator_id;

        if let Some(checkpoint) = self
            .repository
            .checkpoint(PipelineStage::Evaluation, simulator_id)
            .await?
        {
            if checkpoint.last_run_on >= eval_date {
                info!(%simulator_id, %eval_date, "already evaluated for this date, skipping");
                return Ok(SimulatorEvaluation::AlreadyRan);
            }
        }

        let strategy = match build_strategy(simulator.strategy_id, &simulator.strategy_params) {
            Ok(strategy) => strategy,
            Err(e) => {
                error!(%simulator_id, error = %e, "strategy construction failed");
                return Ok(SimulatorEvaluation::Failed);
            }
        };

        let positions = self.repository.positions_for(simulator_id).await?;
        let snapshot = PortfolioSnapshot {
            simulator_id,
            cash: simulator.cash_balance,
            positions: positions
                .into_iter()
                .map(|p| {
                    (
                        p.symbol,
                        Holding {
                            quantity: p.quantity,
                            avg_cost: p.avg_cost,
                        },
                    )
                })
                .collect(),
            as_of: Utc::now(),
        };

        let window_start = eval_date - Duration::days(self.settings.price_window_days);
        let now = Utc::now();
        let mut signals = Vec::new();
        let mut symbols_skipped = 0usize;

        for symbol in self.repository.enabled_symbols(simulator_id).await? {
            let bars = self
                .repository
                .price_history(&symbol, window_start, eval_date)
                .await?;
            let Some(latest) = bars.last() else {
                warn!(%simulator_id, %symbol, %eval_date, "no bars in window, skipping symbol");
                symbols_skipped += 1;
                continue;
            };
            if latest.day != eval_date {
                warn!(%simulator_id, %symbol, %eval_date, latest_day = %latest.day,
                    "no bar on the evaluation date, skipping symbol");
                symbols_skipped += 1;
                continue;
            }
            if self.repository.has_pending_signal(simulator_id, &symbol).await? {
                debug!(%simulator_id, %symbol, "pending signal already open, skipping symbol");
                symbols_skipped += 1;
                continue;
            }

            let decision = match strategy.decide(&bars, &snapshot, &symbol) {
                Ok(Some(decision)) => decision,
                Ok(None) => {
                    debug!(%simulator_id, %symbol, bars = bars.len(), "insufficient history, no signal");
                    symbols_skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(%simulator_id, %symbol, error = %e, "strategy evaluation failed, skipping symbol");
                    symbols_skipped += 1;
                    continue;
                }
            };

            signals.push(Signal {
                signal_id: Uuid::new_v4(),
                simulator_id,
                symbol: symbol.clone(),
                action: decision.action,
                reason: decision.reason,
                confidence: decision.confidence,
                strategy_id: simulator.strategy_id,
                ref_price: latest.close,
                status: SignalStatus::Pending,
                status_reason: None,
                created_at: now,
                executed_at: None,
            });
        }

        self.repository.insert_signals(&signals).await?;

        let checkpoint = PipelineCheckpoint {
            stage: PipelineStage::Evaluation,
            simulator_id,
            last_run_on: eval_date,
            outcome: "ok".to_string(),
            detail: serde_json::json!({
                "signals_created": signals.len(),
                "symbols_skipped": symbols_skipped,
            }),
            updated_at: Utc::now(),
        };
        self.repository.upsert_checkpoint(&checkpoint).await?;

        info!(%simulator_id, %eval_date, signals = signals.len(), skipped = symbols_skipped,
            "simulator evaluated");
        Ok(SimulatorEvaluation::Evaluated {
            signals_created: signals.len(),
            symbols_skipped,
        })
    }
}
