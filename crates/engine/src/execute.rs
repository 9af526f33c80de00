use crate::error::EngineError;
use crate::replay::apply_trade;
use crate::summary::ExecutionSummary;
use chrono::{NaiveDate, Utc};
use configuration::PipelineSettings;
use core_types::{
    Holding, PipelineCheckpoint, PipelineStage, PortfolioSnapshot, PriceBar, Signal, SignalStatus,
    Simulator, Trade, TradeSide,
};
use database::{DbError, Repository};
use futures::future::join_all;
use rust_decimal::Decimal;
use sizing::{SizingRule, build_sizing_rule};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What the execution pass decided to do with one pending signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Planned {
    /// Settle the signal as executed; `None` is a hold with no fill.
    Execute(Option<PlannedFill>),
    /// A business rule declined the signal.
    Skip(SkipReason),
    /// The signal cannot be executed from its current state.
    Fail(FailReason),
}

/// A fully priced order ready to append to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFill {
    pub side: TradeSide,
    pub quantity: Decimal,
    /// Reference close after adverse slippage.
    pub price: Decimal,
    pub fee: Decimal,
    /// Signed change to working cash when this fill applies.
    pub cash_delta: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientCash,
    NoPosition,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::InsufficientCash => "insufficient cash",
            SkipReason::NoPosition => "no position",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    NoUsablePrice,
    NonPositiveQuantity,
}

impl FailReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailReason::NoUsablePrice => "no usable price",
            FailReason::NonPositiveQuantity => "non-positive quantity",
        }
    }
}

/// Prices one signal against the working balance. Pure: no store access, no
/// clock reads, no mutation.
///
/// The reference price is the latest stored bar, not the price the strategy
/// saw; a bar older than `max_price_age_days` (or absent, or non-positive)
/// fails the signal. Buys pay `close * (1 + slippage)`, sells receive
/// `close * (1 - slippage)`, and the fee applies to the slipped notional in
/// both directions.
pub fn plan_signal(
    signal: &Signal,
    simulator: &Simulator,
    sizing_rule: &dyn SizingRule,
    latest_bar: Option<&PriceBar>,
    today: NaiveDate,
    max_price_age_days: i64,
    working: &PortfolioSnapshot,
) -> Result<Planned, EngineError> {
    let Some(bar) = latest_bar else {
        return Ok(Planned::Fail(FailReason::NoUsablePrice));
    };
    if (today - bar.day).num_days() > max_price_age_days || bar.close <= Decimal::ZERO {
        return Ok(Planned::Fail(FailReason::NoUsablePrice));
    }

    let Some(side) = signal.action.trade_side() else {
        return Ok(Planned::Execute(None));
    };

    match side {
        TradeSide::Buy => {
            let fill = (bar.close * (Decimal::ONE + simulator.slippage_rate)).round_dp(4);
            let quantity = sizing_rule.order_quantity(fill, working.cash)?;
            if quantity <= Decimal::ZERO {
                return Ok(Planned::Fail(FailReason::NonPositiveQuantity));
            }
            let gross = (quantity * fill).round_dp(4);
            let fee = (gross * simulator.fee_rate).round_dp(4);
            let required = gross + fee;
            if required > working.cash {
                return Ok(Planned::Skip(SkipReason::InsufficientCash));
            }
            Ok(Planned::Execute(Some(PlannedFill {
                side,
                quantity,
                price: fill,
                fee,
                cash_delta: -required,
            })))
        }
        TradeSide::Sell => {
            let held = working.shares(&signal.symbol);
            if held <= Decimal::ZERO {
                return Ok(Planned::Skip(SkipReason::NoPosition));
            }
            let fill = (bar.close * (Decimal::ONE - simulator.slippage_rate)).round_dp(4);
            let quantity = sizing_rule.order_quantity(fill, working.cash)?.min(held);
            if quantity <= Decimal::ZERO {
                return Ok(Planned::Fail(FailReason::NonPositiveQuantity));
            }
            let gross = (quantity * fill).round_dp(4);
            let fee = (gross * simulator.fee_rate).round_dp(4);
            Ok(Planned::Execute(Some(PlannedFill {
                side,
                quantity,
                price: fill,
                fee,
                cash_delta: gross - fee,
            })))
        }
    }
}

/// Turns pending signals into ledger entries, one simulator at a time.
#[derive(Clone)]
pub struct ExecutionEngine {
    repository: Repository,
    settings: PipelineSettings,
}

enum SimulatorRun {
    LockedOut,
    Completed(SimulatorCounts),
}

#[derive(Debug, Default, Clone, Copy)]
struct SimulatorCounts {
    processed: usize,
    executed: usize,
    skipped: usize,
    failed: usize,
    trades_created: usize,
}

impl ExecutionEngine {
    pub fn new(repository: Repository, settings: PipelineSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Runs one execution pass. Simulators are processed concurrently; the
    /// signals within one simulator strictly in order against its working
    /// balance.
    pub async fn run(
        &self,
        simulator_filter: Option<Uuid>,
    ) -> Result<ExecutionSummary, EngineError> {
        let simulator_ids = match simulator_filter {
            Some(id) => vec![id],
            None => self.repository.simulators_with_pending_signals().await?,
        };

        let mut handles = Vec::new();
        for simulator_id in simulator_ids {
            let engine = self.clone();
            handles.push(tokio::spawn(async move {
                engine.run_for_simulator(simulator_id).await
            }));
        }

        let mut summary = ExecutionSummary::default();
        let mut first_error: Option<EngineError> = None;
        for result in join_all(handles).await {
            match result {
                Ok(Ok(SimulatorRun::LockedOut)) => summary.simulators_locked_out += 1,
                Ok(Ok(SimulatorRun::Completed(counts))) => {
                    summary.simulators_processed += 1;
                    summary.signals_processed += counts.processed;
                    summary.executed += counts.executed;
                    summary.skipped += counts.skipped;
                    summary.failed += counts.failed;
                    summary.trades_created += counts.trades_created;
                }
                Ok(Err(e)) => {
                    error!(error = %e, "execution pass failed for a simulator");
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
            simulators = summary.simulators_processed,
            executed = summary.executed,
            skipped = summary.skipped,
            failed = summary.failed,
            trades = summary.trades_created,
            "execution pass complete"
        );
        Ok(summary)
    }

    async fn run_for_simulator(&self, simulator_id: Uuid) -> Result<SimulatorRun, EngineError> {
        let Some(lock) = self
            .repository
            .lock_simulator(PipelineStage::Execution, simulator_id)
            .await?
        else {
            warn!(%simulator_id, "another session is executing this simulator, skipping");
            return Ok(SimulatorRun::LockedOut);
        };

        let result = self.execute_pending(simulator_id).await;
        lock.release().await?;
        result.map(SimulatorRun::Completed)
    }

    async fn execute_pending(&self, simulator_id: Uuid) -> Result<SimulatorCounts, EngineError> {
        let simulator = match self.repository.simulator_by_id(simulator_id).await {
            Ok(simulator) => simulator,
            Err(DbError::NotFound) => return self.fail_orphaned_signals(simulator_id).await,
            Err(e) => return Err(e.into()),
        };

        let signals = self
            .repository
            .pending_signals(simulator_id, self.settings.signal_batch_limit)
            .await?;
        if signals.is_empty() {
            return Ok(SimulatorCounts::default());
        }

        let sizing_rule = build_sizing_rule(&simulator.sizing)?;

        // Working balance seeded from stored state. It steers sizing and the
        // cash gate inside this pass only and is never written back; the
        // reconciler's replay is what updates stored state.
        let positions = self.repository.positions_for(simulator_id).await?;
        let mut working = PortfolioSnapshot {
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

        let today = Utc::now().date_naive();
        let mut counts = SimulatorCounts::default();

        for signal in &signals {
            counts.processed += 1;
            let latest_bar = self.repository.latest_price_bar(&signal.symbol).await?;
            let planned = plan_signal(
                signal,
                &simulator,
                sizing_rule.as_ref(),
                latest_bar.as_ref(),
                today,
                self.settings.max_price_age_days,
                &working,
            )?;

            match planned {
                Planned::Execute(None) => {
                    if self
                        .repository
                        .transition_signal(signal.signal_id, SignalStatus::Executed, Some("hold, no trade"))
                        .await?
                    {
                        counts.executed += 1;
                        debug!(signal_id = %signal.signal_id, symbol = %signal.symbol, "hold signal settled");
                    }
                }
                Planned::Execute(Some(fill)) => {
                    let trade = Trade {
                        trade_id: Uuid::new_v4(),
                        simulator_id,
                        signal_id: signal.signal_id,
                        symbol: signal.symbol.clone(),
                        side: fill.side,
                        quantity: fill.quantity,
                        price: fill.price,
                        fee: fill.fee,
                        executed_at: Utc::now(),
                    };
                    let balance_after = working.cash + fill.cash_delta;
                    let reason = match fill.side {
                        TradeSide::Buy => "buy fill",
                        TradeSide::Sell => "sell fill",
                    };
                    if self
                        .repository
                        .record_execution(&trade, fill.cash_delta, balance_after, reason)
                        .await?
                    {
                        counts.executed += 1;
                        counts.trades_created += 1;
                        apply_trade(simulator_id, &mut working.cash, &mut working.positions, &trade)?;
                        info!(
                            symbol = %trade.symbol,
                            side = %trade.side,
                            quantity = %trade.quantity,
                            price = %trade.price,
                            fee = %trade.fee,
                            "trade recorded"
                        );
                    } else {
                        debug!(signal_id = %signal.signal_id, "signal already settled elsewhere");
                    }
                }
                Planned::Skip(reason) => {
                    if self
                        .repository
                        .transition_signal(signal.signal_id, SignalStatus::Skipped, Some(reason.as_str()))
                        .await?
                    {
                        counts.skipped += 1;
                        info!(signal_id = %signal.signal_id, symbol = %signal.symbol, reason = reason.as_str(), "signal skipped");
                    }
                }
                Planned::Fail(reason) => {
                    if self
                        .repository
                        .transition_signal(signal.signal_id, SignalStatus::Failed, Some(reason.as_str()))
                        .await?
                    {
                        counts.failed += 1;
                        warn!(signal_id = %signal.signal_id, symbol = %signal.symbol, reason = reason.as_str(), "signal failed");
                    }
                }
            }
        }

        self.write_checkpoint(simulator_id, &counts, today).await?;
        Ok(counts)
    }

    /// Signals whose simulator row has disappeared can never execute; fail
    /// them so they stop re-entering every pass.
    async fn fail_orphaned_signals(
        &self,
        simulator_id: Uuid,
    ) -> Result<SimulatorCounts, EngineError> {
        let signals = self
            .repository
            .pending_signals(simulator_id, self.settings.signal_batch_limit)
            .await?;
        let mut counts = SimulatorCounts::default();
        for signal in &signals {
            counts.processed += 1;
            if self
                .repository
                .transition_signal(signal.signal_id, SignalStatus::Failed, Some("missing simulator"))
                .await?
            {
                counts.failed += 1;
            }
        }
        warn!(%simulator_id, count = counts.failed, "failed signals referencing a missing simulator");
        Ok(counts)
    }

    async fn write_checkpoint(
        &self,
        simulator_id: Uuid,
        counts: &SimulatorCounts,
        today: NaiveDate,
    ) -> Result<(), EngineError> {
        let checkpoint = PipelineCheckpoint {
            stage: PipelineStage::Execution,
            simulator_id,
            last_run_on: today,
            outcome: "ok".to_string(),
            detail: serde_json::json!({
                "processed": counts.processed,
                "executed": counts.executed,
                "skipped": counts.skipped,
                "failed": counts.failed,
                "trades_created": counts.trades_created,
            }),
            updated_at: Utc::now(),
        };
        self.repository.upsert_checkpoint(&checkpoint).await?;
        Ok(())
    }
}
