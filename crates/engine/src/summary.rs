use serde::Serialize;

/// Outcome of one price-ingest pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub symbols_requested: usize,
    pub symbols_fetched: usize,
    pub symbols_skipped: usize,
    pub bars_written: u64,
}

/// Outcome of one evaluation pass across simulators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationSummary {
    pub simulators_evaluated: usize,
    /// Disabled, already evaluated for the date, or lock-style no-ops.
    pub simulators_skipped: usize,
    /// Simulators whose strategy could not even be constructed.
    pub simulators_failed: usize,
    pub signals_created: usize,
    /// Symbols with no usable bar window or an open pending signal.
    pub symbols_skipped: usize,
}

/// Outcome of one execution pass across simulators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    pub simulators_processed: usize,
    /// Another session held the advisory lock; retried next pass.
    pub simulators_locked_out: usize,
    pub signals_processed: usize,
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub trades_created: usize,
}

/// Outcome of one reconciliation pass across simulators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub simulators_reconciled: usize,
    pub simulators_locked_out: usize,
    pub trades_replayed: usize,
    pub positions_written: usize,
}

/// Outcome of one full pipeline cycle, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub ingest: IngestSummary,
    pub evaluation: EvaluationSummary,
    pub execution: ExecutionSummary,
    pub reconcile: ReconcileSummary,
}
