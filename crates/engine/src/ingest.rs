use crate::error::EngineError;
use crate::summary::IngestSummary;
use chrono::{NaiveDate, Utc};
use core_types::{PipelineCheckpoint, PipelineStage, PriceBar};
use database::Repository;
use price_feed::DailyBarProvider;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Fetches daily bars from the provider and upserts them keyed on
/// (symbol, day). Re-running a day overwrites bars in place, so corrected
/// vendor data always wins.
pub struct PriceIngestor {
    repository: Repository,
    provider: Arc<dyn DailyBarProvider>,
}

impl PriceIngestor {
    pub fn new(repository: Repository, provider: Arc<dyn DailyBarProvider>) -> Self {
        Self {
            repository,
            provider,
        }
    }

    /// The daily pass: fetch one day of bars for every enabled tracked
    /// symbol (or one simulator's symbols), today by default.
    pub async fn run(
        &self,
        simulator_filter: Option<Uuid>,
        day: Option<NaiveDate>,
    ) -> Result<IngestSummary, EngineError> {
        let day = day.unwrap_or_else(|| Utc::now().date_naive());
        let symbols = match simulator_filter {
            Some(id) => self.repository.enabled_symbols(id).await?,
            None => self.repository.all_enabled_symbols().await?,
        };
        self.ingest_range(&symbols, day, day).await
    }

    /// Fetches and upserts bars for an explicit symbol set over an inclusive
    /// date range. A symbol the provider returns nothing for is recorded as
    /// skipped, never a pass-wide failure.
    pub async fn ingest_range(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<IngestSummary, EngineError> {
        if symbols.is_empty() {
            return Err(EngineError::InvalidInput(
                "no symbols to ingest; track at least one symbol first".to_string(),
            ));
        }
        if end < start {
            return Err(EngineError::InvalidInput(format!(
                "ingest range ends ({end}) before it starts ({start})"
            )));
        }

        let fetched = self.provider.fetch_daily_bars(symbols, start, end).await?;

        let now = Utc::now();
        let source = self.provider.source();
        let mut summary = IngestSummary {
            symbols_requested: symbols.len(),
            ..Default::default()
        };
        let mut rows = Vec::new();
        for symbol in symbols {
            match fetched.get(symbol) {
                Some(bars) if !bars.is_empty() => {
                    summary.symbols_fetched += 1;
                    rows.extend(bars.iter().map(|bar| PriceBar {
                        bar_id: Uuid::new_v4(),
                        symbol: symbol.clone(),
                        day: bar.day,
                        open: bar.open,
                        high: bar.high,
                        low: bar.low,
                        close: bar.close,
                        volume: bar.volume,
                        source: source.to_string(),
                        fetched_at: now,
                    }));
                }
                _ => {
                    summary.symbols_skipped += 1;
                    warn!(%symbol, %start, %end, "provider returned no bars, symbol skipped");
                }
            }
        }

        summary.bars_written = self.repository.upsert_price_bars(&rows).await?;

        // Ingest is global, so the checkpoint is keyed on the nil simulator.
        let checkpoint = PipelineCheckpoint {
            stage: PipelineStage::PriceIngest,
            simulator_id: Uuid::nil(),
            last_run_on: end,
            outcome: "ok".to_string(),
            detail: serde_json::to_value(&summary)?,
            updated_at: now,
        };
        self.repository.upsert_checkpoint(&checkpoint).await?;

        info!(
            requested = summary.symbols_requested,
            fetched = summary.symbols_fetched,
            skipped = summary.symbols_skipped,
            bars = summary.bars_written,
            "price ingest complete"
        );
        Ok(summary)
    }
}
