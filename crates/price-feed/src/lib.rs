//! # Vellum Price Feed
//!
//! Daily OHLCV bars from Yahoo's v8 chart API. The `DailyBarProvider` trait
//! is the contract the ingest stage uses, allowing the underlying
//! implementation (live client or test double) to be swapped out.
//!
//! One symbol failing never fails a batch: exhausted retries degrade to the
//! symbol being absent from the returned map, and the ingest stage records
//! it as skipped.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use configuration::FeedSettings;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::responses::ChartResponse;

pub mod error;
pub mod responses;

// --- Public API ---
pub use error::FeedError;

/// A bar as the provider reports it, before the ingest stage stamps it with
/// provenance and stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderBar {
    pub day: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// The generic, abstract interface for a daily-bar price source.
#[async_trait]
pub trait DailyBarProvider: Send + Sync {
    /// Short name stamped into each stored bar's provenance column.
    fn source(&self) -> &'static str;

    /// Fetches daily bars for every symbol over the inclusive date range.
    ///
    /// Symbols that could not be fetched are absent from the returned map;
    /// the caller decides what absence means. An `Err` is reserved for
    /// failures that doom the whole batch.
    async fn fetch_daily_bars(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Vec<ProviderBar>>, FeedError>;
}

/// A concrete `DailyBarProvider` for the Yahoo Finance chart endpoint.
#[derive(Clone)]
pub struct YahooChartClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooChartClient {
    pub fn new(settings: &FeedSettings) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            // Yahoo serves browsers; a bare reqwest UA gets 429'd quickly.
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        })
    }

    /// Build the chart API URL for a symbol and inclusive date range.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end_ts = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        format!(
            "{}/v8/finance/chart/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url
        )
    }

    /// Parse a chart response into provider bars.
    ///
    /// Rows where every OHLCV column is null are non-trading days and are
    /// dropped. Rows missing only part of the OHLC set are unusable and are
    /// dropped too, with a debug log.
    fn parse_chart(symbol: &str, response: ChartResponse) -> Result<Vec<ProviderBar>, FeedError> {
        let result = response.chart.result.ok_or_else(|| {
            if let Some(err) = response.chart.error {
                FeedError::ChartError {
                    symbol: symbol.to_string(),
                    code: err.code,
                    description: err.description,
                }
            } else {
                FeedError::MalformedResponse("empty result with no error".to_string())
            }
        })?;

        let series = result
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::MalformedResponse("result array is empty".to_string()))?;

        let timestamps = series
            .timestamp
            .ok_or_else(|| FeedError::MalformedResponse("no timestamps".to_string()))?;

        let quote = series
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::MalformedResponse("no quote data".to_string()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let day = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    FeedError::MalformedResponse(format!("invalid timestamp: {ts}"))
                })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // All-null rows are holidays/non-trading days.
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            let (Some(open), Some(high), Some(low), Some(close)) = (
                open.and_then(to_price),
                high.and_then(to_price),
                low.and_then(to_price),
                close.and_then(to_price),
            ) else {
                tracing::debug!("price feed: {} {} has partial OHLC, dropping row", symbol, day);
                continue;
            };

            bars.push(ProviderBar {
                day,
                open,
                high,
                low,
                close,
                volume: volume.map(Decimal::from).unwrap_or(Decimal::ZERO),
            });
        }

        if bars.is_empty() {
            return Err(FeedError::NoData {
                symbol: symbol.to_string(),
            });
        }

        Ok(bars)
    }

    /// One symbol, with bounded exponential-backoff retries. Timeouts and
    /// server errors are retried; a malformed body is not.
    async fn fetch_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderBar>, FeedError> {
        let url = self.chart_url(symbol, start, end);
        let mut last_error: Option<FeedError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(FeedError::RateLimited);
                        continue;
                    }
                    if !status.is_success() {
                        last_error = Some(FeedError::Status {
                            symbol: symbol.to_string(),
                            status: status.as_u16(),
                        });
                        continue;
                    }

                    let chart: ChartResponse = response.json().await.map_err(|e| {
                        FeedError::MalformedResponse(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_chart(symbol, chart);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = Some(e.into());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error.unwrap_or(FeedError::RetriesExhausted {
            symbol: symbol.to_string(),
            attempts: self.max_retries + 1,
        }))
    }
}

#[async_trait]
impl DailyBarProvider for YahooChartClient {
    fn source(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_daily_bars(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Vec<ProviderBar>>, FeedError> {
        let mut bars_by_symbol = HashMap::new();

        // Sequential on purpose: Yahoo rate-limits aggressively and this is
        // a batch job, not a latency-sensitive path.
        for symbol in symbols {
            match self.fetch_symbol(symbol, start, end).await {
                Ok(bars) => {
                    tracing::debug!("price feed: {} returned {} bars", symbol, bars.len());
                    bars_by_symbol.insert(symbol.clone(), bars);
                }
                Err(e) => {
                    tracing::warn!("price feed: skipping {}: {}", symbol, e);
                }
            }
        }

        Ok(bars_by_symbol)
    }
}

fn to_price(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|price| price.round_dp(4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings() -> FeedSettings {
        FeedSettings {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }

    #[test]
    fn chart_url_covers_the_whole_range() {
        let client = YahooChartClient::new(&settings()).unwrap();
        let url = client.chart_url(
            "ACME",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        );
        assert_eq!(
            url,
            "https://query1.finance.yahoo.com/v8/finance/chart/ACME\
             ?period1=1704153600&period2=1704499199&interval=1d"
        );
    }

    #[test]
    fn parse_drops_null_rows_and_keeps_the_rest() {
        let payload = r#"{
            "chart": {
                "result": [{
                    "meta": {"currency": "USD", "symbol": "ACME"},
                    "timestamp": [1704153600, 1704240000, 1704326400],
                    "indicators": {
                        "quote": [{
                            "open":   [184.35, null, 186.06],
                            "high":   [186.95, null, 186.74],
                            "low":    [183.82, null, 184.21],
                            "close":  [185.64, null, 184.25],
                            "volume": [82488700, null, 58414500]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let response: ChartResponse = serde_json::from_str(payload).unwrap();
        let bars = YahooChartClient::parse_chart("ACME", response).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].day, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].close, dec!(185.64));
        assert_eq!(bars[0].volume, dec!(82488700));
        assert_eq!(bars[1].day, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn parse_surfaces_the_api_error_node() {
        let payload = r#"{
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        }"#;
        let response: ChartResponse = serde_json::from_str(payload).unwrap();
        let err = YahooChartClient::parse_chart("NOPE", response).unwrap_err();
        assert!(matches!(err, FeedError::ChartError { .. }));
    }

    #[test]
    fn parse_rejects_all_null_series() {
        let payload = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1704153600],
                    "indicators": {
                        "quote": [{
                            "open": [null], "high": [null], "low": [null],
                            "close": [null], "volume": [null]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let response: ChartResponse = serde_json::from_str(payload).unwrap();
        let err = YahooChartClient::parse_chart("ACME", response).unwrap_err();
        assert!(matches!(err, FeedError::NoData { .. }));
    }
}
