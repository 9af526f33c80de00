//! Serde DTOs for the Yahoo Finance v8 chart API.
//!
//! Yahoo has no official API; these shapes follow what the endpoint actually
//! serves and may change without notice. Every OHLCV column is a vector of
//! optionals because non-trading days are padded with nulls.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartOutcome,
}

#[derive(Debug, Deserialize)]
pub struct ChartOutcome {
    pub result: Option<Vec<ChartSeries>>,
    pub error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartApiError {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ChartSeries {
    pub timestamp: Option<Vec<i64>>,
    pub indicators: Indicators,
}

#[derive(Debug, Deserialize)]
pub struct Indicators {
    pub quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteBlock {
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<u64>>,
}
