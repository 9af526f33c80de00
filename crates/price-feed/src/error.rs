use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The chart API returned an error for {symbol}: {code}: {description}")]
    ChartError {
        symbol: String,
        code: String,
        description: String,
    },

    #[error("Failed to deserialize the chart response: {0}")]
    MalformedResponse(String),

    #[error("No usable bars returned for {symbol}")]
    NoData { symbol: String },

    #[error("Rate limited by the provider")]
    RateLimited,

    #[error("HTTP status {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("Gave up on {symbol} after {attempts} attempts")]
    RetriesExhausted { symbol: String, attempts: u32 },
}
