use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Price feed error: {0}")]
    Feed(#[from] price_feed::FeedError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Sizing error: {0}")]
    Sizing(#[from] sizing::SizingError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The trade ledger contradicts itself; replay refuses to guess.
    #[error("Trade ledger for simulator {simulator_id} is corrupt: {detail}")]
    CorruptLedger { simulator_id: Uuid, detail: String },

    #[error("A per-simulator task panicked: {0}")]
    TaskPanic(String),
}
