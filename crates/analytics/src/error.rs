use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("No stored price available to value position in '{symbol}'")]
    MissingPrice { symbol: String },
}
