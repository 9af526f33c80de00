use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SizingError {
    #[error("Sizing parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("The provided fill price ({0}) is zero or negative.")]
    InvalidFillPrice(Decimal),
}
