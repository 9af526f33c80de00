use core_types::CoreError;
use thiserror::Error;

/// Errors returned by the persistence layer.
#[derive(Error, Debug)]
pub enum DbError {
    /// The database connection could not be established or configured.
    #[error("Database connection error: {0}")]
    ConnectionConfigError(String),

    /// A query failed to execute.
    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    /// A schema migration failed to apply.
    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into its domain type.
    #[error("Failed to decode stored value: {0}")]
    DecodeError(String),

    /// The requested entity does not exist.
    #[error("The requested entity was not found")]
    NotFound,
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        DbError::DecodeError(err.to_string())
    }
}
