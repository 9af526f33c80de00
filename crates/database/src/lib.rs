//! # Vellum Database Crate
//!
//! Persistence layer for the paper-trading pipeline, backed by PostgreSQL
//! through `sqlx`. Every table the pipeline touches is reached through the
//! [`Repository`] so the stage code never holds raw SQL.
//!
//! ## Core Responsibilities
//!
//! - **Connection Management**: Builds the `PgPool` from `DATABASE_URL` and
//!   applies schema migrations at startup.
//! - **Repository**: Runtime-checked queries for bars, simulators, signals,
//!   trades, positions, the cash ledger, and pipeline checkpoints. Writes
//!   that must be atomic (signal settlement, reconciliation) run inside a
//!   single transaction.
//! - **Advisory Locks**: Session-scoped per-simulator locks that keep two
//!   processes from running the same pipeline stage against the same
//!   simulator at once.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::{Repository, SimulatorLock};
