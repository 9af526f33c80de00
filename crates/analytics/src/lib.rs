//! # Vellum Analytics Engine
//!
//! This crate values a reconciled portfolio. It acts as the "unbiased judge"
//! of a simulator's performance: cash plus holdings marked at the latest
//! stored close, with no knowledge of how those holdings came to be.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** This crate has no knowledge of external systems. It
//!   depends only on `core-types`.
//! - **Stateless Calculation:** The `AnalyticsEngine` takes a portfolio and a
//!   price map as input and produces a `PerformanceSnapshot` as output. This
//!   makes it highly reliable and easy to test.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The main struct that contains the valuation logic.
//! - `PerformanceSnapshot`: The standardized struct holding the valuation.
//! - `AnalyticsError`: The specific error types that can be returned.

pub mod engine;
pub mod error;
pub mod snapshot;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use snapshot::PerformanceSnapshot;
