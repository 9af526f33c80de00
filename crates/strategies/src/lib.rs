//! # Vellum Strategy Library
//!
//! This crate contains the decision logic for the simulation pipeline. It
//! defines a universal `Strategy` trait and provides the concrete
//! implementations behind each `StrategyId`.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** Strategies are functions of their inputs. They never
//!   touch the database, the clock, or the network, which is what makes every
//!   evaluation pass re-runnable and testable without infrastructure.
//! - **Window in, decision out:** `decide` receives the trailing bar window
//!   and a portfolio snapshot and returns at most one `Decision`. Returning
//!   `Ok(None)` means "not enough history to say anything" and produces no
//!   signal at all; an explicit hold is `Some(Decision)` like any other.
//! - **Extensibility:** Adding a strategy means a new module, a new
//!   `StrategyId` variant, and an arm in `build_strategy`. The compiler
//!   flags every place that needs touching.
//!
//! ## Public API
//!
//! - `Strategy`: the core trait all strategies implement.
//! - `build_strategy`: the factory from a `StrategyId` + JSON parameter bag.
//! - The concrete strategy structs themselves (e.g., `SmaCrossover`).

// Declare all the modules that constitute this crate.
pub mod error;
pub mod factory;
pub mod sma_crossover;
pub mod threshold_rule;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use factory::build_strategy;
pub use sma_crossover::SmaCrossover;
pub use threshold_rule::ThresholdRule;

// Re-export StrategyId from core_types
pub use core_types::enums::StrategyId;

use core_types::{Decision, PortfolioSnapshot, PriceBar};

/// The core trait that all trading strategies must implement.
///
/// `decide` takes `&self` rather than `&mut self`: a strategy is stateless
/// and recomputes whatever it needs from the full window it is handed, so
/// evaluating the same inputs twice always yields the same decision.
/// The `Send + Sync` bounds allow the evaluator to fan out across simulators
/// on tokio tasks.
pub trait Strategy: Send + Sync {
    /// Evaluates one symbol.
    ///
    /// # Arguments
    ///
    /// * `bars` - trailing daily bars for `symbol`, ascending by day, with
    ///   the evaluation day last.
    /// * `snapshot` - the simulator's current cash and positions.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Decision))` - the strategy's verdict, `hold` included.
    /// * `Ok(None)` - the window is too short to evaluate; emit nothing.
    /// * `Err(StrategyError)` - evaluation itself went wrong.
    fn decide(
        &self,
        bars: &[PriceBar],
        snapshot: &PortfolioSnapshot,
        symbol: &str,
    ) -> Result<Option<Decision>, StrategyError>;
}
