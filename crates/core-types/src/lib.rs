pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{PipelineStage, SignalAction, SignalStatus, StrategyId, TradeSide};
pub use error::CoreError;
pub use structs::{
    CashLedgerEntry, Decision, Holding, NewSimulator, PipelineCheckpoint, PortfolioSnapshot,
    Position, PriceBar, Signal, Simulator, TrackedSymbol, Trade,
};
