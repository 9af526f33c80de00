use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A point-in-time valuation of one simulator's portfolio.
///
/// This struct is the output of the `AnalyticsEngine` and is what the
/// reconciler logs and stores in its checkpoint detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub as_of: DateTime<Utc>,

    // I. Components
    pub cash: Decimal,
    pub market_value: Decimal,

    // II. Derived Totals
    pub equity: Decimal,
    pub unrealized_pnl: Decimal,
    /// `None` when the simulator's starting cash is not positive, which
    /// would make the percentage undefined.
    pub return_since_inception_pct: Option<Decimal>,
}
