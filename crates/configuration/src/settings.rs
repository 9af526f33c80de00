use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedSettings,
    pub pipeline: PipelineSettings,
    pub simulator_defaults: SimulatorDefaults,
}

/// Parameters for the daily-bar price feed client.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    /// Base URL of the chart API, e.g. "https://query1.finance.yahoo.com".
    pub base_url: String,
    /// Per-request timeout. Slow responses count as a failed attempt.
    pub request_timeout_secs: u64,
    /// How many times to attempt one symbol before giving up on it.
    pub max_retries: u32,
    /// First retry delay; doubles on every subsequent attempt.
    pub retry_base_delay_ms: u64,
}

/// Tuning knobs for the pipeline stages.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// How many pending signals one execution pass claims per simulator.
    pub signal_batch_limit: i64,
    /// Reference prices older than this many calendar days are unusable.
    pub max_price_age_days: i64,
    /// Length of the trailing bar window handed to strategies, in days.
    pub price_window_days: i64,
    /// Pause between stages when running the full cycle.
    pub inter_stage_delay_secs: u64,
}

/// Execution settings applied to newly created simulators unless overridden.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorDefaults {
    pub starting_cash: Decimal,
    /// Fee charged on the slipped notional, e.g. 0.001 for 0.1%.
    pub fee_rate: Decimal,
    /// Adverse price adjustment applied to fills, e.g. 0.0005 for 5 bps.
    pub slippage_rate: Decimal,
}

/// Parameters for the simple moving average crossover strategy. These live in
/// each simulator's JSON parameter bag, not in config.toml; the serde defaults
/// make an empty bag `{}` a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaCrossoverParams {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
}

fn default_short_window() -> usize {
    5
}

fn default_long_window() -> usize {
    20
}

impl Default for SmaCrossoverParams {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
        }
    }
}

/// Parameters for the mean-reversion threshold strategy: buy when the close
/// dips far enough below the trailing mean, sell when it stretches above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRuleParams {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Buy when close <= mean * (1 - buy_below_pct).
    #[serde(default = "default_buy_below_pct")]
    pub buy_below_pct: Decimal,
    /// Sell (while holding) when close >= mean * (1 + sell_above_pct).
    #[serde(default = "default_sell_above_pct")]
    pub sell_above_pct: Decimal,
}

fn default_lookback() -> usize {
    20
}

fn default_buy_below_pct() -> Decimal {
    dec!(0.03)
}

fn default_sell_above_pct() -> Decimal {
    dec!(0.05)
}

impl Default for ThresholdRuleParams {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            buy_below_pct: default_buy_below_pct(),
            sell_above_pct: default_sell_above_pct(),
        }
    }
}

/// Per-simulator order sizing rule, stored as a tagged JSON object, e.g.
/// `{"rule": "cash_fraction", "fraction": "0.25"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SizingConfig {
    /// Always order a fixed number of shares.
    FixedShares { shares: Decimal },
    /// Spend a fixed fraction of the working cash balance per buy.
    CashFraction { fraction: Decimal },
}
