use rust_decimal::Decimal;

use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    Config, FeedSettings, PipelineSettings, SimulatorDefaults, SizingConfig, SmaCrossoverParams,
    ThresholdRuleParams,
};

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the configuration file,
/// deserializes it into our strongly-typed `Config` struct, and returns it.
pub fn load_config() -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        // Tells the builder to look for a file named `config.toml`
        .add_source(config::File::with_name("config.toml"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    validate(&config)?;

    Ok(config)
}

/// Rejects configurations that would make the pipeline misbehave silently.
fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.pipeline.signal_batch_limit < 1 {
        return Err(ConfigError::ValidationError(
            "pipeline.signal_batch_limit must be at least 1".to_string(),
        ));
    }
    if config.pipeline.price_window_days < 1 {
        return Err(ConfigError::ValidationError(
            "pipeline.price_window_days must be at least 1".to_string(),
        ));
    }
    if config.simulator_defaults.starting_cash <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "simulator_defaults.starting_cash must be positive".to_string(),
        ));
    }
    for (name, rate) in [
        ("fee_rate", config.simulator_defaults.fee_rate),
        ("slippage_rate", config.simulator_defaults.slippage_rate),
    ] {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(ConfigError::ValidationError(format!(
                "simulator_defaults.{name} must be in [0, 1)"
            )));
        }
    }
    Ok(())
}
