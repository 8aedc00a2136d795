//! Configuration management for the traffic monitor.
//!
//! This module handles loading and managing application configuration
//! from an optional TOML file and `MONITOR__*` environment variables.

use std::env;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use crate::models::Config;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 5000)?
        .set_default("pipeline.window_seconds", 5)?
        .set_default("pipeline.ingestion_capacity", 10_000)?
        .set_default("pipeline.decay_factor", 0.8)?
        .set_default("pipeline.start_monitoring", false)?
        .set_default("persistence.enabled", true)?
        .set_default("persistence.redis_url", "redis://127.0.0.1:6379")?
        .set_default("persistence.list_key", "ip_traffic")?
        .set_default("persistence.queue_capacity", 5_000)?
        .set_default("persistence.batch_size", 100)?
        .set_default("persistence.flush_interval_seconds", 2)?
        .set_default("metrics.enabled", true)?
        .set_default("metrics.listen", "0.0.0.0:9000")?
        .set_default("auto_block.risk_threshold", 90)?
        .add_source(File::with_name(&config_file).required(false))
        .add_source(Environment::with_prefix("MONITOR").separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        env::set_var("CONFIG_FILE", "does/not/exist.toml");
        let config = load_config().unwrap();

        assert_eq!(config.pipeline.window_seconds, 5);
        assert_eq!(config.pipeline.ingestion_capacity, 10_000);
        assert_eq!(config.persistence.batch_size, 100);
        assert_eq!(config.auto_block.risk_threshold, 90);
        assert!(config.scorer.model_path.is_none());
        assert!(config.capture.input.is_none());
    }
}
