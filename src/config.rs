//! Engine configuration.
//!
//! Defaults suit most uses. `EngineConfig::from_env` lets an embedding
//! process tune the engine without code changes:
//!
//! | Variable                      | Setting                       | Default |
//! |-------------------------------|-------------------------------|---------|
//! | `EMBERKV_SHARDS`              | number of keyspace shards     | 64      |
//! | `EMBERKV_SWEEP_INTERVAL_MS`   | base sweeper interval         | 100     |
//! | `EMBERKV_SWEEP_BATCH`         | max evictions per shard/pass  | 64      |
//! | `EMBERKV_SWEEPER`             | `0`/`false` disables sweeper  | on      |

use std::time::Duration;

use crate::error::ConfigError;
use crate::storage::{ExpiryConfig, DEFAULT_SHARDS};

/// Upper bound on the shard count.
pub const MAX_SHARDS: usize = 16 * 1024;

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of keyspace shards (default: 64)
    pub shards: usize,

    /// Whether to run the background expiry sweeper (default: true)
    pub sweeper: bool,

    /// Sweeper tuning
    pub expiry: ExpiryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            sweeper: true,
            expiry: ExpiryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(shards) = parse_var(&lookup, "EMBERKV_SHARDS")? {
            config.shards = shards;
        }
        if let Some(ms) = parse_var(&lookup, "EMBERKV_SWEEP_INTERVAL_MS")? {
            config.expiry.base_interval = Duration::from_millis(ms);
        }
        if let Some(batch) = parse_var(&lookup, "EMBERKV_SWEEP_BATCH")? {
            config.expiry.batch_size = batch;
        }
        if let Some(raw) = lookup("EMBERKV_SWEEPER") {
            config.sweeper = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: "EMBERKV_SWEEPER",
                        value: raw,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is within range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 || self.shards > MAX_SHARDS {
            return Err(ConfigError::Invalid(format!(
                "shard count must be between 1 and {}, got {}",
                MAX_SHARDS, self.shards
            )));
        }
        if self.expiry.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "sweeper batch size must be at least 1".to_string(),
            ));
        }
        let expiry = &self.expiry;
        if expiry.min_interval.is_zero()
            || expiry.min_interval > expiry.max_interval
            || expiry.base_interval < expiry.min_interval
            || expiry.base_interval > expiry.max_interval
        {
            return Err(ConfigError::Invalid(format!(
                "sweeper intervals must satisfy 0 < min ({:?}) <= base ({:?}) <= max ({:?})",
                expiry.min_interval, expiry.base_interval, expiry.max_interval
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
    }
}
