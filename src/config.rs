//! Limiter configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for a [`crate::KeyedLimiter`].
///
/// The default capacity and interval apply to buckets created implicitly
/// on first sight of a key; [`crate::KeyedLimiter::add_key`] can override
/// them per key. `stale_after` is the idle time after which a fully
/// replenished bucket is dropped from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Token capacity for implicitly created buckets
    #[serde(default = "default_capacity")]
    pub default_capacity: u32,
    /// Refill period for implicitly created buckets
    #[serde(default = "default_interval")]
    pub default_interval: Duration,
    /// Idle time after which a full bucket is evicted
    #[serde(default = "default_stale_after")]
    pub stale_after: Duration,
}

fn default_capacity() -> u32 {
    60
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(60)
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
            default_interval: default_interval(),
            stale_after: default_stale_after(),
        }
    }
}

impl LimiterConfig {
    /// Configuration with the given per-key defaults and the standard
    /// one-minute staleness threshold.
    pub fn new(default_capacity: u32, default_interval: Duration) -> Self {
        Self {
            default_capacity,
            default_interval,
            stale_after: default_stale_after(),
        }
    }

    /// Reject zero capacity or zero durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bucket_params(self.default_capacity, self.default_interval)?;
        if self.stale_after.is_zero() {
            return Err(ConfigError::ZeroStaleAfter);
        }
        Ok(())
    }
}

/// Shared validation for bucket parameters, used by the config and by
/// explicit per-key registration.
pub(crate) fn validate_bucket_params(
    capacity: u32,
    interval: Duration,
) -> Result<(), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LimiterConfig::default();
        assert_eq!(config.default_capacity, 60);
        assert_eq!(config.default_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new_uses_standard_staleness() {
        let config = LimiterConfig::new(5, Duration::from_secs(10));
        assert_eq!(config.default_capacity, 5);
        assert_eq!(config.default_interval, Duration::from_secs(10));
        assert_eq!(config.stale_after, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = LimiterConfig::new(0, Duration::from_secs(10));
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = LimiterConfig::new(5, Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn test_validate_rejects_zero_staleness() {
        let config = LimiterConfig {
            default_capacity: 5,
            default_interval: Duration::from_secs(10),
            stale_after: Duration::ZERO,
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroStaleAfter));
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let config: LimiterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_capacity, 60);
        assert_eq!(config.default_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(60));
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = LimiterConfig {
            default_capacity: 5,
            default_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(120),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: LimiterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.default_capacity, 5);
        assert_eq!(back.default_interval, Duration::from_secs(10));
        assert_eq!(back.stale_after, Duration::from_secs(120));
    }
}
