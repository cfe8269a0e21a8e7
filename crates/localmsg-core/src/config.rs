//! Outbox configuration.
//!
//! Loaded by the host process (a JSON file in the demo binary). Every field
//! has a default, so `{}` is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::backoff::IdleBackoff;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables shared by the coordinator, the publisher and the reconcilers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Bound on each store call and each broker send.
    pub op_timeout_ms: u64,

    /// A pending row untouched for this long is picked up by the reconciler.
    pub stale_after_ms: u64,

    /// Maximum rows fetched per reconcile cycle.
    pub batch_limit: usize,

    /// Sleep policy after cycles that made no progress.
    pub idle_backoff: IdleBackoff,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: 3_000,
            stale_after_ms: 3_000,
            batch_limit: 10,
            idle_backoff: IdleBackoff::default(),
        }
    }
}

impl OutboxConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.op_timeout_ms == 0 {
            return Err(ConfigError::Invalid("op_timeout_ms must be > 0".into()));
        }
        if i64::try_from(self.stale_after_ms).is_err() {
            return Err(ConfigError::Invalid(
                "stale_after_ms must fit in a signed 64-bit millisecond count".into(),
            ));
        }
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("batch_limit must be > 0".into()));
        }
        if self.idle_backoff.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "idle_backoff.multiplier must be >= 1.0".into(),
            ));
        }
        if self.idle_backoff.max_delay_ms < self.idle_backoff.base_delay_ms {
            return Err(ConfigError::Invalid(
                "idle_backoff.max_delay_ms must be >= base_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_json_gives_defaults() {
        let config = OutboxConfig::from_json_str("{}").unwrap();
        assert_eq!(config, OutboxConfig::default());
        assert_eq!(config.op_timeout(), Duration::from_secs(3));
        assert_eq!(config.stale_after(), Duration::from_secs(3));
        assert_eq!(config.batch_limit, 10);
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = OutboxConfig::from_json_str(
            r#"{"batch_limit": 50, "idle_backoff": {"max_delay_ms": 1000}}"#,
        )
        .unwrap();
        assert_eq!(config.batch_limit, 50);
        assert_eq!(config.idle_backoff.max_delay_ms, 1_000);
        assert_eq!(config.idle_backoff.base_delay_ms, IdleBackoff::default().base_delay_ms);
    }

    #[rstest]
    #[case::zero_timeout(r#"{"op_timeout_ms": 0}"#)]
    #[case::stale_after_beyond_i64(r#"{"stale_after_ms": 9223372036854775808}"#)]
    #[case::stale_after_max(r#"{"stale_after_ms": 18446744073709551615}"#)]
    #[case::zero_batch(r#"{"batch_limit": 0}"#)]
    #[case::shrinking_backoff(r#"{"idle_backoff": {"multiplier": 0.5}}"#)]
    #[case::inverted_bounds(r#"{"idle_backoff": {"base_delay_ms": 500, "max_delay_ms": 100}}"#)]
    fn invalid_configs_are_rejected(#[case] json: &str) {
        assert!(matches!(
            OutboxConfig::from_json_str(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn largest_signed_stale_after_is_accepted() {
        let config =
            OutboxConfig::from_json_str(r#"{"stale_after_ms": 9223372036854775807}"#).unwrap();
        assert_eq!(config.stale_after_ms, i64::MAX as u64);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            OutboxConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
