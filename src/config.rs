//! Session tuning knobs.
//!
//! Every field has a default matching the shipped web client, so hosts only
//! override what they need:
//!
//! ```
//! let config = tap_sync::SessionConfig::from_json(r#"{"flush_threshold": 20}"#).unwrap();
//! assert_eq!(config.flush_threshold, 20);
//! assert_eq!(config.regen_period_ms, 1_000);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::Millis;

const MINUTE_MS: Millis = 60_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Queue length that triggers an immediate flush.
    pub flush_threshold: usize,
    /// Age of the oldest unflushed tap that triggers a flush.
    pub flush_debounce_ms: Millis,
    /// Interval recorded for the first tap of a session.
    pub first_tap_interval_ms: Millis,
    /// First hold-off after a failed flush; doubles per consecutive failure.
    pub retry_backoff_base_ms: Millis,
    pub retry_backoff_max_ms: Millis,

    pub regen_period_ms: Millis,
    /// Energy restored per period (doubled by the energy booster).
    pub regen_per_tick: u32,
    /// Most regeneration periods applied by one update after a long gap.
    pub regen_max_catch_up_ticks: u32,

    pub autoclicker_period_ms: Millis,

    pub expiry_check_period_ms: Millis,
    /// Remaining time at which a booster starts warning.
    pub expiry_warning_threshold_ms: Millis,
    /// Width of a warning bucket, in minutes left.
    pub warning_bucket_minutes: u32,
    /// How long a shown warning stays suppressed.
    pub warning_dedup_window_ms: Millis,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 10,
            flush_debounce_ms: 500,
            first_tap_interval_ms: 100,
            retry_backoff_base_ms: 1_000,
            retry_backoff_max_ms: 30_000,
            regen_period_ms: 1_000,
            regen_per_tick: 1,
            regen_max_catch_up_ticks: 5,
            autoclicker_period_ms: 2_000,
            expiry_check_period_ms: 10 * MINUTE_MS,
            expiry_warning_threshold_ms: 10 * MINUTE_MS,
            warning_bucket_minutes: 10,
            warning_dedup_window_ms: 60 * MINUTE_MS,
        }
    }
}

impl SessionConfig {
    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(value: u64, field: &'static str) -> Result<(), ConfigError> {
            if value == 0 {
                Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero",
                })
            } else {
                Ok(())
            }
        }

        positive(self.flush_threshold as u64, "flush_threshold")?;
        positive(self.flush_debounce_ms, "flush_debounce_ms")?;
        positive(self.retry_backoff_base_ms, "retry_backoff_base_ms")?;
        positive(self.regen_period_ms, "regen_period_ms")?;
        positive(self.regen_max_catch_up_ticks as u64, "regen_max_catch_up_ticks")?;
        positive(self.autoclicker_period_ms, "autoclicker_period_ms")?;
        positive(self.expiry_check_period_ms, "expiry_check_period_ms")?;
        positive(self.warning_bucket_minutes as u64, "warning_bucket_minutes")?;

        if self.retry_backoff_max_ms < self.retry_backoff_base_ms {
            return Err(ConfigError::Invalid {
                field: "retry_backoff_max_ms",
                reason: "must not be below retry_backoff_base_ms",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_object_gives_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn partial_override() {
        let config =
            SessionConfig::from_json(r#"{"flush_threshold": 25, "autoclicker_period_ms": 5000}"#)
                .unwrap();
        assert_eq!(config.flush_threshold, 25);
        assert_eq!(config.autoclicker_period_ms, 5_000);
        assert_eq!(config.flush_debounce_ms, 500);
    }

    #[test]
    fn zero_threshold_rejected() {
        let err = SessionConfig::from_json(r#"{"flush_threshold": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "flush_threshold",
                ..
            }
        ));
    }

    #[test]
    fn backoff_cap_below_base_rejected() {
        let err = SessionConfig::from_json(
            r#"{"retry_backoff_base_ms": 5000, "retry_backoff_max_ms": 1000}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "retry_backoff_max_ms",
                ..
            }
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SessionConfig::from_json("{flush_threshold").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
