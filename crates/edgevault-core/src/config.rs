//! Recognized configuration options.
//!
//! Field names serialize exactly as the options are documented for callers
//! (`sessionWindowMs`, `defaultBatchSize`, `defaultStartId`, ...), so a JSON or
//! CBOR config document maps onto [`EdgeConfig`] without translation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{payloads::MAX_PREKEYS_PER_RESPONSE, prekey::KeyId};

/// Default session lifetime: 24 hours.
pub const DEFAULT_SESSION_WINDOW_MS: u64 = 86_400_000;

/// Default number of prekeys minted per batch.
pub const DEFAULT_BATCH_SIZE: u32 = 20;

/// Default first key id of a batch.
pub const DEFAULT_START_ID: KeyId = 1000;

/// Largest `maxBatchSize` accepted. A whole batch outcome must fit one
/// response frame.
pub const MAX_BATCH_SIZE_LIMIT: u32 = MAX_PREKEYS_PER_RESPONSE as u32;

/// Upper bound on a single batch.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = MAX_BATCH_SIZE_LIMIT;

/// Default period of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `sessionWindowMs` was zero.
    #[error("sessionWindowMs must be greater than zero")]
    ZeroSessionWindow,

    /// `defaultBatchSize` outside `1..=maxBatchSize`.
    #[error("defaultBatchSize must be in 1..={max}, got {got}")]
    BatchSizeOutOfRange {
        /// Configured size
        got: u32,
        /// Configured maximum
        max: u32,
    },

    /// `maxBatchSize` above [`MAX_BATCH_SIZE_LIMIT`].
    #[error("maxBatchSize must be at most {limit}, got {got}")]
    MaxBatchSizeTooLarge {
        /// Configured maximum
        got: u32,
        /// Hard limit
        limit: u32,
    },

    /// `sweepIntervalMs` was zero.
    #[error("sweepIntervalMs must be greater than zero")]
    ZeroSweepInterval,
}

/// Options shared by the session gateway, prekey manager and sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeConfig {
    /// Session lifetime applied by create and refresh.
    pub session_window_ms: u64,
    /// Batch size used when a generate request omits `count`.
    pub default_batch_size: u32,
    /// First key id used when a generate request omits `start_id`.
    pub default_start_id: KeyId,
    /// Largest batch a single generate request may ask for.
    pub max_batch_size: u32,
    /// Period of the background expiry sweep.
    pub sweep_interval_ms: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            session_window_ms: DEFAULT_SESSION_WINDOW_MS,
            default_batch_size: DEFAULT_BATCH_SIZE,
            default_start_id: DEFAULT_START_ID,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl EdgeConfig {
    /// Session lifetime as a [`Duration`].
    pub fn session_window(&self) -> Duration {
        Duration::from_millis(self.session_window_ms)
    }

    /// Sweep period as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Reject values the gateway and manager cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_window_ms == 0 {
            return Err(ConfigError::ZeroSessionWindow);
        }
        if self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(ConfigError::MaxBatchSizeTooLarge {
                got: self.max_batch_size,
                limit: MAX_BATCH_SIZE_LIMIT,
            });
        }
        if self.default_batch_size == 0 || self.default_batch_size > self.max_batch_size {
            return Err(ConfigError::BatchSizeOutOfRange {
                got: self.default_batch_size,
                max: self.max_batch_size,
            });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_options() {
        let config = EdgeConfig::default();
        assert_eq!(config.session_window_ms, 86_400_000);
        assert_eq!(config.default_batch_size, 20);
        assert_eq!(config.default_start_id, 1000);
        assert_eq!(config.session_window(), Duration::from_secs(24 * 60 * 60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn options_use_camel_case_names() {
        let config = EdgeConfig { session_window_ms: 1000, ..EdgeConfig::default() };

        let mut bytes = Vec::new();
        ciborium::into_writer(&config, &mut bytes).unwrap();
        let value: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();

        let keys: Vec<String> = value
            .as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_text().map(str::to_string))
            .collect();
        assert!(keys.contains(&"sessionWindowMs".to_string()));
        assert!(keys.contains(&"defaultBatchSize".to_string()));
        assert!(keys.contains(&"defaultStartId".to_string()));
    }

    #[test]
    fn missing_options_fall_back_to_defaults() {
        let partial = ciborium::Value::Map(vec![(
            ciborium::Value::Text("defaultStartId".to_string()),
            ciborium::Value::Integer(5.into()),
        )]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&partial, &mut bytes).unwrap();

        let config: EdgeConfig = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(config.default_start_id, 5);
        assert_eq!(config.default_batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.session_window_ms, DEFAULT_SESSION_WINDOW_MS);
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let zero_window = EdgeConfig { session_window_ms: 0, ..EdgeConfig::default() };
        assert_eq!(zero_window.validate(), Err(ConfigError::ZeroSessionWindow));

        let huge_batch = EdgeConfig { default_batch_size: 5000, ..EdgeConfig::default() };
        assert_eq!(
            huge_batch.validate(),
            Err(ConfigError::BatchSizeOutOfRange { got: 5000, max: DEFAULT_MAX_BATCH_SIZE })
        );

        let oversized = EdgeConfig { max_batch_size: 1000, ..EdgeConfig::default() };
        assert_eq!(
            oversized.validate(),
            Err(ConfigError::MaxBatchSizeTooLarge { got: 1000, limit: MAX_BATCH_SIZE_LIMIT })
        );

        let zero_sweep = EdgeConfig { sweep_interval_ms: 0, ..EdgeConfig::default() };
        assert_eq!(zero_sweep.validate(), Err(ConfigError::ZeroSweepInterval));
    }
}
