//! Stale payment sweep configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::StalePaymentPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Unsettled payments untouched this long are polled
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Unsettled payments untouched this long are cancelled
    #[serde(default = "default_abandon_after")]
    pub abandon_after_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Gateway polls in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn policy(&self) -> StalePaymentPolicy {
        StalePaymentPolicy {
            stale_after: Duration::from_secs(self.stale_after_secs),
            abandon_after: Duration::from_secs(self.abandon_after_secs),
            batch_size: self.batch_size,
            concurrency: self.concurrency.max(1),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout("reconciliation.interval_secs"));
        }
        if self.stale_after_secs == 0 {
            return Err(ValidationError::InvalidTimeout(
                "reconciliation.stale_after_secs",
            ));
        }
        if self.abandon_after_secs <= self.stale_after_secs {
            return Err(ValidationError::InvalidAbandonWindow);
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
            stale_after_secs: default_stale_after(),
            abandon_after_secs: default_abandon_after(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_stale_after() -> u64 {
    900
}

fn default_abandon_after() -> u64 {
    86_400
}

fn default_batch_size() -> u32 {
    100
}

fn default_concurrency() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_defaults() {
        let policy = ReconciliationConfig::default().policy();
        let expected = StalePaymentPolicy::default();
        assert_eq!(policy.stale_after, expected.stale_after);
        assert_eq!(policy.abandon_after, expected.abandon_after);
        assert_eq!(policy.batch_size, expected.batch_size);
        assert_eq!(policy.concurrency, expected.concurrency);
    }

    #[test]
    fn defaults_validate() {
        assert!(ReconciliationConfig::default().validate().is_ok());
    }

    #[test]
    fn abandon_window_must_outlast_stale_window() {
        let config = ReconciliationConfig {
            stale_after_secs: 3_600,
            abandon_after_secs: 3_600,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidAbandonWindow));
    }

    #[test]
    fn batch_size_is_bounded() {
        for batch_size in [0, 1001] {
            let config = ReconciliationConfig {
                batch_size,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidBatchSize));
        }
    }

    #[test]
    fn zero_concurrency_still_polls() {
        let config = ReconciliationConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.policy().concurrency, 1);
    }
}
