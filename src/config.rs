use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ─── Sink configuration ──────────────────────────────────────────

/// Runtime configuration for one sink instance.
///
/// `max_batch_size` is the backend's per-call item limit. It belongs to
/// the deployment, not to the write logic, so it lives here rather than
/// as a literal in the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Destination table: the key namespace all partitions live under.
    pub table: String,

    /// Maximum items per batch-write call.
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_batch_size() -> usize {
    25
}

impl SinkConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            max_batch_size: default_batch_size(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.retry.base_backoff_ms == 0 {
            return Err(ConfigError::ZeroBackoff);
        }
        if self.retry.max_units == 0 {
            return Err(ConfigError::ZeroRetryUnits);
        }
        Ok(())
    }
}

// ─── Retry policy ────────────────────────────────────────────────

/// Backoff policy for one unprocessed set.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// First backoff interval (milliseconds); doubles per attempt.
    #[serde(default = "default_base_ms")]
    pub base_backoff_ms: u64,

    /// Total elapsed-time budget per unprocessed set (seconds). Once
    /// exceeded, the items are dropped for good.
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,

    /// Cap on concurrently retrying unprocessed sets.
    #[serde(default = "default_max_units")]
    pub max_units: usize,
}

fn default_base_ms() -> u64 {
    500
}
fn default_max_elapsed_secs() -> u64 {
    180
}
fn default_max_units() -> usize {
    64
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_backoff_ms: default_base_ms(),
            max_elapsed_secs: default_max_elapsed_secs(),
            max_units: default_max_units(),
        }
    }
}

impl RetryPolicy {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }
}

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("table name must not be empty")]
    EmptyTable,

    #[error("max_batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("retry base backoff must be at least 1ms")]
    ZeroBackoff,

    #[error("retry max_units must be at least 1")]
    ZeroRetryUnits,
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SinkConfig::new("metrics").validate().is_ok());
    }

    #[test]
    fn batch_limit_defaults_to_twenty_five() {
        assert_eq!(SinkConfig::new("metrics").max_batch_size, 25);
    }

    #[test]
    fn rejects_degenerate_values() {
        let mut c = SinkConfig::new("");
        assert!(matches!(c.validate(), Err(ConfigError::EmptyTable)));

        c = SinkConfig::new("metrics");
        c.max_batch_size = 0;
        assert!(matches!(c.validate(), Err(ConfigError::ZeroBatchSize)));

        c = SinkConfig::new("metrics");
        c.retry.max_units = 0;
        assert!(matches!(c.validate(), Err(ConfigError::ZeroRetryUnits)));
    }
}
