use crate::core::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-request item limit enforced by the remote service.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 400;

/// Retry budget and backoff for transient operation-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts per request, the first one included.
    pub max_attempts: u32,
    /// Backoff before the first retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the exponential backoff in milliseconds.
    pub max_backoff_ms: u64,
    /// Wait for the server-suggested delay when the error carries one.
    pub honor_server_hint: bool,
    /// Upper bound applied to server-suggested delays in milliseconds.
    pub max_server_hint_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
            honor_server_hint: true,
            max_server_hint_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retrying after `attempt` failed attempts.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff_ms.max(1);
        let max = self.max_backoff_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(factor).min(max))
    }

    /// Delay before the next attempt: the server hint when honored, else backoff.
    pub fn delay_for(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        match server_hint {
            Some(hint) if self.honor_server_hint => {
                hint.min(Duration::from_millis(self.max_server_hint_ms))
            }
            _ => self.backoff(attempt),
        }
    }
}

/// Static client configuration
///
/// Behavior that may change between calls lives in
/// [`CloudSettings`](crate::settings::CloudSettings) instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum number of saves plus deletes in one remote request
    pub max_batch_size: usize,

    /// Retry budget and backoff
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the maximum batch size
    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Set the retry budget (attempts, the first one included)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Set the exponential backoff bounds
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry.initial_backoff_ms = duration_ms(initial);
        self.retry.max_backoff_ms = duration_ms(max);
        self
    }

    /// Set whether server retry hints are honored
    pub fn honor_server_hint(mut self, honor: bool) -> Self {
        self.retry.honor_server_hint = honor;
        self
    }

    /// Set the cap applied to server retry hints
    pub fn max_server_hint(mut self, max: Duration) -> Self {
        self.retry.max_server_hint_ms = duration_ms(max);
        self
    }

    /// Parse from a JSON document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| CloudError::Configuration(format!("parse client config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(CloudError::Configuration(
                "max_batch_size must be > 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(CloudError::Configuration(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(CloudError::Configuration(
                "retry.initial_backoff_ms cannot exceed retry.max_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
