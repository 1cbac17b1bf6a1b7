//! Per-queue configuration and retry backoff policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff curve applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay between attempts.
    Fixed,
    /// Base delay doubled per attempt already made.
    #[default]
    Exponential,
}

/// Retry backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Backoff curve.
    #[serde(rename = "type", default)]
    pub kind: BackoffKind,
    /// Base delay.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Upper bound on any computed delay.
    #[serde(with = "duration_millis", default = "default_max_backoff")]
    pub max_delay: Duration,
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(300)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay: Duration::from_secs(1),
            max_delay: default_max_backoff(),
        }
    }
}

impl BackoffConfig {
    /// Delay before the next attempt, given the number of retries already
    /// recorded. Exponential: `delay * 2^retry_count`, capped at `max_delay`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let delay = match self.kind {
            BackoffKind::Fixed => self.delay,
            BackoffKind::Exponential => 2u32
                .checked_pow(retry_count)
                .map(|factor| self.delay.saturating_mul(factor))
                .unwrap_or(self.max_delay),
        };
        delay.min(self.max_delay)
    }
}

/// Queue configuration accepted at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Default retry budget for jobs on this queue.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound that may further restrict a job's own `max_retries`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Retry backoff policy.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Keep at most this many completed jobs around (None keeps all).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_on_complete: Option<usize>,
    /// Keep at most this many terminally failed jobs around (None keeps all).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_on_fail: Option<usize>,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attempts: None,
            backoff: BackoffConfig::default(),
            remove_on_complete: None,
            remove_on_fail: None,
        }
    }
}

impl QueueSettings {
    /// Effective retry budget for a job: the job's own budget, further
    /// restricted by the queue-level `attempts` bound when set.
    pub fn effective_max_retries(&self, job_max_retries: u32) -> u32 {
        match self.attempts {
            Some(attempts) => job_max_retries.min(attempts),
            None => job_max_retries,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
