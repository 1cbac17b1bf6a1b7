//! Queue status, counters and derived health metrics.
//!
//! Health and overload are pure functions over the stored counters so the
//! derived values can never drift from the counts themselves.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Accepting enqueues and dispatching work
    #[default]
    Active,
    /// Accepting enqueues, not dispatching
    Paused,
    /// Finishing in-flight work, rejecting new enqueues
    Draining,
    /// Tripped by consecutive failures; exits only via explicit reactivation
    Error,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Active => "active",
            QueueStatus::Paused => "paused",
            QueueStatus::Draining => "draining",
            QueueStatus::Error => "error",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live per-queue counters.
///
/// Invariant: every job ever enqueued is counted in exactly one bucket, so
/// `total()` equals the number of enqueues accepted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueueCounters {
    /// Jobs waiting for a worker
    pub waiting: u64,
    /// Jobs currently executing
    pub active: u64,
    /// Jobs finished successfully
    pub completed: u64,
    /// Jobs terminally failed
    pub failed: u64,
    /// Jobs waiting out a retry/schedule delay
    pub delayed: u64,
    /// Jobs parked while the queue is paused
    pub paused: u64,
}

impl QueueCounters {
    /// Sum of all buckets.
    pub fn total(&self) -> u64 {
        self.waiting + self.active + self.completed + self.failed + self.delayed + self.paused
    }

    /// Fraction of settled jobs that completed, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let settled = self.completed + self.failed;
        if settled == 0 {
            return 0.0;
        }
        self.completed as f64 / settled as f64 * 100.0
    }

    /// Fraction of settled jobs that failed, as a percentage.
    pub fn error_rate(&self) -> f64 {
        let settled = self.completed + self.failed;
        if settled == 0 {
            return 0.0;
        }
        self.failed as f64 / settled as f64 * 100.0
    }
}

/// Backlog multiplier: a queue is overloaded once its waiting count exceeds
/// this many times its concurrency.
pub const OVERLOAD_MULTIPLIER: u64 = 10;

/// Derived queue health snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct QueueHealth {
    pub is_healthy: bool,
    pub is_overloaded: bool,
    pub success_rate: f64,
    pub error_rate: f64,
}

impl QueueHealth {
    /// Compute health from the stored state.
    pub fn derive(
        status: QueueStatus,
        counters: &QueueCounters,
        concurrency: usize,
        last_error: Option<&str>,
    ) -> Self {
        Self {
            is_healthy: status == QueueStatus::Active && last_error.is_none(),
            is_overloaded: counters.waiting > concurrency as u64 * OVERLOAD_MULTIPLIER,
            success_rate: counters.success_rate(),
            error_rate: counters.error_rate(),
        }
    }
}

/// Point-in-time queue snapshot exposed to the API layer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueSnapshot {
    pub name: String,
    pub status: QueueStatus,
    pub concurrency: usize,
    pub counters: QueueCounters,
    pub health: QueueHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
}
