//! Named queue registry with counters and health derivation.
//!
//! Queues are long-lived process-wide state, created at startup from
//! configuration and mutated only by the dispatcher and worker completions
//! through the narrow operation set below.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use clipforge_models::{JobType, QueueCounters, QueueHealth, QueueSnapshot, QueueStatus};

use crate::error::{QueueError, QueueResult};
use crate::settings::QueueSettings;

/// Consecutive `record_fail` calls before a queue trips into `error`.
pub const ERROR_THRESHOLD: u32 = 5;

/// Stored state for one queue.
#[derive(Debug, Clone)]
struct QueueState {
    name: String,
    job_types: Vec<JobType>,
    concurrency: usize,
    settings: QueueSettings,
    status: QueueStatus,
    counters: QueueCounters,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            name: self.name.clone(),
            status: self.status,
            concurrency: self.concurrency,
            counters: self.counters,
            health: QueueHealth::derive(
                self.status,
                &self.counters,
                self.concurrency,
                self.last_error.as_deref(),
            ),
            last_error: self.last_error.clone(),
            last_error_at: self.last_error_at,
        }
    }
}

/// Registry of named, typed queues.
pub struct QueueRegistry {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Register a queue bound to a set of job types.
    pub fn register(
        &self,
        name: impl Into<String>,
        job_types: Vec<JobType>,
        concurrency: usize,
        settings: QueueSettings,
    ) -> QueueResult<()> {
        let name = name.into();
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        if queues.contains_key(&name) {
            return Err(QueueError::duplicate_queue(name));
        }
        info!(queue = %name, concurrency, ?job_types, "Registered queue");
        queues.insert(
            name.clone(),
            QueueState {
                name,
                job_types,
                concurrency,
                settings,
                status: QueueStatus::Active,
                counters: QueueCounters::default(),
                consecutive_failures: 0,
                last_error: None,
                last_error_at: None,
            },
        );
        Ok(())
    }

    fn with_queue<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut QueueState) -> QueueResult<T>,
    ) -> QueueResult<T> {
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        let state = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::queue_not_found(name))?;
        f(state)
    }

    /// Count a new enqueue. Rejected while the queue is draining; while
    /// paused the job is parked in the `paused` bucket.
    pub fn record_enqueue(&self, name: &str) -> QueueResult<()> {
        self.with_queue(name, |state| {
            match state.status {
                QueueStatus::Draining => return Err(QueueError::Draining(state.name.clone())),
                QueueStatus::Paused => state.counters.paused += 1,
                _ => state.counters.waiting += 1,
            }
            Ok(())
        })
    }

    /// Count a claim handed to a worker.
    pub fn record_dequeue(&self, name: &str) -> QueueResult<()> {
        self.with_queue(name, |state| {
            // A dequeued job may come out of the waiting or the delayed
            // bucket (retry that became due).
            if state.counters.waiting > 0 {
                state.counters.waiting -= 1;
            } else if state.counters.delayed > 0 {
                state.counters.delayed -= 1;
            }
            state.counters.active += 1;
            Ok(())
        })
    }

    /// Count a successful completion; resets the failure streak.
    pub fn record_complete(&self, name: &str) -> QueueResult<()> {
        self.with_queue(name, |state| {
            state.counters.active = state.counters.active.saturating_sub(1);
            state.counters.completed += 1;
            state.consecutive_failures = 0;
            Ok(())
        })
    }

    /// Count a terminal failure; trips the queue into `error` after
    /// [`ERROR_THRESHOLD`] consecutive failures.
    pub fn record_fail(&self, name: &str, error: &str) -> QueueResult<()> {
        self.with_queue(name, |state| {
            state.counters.active = state.counters.active.saturating_sub(1);
            state.counters.failed += 1;
            state.last_error = Some(error.to_string());
            state.last_error_at = Some(Utc::now());
            state.consecutive_failures += 1;
            if state.consecutive_failures >= ERROR_THRESHOLD && state.status == QueueStatus::Active
            {
                warn!(
                    queue = %state.name,
                    failures = state.consecutive_failures,
                    "Queue tripped into error status"
                );
                state.status = QueueStatus::Error;
            }
            Ok(())
        })
    }

    /// Count an active job rescheduled with a retry delay.
    pub fn record_delayed(&self, name: &str, error: &str) -> QueueResult<()> {
        self.with_queue(name, |state| {
            state.counters.active = state.counters.active.saturating_sub(1);
            state.counters.delayed += 1;
            state.last_error = Some(error.to_string());
            state.last_error_at = Some(Utc::now());
            state.consecutive_failures += 1;
            if state.consecutive_failures >= ERROR_THRESHOLD && state.status == QueueStatus::Active
            {
                warn!(
                    queue = %state.name,
                    failures = state.consecutive_failures,
                    "Queue tripped into error status"
                );
                state.status = QueueStatus::Error;
            }
            Ok(())
        })
    }

    /// Count a pending job cancelled before dispatch.
    pub fn record_cancelled(&self, name: &str) -> QueueResult<()> {
        self.with_queue(name, |state| {
            // Cancelled jobs leave the backlog; they settle as neither
            // completed nor failed, so they drop out of the sum entirely
            // along with their enqueue.
            if state.counters.waiting > 0 {
                state.counters.waiting -= 1;
            } else if state.counters.delayed > 0 {
                state.counters.delayed -= 1;
            }
            Ok(())
        })
    }

    /// Transition queue status. Resuming from paused releases the parked
    /// bucket back into waiting; leaving `error` requires this explicit
    /// call.
    pub fn set_status(&self, name: &str, status: QueueStatus) -> QueueResult<()> {
        self.with_queue(name, |state| {
            if state.status == QueueStatus::Paused && status == QueueStatus::Active {
                state.counters.waiting += state.counters.paused;
                state.counters.paused = 0;
            }
            if status == QueueStatus::Active {
                state.consecutive_failures = 0;
            }
            info!(queue = %state.name, from = %state.status, to = %status, "Queue status change");
            state.status = status;
            Ok(())
        })
    }

    /// Current status.
    pub fn status(&self, name: &str) -> QueueResult<QueueStatus> {
        self.with_queue(name, |state| Ok(state.status))
    }

    /// Derived health for a queue.
    pub fn health(&self, name: &str) -> QueueResult<QueueHealth> {
        self.with_queue(name, |state| {
            Ok(QueueHealth::derive(
                state.status,
                &state.counters,
                state.concurrency,
                state.last_error.as_deref(),
            ))
        })
    }

    /// Full point-in-time snapshot for the API layer.
    pub fn snapshot(&self, name: &str) -> QueueResult<QueueSnapshot> {
        self.with_queue(name, |state| Ok(state.snapshot()))
    }

    /// Snapshots of all queues.
    pub fn snapshots(&self) -> Vec<QueueSnapshot> {
        let queues = self.queues.lock().expect("queue lock poisoned");
        let mut all: Vec<QueueSnapshot> = queues.values().map(|s| s.snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Settings for a queue.
    pub fn settings(&self, name: &str) -> QueueResult<QueueSettings> {
        self.with_queue(name, |state| Ok(state.settings.clone()))
    }

    /// Job types served by a queue.
    pub fn job_types(&self, name: &str) -> QueueResult<Vec<JobType>> {
        self.with_queue(name, |state| Ok(state.job_types.clone()))
    }

    /// Concurrency limit for a queue.
    pub fn concurrency(&self, name: &str) -> QueueResult<usize> {
        self.with_queue(name, |state| Ok(state.concurrency))
    }

    /// The queue bound to a job type, if any.
    pub fn queue_for(&self, job_type: JobType) -> Option<String> {
        let queues = self.queues.lock().expect("queue lock poisoned");
        queues
            .values()
            .find(|state| state.job_types.contains(&job_type))
            .map(|state| state.name.clone())
    }

    /// Registered queue names, sorted.
    pub fn names(&self) -> Vec<String> {
        let queues = self.queues.lock().expect("queue lock poisoned");
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
