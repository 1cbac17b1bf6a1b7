//! Queue error types.

use clipforge_models::{JobId, TransitionError};
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue already registered: {0}")]
    DuplicateQueue(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job is not running: {0}")]
    NotRunning(JobId),

    #[error("Job already terminal: {0}")]
    AlreadyTerminal(JobId),

    #[error("Job cannot be cancelled while running: {0}")]
    NotCancellable(JobId),

    #[error("Queue is draining, enqueue rejected: {0}")]
    Draining(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn duplicate_queue(name: impl Into<String>) -> Self {
        Self::DuplicateQueue(name.into())
    }

    pub fn queue_not_found(name: impl Into<String>) -> Self {
        Self::QueueNotFound(name.into())
    }

    /// Non-retryable caller errors, as opposed to transient ones.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, QueueError::ConcurrentModification(_))
    }
}
