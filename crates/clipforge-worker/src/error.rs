//! Worker error types.

use thiserror::Error;

use clipforge_models::{ChunkError, JobType, TransitionError};
use clipforge_queue::QueueError;

use crate::adapters::AdapterError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: &'static str, id: String },

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("No queue registered for job type: {0}")]
    UnroutedJobType(JobType),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn entity_not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Whether a retry can plausibly succeed. Transition and payload errors
    /// are deterministic: the same attempt would fail the same way, so the
    /// dispatcher fails these terminally instead of burning the retry budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::JobFailed(_) => true,
            WorkerError::Adapter(e) => e.is_transient(),
            WorkerError::EntityNotFound { .. }
            | WorkerError::InvalidPayload(_)
            | WorkerError::UnroutedJobType(_)
            | WorkerError::Queue(_)
            | WorkerError::Transition(_)
            | WorkerError::Chunk(_)
            | WorkerError::Json(_) => false,
        }
    }
}
