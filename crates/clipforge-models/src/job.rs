//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transition::{StatusGraph, TransitionError};
use crate::{ClipId, JobId, StreamId, StreamerId};

/// Type of job, matched to the queue that dispatches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum JobType {
    #[serde(rename = "ingest_stream")]
    IngestStream,
    #[serde(rename = "download-stream")]
    DownloadStream,
    #[serde(rename = "process-stream")]
    ProcessStream,
    #[serde(rename = "generate_highlights")]
    GenerateHighlights,
    #[serde(rename = "render_clip")]
    RenderClip,
    #[serde(rename = "publish_clip")]
    PublishClip,
    #[serde(rename = "transcribe_chunk")]
    TranscribeChunk,
    #[serde(rename = "analyze_vision")]
    AnalyzeVision,
    #[serde(rename = "score_clip")]
    ScoreClip,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::IngestStream => "ingest_stream",
            JobType::DownloadStream => "download-stream",
            JobType::ProcessStream => "process-stream",
            JobType::GenerateHighlights => "generate_highlights",
            JobType::RenderClip => "render_clip",
            JobType::PublishClip => "publish_clip",
            JobType::TranscribeChunk => "transcribe_chunk",
            JobType::AnalyzeVision => "analyze_vision",
            JobType::ScoreClip => "score_clip",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in queue
    #[default]
    Pending,
    /// Claimed by a worker
    Running,
    /// Mid-execution progress checkpoint
    Processing,
    /// Finished successfully (terminal)
    Completed,
    /// Retries exhausted (terminal)
    Failed,
    /// Cancelled before execution (terminal)
    Cancelled,
    /// Failed, waiting for the backoff delay before re-dispatch
    Retrying,
}

impl StatusGraph for JobStatus {
    const ENTITY: &'static str = "job";

    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Retrying => "retrying",
        }
    }

    fn successors(&self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            Pending => &[Running, Cancelled],
            Running => &[Processing, Completed, Failed, Retrying],
            Processing => &[Completed, Failed, Retrying],
            Retrying => &[Running, Cancelled, Failed],
            Completed | Failed | Cancelled => &[],
        }
    }
}

impl JobStatus {
    /// Statuses a worker currently owns.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which entity kind a job payload points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Stream,
    Chunk,
    Clip,
}

/// Type-specific job payload. Always carries at minimum the entity the job
/// operates on; anything else rides in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobData {
    /// ID of the entity this job operates on
    pub entity_id: String,
    /// Kind of that entity
    pub entity_kind: EntityKind,
    /// Type-specific extras, opaque to the queue
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl JobData {
    pub fn stream(id: &StreamId) -> Self {
        Self {
            entity_id: id.to_string(),
            entity_kind: EntityKind::Stream,
            extra: serde_json::Value::Null,
        }
    }

    pub fn chunk(id: &crate::ChunkId) -> Self {
        Self {
            entity_id: id.to_string(),
            entity_kind: EntityKind::Chunk,
            extra: serde_json::Value::Null,
        }
    }

    pub fn clip(id: &ClipId) -> Self {
        Self {
            entity_id: id.to_string(),
            entity_kind: EntityKind::Clip,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

fn default_max_retries() -> u32 {
    3
}

/// One dispatchable unit of work.
///
/// A job holds non-owning references to the entity it acts upon; deleting
/// that entity keeps the job around as a historical record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job type (selects the queue)
    pub job_type: JobType,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Dispatch priority, higher first
    #[serde(default)]
    pub priority: i32,

    /// Type-specific payload
    pub data: JobData,

    /// Number of retry attempts so far
    #[serde(default)]
    pub retry_count: u32,

    /// Maximum retries allowed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Earliest dispatch time (delay/backoff support)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Owning worker while running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    /// Linked streamer (at most one link populated, by type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streamer_id: Option<StreamerId>,

    /// Linked stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,

    /// Linked clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<ClipId>,

    /// Handler result (if completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Claim timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: JobType, data: JobData) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            priority: 0,
            data,
            retry_count: 0,
            max_retries: default_max_retries(),
            scheduled_for: None,
            worker_id: None,
            streamer_id: None,
            stream_id: None,
            clip_id: None,
            result: None,
            error_message: None,
            progress: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the dispatch priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay dispatch until `at`.
    pub fn with_scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Link the owning stream.
    pub fn with_stream(mut self, stream_id: StreamId) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Link the owning clip.
    pub fn with_clip(mut self, clip_id: ClipId) -> Self {
        self.clip_id = Some(clip_id);
        self
    }

    /// Link the owning streamer.
    pub fn with_streamer(mut self, streamer_id: StreamerId) -> Self {
        self.streamer_id = Some(streamer_id);
        self
    }

    /// Transition to `target`, stamping timestamps.
    pub fn transition(&mut self, target: JobStatus) -> Result<(), TransitionError> {
        self.status.check_transition(target)?;
        self.status = target;
        let now = Utc::now();
        self.updated_at = now;
        match target {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(now)
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether this job is eligible for claiming at `now`: pending, or
    /// retrying with its backoff delay elapsed.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending | JobStatus::Retrying => {
                self.scheduled_for.map_or(true, |at| at <= now)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation_defaults() {
        let job = Job::new(JobType::IngestStream, JobData::stream(&StreamId::new()));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert!(job.worker_id.is_none());
    }

    #[test]
    fn test_terminal_rejects_further_transitions() {
        let mut job = Job::new(JobType::RenderClip, JobData::clip(&ClipId::new()));
        job.transition(JobStatus::Running).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());
        for target in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Retrying,
        ] {
            assert!(job.transition(target).is_err());
            assert_eq!(job.status, JobStatus::Completed);
        }
    }

    #[test]
    fn test_retrying_can_run_again() {
        let mut job = Job::new(JobType::PublishClip, JobData::clip(&ClipId::new()));
        job.transition(JobStatus::Running).unwrap();
        job.transition(JobStatus::Retrying).unwrap();
        job.transition(JobStatus::Running).unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    #[test]
    fn test_claimable_respects_schedule() {
        let mut job = Job::new(JobType::ScoreClip, JobData::chunk(&crate::ChunkId::new()));
        let now = Utc::now();
        assert!(job.is_claimable(now));
        job.scheduled_for = Some(now + chrono::Duration::seconds(60));
        assert!(!job.is_claimable(now));
        assert!(job.is_claimable(now + chrono::Duration::seconds(61)));
        job.status = JobStatus::Completed;
        assert!(!job.is_claimable(now));
    }

    #[test]
    fn test_job_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&JobType::DownloadStream).unwrap(),
            "\"download-stream\""
        );
        assert_eq!(
            serde_json::to_string(&JobType::IngestStream).unwrap(),
            "\"ingest_stream\""
        );
    }
}
