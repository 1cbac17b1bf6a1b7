//! Stream (source VOD) model and state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transition::{StatusGraph, TransitionError};
use crate::{Platform, StreamId, StreamerId};

/// Stream processing status.
///
/// Forward path: pending -> downloading -> downloaded -> processing ->
/// processed -> completed | published. `failed` is reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    #[default]
    Pending,
    Downloading,
    Downloaded,
    Processing,
    Processed,
    Completed,
    Published,
    Failed,
}

impl StatusGraph for StreamStatus {
    const ENTITY: &'static str = "stream";

    fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Pending => "pending",
            StreamStatus::Downloading => "downloading",
            StreamStatus::Downloaded => "downloaded",
            StreamStatus::Processing => "processing",
            StreamStatus::Processed => "processed",
            StreamStatus::Completed => "completed",
            StreamStatus::Published => "published",
            StreamStatus::Failed => "failed",
        }
    }

    fn successors(&self) -> &'static [StreamStatus] {
        use StreamStatus::*;
        match self {
            Pending => &[Downloading, Failed],
            Downloading => &[Downloaded, Failed],
            Downloaded => &[Processing, Failed],
            Processing => &[Processed, Failed],
            Processed => &[Completed, Published, Failed],
            Completed | Published | Failed => &[],
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One source video/VOD, owned by a streamer. Owns its chunks, ordered by
/// start time, and (through `stream_id`) its clips.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Stream {
    /// Unique stream ID
    pub id: StreamId,

    /// Owning streamer
    pub streamer_id: StreamerId,

    /// Original VOD URL
    pub original_url: String,

    /// Source platform
    pub platform: Platform,

    /// Platform-native VOD ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,

    /// Stream title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Processing status
    #[serde(default)]
    pub status: StreamStatus,

    /// Total duration in seconds (known after ingest)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Local media path (set after download)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Total file size in bytes
    #[serde(default)]
    pub file_size_bytes: u64,

    /// Bytes downloaded so far
    #[serde(default)]
    pub downloaded_bytes: u64,

    /// Download/processing progress (0-100)
    #[serde(default)]
    pub progress_percent: u8,

    /// Number of retry attempts across ingest jobs
    #[serde(default)]
    pub retry_count: u32,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Download completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,

    /// Processing completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Failure timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Stream {
    /// Create a new pending stream record.
    pub fn new(streamer_id: StreamerId, original_url: impl Into<String>, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            id: StreamId::new(),
            streamer_id,
            original_url: original_url.into(),
            platform,
            platform_id: None,
            title: None,
            status: StreamStatus::Pending,
            duration_seconds: None,
            file_path: None,
            file_size_bytes: 0,
            downloaded_bytes: 0,
            progress_percent: 0,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            downloaded_at: None,
            processed_at: None,
            failed_at: None,
        }
    }

    /// Transition to `target`, stamping `updated_at` and any stage timestamp.
    ///
    /// Fails with `InvalidTransition` and leaves the record untouched when
    /// `target` is not reachable from the current status.
    pub fn transition(&mut self, target: StreamStatus) -> Result<(), TransitionError> {
        self.status.check_transition(target)?;
        self.status = target;
        let now = Utc::now();
        self.updated_at = now;
        match target {
            StreamStatus::Downloaded => self.downloaded_at = Some(now),
            StreamStatus::Processed => self.processed_at = Some(now),
            StreamStatus::Failed => self.failed_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    /// Transition to `failed` with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(StreamStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Administrative override: set any status without consulting the
    /// transition table. Not exposed to automated workers.
    pub fn force_status(&mut self, status: StreamStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record download progress counters.
    pub fn record_progress(&mut self, downloaded_bytes: u64, progress_percent: u8) {
        self.downloaded_bytes = downloaded_bytes;
        self.progress_percent = progress_percent.min(100);
        self.updated_at = Utc::now();
    }
}
