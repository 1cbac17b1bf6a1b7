//! Clip model, render/publish state machine and review workflow.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transition::{StatusGraph, TransitionError};
use crate::{ChunkId, ClipId, Platform, StreamId};

/// Clip render/publish status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    #[default]
    Pending,
    PendingRender,
    Rendering,
    Rendered,
    Published,
    Failed,
}

impl StatusGraph for ClipStatus {
    const ENTITY: &'static str = "clip";

    fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Pending => "pending",
            ClipStatus::PendingRender => "pending_render",
            ClipStatus::Rendering => "rendering",
            ClipStatus::Rendered => "rendered",
            ClipStatus::Published => "published",
            ClipStatus::Failed => "failed",
        }
    }

    fn successors(&self) -> &'static [ClipStatus] {
        use ClipStatus::*;
        match self {
            Pending => &[PendingRender, Failed],
            PendingRender => &[Rendering, Failed],
            Rendering => &[Rendered, Failed],
            Rendered => &[Published, Failed],
            Published | Failed => &[],
        }
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human review decision, decoupled from the render status so rendering can
/// proceed before or after review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A URL produced by publishing a clip to one target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PublishedUrl {
    /// Target platform
    pub platform: Platform,
    /// Public URL of the published clip
    pub url: String,
    /// Platform-native ID of the upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
}

/// A candidate or finalized short-form video derived from one chunk.
///
/// Invariants: `rendered_file_path` is set iff status >= rendered;
/// `published_at` is set iff status == published.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    /// Unique clip ID
    pub id: ClipId,

    /// Owning stream (required; deleting the stream cascades)
    pub stream_id: StreamId,

    /// Source chunk (nullable; the chunk may have been deleted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,

    /// Render/publish status
    #[serde(default)]
    pub status: ClipStatus,

    /// Human review decision
    #[serde(default)]
    pub approval_status: ApprovalStatus,

    /// Clip start offset within the stream, in seconds
    pub start_time: f64,

    /// Clip end offset within the stream, in seconds
    pub end_time: f64,

    /// Title (for publishing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Highlight score inherited from the source chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_score: Option<f64>,

    /// Render settings (opaque, adapter-specific)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub render_settings: serde_json::Value,

    /// Caption settings (opaque)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub caption_settings: serde_json::Value,

    /// Publish settings (opaque)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub publish_settings: serde_json::Value,

    /// Rendered output path, set when rendered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_file_path: Option<String>,

    /// Thumbnail path, set when rendered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,

    /// One published URL per successfully published target platform
    #[serde(default)]
    pub published_urls: Vec<PublishedUrl>,

    /// Number of retry attempts across render/publish jobs
    #[serde(default)]
    pub retry_count: u32,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Reviewer identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,

    /// Review timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,

    /// Reviewer notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Render completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_at: Option<DateTime<Utc>>,

    /// Publish timestamp, set iff published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Clip {
    /// Create a new pending clip carved from a chunk's window.
    pub fn new(stream_id: StreamId, chunk_id: ChunkId, start_time: f64, end_time: f64) -> Self {
        let now = Utc::now();
        Self {
            id: ClipId::new(),
            stream_id,
            chunk_id: Some(chunk_id),
            status: ClipStatus::Pending,
            approval_status: ApprovalStatus::Pending,
            start_time,
            end_time,
            title: None,
            highlight_score: None,
            render_settings: serde_json::Value::Null,
            caption_settings: serde_json::Value::Null,
            publish_settings: serde_json::Value::Null,
            rendered_file_path: None,
            thumbnail_path: None,
            published_urls: Vec::new(),
            retry_count: 0,
            error_message: None,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
            rendered_at: None,
            published_at: None,
        }
    }

    /// Set the inherited highlight score.
    pub fn with_highlight_score(mut self, score: f64) -> Self {
        self.highlight_score = Some(score);
        self
    }

    /// Clip length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Transition to `target`, stamping timestamps.
    pub fn transition(&mut self, target: ClipStatus) -> Result<(), TransitionError> {
        self.status.check_transition(target)?;
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to `failed` with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ClipStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Administrative override: set any status without consulting the table.
    pub fn force_status(&mut self, status: ClipStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Store the render output, advancing to `rendered`.
    ///
    /// The only way `rendered_file_path` becomes populated.
    pub fn record_render(
        &mut self,
        file_path: impl Into<String>,
        thumbnail_path: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(ClipStatus::Rendered)?;
        let now = Utc::now();
        self.rendered_file_path = Some(file_path.into());
        self.thumbnail_path = thumbnail_path;
        self.rendered_at = Some(now);
        Ok(())
    }

    /// Record a successful per-platform publish result. Idempotent per
    /// platform so publish retries do not duplicate entries.
    pub fn record_platform_url(&mut self, published: PublishedUrl) {
        if !self
            .published_urls
            .iter()
            .any(|p| p.platform == published.platform)
        {
            self.published_urls.push(published);
        }
        self.updated_at = Utc::now();
    }

    /// Advance to `published`, stamping `published_at`.
    pub fn record_publish(&mut self) -> Result<(), TransitionError> {
        self.transition(ClipStatus::Published)?;
        self.published_at = Some(Utc::now());
        Ok(())
    }

    /// Apply a human review decision.
    ///
    /// Re-reviewing an already decided clip is rejected; the review record is
    /// write-once from the automated side.
    pub fn review(
        &mut self,
        decision: ApprovalStatus,
        reviewed_by: impl Into<String>,
        notes: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.approval_status != ApprovalStatus::Pending || decision == ApprovalStatus::Pending {
            return Err(TransitionError::invalid(
                "clip_approval",
                self.approval_status.as_str(),
                decision.as_str(),
            ));
        }
        self.approval_status = decision;
        self.reviewed_by = Some(reviewed_by.into());
        self.reviewed_at = Some(Utc::now());
        self.review_notes = notes;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// A clip is ready for a publish job once rendered and approved.
    pub fn is_publishable(&self) -> bool {
        self.status == ClipStatus::Rendered && self.approval_status == ApprovalStatus::Approved
    }
}
