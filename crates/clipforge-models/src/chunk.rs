//! Chunk (time-bounded stream slice) model and state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::transition::{StatusGraph, TransitionError};
use crate::{AudioFeatures, ChunkId, ScoreBreakdown, StreamId, Transcription, VisionAnalysis};

/// Chunk processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Processing,
    Transcribed,
    Analyzed,
    Scored,
    Completed,
    Failed,
}

impl StatusGraph for ChunkStatus {
    const ENTITY: &'static str = "chunk";

    fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Transcribed => "transcribed",
            ChunkStatus::Analyzed => "analyzed",
            ChunkStatus::Scored => "scored",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }

    fn successors(&self) -> &'static [ChunkStatus] {
        use ChunkStatus::*;
        match self {
            Pending => &[Processing, Failed],
            Processing => &[Transcribed, Failed],
            Transcribed => &[Analyzed, Failed],
            Analyzed => &[Scored, Failed],
            Scored => &[Completed, Failed],
            Completed | Failed => &[],
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error constructing or scoring a chunk.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChunkError {
    #[error("invalid chunk window: start {start} must be before end {end}")]
    InvalidWindow { start: f64, end: f64 },

    #[error("highlight score {0} outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A time-bounded slice of a stream, the unit of scoring.
///
/// Invariants: `start_time < end_time`; score fields are populated only once
/// the chunk has reached `scored`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: ChunkId,

    /// Owning stream (deleting the stream cascades)
    pub stream_id: StreamId,

    /// Zero-based position within the stream
    pub index: u32,

    /// Window start offset in seconds (inclusive)
    pub start_time: f64,

    /// Window end offset in seconds (exclusive)
    pub end_time: f64,

    /// Processing status
    #[serde(default)]
    pub status: ChunkStatus,

    /// Extracted media path for this window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Speech-to-text output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<Transcription>,

    /// Audio-derived features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_features: Option<AudioFeatures>,

    /// Vision-derived features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_analysis: Option<VisionAnalysis>,

    /// Highlight score in [0, 1], set when scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_score: Option<f64>,

    /// Structured score explanation, set when scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Scoring timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scored_at: Option<DateTime<Utc>>,
}

impl Chunk {
    /// Create a new pending chunk. Rejects empty or inverted windows.
    pub fn new(stream_id: StreamId, index: u32, start_time: f64, end_time: f64) -> Result<Self, ChunkError> {
        if start_time >= end_time {
            return Err(ChunkError::InvalidWindow {
                start: start_time,
                end: end_time,
            });
        }
        let now = Utc::now();
        Ok(Self {
            id: ChunkId::new(),
            stream_id,
            index,
            start_time,
            end_time,
            status: ChunkStatus::Pending,
            file_path: None,
            transcription: None,
            audio_features: None,
            vision_analysis: None,
            highlight_score: None,
            score_breakdown: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            scored_at: None,
        })
    }

    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Transition to `target`, stamping timestamps.
    pub fn transition(&mut self, target: ChunkStatus) -> Result<(), TransitionError> {
        self.status.check_transition(target)?;
        self.status = target;
        let now = Utc::now();
        self.updated_at = now;
        if target == ChunkStatus::Scored {
            self.scored_at = Some(now);
        }
        Ok(())
    }

    /// Transition to `failed` with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ChunkStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Administrative override: set any status without consulting the table.
    pub fn force_status(&mut self, status: ChunkStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Store the transcription and advance to `transcribed`.
    pub fn record_transcription(&mut self, transcription: Transcription) -> Result<(), TransitionError> {
        self.transition(ChunkStatus::Transcribed)?;
        self.transcription = Some(transcription);
        Ok(())
    }

    /// Store the vision analysis and advance to `analyzed`.
    pub fn record_vision(&mut self, vision: VisionAnalysis) -> Result<(), TransitionError> {
        self.transition(ChunkStatus::Analyzed)?;
        self.vision_analysis = Some(vision);
        Ok(())
    }

    /// Store the score and breakdown, advancing to `scored`.
    ///
    /// This is the only way score fields become populated, which keeps the
    /// "scored implies status >= scored" invariant.
    pub fn record_score(
        &mut self,
        score: f64,
        breakdown: ScoreBreakdown,
        audio: AudioFeatures,
    ) -> Result<(), ChunkError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(ChunkError::ScoreOutOfRange(score));
        }
        self.transition(ChunkStatus::Scored)?;
        self.highlight_score = Some(score);
        self.score_breakdown = Some(breakdown);
        self.audio_features = Some(audio);
        Ok(())
    }
}
