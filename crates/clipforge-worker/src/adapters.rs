//! Adapter traits for every external collaborator of the pipeline.
//!
//! The core never talks to yt-dlp, FFmpeg, speech-to-text or platform
//! upload APIs directly; each sits behind one of these traits. Production
//! wiring and test doubles both implement the same seams.

use async_trait::async_trait;
use thiserror::Error;

use clipforge_models::{
    AudioFeatures, Chunk, Clip, Platform, PublishedUrl, ScoreBreakdown, Stream, Transcription,
    VisionAnalysis,
};

/// Error surfaced by an adapter call.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The operation ran and failed; a retry may succeed.
    #[error("adapter call failed: {0}")]
    Failed(String),

    /// The upstream service could not be reached.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The input can never be processed (bad media, unsupported format).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AdapterError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Transient errors are worth retrying; invalid input is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Failed(_) | AdapterError::Unavailable(_))
    }
}

/// One chunk window produced by ingest.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    /// Zero-based position within the stream
    pub index: u32,
    /// Window start offset in seconds
    pub start: f64,
    /// Window end offset in seconds
    pub end: f64,
    /// Extracted media path for this window, if the adapter splits files
    pub file_path: Option<String>,
}

/// Result of downloading and chunking one stream.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Local path of the downloaded media
    pub media_path: String,
    /// Total file size in bytes
    pub file_size_bytes: u64,
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// Chunk windows covering the stream, ordered by start time
    pub chunks: Vec<TimeWindow>,
}

/// Result of scoring one chunk.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// Highlight score in [0, 1]
    pub score: f64,
    /// Component breakdown
    pub breakdown: ScoreBreakdown,
    /// Audio features extracted during scoring
    pub audio: AudioFeatures,
}

/// Result of rendering one clip.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// Rendered output path
    pub file_path: String,
    /// Thumbnail path, if generated
    pub thumbnail_path: Option<String>,
}

/// Per-platform publish result. Platforms succeed or fail individually so a
/// partial publish keeps its successes.
#[derive(Debug, Clone)]
pub struct PlatformResult {
    pub platform: Platform,
    pub outcome: Result<PublishedUrl, String>,
}

/// Downloads a stream VOD and splits it into chunk windows.
#[async_trait]
pub trait IngestAdapter: Send + Sync {
    async fn ingest(&self, stream: &Stream) -> Result<IngestOutcome, AdapterError>;
}

/// Speech-to-text for one chunk.
#[async_trait]
pub trait TranscribeAdapter: Send + Sync {
    async fn transcribe(&self, chunk: &Chunk) -> Result<Transcription, AdapterError>;
}

/// Visual feature extraction for one chunk.
#[async_trait]
pub trait VisionAdapter: Send + Sync {
    async fn analyze(&self, chunk: &Chunk) -> Result<VisionAnalysis, AdapterError>;
}

/// Highlight scoring for one analyzed chunk.
#[async_trait]
pub trait ScoringAdapter: Send + Sync {
    async fn score(&self, chunk: &Chunk) -> Result<ScoreOutcome, AdapterError>;
}

/// Renders a clip into its final short-form output.
#[async_trait]
pub trait RenderAdapter: Send + Sync {
    async fn render(&self, clip: &Clip) -> Result<RenderOutcome, AdapterError>;
}

/// Publishes a rendered clip to the given target platforms.
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    async fn publish(
        &self,
        clip: &Clip,
        platforms: &[Platform],
    ) -> Result<Vec<PlatformResult>, AdapterError>;
}
