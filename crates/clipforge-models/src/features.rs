//! Analysis feature payloads produced by the transcribe/vision/scoring
//! adapters. The core treats the scorer as opaque; the breakdown is carried
//! verbatim for the review UI.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single transcript segment with word-level timing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    /// Segment start offset within the chunk, in seconds
    pub start: f64,
    /// Segment end offset within the chunk, in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
    /// Recognition confidence (0-1)
    #[serde(default)]
    pub confidence: f64,
}

/// Speech-to-text output for one chunk.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Transcription {
    /// Full transcript text
    pub text: String,
    /// Detected language code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Timed segments
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    /// Word count of the full transcript
    #[serde(default)]
    pub word_count: u32,
}

/// Audio-derived features for one chunk. All values normalized to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct AudioFeatures {
    /// Mean audio energy
    pub energy: f64,
    /// Fraction of the chunk with detected speech
    pub speech_activity: f64,
    /// Emotion intensity from speech prosody
    #[serde(default)]
    pub emotion_intensity: f64,
    /// Excitement proxy (caps ratio, exclamations)
    #[serde(default)]
    pub excitement: f64,
}

/// Vision-derived features for one chunk. All values normalized to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct VisionAnalysis {
    /// Amount of visual motion/activity
    pub visual_activity: f64,
    /// Fraction of frames with a detected face
    pub face_presence: f64,
    /// Scene change density
    #[serde(default)]
    pub scene_changes: f64,
}

/// Weighted-fusion explanation for a chunk's highlight score.
///
/// Mirrors the scorer's component terms: four base features plus three
/// bonus terms, with the adapter's raw output retained as-is.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ScoreBreakdown {
    pub audio_energy: f64,
    pub speech_activity: f64,
    pub visual_activity: f64,
    pub face_presence: f64,
    #[serde(default)]
    pub emotion_bonus: f64,
    #[serde(default)]
    pub excitement_bonus: f64,
    #[serde(default)]
    pub scene_bonus: f64,
    /// Opaque scorer output, retained verbatim
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}
