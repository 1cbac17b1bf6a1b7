//! Shared data models for the ClipForge pipeline core.
//!
//! This crate provides Serde-serializable types for:
//! - Entity state machines (stream, chunk, clip, job) with explicit
//!   transition tables
//! - Typed IDs
//! - Analysis feature payloads and score breakdowns
//! - Queue counters and derived health metrics
//!
//! No I/O lives here; everything is pure data and state logic.

pub mod chunk;
pub mod clip;
pub mod features;
pub mod ids;
pub mod job;
pub mod queue_stats;
pub mod stream;
pub mod streamer;
pub mod transition;

// Re-export common types
pub use chunk::{Chunk, ChunkError, ChunkStatus};
pub use clip::{ApprovalStatus, Clip, ClipStatus, PublishedUrl};
pub use features::{AudioFeatures, ScoreBreakdown, TranscriptSegment, Transcription, VisionAnalysis};
pub use ids::{ChunkId, ClipId, JobId, StreamId, StreamerId};
pub use job::{EntityKind, Job, JobData, JobStatus, JobType};
pub use queue_stats::{
    QueueCounters, QueueHealth, QueueSnapshot, QueueStatus, OVERLOAD_MULTIPLIER,
};
pub use stream::{Stream, StreamStatus};
pub use streamer::{Platform, Streamer};
pub use transition::{StatusGraph, TransitionError};
