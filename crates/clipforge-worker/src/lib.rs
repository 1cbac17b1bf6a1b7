//! Pipeline worker: dispatcher, adapter seams and cross-entity coordination.
//!
//! This crate provides:
//! - Adapter traits for every external collaborator (ingest, transcribe,
//!   vision, scoring, render, publish)
//! - An in-memory entity repository with atomic per-row transitions
//! - The pipeline coordinator (job handlers, follow-up enqueues, stream
//!   completion rules, failure propagation)
//! - Per-queue dispatch loops with bounded concurrency and graceful
//!   shutdown

pub mod adapters;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod repo;

pub use adapters::{
    AdapterError, IngestAdapter, IngestOutcome, PlatformResult, PublishAdapter, RenderAdapter,
    RenderOutcome, ScoreOutcome, ScoringAdapter, TimeWindow, TranscribeAdapter, VisionAdapter,
};
pub use config::{PipelineConfig, QueueSpec, WorkerConfig};
pub use dispatcher::Dispatcher;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{PipelineAdapters, PipelineCoordinator};
pub use repo::EntityRepo;
