//! In-process job store, queue registry and retry policy.
//!
//! This crate provides:
//! - A durable job record store with atomic claim semantics
//! - A registry of named, typed, concurrency-bounded queues with counters
//!   and derived health metrics
//! - Per-queue retry/backoff configuration
//!
//! The store intentionally replaces a broker-backed queue library so the
//! at-most-one-claim guarantee and the retry policy live in auditable code.

pub mod error;
pub mod registry;
pub mod settings;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use registry::{QueueRegistry, ERROR_THRESHOLD};
pub use settings::{BackoffConfig, BackoffKind, QueueSettings};
pub use store::{CreateJobOptions, FailOutcome, JobStore};
