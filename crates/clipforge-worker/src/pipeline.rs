//! Pipeline coordination: job handlers and cross-entity progression.
//!
//! The coordinator owns the business rules between stages: which entity
//! transitions happen around each adapter call, which follow-up jobs get
//! enqueued, and when a stream is finished. The dispatcher calls `handle`
//! for every claimed job and `on_exhausted` when a retry budget runs out.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use clipforge_models::{
    ApprovalStatus, Chunk, ChunkId, ChunkStatus, Clip, ClipId, ClipStatus, EntityKind, Job,
    JobData, JobId, JobType, Platform, QueueHealth, QueueSnapshot, QueueStatus, StatusGraph,
    StreamId, StreamStatus,
};
use clipforge_queue::{CreateJobOptions, JobStore, QueueRegistry};

use crate::adapters::{
    AdapterError, IngestAdapter, PublishAdapter, RenderAdapter, ScoringAdapter, TranscribeAdapter,
    VisionAdapter,
};
use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::repo::EntityRepo;

/// The full adapter set behind the pipeline stages.
#[derive(Clone)]
pub struct PipelineAdapters {
    pub ingest: Arc<dyn IngestAdapter>,
    pub transcribe: Arc<dyn TranscribeAdapter>,
    pub vision: Arc<dyn VisionAdapter>,
    pub scoring: Arc<dyn ScoringAdapter>,
    pub render: Arc<dyn RenderAdapter>,
    pub publish: Arc<dyn PublishAdapter>,
}

/// Coordinates entity state, queues and adapters across the pipeline.
pub struct PipelineCoordinator {
    store: Arc<JobStore>,
    registry: Arc<QueueRegistry>,
    repo: Arc<EntityRepo>,
    adapters: PipelineAdapters,
    config: PipelineConfig,
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<QueueRegistry>,
        repo: Arc<EntityRepo>,
        adapters: PipelineAdapters,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            repo,
            adapters,
            config,
        }
    }

    pub fn repo(&self) -> &Arc<EntityRepo> {
        &self.repo
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    // ---- public surface used by the CRUD/API layer ----

    /// Create a job on the queue serving its type. Counted against the
    /// queue first so draining queues reject before the record exists.
    pub fn enqueue(
        &self,
        job_type: JobType,
        data: JobData,
        mut opts: CreateJobOptions,
    ) -> WorkerResult<Job> {
        let queue = self
            .registry
            .queue_for(job_type)
            .ok_or(WorkerError::UnroutedJobType(job_type))?;
        // Jobs without an explicit retry budget inherit the queue's.
        if opts.max_retries.is_none() {
            opts.max_retries = Some(self.registry.settings(&queue)?.max_retries);
        }
        self.registry.record_enqueue(&queue)?;
        Ok(self.store.create(job_type, data, opts))
    }

    pub fn get_job(&self, job_id: &JobId) -> Option<Job> {
        self.store.get(job_id)
    }

    /// Cancel a job that has not been claimed yet.
    pub fn cancel_job(&self, job_id: &JobId) -> WorkerResult<Job> {
        let job = self.store.cancel(job_id)?;
        if let Some(queue) = self.registry.queue_for(job.job_type) {
            self.registry.record_cancelled(&queue)?;
        }
        info!(job_id = %job.id, "Job cancelled");
        Ok(job)
    }

    pub fn queue_stats(&self, name: &str) -> WorkerResult<QueueSnapshot> {
        Ok(self.registry.snapshot(name)?)
    }

    pub fn queue_health(&self, name: &str) -> WorkerResult<QueueHealth> {
        Ok(self.registry.health(name)?)
    }

    pub fn set_queue_status(&self, name: &str, status: QueueStatus) -> WorkerResult<()> {
        Ok(self.registry.set_status(name, status)?)
    }

    /// Apply a human review decision to a clip.
    ///
    /// Approving a rendered clip enqueues exactly one publish job; the
    /// guard skips the enqueue when a live publish job already exists.
    pub fn transition_clip_approval(
        &self,
        clip_id: &ClipId,
        decision: ApprovalStatus,
        reviewed_by: &str,
        notes: Option<String>,
    ) -> WorkerResult<Clip> {
        let clip = self.repo.update_clip(clip_id, |c| {
            c.review(decision, reviewed_by, notes)?;
            Ok(c.clone())
        })?;

        match decision {
            ApprovalStatus::Approved => {
                if clip.status == ClipStatus::Rendered {
                    self.enqueue_publish(&clip)?;
                } else if clip.status == ClipStatus::Pending
                    && self.config.require_approval_before_render
                {
                    self.repo.update_clip(clip_id, |c| {
                        c.transition(ClipStatus::PendingRender)?;
                        Ok(())
                    })?;
                    self.enqueue(
                        JobType::RenderClip,
                        JobData::clip(clip_id),
                        CreateJobOptions {
                            stream_id: Some(clip.stream_id.clone()),
                            clip_id: Some(clip_id.clone()),
                            ..Default::default()
                        },
                    )?;
                }
            }
            ApprovalStatus::Rejected => {
                // The clip never proceeds; the stream may be finishable now.
                self.maybe_finish_stream(&clip.stream_id)?;
            }
            // review() already rejected a pending decision.
            ApprovalStatus::Pending => {}
        }

        self.repo
            .get_clip(clip_id)
            .ok_or_else(|| WorkerError::entity_not_found("clip", clip_id.as_str()))
    }

    // ---- job handlers invoked by the dispatcher ----

    pub async fn handle(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        match job.job_type {
            JobType::IngestStream | JobType::DownloadStream | JobType::ProcessStream => {
                self.handle_ingest(job).await
            }
            JobType::TranscribeChunk => self.handle_transcribe(job).await,
            JobType::AnalyzeVision => self.handle_vision(job).await,
            JobType::ScoreClip => self.handle_scoring(job).await,
            JobType::GenerateHighlights => self.handle_generate_highlights(job),
            JobType::RenderClip => self.handle_render(job).await,
            JobType::PublishClip => self.handle_publish(job).await,
        }
    }

    /// Mirror a job retry onto the owning entity's retry counter. Chunk
    /// retries are tracked on the job alone.
    pub fn on_retrying(&self, job: &Job) {
        let outcome = match job.data.entity_kind {
            EntityKind::Stream => {
                let id = StreamId::from(job.data.entity_id.as_str());
                self.repo.update_stream(&id, |s| {
                    s.retry_count += 1;
                    Ok(())
                })
            }
            EntityKind::Clip => {
                let id = ClipId::from(job.data.entity_id.as_str());
                self.repo.update_clip(&id, |c| {
                    c.retry_count += 1;
                    Ok(())
                })
            }
            EntityKind::Chunk => Ok(()),
        };
        if let Err(e) = outcome {
            warn!(job_id = %job.id, error = %e, "Retry bookkeeping failed");
        }
    }

    /// Terminal failure propagation: the owning entity flips to failed via
    /// its state machine, never left silently orphaned.
    pub fn on_exhausted(&self, job: &Job, error: &str) {
        let outcome: WorkerResult<()> = (|| match job.data.entity_kind {
            EntityKind::Stream => {
                let id = StreamId::from(job.data.entity_id.as_str());
                self.repo.update_stream(&id, |s| {
                    s.fail(error)?;
                    Ok(())
                })
            }
            EntityKind::Chunk => {
                let id = ChunkId::from(job.data.entity_id.as_str());
                self.repo.update_chunk(&id, |c| {
                    c.fail(error)?;
                    Ok(())
                })?;
                if let Some(chunk) = self.repo.get_chunk(&id) {
                    self.maybe_finish_stream(&chunk.stream_id)?;
                }
                Ok(())
            }
            EntityKind::Clip => {
                let id = ClipId::from(job.data.entity_id.as_str());
                self.repo.update_clip(&id, |c| {
                    c.fail(error)?;
                    Ok(())
                })?;
                if let Some(clip) = self.repo.get_clip(&id) {
                    self.maybe_finish_stream(&clip.stream_id)?;
                }
                Ok(())
            }
        })();
        if let Err(e) = outcome {
            warn!(job_id = %job.id, error = %e, "Terminal failure propagation failed");
        }
    }

    async fn handle_ingest(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let stream_id = self.stream_id_of(job)?;
        let stream = self
            .repo
            .get_stream(&stream_id)
            .ok_or_else(|| WorkerError::entity_not_found("stream", stream_id.as_str()))?;

        // Idempotent across retries: a stream that already moved past
        // download is not re-ingested.
        match stream.status {
            StreamStatus::Pending => {
                self.repo.update_stream(&stream_id, |s| {
                    s.transition(StreamStatus::Downloading)?;
                    Ok(())
                })?;
            }
            StreamStatus::Downloading => {}
            other => {
                return Ok(json!({ "skipped": true, "status": other.to_string() }));
            }
        }

        let outcome = self.adapters.ingest.ingest(&stream).await?;
        if outcome.chunks.is_empty() {
            return Err(AdapterError::invalid_input("ingest produced no chunks").into());
        }

        self.repo.update_stream(&stream_id, |s| {
            s.file_path = Some(outcome.media_path.clone());
            s.file_size_bytes = outcome.file_size_bytes;
            s.duration_seconds = Some(outcome.duration_seconds);
            s.record_progress(outcome.file_size_bytes, 100);
            s.transition(StreamStatus::Downloaded)?;
            Ok(())
        })?;

        let mut chunk_ids = Vec::with_capacity(outcome.chunks.len());
        for window in &outcome.chunks {
            let mut chunk = Chunk::new(stream_id.clone(), window.index, window.start, window.end)?;
            chunk.file_path = window.file_path.clone();
            chunk_ids.push(chunk.id.clone());
            self.repo.insert_chunk(chunk);
        }

        self.repo.update_stream(&stream_id, |s| {
            s.transition(StreamStatus::Processing)?;
            Ok(())
        })?;

        for chunk_id in &chunk_ids {
            self.enqueue(
                JobType::TranscribeChunk,
                JobData::chunk(chunk_id),
                CreateJobOptions {
                    stream_id: Some(stream_id.clone()),
                    streamer_id: job.streamer_id.clone(),
                    ..Default::default()
                },
            )?;
        }

        info!(
            stream_id = %stream_id,
            chunks = chunk_ids.len(),
            duration_seconds = outcome.duration_seconds,
            "Stream ingested"
        );
        Ok(json!({
            "chunks": chunk_ids.len(),
            "duration_seconds": outcome.duration_seconds,
        }))
    }

    async fn handle_transcribe(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let chunk_id = self.chunk_id_of(job)?;
        self.repo.update_chunk(&chunk_id, |c| {
            if c.status == ChunkStatus::Pending {
                c.transition(ChunkStatus::Processing)?;
            }
            Ok(())
        })?;

        let chunk = self
            .repo
            .get_chunk(&chunk_id)
            .ok_or_else(|| WorkerError::entity_not_found("chunk", chunk_id.as_str()))?;
        let transcription = self.adapters.transcribe.transcribe(&chunk).await?;
        let word_count = transcription.word_count;

        self.repo.update_chunk(&chunk_id, |c| {
            c.record_transcription(transcription)?;
            Ok(())
        })?;

        self.enqueue(
            JobType::AnalyzeVision,
            JobData::chunk(&chunk_id),
            CreateJobOptions {
                stream_id: Some(chunk.stream_id.clone()),
                ..Default::default()
            },
        )?;
        Ok(json!({ "word_count": word_count }))
    }

    async fn handle_vision(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let chunk_id = self.chunk_id_of(job)?;
        let chunk = self
            .repo
            .get_chunk(&chunk_id)
            .ok_or_else(|| WorkerError::entity_not_found("chunk", chunk_id.as_str()))?;
        let vision = self.adapters.vision.analyze(&chunk).await?;
        let face_presence = vision.face_presence;

        self.repo.update_chunk(&chunk_id, |c| {
            c.record_vision(vision)?;
            Ok(())
        })?;

        self.enqueue(
            JobType::ScoreClip,
            JobData::chunk(&chunk_id),
            CreateJobOptions {
                stream_id: Some(chunk.stream_id.clone()),
                ..Default::default()
            },
        )?;
        Ok(json!({ "face_presence": face_presence }))
    }

    async fn handle_scoring(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let chunk_id = self.chunk_id_of(job)?;
        let chunk = self
            .repo
            .get_chunk(&chunk_id)
            .ok_or_else(|| WorkerError::entity_not_found("chunk", chunk_id.as_str()))?;
        let outcome = self.adapters.scoring.score(&chunk).await?;

        self.repo.update_chunk(&chunk_id, |c| {
            c.record_score(outcome.score, outcome.breakdown.clone(), outcome.audio.clone())?;
            Ok(())
        })?;

        let clip_id = if outcome.score >= self.config.highlight_threshold {
            Some(self.spawn_clip(&chunk, outcome.score)?)
        } else {
            None
        };

        self.repo.update_chunk(&chunk_id, |c| {
            c.transition(ChunkStatus::Completed)?;
            Ok(())
        })?;
        self.maybe_finish_stream(&chunk.stream_id)?;

        Ok(json!({
            "score": outcome.score,
            "clip_id": clip_id.as_ref().map(|id| id.to_string()),
        }))
    }

    /// Sweep a stream's scored chunks for highlights that never became
    /// clips (threshold changes, reprocessing).
    fn handle_generate_highlights(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let stream_id = self.stream_id_of(job)?;
        let mut created = 0usize;
        for chunk in self.repo.chunks_for_stream(&stream_id) {
            let Some(score) = chunk.highlight_score else {
                continue;
            };
            if score < self.config.highlight_threshold
                || self.repo.clip_exists_for_chunk(&chunk.id)
            {
                continue;
            }
            self.spawn_clip(&chunk, score)?;
            created += 1;
        }
        info!(stream_id = %stream_id, clips_created = created, "Highlight sweep done");
        Ok(json!({ "clips_created": created }))
    }

    async fn handle_render(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let clip_id = self.clip_id_of(job)?;
        self.repo.update_clip(&clip_id, |c| {
            if c.status == ClipStatus::PendingRender {
                c.transition(ClipStatus::Rendering)?;
            }
            Ok(())
        })?;

        let clip = self
            .repo
            .get_clip(&clip_id)
            .ok_or_else(|| WorkerError::entity_not_found("clip", clip_id.as_str()))?;
        let outcome = self.adapters.render.render(&clip).await?;

        let approved = self.repo.update_clip(&clip_id, |c| {
            c.record_render(outcome.file_path.clone(), outcome.thumbnail_path.clone())?;
            Ok(c.approval_status == ApprovalStatus::Approved)
        })?;

        if approved {
            let clip = self
                .repo
                .get_clip(&clip_id)
                .ok_or_else(|| WorkerError::entity_not_found("clip", clip_id.as_str()))?;
            self.enqueue_publish(&clip)?;
        }
        Ok(json!({ "file_path": outcome.file_path }))
    }

    async fn handle_publish(&self, job: &Job) -> WorkerResult<serde_json::Value> {
        let clip_id = self.clip_id_of(job)?;
        let clip = self
            .repo
            .get_clip(&clip_id)
            .ok_or_else(|| WorkerError::entity_not_found("clip", clip_id.as_str()))?;

        if clip.approval_status != ApprovalStatus::Approved
            || !matches!(clip.status, ClipStatus::Rendered | ClipStatus::Published)
        {
            return Err(WorkerError::invalid_payload(format!(
                "clip {} is not publishable (status {}, approval {})",
                clip_id, clip.status, clip.approval_status
            )));
        }

        // Retries skip platforms that already succeeded.
        let remaining: Vec<Platform> = self
            .config
            .publish_platforms
            .iter()
            .copied()
            .filter(|p| !clip.published_urls.iter().any(|u| u.platform == *p))
            .collect();

        let mut failures = Vec::new();
        if !remaining.is_empty() {
            let results = self.adapters.publish.publish(&clip, &remaining).await?;
            for result in results {
                match result.outcome {
                    Ok(url) => {
                        self.repo.update_clip(&clip_id, |c| {
                            c.record_platform_url(url);
                            Ok(())
                        })?;
                    }
                    Err(msg) => failures.push(format!("{}: {}", result.platform, msg)),
                }
            }
        }

        if !failures.is_empty() {
            return Err(WorkerError::job_failed(format!(
                "publish failed for {}",
                failures.join(", ")
            )));
        }

        let urls = self.repo.update_clip(&clip_id, |c| {
            if c.status == ClipStatus::Rendered {
                c.record_publish()?;
            }
            Ok(c.published_urls.clone())
        })?;
        self.maybe_finish_stream(&clip.stream_id)?;
        info!(clip_id = %clip_id, platforms = urls.len(), "Clip published");
        Ok(serde_json::to_value(&urls)?)
    }

    // ---- internal progression rules ----

    /// Carve a clip from a scored chunk; unless approval gates rendering,
    /// it goes straight to the render queue.
    fn spawn_clip(&self, chunk: &Chunk, score: f64) -> WorkerResult<ClipId> {
        let mut clip = Clip::new(
            chunk.stream_id.clone(),
            chunk.id.clone(),
            chunk.start_time,
            chunk.end_time,
        )
        .with_highlight_score(score);
        let clip_id = clip.id.clone();

        if self.config.require_approval_before_render {
            // Waits at pending until a reviewer approves.
            self.repo.insert_clip(clip);
        } else {
            clip.transition(ClipStatus::PendingRender)?;
            self.repo.insert_clip(clip);
            self.enqueue(
                JobType::RenderClip,
                JobData::clip(&clip_id),
                CreateJobOptions {
                    stream_id: Some(chunk.stream_id.clone()),
                    clip_id: Some(clip_id.clone()),
                    ..Default::default()
                },
            )?;
        }
        info!(clip_id = %clip_id, chunk_id = %chunk.id, score, "Clip created from highlight");
        Ok(clip_id)
    }

    /// Enqueue a publish job for a rendered, approved clip unless a live
    /// publish job for it already exists.
    fn enqueue_publish(&self, clip: &Clip) -> WorkerResult<Option<Job>> {
        let already_queued = self
            .store
            .jobs_of_type(JobType::PublishClip)
            .iter()
            .any(|j| j.clip_id.as_ref() == Some(&clip.id) && !j.status.is_terminal());
        if already_queued {
            return Ok(None);
        }
        let job = self.enqueue(
            JobType::PublishClip,
            JobData::clip(&clip.id),
            CreateJobOptions {
                stream_id: Some(clip.stream_id.clone()),
                clip_id: Some(clip.id.clone()),
                ..Default::default()
            },
        )?;
        Ok(Some(job))
    }

    /// Advance a stream once its children settle.
    ///
    /// All chunks terminal: stream leaves `processing` (all failed means
    /// the stream fails). All clips settled on top of that: `published`
    /// when anything went out, `completed` otherwise. A rendered clip
    /// awaiting review keeps the stream at `processed`.
    pub fn maybe_finish_stream(&self, stream_id: &StreamId) -> WorkerResult<()> {
        let chunks = self.repo.chunks_for_stream(stream_id);
        if chunks.is_empty() || !chunks.iter().all(|c| c.status.is_terminal()) {
            return Ok(());
        }

        // Both status checks run inside the row lock: when two handlers
        // settle the same stream concurrently, exactly one performs each
        // transition and the other sees the stream already advanced and
        // leaves it alone.
        let all_failed = chunks.iter().all(|c| c.status == ChunkStatus::Failed);
        self.repo.update_stream(stream_id, |s| {
            if s.status == StreamStatus::Processing {
                if all_failed {
                    s.fail("all chunks failed")?;
                } else {
                    s.transition(StreamStatus::Processed)?;
                }
            }
            Ok(())
        })?;
        if all_failed {
            return Ok(());
        }

        let clips = self.repo.clips_for_stream(stream_id);
        let settled = clips
            .iter()
            .all(|c| c.status.is_terminal() || c.approval_status == ApprovalStatus::Rejected);
        if !settled {
            return Ok(());
        }

        let target = if clips.iter().any(|c| c.status == ClipStatus::Published) {
            StreamStatus::Published
        } else {
            StreamStatus::Completed
        };
        let finished = self.repo.update_stream(stream_id, |s| {
            if s.status == StreamStatus::Processed {
                s.transition(target)?;
                Ok(true)
            } else {
                Ok(false)
            }
        })?;
        if finished {
            info!(stream_id = %stream_id, status = %target, "Stream finished");
        }
        Ok(())
    }

    // ---- payload extraction ----

    fn stream_id_of(&self, job: &Job) -> WorkerResult<StreamId> {
        if job.data.entity_kind != EntityKind::Stream {
            return Err(WorkerError::invalid_payload(format!(
                "{} job expects a stream payload, got {:?}",
                job.job_type, job.data.entity_kind
            )));
        }
        Ok(StreamId::from(job.data.entity_id.as_str()))
    }

    fn chunk_id_of(&self, job: &Job) -> WorkerResult<ChunkId> {
        if job.data.entity_kind != EntityKind::Chunk {
            return Err(WorkerError::invalid_payload(format!(
                "{} job expects a chunk payload, got {:?}",
                job.job_type, job.data.entity_kind
            )));
        }
        Ok(ChunkId::from(job.data.entity_id.as_str()))
    }

    fn clip_id_of(&self, job: &Job) -> WorkerResult<ClipId> {
        if job.data.entity_kind != EntityKind::Clip {
            return Err(WorkerError::invalid_payload(format!(
                "{} job expects a clip payload, got {:?}",
                job.job_type, job.data.entity_kind
            )));
        }
        Ok(ClipId::from(job.data.entity_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        IngestOutcome, PlatformResult, RenderOutcome, ScoreOutcome, TimeWindow,
    };
    use crate::config::WorkerConfig;
    use async_trait::async_trait;
    use clipforge_models::{
        AudioFeatures, ScoreBreakdown, Stream, Transcription, VisionAnalysis,
    };

    struct StubAdapters;

    #[async_trait]
    impl IngestAdapter for StubAdapters {
        async fn ingest(&self, _stream: &Stream) -> Result<IngestOutcome, AdapterError> {
            Ok(IngestOutcome {
                media_path: "/tmp/vod.mp4".into(),
                file_size_bytes: 1,
                duration_seconds: 30.0,
                chunks: vec![TimeWindow {
                    index: 0,
                    start: 0.0,
                    end: 30.0,
                    file_path: None,
                }],
            })
        }
    }

    #[async_trait]
    impl TranscribeAdapter for StubAdapters {
        async fn transcribe(&self, _chunk: &Chunk) -> Result<Transcription, AdapterError> {
            Ok(Transcription {
                text: String::new(),
                language: None,
                segments: vec![],
                word_count: 0,
            })
        }
    }

    #[async_trait]
    impl VisionAdapter for StubAdapters {
        async fn analyze(&self, _chunk: &Chunk) -> Result<VisionAnalysis, AdapterError> {
            Ok(VisionAnalysis::default())
        }
    }

    #[async_trait]
    impl ScoringAdapter for StubAdapters {
        async fn score(&self, _chunk: &Chunk) -> Result<ScoreOutcome, AdapterError> {
            Ok(ScoreOutcome {
                score: 0.0,
                breakdown: ScoreBreakdown::default(),
                audio: AudioFeatures::default(),
            })
        }
    }

    #[async_trait]
    impl RenderAdapter for StubAdapters {
        async fn render(&self, _clip: &Clip) -> Result<RenderOutcome, AdapterError> {
            Ok(RenderOutcome {
                file_path: "/tmp/clip.mp4".into(),
                thumbnail_path: None,
            })
        }
    }

    #[async_trait]
    impl PublishAdapter for StubAdapters {
        async fn publish(
            &self,
            _clip: &Clip,
            _platforms: &[Platform],
        ) -> Result<Vec<PlatformResult>, AdapterError> {
            Ok(vec![])
        }
    }

    fn coordinator() -> PipelineCoordinator {
        coordinator_with(WorkerConfig::default())
    }

    fn coordinator_with(config: WorkerConfig) -> PipelineCoordinator {
        let store = Arc::new(JobStore::new());
        let registry = Arc::new(QueueRegistry::new());
        for spec in config.standard_queues() {
            registry
                .register(spec.name, spec.job_types, spec.concurrency, spec.settings)
                .unwrap();
        }
        let stub = Arc::new(StubAdapters);
        PipelineCoordinator::new(
            store,
            registry,
            Arc::new(EntityRepo::new()),
            PipelineAdapters {
                ingest: stub.clone(),
                transcribe: stub.clone(),
                vision: stub.clone(),
                scoring: stub.clone(),
                render: stub.clone(),
                publish: stub,
            },
            config.pipeline,
        )
    }

    fn rendered_clip(coord: &PipelineCoordinator) -> Clip {
        let mut clip = Clip::new(StreamId::new(), ChunkId::new(), 0.0, 30.0);
        clip.transition(ClipStatus::PendingRender).unwrap();
        clip.transition(ClipStatus::Rendering).unwrap();
        clip.record_render("/tmp/c.mp4", None).unwrap();
        coord.repo.insert_clip(clip.clone());
        clip
    }

    #[test]
    fn test_enqueue_routes_and_counts() {
        let coord = coordinator();
        let job = coord
            .enqueue(
                JobType::TranscribeChunk,
                JobData::chunk(&ChunkId::new()),
                CreateJobOptions::default(),
            )
            .unwrap();
        assert_eq!(job.job_type, JobType::TranscribeChunk);
        let snap = coord.queue_stats("transcribe").unwrap();
        assert_eq!(snap.counters.waiting, 1);
    }

    #[test]
    fn test_enqueue_inherits_queue_retry_budget() {
        let config = WorkerConfig {
            max_retries: 5,
            ..Default::default()
        };
        let coord = coordinator_with(config);
        let job = coord
            .enqueue(
                JobType::TranscribeChunk,
                JobData::chunk(&ChunkId::new()),
                CreateJobOptions::default(),
            )
            .unwrap();
        assert_eq!(job.max_retries, 5);

        let overridden = coord
            .enqueue(
                JobType::TranscribeChunk,
                JobData::chunk(&ChunkId::new()),
                CreateJobOptions {
                    max_retries: Some(9),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(overridden.max_retries, 9);
    }

    #[test]
    fn test_approval_enqueues_publish_once() {
        let coord = coordinator();
        let clip = rendered_clip(&coord);
        coord
            .transition_clip_approval(&clip.id, ApprovalStatus::Approved, "mod_1", None)
            .unwrap();
        // A second approval attempt fails, and the guard would skip anyway.
        assert!(coord
            .transition_clip_approval(&clip.id, ApprovalStatus::Approved, "mod_2", None)
            .is_err());
        let publish_jobs = coord.store.jobs_of_type(JobType::PublishClip);
        assert_eq!(publish_jobs.len(), 1);
        assert_eq!(publish_jobs[0].clip_id.as_ref(), Some(&clip.id));
    }

    #[test]
    fn test_rejected_clip_never_queues_publish() {
        let coord = coordinator();
        let clip = rendered_clip(&coord);
        coord
            .transition_clip_approval(&clip.id, ApprovalStatus::Rejected, "mod_1", Some("off-brand".into()))
            .unwrap();
        assert!(coord.store.jobs_of_type(JobType::PublishClip).is_empty());
    }

    #[test]
    fn test_finish_stream_completed_without_clips() {
        let coord = coordinator();
        let mut stream = Stream::new(
            clipforge_models::StreamerId::new(),
            "https://example.test/vod",
            Platform::Twitch,
        );
        for status in [
            StreamStatus::Downloading,
            StreamStatus::Downloaded,
            StreamStatus::Processing,
        ] {
            stream.transition(status).unwrap();
        }
        let stream_id = stream.id.clone();
        coord.repo.insert_stream(stream);

        let mut chunk = Chunk::new(stream_id.clone(), 0, 0.0, 30.0).unwrap();
        chunk.force_status(ChunkStatus::Completed);
        coord.repo.insert_chunk(chunk);

        coord.maybe_finish_stream(&stream_id).unwrap();
        assert_eq!(
            coord.repo.get_stream(&stream_id).unwrap().status,
            StreamStatus::Completed
        );
    }

    #[test]
    fn test_all_chunks_failed_fails_stream() {
        let coord = coordinator();
        let mut stream = Stream::new(
            clipforge_models::StreamerId::new(),
            "https://example.test/vod",
            Platform::Twitch,
        );
        for status in [
            StreamStatus::Downloading,
            StreamStatus::Downloaded,
            StreamStatus::Processing,
        ] {
            stream.transition(status).unwrap();
        }
        let stream_id = stream.id.clone();
        coord.repo.insert_stream(stream);

        let mut chunk = Chunk::new(stream_id.clone(), 0, 0.0, 30.0).unwrap();
        chunk.force_status(ChunkStatus::Failed);
        coord.repo.insert_chunk(chunk);

        coord.maybe_finish_stream(&stream_id).unwrap();
        let stream = coord.repo.get_stream(&stream_id).unwrap();
        assert_eq!(stream.status, StreamStatus::Failed);
        assert!(stream.error_message.is_some());
    }

    #[test]
    fn test_retry_bookkeeping_mirrors_onto_stream() {
        let coord = coordinator();
        let stream = Stream::new(
            clipforge_models::StreamerId::new(),
            "https://example.test/vod",
            Platform::Twitch,
        );
        let stream_id = stream.id.clone();
        coord.repo.insert_stream(stream);

        let job = coord
            .enqueue(
                JobType::IngestStream,
                JobData::stream(&stream_id),
                CreateJobOptions::default(),
            )
            .unwrap();
        coord.on_retrying(&job);
        coord.on_retrying(&job);
        assert_eq!(coord.repo.get_stream(&stream_id).unwrap().retry_count, 2);
    }

    #[test]
    fn test_concurrent_settlement_attempts_all_succeed() {
        let coord = coordinator();
        let mut stream = Stream::new(
            clipforge_models::StreamerId::new(),
            "https://example.test/vod",
            Platform::Twitch,
        );
        for status in [
            StreamStatus::Downloading,
            StreamStatus::Downloaded,
            StreamStatus::Processing,
        ] {
            stream.transition(status).unwrap();
        }
        let stream_id = stream.id.clone();
        coord.repo.insert_stream(stream);

        let mut chunk = Chunk::new(stream_id.clone(), 0, 0.0, 30.0).unwrap();
        chunk.force_status(ChunkStatus::Completed);
        coord.repo.insert_chunk(chunk);

        // Several handlers finishing children of the same stream at once:
        // one wins each transition, the rest are no-ops, nobody errors.
        let barrier = std::sync::Barrier::new(8);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        coord.maybe_finish_stream(&stream_id)
                    })
                })
                .collect();
            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });
        assert_eq!(
            coord.repo.get_stream(&stream_id).unwrap().status,
            StreamStatus::Completed
        );
    }

    #[test]
    fn test_unreviewed_rendered_clip_holds_stream_at_processed() {
        let coord = coordinator();
        let mut stream = Stream::new(
            clipforge_models::StreamerId::new(),
            "https://example.test/vod",
            Platform::Twitch,
        );
        for status in [
            StreamStatus::Downloading,
            StreamStatus::Downloaded,
            StreamStatus::Processing,
        ] {
            stream.transition(status).unwrap();
        }
        let stream_id = stream.id.clone();
        coord.repo.insert_stream(stream);

        let mut chunk = Chunk::new(stream_id.clone(), 0, 0.0, 30.0).unwrap();
        chunk.force_status(ChunkStatus::Completed);
        let chunk_id = chunk.id.clone();
        coord.repo.insert_chunk(chunk);

        let mut clip = Clip::new(stream_id.clone(), chunk_id, 0.0, 30.0);
        clip.force_status(ClipStatus::Rendered);
        coord.repo.insert_clip(clip);

        coord.maybe_finish_stream(&stream_id).unwrap();
        assert_eq!(
            coord.repo.get_stream(&stream_id).unwrap().status,
            StreamStatus::Processed
        );
    }
}
