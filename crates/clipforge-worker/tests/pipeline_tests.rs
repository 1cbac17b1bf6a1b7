//! End-to-end pipeline tests: dispatcher + coordinator + store + registry
//! with mock adapters.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use clipforge_models::{
    ApprovalStatus, AudioFeatures, Chunk, ChunkStatus, Clip, ClipStatus, JobData, JobStatus,
    JobType, Platform, PublishedUrl, QueueStatus, ScoreBreakdown, Stream, StreamStatus, Streamer,
    Transcription, VisionAnalysis,
};
use clipforge_queue::{CreateJobOptions, JobStore, QueueError, QueueRegistry};
use clipforge_worker::{
    AdapterError, Dispatcher, EntityRepo, IngestAdapter, IngestOutcome, PipelineAdapters,
    PipelineCoordinator, PlatformResult, PublishAdapter, RenderAdapter, RenderOutcome,
    ScoreOutcome, ScoringAdapter, TimeWindow, TranscribeAdapter, VisionAdapter, WorkerConfig,
};

/// Configurable mock for all six adapter seams.
#[derive(Default)]
struct MockAdapters {
    /// Chunk windows returned by ingest
    ingest_chunks: u32,
    /// Remaining transcribe calls that fail before succeeding
    transcribe_failures: AtomicU32,
    /// Total transcribe invocations
    transcribe_calls: AtomicUsize,
    /// Every vision call fails
    vision_always_fails: bool,
    /// Chunk indices that score above the highlight threshold
    high_score_indices: Vec<u32>,
    /// Platform whose publish attempts fail while failures remain
    publish_fail_platform: Option<Platform>,
    /// Remaining publish failures for `publish_fail_platform`
    publish_failures: AtomicU32,
    /// Platform list received by each publish call
    publish_calls: std::sync::Mutex<Vec<Vec<Platform>>>,
}

impl MockAdapters {
    fn new(ingest_chunks: u32) -> Self {
        Self {
            ingest_chunks,
            ..Default::default()
        }
    }
}

#[async_trait]
impl IngestAdapter for MockAdapters {
    async fn ingest(&self, _stream: &Stream) -> Result<IngestOutcome, AdapterError> {
        let chunks = (0..self.ingest_chunks)
            .map(|i| TimeWindow {
                index: i,
                start: f64::from(i) * 30.0,
                end: f64::from(i + 1) * 30.0,
                file_path: None,
            })
            .collect();
        Ok(IngestOutcome {
            media_path: "/tmp/test-vod.mp4".into(),
            file_size_bytes: 2048,
            duration_seconds: f64::from(self.ingest_chunks) * 30.0,
            chunks,
        })
    }
}

#[async_trait]
impl TranscribeAdapter for MockAdapters {
    async fn transcribe(&self, chunk: &Chunk) -> Result<Transcription, AdapterError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.transcribe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transcribe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::unavailable("speech service down"));
        }
        Ok(Transcription {
            text: format!("chunk {} speech", chunk.index),
            language: Some("en".into()),
            segments: vec![],
            word_count: 3,
        })
    }
}

#[async_trait]
impl VisionAdapter for MockAdapters {
    async fn analyze(&self, _chunk: &Chunk) -> Result<VisionAnalysis, AdapterError> {
        if self.vision_always_fails {
            return Err(AdapterError::failed("frame decode error"));
        }
        Ok(VisionAnalysis {
            visual_activity: 0.4,
            face_presence: 0.6,
            scene_changes: 0.1,
        })
    }
}

#[async_trait]
impl ScoringAdapter for MockAdapters {
    async fn score(&self, chunk: &Chunk) -> Result<ScoreOutcome, AdapterError> {
        let score = if self.high_score_indices.contains(&chunk.index) {
            0.9
        } else {
            0.2
        };
        Ok(ScoreOutcome {
            score,
            breakdown: ScoreBreakdown {
                audio_energy: score,
                ..Default::default()
            },
            audio: AudioFeatures {
                energy: score,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl RenderAdapter for MockAdapters {
    async fn render(&self, clip: &Clip) -> Result<RenderOutcome, AdapterError> {
        Ok(RenderOutcome {
            file_path: format!("/tmp/clip-{}.mp4", clip.id),
            thumbnail_path: Some(format!("/tmp/clip-{}.jpg", clip.id)),
        })
    }
}

#[async_trait]
impl PublishAdapter for MockAdapters {
    async fn publish(
        &self,
        clip: &Clip,
        platforms: &[Platform],
    ) -> Result<Vec<PlatformResult>, AdapterError> {
        self.publish_calls
            .lock()
            .unwrap()
            .push(platforms.to_vec());
        Ok(platforms
            .iter()
            .map(|platform| {
                if self.publish_fail_platform == Some(*platform)
                    && self.publish_failures.load(Ordering::SeqCst) > 0
                {
                    self.publish_failures.fetch_sub(1, Ordering::SeqCst);
                    return PlatformResult {
                        platform: *platform,
                        outcome: Err("platform api down".into()),
                    };
                }
                PlatformResult {
                    platform: *platform,
                    outcome: Ok(PublishedUrl {
                        platform: *platform,
                        url: format!("https://{platform}.example/{}", clip.id),
                        platform_id: None,
                    }),
                }
            })
            .collect())
    }
}

struct Harness {
    store: Arc<JobStore>,
    registry: Arc<QueueRegistry>,
    repo: Arc<EntityRepo>,
    coordinator: Arc<PipelineCoordinator>,
    dispatcher: Arc<Dispatcher>,
    task: Option<tokio::task::JoinHandle<clipforge_worker::WorkerResult<()>>>,
}

impl Harness {
    fn config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(20),
            backoff_delay: Duration::from_millis(10),
            backoff_max_delay: Duration::from_millis(50),
            shutdown_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn build(adapters: Arc<MockAdapters>, config: WorkerConfig) -> Self {
        let store = Arc::new(JobStore::new());
        let registry = Arc::new(QueueRegistry::new());
        let repo = Arc::new(EntityRepo::new());
        for spec in config.standard_queues() {
            registry
                .register(spec.name, spec.job_types, spec.concurrency, spec.settings)
                .unwrap();
        }
        let coordinator = Arc::new(PipelineCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&repo),
            PipelineAdapters {
                ingest: adapters.clone(),
                transcribe: adapters.clone(),
                vision: adapters.clone(),
                scoring: adapters.clone(),
                render: adapters.clone(),
                publish: adapters,
            },
            config.pipeline.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&coordinator),
            config,
        ));
        Self {
            store,
            registry,
            repo,
            coordinator,
            dispatcher,
            task: None,
        }
    }

    fn start(&mut self) {
        let runner = Arc::clone(&self.dispatcher);
        self.task = Some(tokio::spawn(async move { runner.run().await }));
    }

    /// Seed a streamer + pending stream and enqueue its ingest job.
    fn seed_stream(&self) -> clipforge_models::StreamId {
        let streamer = Streamer::new("test_streamer", Platform::Twitch);
        let stream = Stream::new(
            streamer.id.clone(),
            "https://www.twitch.tv/videos/1",
            Platform::Twitch,
        );
        let stream_id = stream.id.clone();
        self.repo.insert_streamer(streamer);
        self.repo.insert_stream(stream);
        self.coordinator
            .enqueue(
                JobType::IngestStream,
                JobData::stream(&stream_id),
                CreateJobOptions {
                    stream_id: Some(stream_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        stream_id
    }

    async fn stop(&mut self) {
        self.dispatcher.shutdown();
        if let Some(task) = self.task.take() {
            task.await.unwrap().unwrap();
        }
    }
}

/// Poll until `check` passes or the timeout elapses.
async fn wait_for(timeout: Duration, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_stream_flows_from_ingest_to_published() {
    let adapters = Arc::new(MockAdapters {
        high_score_indices: vec![1],
        ..MockAdapters::new(2)
    });
    let mut harness = Harness::build(adapters, Harness::config());
    harness.start();
    let stream_id = harness.seed_stream();

    // Chunks settle; the high scorer becomes a rendered clip and the
    // stream parks at processed awaiting review.
    let repo = Arc::clone(&harness.repo);
    let sid = stream_id.clone();
    wait_for(Duration::from_secs(5), move || {
        let clips = repo.clips_for_stream(&sid);
        clips.len() == 1
            && clips[0].status == ClipStatus::Rendered
            && repo
                .get_stream(&sid)
                .is_some_and(|s| s.status == StreamStatus::Processed)
    })
    .await;

    let chunks = harness.repo.chunks_for_stream(&stream_id);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.status == ChunkStatus::Completed));
    assert!(chunks.iter().all(|c| c.highlight_score.is_some()));

    let stream = harness.repo.get_stream(&stream_id).unwrap();
    assert_eq!(stream.status, StreamStatus::Processed);
    assert_eq!(stream.duration_seconds, Some(60.0));
    assert!(stream.file_path.is_some());

    // Approve the rendered clip; publish follows automatically.
    let clip = harness.repo.clips_for_stream(&stream_id).pop().unwrap();
    assert!(clip.chunk_id.is_some());
    assert_eq!(clip.highlight_score, Some(0.9));
    harness
        .coordinator
        .transition_clip_approval(&clip.id, ApprovalStatus::Approved, "mod_1", None)
        .unwrap();

    let repo = Arc::clone(&harness.repo);
    let sid = stream_id.clone();
    wait_for(Duration::from_secs(5), move || {
        repo.get_stream(&sid)
            .is_some_and(|s| s.status == StreamStatus::Published)
    })
    .await;

    let clip = harness.repo.get_clip(&clip.id).unwrap();
    assert_eq!(clip.status, ClipStatus::Published);
    assert_eq!(clip.published_urls.len(), 1);
    assert!(clip.published_at.is_some());

    let snap = harness.registry.snapshot("transcribe").unwrap();
    assert_eq!(snap.counters.completed, 2);
    assert_eq!(snap.counters.failed, 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_flaky_adapter_retries_until_success() {
    let adapters = Arc::new(MockAdapters {
        transcribe_failures: AtomicU32::new(2),
        ..MockAdapters::new(1)
    });
    let mut harness = Harness::build(Arc::clone(&adapters), Harness::config());
    harness.start();
    let stream_id = harness.seed_stream();

    // Low score everywhere: the stream finishes with no clips.
    let repo = Arc::clone(&harness.repo);
    let sid = stream_id.clone();
    wait_for(Duration::from_secs(5), move || {
        repo.get_stream(&sid)
            .is_some_and(|s| s.status == StreamStatus::Completed)
    })
    .await;

    // Two failures then one success.
    assert_eq!(adapters.transcribe_calls.load(Ordering::SeqCst), 3);
    let jobs = harness.store.jobs_of_type(JobType::TranscribeChunk);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].retry_count, 2);

    assert!(harness.repo.clips_for_stream(&stream_id).is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn test_exhausted_retries_propagate_to_entities() {
    let adapters = Arc::new(MockAdapters {
        vision_always_fails: true,
        ..MockAdapters::new(1)
    });
    let mut config = Harness::config();
    config.max_retries = 1;
    let mut harness = Harness::build(adapters, config);
    harness.start();
    let stream_id = harness.seed_stream();

    // The only chunk fails terminally, so the stream fails.
    let repo = Arc::clone(&harness.repo);
    let sid = stream_id.clone();
    wait_for(Duration::from_secs(5), move || {
        repo.get_stream(&sid)
            .is_some_and(|s| s.status == StreamStatus::Failed)
    })
    .await;

    let chunk = harness
        .repo
        .chunks_for_stream(&stream_id)
        .pop()
        .unwrap();
    assert_eq!(chunk.status, ChunkStatus::Failed);
    assert!(chunk
        .error_message
        .as_deref()
        .unwrap()
        .contains("frame decode error"));

    let jobs = harness.store.jobs_of_type(JobType::AnalyzeVision);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].retry_count, 1);

    let snap = harness.registry.snapshot("vision").unwrap();
    assert_eq!(snap.counters.failed, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_partial_publish_failure_keeps_successes_and_retries_rest() {
    let adapters = Arc::new(MockAdapters {
        publish_fail_platform: Some(Platform::X),
        publish_failures: AtomicU32::new(1),
        ..MockAdapters::new(1)
    });
    let mut config = Harness::config();
    config.pipeline.publish_platforms = vec![Platform::Youtube, Platform::X];
    let mut harness = Harness::build(Arc::clone(&adapters), config);
    harness.start();

    // Seed a rendered, approved clip and queue its publish job directly.
    let mut clip = Clip::new(
        clipforge_models::StreamId::new(),
        clipforge_models::ChunkId::new(),
        0.0,
        30.0,
    );
    clip.transition(ClipStatus::PendingRender).unwrap();
    clip.transition(ClipStatus::Rendering).unwrap();
    clip.record_render("/tmp/partial.mp4", None).unwrap();
    clip.review(ApprovalStatus::Approved, "mod_1", None).unwrap();
    let clip_id = clip.id.clone();
    harness.repo.insert_clip(clip);
    let job = harness
        .coordinator
        .enqueue(
            JobType::PublishClip,
            JobData::clip(&clip_id),
            CreateJobOptions {
                clip_id: Some(clip_id.clone()),
                ..Default::default()
            },
        )
        .unwrap();

    let store = Arc::clone(&harness.store);
    let job_id = job.id.clone();
    wait_for(Duration::from_secs(5), move || {
        store
            .get(&job_id)
            .is_some_and(|j| j.status == JobStatus::Completed)
    })
    .await;

    // The first attempt failed one platform but kept the other's URL; the
    // retry was asked to publish only the missing platform.
    let calls = adapters.publish_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], vec![Platform::Youtube, Platform::X]);
    assert_eq!(calls[1], vec![Platform::X]);

    let clip = harness.repo.get_clip(&clip_id).unwrap();
    assert_eq!(clip.status, ClipStatus::Published);
    assert_eq!(clip.published_urls.len(), 2);
    assert_eq!(clip.retry_count, 1);

    let job = harness.store.get(&job.id).unwrap();
    assert_eq!(job.retry_count, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_cancel_before_dispatch_wins_races() {
    // No dispatcher running: the job never gets claimed.
    let harness = Harness::build(Arc::new(MockAdapters::new(1)), Harness::config());

    let job = harness
        .coordinator
        .enqueue(
            JobType::RenderClip,
            JobData::clip(&clipforge_models::ClipId::new()),
            CreateJobOptions::default(),
        )
        .unwrap();
    let cancelled = harness.coordinator.cancel_job(&job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // A late completion against the cancelled record is a reported no-op.
    let settings = harness.registry.settings("render").unwrap();
    assert!(matches!(
        harness
            .store
            .complete(&job.id, serde_json::Value::Null, &settings),
        Err(QueueError::AlreadyTerminal(_))
    ));
    assert_eq!(
        harness.store.get(&job.id).unwrap().status,
        JobStatus::Cancelled
    );

    let snap = harness.registry.snapshot("render").unwrap();
    assert_eq!(snap.counters.waiting, 0);
    assert_eq!(snap.counters.total(), 0);
}

#[tokio::test]
async fn test_paused_queue_defers_dispatch_until_resume() {
    let adapters = Arc::new(MockAdapters::new(1));
    let mut harness = Harness::build(Arc::clone(&adapters), Harness::config());
    harness.start();

    harness
        .registry
        .set_status("transcribe", QueueStatus::Paused)
        .unwrap();

    // Seed a chunk directly and enqueue its transcribe job.
    let mut stream = Stream::new(
        clipforge_models::StreamerId::new(),
        "https://www.twitch.tv/videos/2",
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
    harness.repo.insert_stream(stream);
    let chunk = Chunk::new(stream_id.clone(), 0, 0.0, 30.0).unwrap();
    let chunk_id = chunk.id.clone();
    harness.repo.insert_chunk(chunk);
    let job = harness
        .coordinator
        .enqueue(
            JobType::TranscribeChunk,
            JobData::chunk(&chunk_id),
            CreateJobOptions {
                stream_id: Some(stream_id),
                ..Default::default()
            },
        )
        .unwrap();

    // Paused: parked, not dispatched.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        harness.store.get(&job.id).unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(
        harness.registry.snapshot("transcribe").unwrap().counters.paused,
        1
    );

    harness
        .registry
        .set_status("transcribe", QueueStatus::Active)
        .unwrap();
    let store = Arc::clone(&harness.store);
    let job_id = job.id.clone();
    wait_for(Duration::from_secs(5), move || {
        store
            .get(&job_id)
            .is_some_and(|j| j.status == JobStatus::Completed)
    })
    .await;

    assert_eq!(adapters.transcribe_calls.load(Ordering::SeqCst), 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_every_job_handled_exactly_once_under_load() {
    let adapters = Arc::new(MockAdapters::new(1));
    let mut harness = Harness::build(Arc::clone(&adapters), Harness::config());
    harness.start();

    // One processing stream with many pending chunks, each with its own
    // transcribe job enqueued up front.
    let mut stream = Stream::new(
        clipforge_models::StreamerId::new(),
        "https://www.twitch.tv/videos/3",
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
    harness.repo.insert_stream(stream);

    let total = 25u32;
    for index in 0..total {
        let chunk = Chunk::new(
            stream_id.clone(),
            index,
            f64::from(index) * 30.0,
            f64::from(index + 1) * 30.0,
        )
        .unwrap();
        let chunk_id = chunk.id.clone();
        harness.repo.insert_chunk(chunk);
        harness
            .coordinator
            .enqueue(
                JobType::TranscribeChunk,
                JobData::chunk(&chunk_id),
                CreateJobOptions {
                    stream_id: Some(stream_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    let repo = Arc::clone(&harness.repo);
    let sid = stream_id.clone();
    wait_for(Duration::from_secs(10), move || {
        repo.get_stream(&sid)
            .is_some_and(|s| s.status == StreamStatus::Completed)
    })
    .await;

    // Exactly one transcribe call per chunk: no duplicate claims.
    assert_eq!(
        adapters.transcribe_calls.load(Ordering::SeqCst),
        total as usize
    );
    let jobs = harness.store.jobs_of_type(JobType::TranscribeChunk);
    assert_eq!(jobs.len(), total as usize);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));

    harness.stop().await;
}
