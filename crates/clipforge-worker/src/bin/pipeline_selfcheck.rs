//! End-to-end pipeline check with deterministic in-process adapters.
//!
//! Drives one stream from ingest through publish against the real store,
//! registry, coordinator and dispatcher, with every external collaborator
//! replaced by a canned implementation. Exits non-zero if the stream does
//! not reach its expected terminal status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipforge_models::{
    ApprovalStatus, AudioFeatures, Chunk, Clip, ClipStatus, JobData, JobType, Platform,
    PublishedUrl, ScoreBreakdown, Stream, StreamStatus, Streamer, Transcription, VisionAnalysis,
};
use clipforge_queue::{CreateJobOptions, JobStore, QueueRegistry};
use clipforge_worker::{
    AdapterError, Dispatcher, EntityRepo, IngestAdapter, IngestOutcome, PipelineAdapters,
    PipelineCoordinator, PlatformResult, PublishAdapter, RenderAdapter, RenderOutcome,
    ScoreOutcome, ScoringAdapter, TimeWindow, TranscribeAdapter, VisionAdapter, WorkerConfig,
};

/// Canned adapters: 4 chunks over a 120s VOD, one of which scores above
/// the default highlight threshold.
struct CannedAdapters;

#[async_trait]
impl IngestAdapter for CannedAdapters {
    async fn ingest(&self, stream: &Stream) -> Result<IngestOutcome, AdapterError> {
        let chunks = (0..4)
            .map(|i| TimeWindow {
                index: i,
                start: f64::from(i) * 30.0,
                end: f64::from(i + 1) * 30.0,
                file_path: Some(format!("/tmp/clipforge-selfcheck/{}-{i}.mp4", stream.id)),
            })
            .collect();
        Ok(IngestOutcome {
            media_path: format!("/tmp/clipforge-selfcheck/{}.mp4", stream.id),
            file_size_bytes: 1_000_000,
            duration_seconds: 120.0,
            chunks,
        })
    }
}

#[async_trait]
impl TranscribeAdapter for CannedAdapters {
    async fn transcribe(&self, chunk: &Chunk) -> Result<Transcription, AdapterError> {
        Ok(Transcription {
            text: format!("canned transcript for chunk {}", chunk.index),
            language: Some("en".into()),
            segments: vec![],
            word_count: 5,
        })
    }
}

#[async_trait]
impl VisionAdapter for CannedAdapters {
    async fn analyze(&self, chunk: &Chunk) -> Result<VisionAnalysis, AdapterError> {
        Ok(VisionAnalysis {
            visual_activity: 0.2 * f64::from(chunk.index),
            face_presence: 0.5,
            scene_changes: 0.1,
        })
    }
}

#[async_trait]
impl ScoringAdapter for CannedAdapters {
    async fn score(&self, chunk: &Chunk) -> Result<ScoreOutcome, AdapterError> {
        let score = if chunk.index == 2 { 0.9 } else { 0.3 };
        Ok(ScoreOutcome {
            score,
            breakdown: ScoreBreakdown {
                audio_energy: score,
                speech_activity: score,
                ..Default::default()
            },
            audio: AudioFeatures {
                energy: score,
                speech_activity: score,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl RenderAdapter for CannedAdapters {
    async fn render(&self, clip: &Clip) -> Result<RenderOutcome, AdapterError> {
        Ok(RenderOutcome {
            file_path: format!("/tmp/clipforge-selfcheck/clip-{}.mp4", clip.id),
            thumbnail_path: None,
        })
    }
}

#[async_trait]
impl PublishAdapter for CannedAdapters {
    async fn publish(
        &self,
        clip: &Clip,
        platforms: &[Platform],
    ) -> Result<Vec<PlatformResult>, AdapterError> {
        Ok(platforms
            .iter()
            .map(|platform| PlatformResult {
                platform: *platform,
                outcome: Ok(PublishedUrl {
                    platform: *platform,
                    url: format!("https://{platform}.example/{}", clip.id),
                    platform_id: Some(clip.id.to_string()),
                }),
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let _metrics = PrometheusBuilder::new().install_recorder()?;

    let config = WorkerConfig::from_env();
    println!("pipeline-selfcheck: starting with config {config:?}");

    let store = Arc::new(JobStore::new());
    let registry = Arc::new(QueueRegistry::new());
    let repo = Arc::new(EntityRepo::new());
    for spec in config.standard_queues() {
        registry.register(spec.name, spec.job_types, spec.concurrency, spec.settings)?;
    }

    let canned = Arc::new(CannedAdapters);
    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&repo),
        PipelineAdapters {
            ingest: canned.clone(),
            transcribe: canned.clone(),
            vision: canned.clone(),
            scoring: canned.clone(),
            render: canned.clone(),
            publish: canned,
        },
        config.pipeline.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&coordinator),
        config,
    ));
    let runner = Arc::clone(&dispatcher);
    let dispatcher_task = tokio::spawn(async move { runner.run().await });

    // Seed one streamer and one stream, then kick off ingest.
    let streamer = Streamer::new("selfcheck", Platform::Twitch);
    let stream = Stream::new(
        streamer.id.clone(),
        "https://www.twitch.tv/videos/selfcheck",
        Platform::Twitch,
    );
    let stream_id = stream.id.clone();
    repo.insert_streamer(streamer.clone());
    repo.insert_stream(stream);
    coordinator.enqueue(
        JobType::IngestStream,
        JobData::stream(&stream_id),
        CreateJobOptions {
            streamer_id: Some(streamer.id),
            stream_id: Some(stream_id.clone()),
            ..Default::default()
        },
    )?;

    // Drive the run: approve clips as they render, stop once the stream
    // settles.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("stream did not settle within 30s");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        for clip in repo.clips_for_stream(&stream_id) {
            if clip.status == ClipStatus::Rendered
                && clip.approval_status == ApprovalStatus::Pending
            {
                coordinator.transition_clip_approval(
                    &clip.id,
                    ApprovalStatus::Approved,
                    "selfcheck",
                    None,
                )?;
                println!("pipeline-selfcheck: approved clip {}", clip.id);
            }
        }

        let stream = repo
            .get_stream(&stream_id)
            .ok_or_else(|| anyhow::anyhow!("stream record vanished"))?;
        if matches!(
            stream.status,
            StreamStatus::Published | StreamStatus::Completed | StreamStatus::Failed
        ) {
            println!("pipeline-selfcheck: stream settled as {}", stream.status);
            if stream.status != StreamStatus::Published {
                anyhow::bail!("expected published, got {}", stream.status);
            }
            break;
        }
    }

    let clips = repo.clips_for_stream(&stream_id);
    anyhow::ensure!(clips.len() == 1, "expected 1 clip, got {}", clips.len());
    anyhow::ensure!(
        clips[0].status == ClipStatus::Published,
        "clip not published"
    );
    for snapshot in registry.snapshots() {
        println!(
            "pipeline-selfcheck: queue {} completed={} failed={}",
            snapshot.name, snapshot.counters.completed, snapshot.counters.failed
        );
    }

    dispatcher.shutdown();
    dispatcher_task.await??;
    println!("pipeline-selfcheck: ok");
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("clipforge=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}
