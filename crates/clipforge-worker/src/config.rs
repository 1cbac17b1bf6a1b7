//! Worker and pipeline configuration.

use std::time::Duration;

use clipforge_models::{JobType, Platform};
use clipforge_queue::{BackoffConfig, BackoffKind, QueueSettings};

/// Definition of one queue registered at startup.
#[derive(Debug, Clone)]
pub struct QueueSpec {
    /// Queue name
    pub name: &'static str,
    /// Job types dispatched through this queue
    pub job_types: Vec<JobType>,
    /// Concurrent handler limit
    pub concurrency: usize,
    /// Retry/backoff/trim settings
    pub settings: QueueSettings,
}

/// Pipeline-level knobs consumed by the coordinator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum highlight score for a chunk to become a clip
    pub highlight_threshold: f64,
    /// Target platforms for publish jobs
    pub publish_platforms: Vec<Platform>,
    /// When set, clips wait for human approval before any render job
    pub require_approval_before_render: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            highlight_threshold: 0.7,
            publish_platforms: vec![Platform::Youtube],
            require_approval_before_render: false,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle poll interval for each queue loop
    pub poll_interval: Duration,
    /// Graceful shutdown drain timeout
    pub shutdown_timeout: Duration,
    /// Retry budget applied as the queue default
    pub max_retries: u32,
    /// Base retry delay
    pub backoff_delay: Duration,
    /// Upper bound on any retry delay
    pub backoff_max_delay: Duration,
    /// Per-queue concurrency limits, in standard queue order
    pub ingest_concurrency: usize,
    pub transcribe_concurrency: usize,
    pub vision_concurrency: usize,
    pub scoring_concurrency: usize,
    pub render_concurrency: usize,
    pub publish_concurrency: usize,
    /// Pipeline knobs
    pub pipeline: PipelineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_delay: Duration::from_secs(1),
            backoff_max_delay: Duration::from_secs(300),
            ingest_concurrency: 2,
            transcribe_concurrency: 4,
            vision_concurrency: 4,
            scoring_concurrency: 4,
            render_concurrency: 2,
            publish_concurrency: 2,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(env_parse(
                "WORKER_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            shutdown_timeout: Duration::from_secs(env_parse(
                "WORKER_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )),
            max_retries: env_parse("QUEUE_MAX_RETRIES", defaults.max_retries),
            backoff_delay: Duration::from_millis(env_parse(
                "QUEUE_BACKOFF_MS",
                defaults.backoff_delay.as_millis() as u64,
            )),
            backoff_max_delay: Duration::from_millis(env_parse(
                "QUEUE_BACKOFF_MAX_MS",
                defaults.backoff_max_delay.as_millis() as u64,
            )),
            ingest_concurrency: env_parse("INGEST_CONCURRENCY", defaults.ingest_concurrency),
            transcribe_concurrency: env_parse(
                "TRANSCRIBE_CONCURRENCY",
                defaults.transcribe_concurrency,
            ),
            vision_concurrency: env_parse("VISION_CONCURRENCY", defaults.vision_concurrency),
            scoring_concurrency: env_parse("SCORING_CONCURRENCY", defaults.scoring_concurrency),
            render_concurrency: env_parse("RENDER_CONCURRENCY", defaults.render_concurrency),
            publish_concurrency: env_parse("PUBLISH_CONCURRENCY", defaults.publish_concurrency),
            pipeline: PipelineConfig {
                highlight_threshold: env_parse(
                    "HIGHLIGHT_THRESHOLD",
                    defaults.pipeline.highlight_threshold,
                ),
                publish_platforms: publish_platforms_from_env()
                    .unwrap_or(defaults.pipeline.publish_platforms),
                require_approval_before_render: env_parse(
                    "REQUIRE_APPROVAL_BEFORE_RENDER",
                    defaults.pipeline.require_approval_before_render,
                ),
            },
        }
    }

    fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_retries: self.max_retries,
            attempts: None,
            backoff: BackoffConfig {
                kind: BackoffKind::Exponential,
                delay: self.backoff_delay,
                max_delay: self.backoff_max_delay,
            },
            remove_on_complete: Some(1000),
            remove_on_fail: Some(5000),
        }
    }

    /// The standard pipeline queues, one spec per poller loop. The
    /// notification queue carries no job types here; it exists so its
    /// status and counters are reportable alongside the others.
    pub fn standard_queues(&self) -> Vec<QueueSpec> {
        let settings = self.queue_settings();
        vec![
            QueueSpec {
                name: "ingest",
                job_types: vec![
                    JobType::IngestStream,
                    JobType::DownloadStream,
                    JobType::ProcessStream,
                ],
                concurrency: self.ingest_concurrency,
                settings: settings.clone(),
            },
            QueueSpec {
                name: "transcribe",
                job_types: vec![JobType::TranscribeChunk],
                concurrency: self.transcribe_concurrency,
                settings: settings.clone(),
            },
            QueueSpec {
                name: "vision",
                job_types: vec![JobType::AnalyzeVision],
                concurrency: self.vision_concurrency,
                settings: settings.clone(),
            },
            QueueSpec {
                name: "scoring",
                job_types: vec![JobType::ScoreClip, JobType::GenerateHighlights],
                concurrency: self.scoring_concurrency,
                settings: settings.clone(),
            },
            QueueSpec {
                name: "render",
                job_types: vec![JobType::RenderClip],
                concurrency: self.render_concurrency,
                settings: settings.clone(),
            },
            QueueSpec {
                name: "publish",
                job_types: vec![JobType::PublishClip],
                concurrency: self.publish_concurrency,
                settings: settings.clone(),
            },
            QueueSpec {
                name: "notification",
                job_types: vec![],
                concurrency: 1,
                settings,
            },
        ]
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse `PUBLISH_PLATFORMS` as a comma-separated list of platform names.
fn publish_platforms_from_env() -> Option<Vec<Platform>> {
    let raw = std::env::var("PUBLISH_PLATFORMS").ok()?;
    let platforms: Vec<Platform> = raw
        .split(',')
        .filter_map(|name| parse_platform(name.trim()))
        .collect();
    if platforms.is_empty() {
        None
    } else {
        Some(platforms)
    }
}

fn parse_platform(name: &str) -> Option<Platform> {
    match name.to_ascii_lowercase().as_str() {
        "twitch" => Some(Platform::Twitch),
        "youtube" => Some(Platform::Youtube),
        "kick" => Some(Platform::Kick),
        "x" => Some(Platform::X),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_queues_cover_all_job_types() {
        let config = WorkerConfig::default();
        let queues = config.standard_queues();
        assert_eq!(queues.len(), 7);
        let all_types: Vec<JobType> = queues.iter().flat_map(|q| q.job_types.clone()).collect();
        for ty in [
            JobType::IngestStream,
            JobType::DownloadStream,
            JobType::ProcessStream,
            JobType::GenerateHighlights,
            JobType::RenderClip,
            JobType::PublishClip,
            JobType::TranscribeChunk,
            JobType::AnalyzeVision,
            JobType::ScoreClip,
        ] {
            assert!(all_types.contains(&ty), "missing {ty}");
        }
    }

    #[test]
    fn test_parse_platform_names() {
        assert_eq!(parse_platform("youtube"), Some(Platform::Youtube));
        assert_eq!(parse_platform("Twitch"), Some(Platform::Twitch));
        assert_eq!(parse_platform("vimeo"), None);
    }
}
