//! Per-queue job dispatch loops.
//!
//! One poller task per registered queue. Each loop claims eligible jobs
//! while permits remain, hands them to the coordinator on spawned tasks,
//! and settles the outcome against the store and the queue counters. Idle
//! loops wait on a poll tick or the wake signal fired by every enqueue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use clipforge_models::{Job, JobType, QueueStatus};
use clipforge_queue::{FailOutcome, JobStore, QueueRegistry, QueueSettings};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::pipeline::PipelineCoordinator;

/// Dispatches jobs from the store to the coordinator's handlers.
pub struct Dispatcher {
    store: Arc<JobStore>,
    registry: Arc<QueueRegistry>,
    coordinator: Arc<PipelineCoordinator>,
    config: WorkerConfig,
    shutdown: watch::Sender<bool>,
    worker_id: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<QueueRegistry>,
        coordinator: Arc<PipelineCoordinator>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let worker_id = format!("worker-{}", Uuid::new_v4());
        Self {
            store,
            registry,
            coordinator,
            config,
            shutdown,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Signal shutdown; `run` drains in-flight jobs and returns.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the dispatch loops until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(worker_id = %self.worker_id, "Starting dispatcher");

        let mut loops = Vec::new();
        let mut drains: Vec<(usize, Arc<Semaphore>)> = Vec::new();

        for queue in self.registry.names() {
            let job_types = self.registry.job_types(&queue)?;
            if job_types.is_empty() {
                // Registered for reporting only; nothing to poll.
                continue;
            }
            let concurrency = self.registry.concurrency(&queue)?;
            let settings = self.registry.settings(&queue)?;
            let semaphore = Arc::new(Semaphore::new(concurrency));
            drains.push((concurrency, Arc::clone(&semaphore)));

            let notify = Arc::new(Notify::new());
            self.store.register_waker(&job_types, Arc::clone(&notify));

            let poller = PollLoop {
                store: Arc::clone(&self.store),
                registry: Arc::clone(&self.registry),
                coordinator: Arc::clone(&self.coordinator),
                queue,
                job_types,
                settings,
                semaphore,
                notify,
                poll_interval: self.config.poll_interval,
                worker_id: self.worker_id.clone(),
                shutdown_rx: self.shutdown.subscribe(),
            };
            loops.push(tokio::spawn(poller.run()));
        }

        for handle in loops {
            handle.await.ok();
        }

        info!("Waiting for in-flight jobs to drain");
        let drained =
            tokio::time::timeout(self.config.shutdown_timeout, wait_for_drain(&drains)).await;
        if drained.is_err() {
            warn!("Shutdown timeout elapsed with jobs still in flight");
        }

        info!("Dispatcher stopped");
        Ok(())
    }
}

/// Wait until every queue's permits are all returned.
async fn wait_for_drain(drains: &[(usize, Arc<Semaphore>)]) {
    loop {
        if drains
            .iter()
            .all(|(capacity, sem)| sem.available_permits() == *capacity)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// State for one queue's poll loop.
struct PollLoop {
    store: Arc<JobStore>,
    registry: Arc<QueueRegistry>,
    coordinator: Arc<PipelineCoordinator>,
    queue: String,
    job_types: Vec<JobType>,
    settings: QueueSettings,
    semaphore: Arc<Semaphore>,
    notify: Arc<Notify>,
    poll_interval: Duration,
    worker_id: String,
    shutdown_rx: watch::Receiver<bool>,
}

impl PollLoop {
    async fn run(mut self) {
        debug!(queue = %self.queue, job_types = ?self.job_types, "Poll loop started");
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {}
                _ = self.notify.notified() => {}
            }

            // Only active queues claim; paused, draining and errored queues
            // leave the backlog untouched.
            match self.registry.status(&self.queue) {
                Ok(QueueStatus::Active) => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(queue = %self.queue, error = %e, "Queue status lookup failed");
                    continue;
                }
            }

            self.claim_available();
        }
        debug!(queue = %self.queue, "Poll loop stopped");
    }

    /// Claim jobs while permits and eligible work remain.
    fn claim_available(&self) {
        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };
            let Some(job) = self.store.claim(&self.job_types, &self.worker_id) else {
                break;
            };
            if let Err(e) = self.registry.record_dequeue(&self.queue) {
                warn!(queue = %self.queue, error = %e, "Dequeue accounting failed");
            }

            let store = Arc::clone(&self.store);
            let registry = Arc::clone(&self.registry);
            let coordinator = Arc::clone(&self.coordinator);
            let queue = self.queue.clone();
            let settings = self.settings.clone();
            tokio::spawn(async move {
                let _permit = permit;
                execute(store, registry, coordinator, queue, settings, job).await;
            });
        }
    }
}

/// Run one claimed job to a settled outcome.
async fn execute(
    store: Arc<JobStore>,
    registry: Arc<QueueRegistry>,
    coordinator: Arc<PipelineCoordinator>,
    queue: String,
    settings: QueueSettings,
    job: Job,
) {
    let logger = JobLogger::new(&job.id, job.job_type);
    logger.started(&format!("on queue {queue}"));

    // Handler and adapter logs inherit the job span.
    match coordinator.handle(&job).instrument(logger.span()).await {
        Ok(result) => {
            match store.complete(&job.id, result, &settings) {
                Ok(_) => {
                    if let Err(e) = registry.record_complete(&queue) {
                        warn!(queue = %queue, error = %e, "Completion accounting failed");
                    }
                    metrics::counter!("clipforge_jobs_completed_total", "queue" => queue)
                        .increment(1);
                    logger.completed("handler succeeded");
                }
                // Lost a race with cancel; the work is a reported no-op.
                Err(e) => logger.warning(&format!("completion rejected: {e}")),
            }
        }
        Err(err) => {
            logger.failed(&err.to_string());
            let mut settings = settings;
            if !err.is_retryable() {
                // Deterministic failures skip the retry budget.
                settings.attempts = Some(0);
            }
            match store.fail(&job.id, &err.to_string(), &settings) {
                Ok(FailOutcome::Retrying { scheduled_for }) => {
                    if let Err(e) = registry.record_delayed(&queue, &err.to_string()) {
                        warn!(queue = %queue, error = %e, "Retry accounting failed");
                    }
                    metrics::counter!("clipforge_jobs_retried_total", "queue" => queue)
                        .increment(1);
                    coordinator.on_retrying(&job);
                    logger.progress(&format!("rescheduled for {scheduled_for}"));
                }
                Ok(FailOutcome::Exhausted) => {
                    if let Err(e) = registry.record_fail(&queue, &err.to_string()) {
                        warn!(queue = %queue, error = %e, "Failure accounting failed");
                    }
                    metrics::counter!("clipforge_jobs_failed_total", "queue" => queue)
                        .increment(1);
                    coordinator.on_exhausted(&job, &err.to_string());
                }
                Err(e) => logger.warning(&format!("failure rejected: {e}")),
            }
        }
    }
}
