//! Durable in-process record of every unit of work.
//!
//! The store replaces an external broker-backed queue so that claim
//! atomicity and retry policy are enforced here and auditable. All
//! operations take the single store lock for the whole read-modify-write,
//! so two workers can never claim the same job and complete/fail/cancel
//! races resolve to exactly one winner. The lock is never held across an
//! await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info};

use clipforge_models::{
    ClipId, Job, JobData, JobId, JobStatus, JobType, StatusGraph, StreamId, StreamerId,
};

use crate::error::{QueueError, QueueResult};
use crate::settings::QueueSettings;

/// Options for creating a job.
#[derive(Debug, Clone, Default)]
pub struct CreateJobOptions {
    /// Dispatch priority, higher first.
    pub priority: i32,
    /// Retry budget override (queue default when None).
    pub max_retries: Option<u32>,
    /// Earliest dispatch time.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Linked streamer.
    pub streamer_id: Option<StreamerId>,
    /// Linked stream.
    pub stream_id: Option<StreamId>,
    /// Linked clip.
    pub clip_id: Option<ClipId>,
}

/// Outcome of failing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// The job was rescheduled with a backoff delay.
    Retrying { scheduled_for: DateTime<Utc> },
    /// Retries exhausted; the job is terminally failed and the owning
    /// entity must be flipped to its failed status by the caller.
    Exhausted,
}

/// In-process job store.
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    wakers: Mutex<HashMap<JobType, Vec<Arc<Notify>>>>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            wakers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a wake signal fired whenever a job of one of `types` is
    /// created, so dispatchers can re-poll promptly instead of waiting for
    /// the next tick.
    pub fn register_waker(&self, types: &[JobType], notify: Arc<Notify>) {
        let mut wakers = self.wakers.lock().expect("waker lock poisoned");
        for ty in types {
            wakers.entry(*ty).or_default().push(Arc::clone(&notify));
        }
    }

    fn wake(&self, job_type: JobType) {
        let wakers = self.wakers.lock().expect("waker lock poisoned");
        if let Some(notifies) = wakers.get(&job_type) {
            for notify in notifies {
                notify.notify_one();
            }
        }
    }

    /// Create a new pending job and fire the wake signal for its type.
    pub fn create(&self, job_type: JobType, data: JobData, opts: CreateJobOptions) -> Job {
        let mut job = Job::new(job_type, data).with_priority(opts.priority);
        if let Some(max_retries) = opts.max_retries {
            job = job.with_max_retries(max_retries);
        }
        if let Some(at) = opts.scheduled_for {
            job = job.with_scheduled_for(at);
        }
        job.streamer_id = opts.streamer_id;
        job.stream_id = opts.stream_id;
        job.clip_id = opts.clip_id;

        {
            let mut jobs = self.jobs.lock().expect("job lock poisoned");
            jobs.insert(job.id.clone(), job.clone());
        }
        debug!(job_id = %job.id, job_type = %job_type, "Created job");
        self.wake(job_type);
        job
    }

    /// Atomically claim the best eligible job for one of `types`.
    ///
    /// Eligible: status `pending`, or `retrying` with its `scheduled_for`
    /// due. Ordering: priority descending, then scheduled time / creation
    /// time ascending (FIFO tie-break). The selected job is marked
    /// `running` with `worker_id` in the same critical section, so at most
    /// one worker ever claims a given job.
    pub fn claim(&self, types: &[JobType], worker_id: &str) -> Option<Job> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().expect("job lock poisoned");

        let best_id = jobs
            .values()
            .filter(|job| types.contains(&job.job_type) && job.is_claimable(now))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| dispatch_time(a).cmp(&dispatch_time(b)))
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .map(|job| job.id.clone())?;

        let job = jobs.get_mut(&best_id).expect("selected job vanished");
        job.transition(JobStatus::Running)
            .expect("claimable job must accept running");
        job.worker_id = Some(worker_id.to_string());
        debug!(job_id = %job.id, worker_id, "Claimed job");
        Some(job.clone())
    }

    /// Mark a running job completed and store its result.
    ///
    /// Returns `NotRunning` for jobs a worker does not own, and
    /// `AlreadyTerminal` when racing a cancel (the completion is a
    /// reported no-op, never a poisoned-state write).
    pub fn complete(
        &self,
        job_id: &JobId,
        result: serde_json::Value,
        settings: &QueueSettings,
    ) -> QueueResult<Job> {
        let mut jobs = self.jobs.lock().expect("job lock poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;

        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal(job_id.clone()));
        }
        if !job.status.is_active() {
            return Err(QueueError::NotRunning(job_id.clone()));
        }

        job.transition(JobStatus::Completed)?;
        job.result = Some(result);
        job.progress = 100;
        let completed = job.clone();
        let job_type = completed.job_type;

        if let Some(keep) = settings.remove_on_complete {
            trim_terminal(&mut jobs, job_type, JobStatus::Completed, keep);
        }
        Ok(completed)
    }

    /// Fail a running job: reschedule with backoff while the retry budget
    /// lasts, otherwise mark it terminally failed.
    pub fn fail(
        &self,
        job_id: &JobId,
        error: &str,
        settings: &QueueSettings,
    ) -> QueueResult<FailOutcome> {
        let mut jobs = self.jobs.lock().expect("job lock poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;

        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal(job_id.clone()));
        }
        if !job.status.is_active() {
            return Err(QueueError::NotRunning(job_id.clone()));
        }

        let effective_max = settings.effective_max_retries(job.max_retries);
        job.error_message = Some(error.to_string());

        if job.retry_count < effective_max {
            job.retry_count += 1;
            job.transition(JobStatus::Retrying)?;
            let delay = settings.backoff.delay_for(job.retry_count);
            let scheduled_for = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(300));
            job.scheduled_for = Some(scheduled_for);
            job.worker_id = None;
            info!(
                job_id = %job_id,
                retry_count = job.retry_count,
                max_retries = effective_max,
                delay_ms = delay.as_millis() as u64,
                "Job failed, rescheduled"
            );
            Ok(FailOutcome::Retrying { scheduled_for })
        } else {
            job.transition(JobStatus::Failed)?;
            let job_type = job.job_type;
            info!(job_id = %job_id, "Job failed terminally, retries exhausted");
            if let Some(keep) = settings.remove_on_fail {
                trim_terminal(&mut jobs, job_type, JobStatus::Failed, keep);
            }
            Ok(FailOutcome::Exhausted)
        }
    }

    /// Cancel a job that has not been claimed. Running jobs are not
    /// forcibly interrupted; they finish and their completion against the
    /// cancelled record is rejected as `AlreadyTerminal`.
    pub fn cancel(&self, job_id: &JobId) -> QueueResult<Job> {
        let mut jobs = self.jobs.lock().expect("job lock poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;

        match job.status {
            JobStatus::Pending | JobStatus::Retrying => {
                job.transition(JobStatus::Cancelled)?;
                Ok(job.clone())
            }
            JobStatus::Running | JobStatus::Processing => {
                Err(QueueError::NotCancellable(job_id.clone()))
            }
            _ => Err(QueueError::AlreadyTerminal(job_id.clone())),
        }
    }

    /// Record mid-execution progress. The first report moves a `running`
    /// job to `processing`.
    pub fn progress(&self, job_id: &JobId, percent: u8) -> QueueResult<Job> {
        let mut jobs = self.jobs.lock().expect("job lock poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;

        if !job.status.is_active() {
            return Err(QueueError::NotRunning(job_id.clone()));
        }
        if job.status == JobStatus::Running {
            job.transition(JobStatus::Processing)?;
        }
        job.progress = percent.min(100);
        Ok(job.clone())
    }

    /// Look up a job by ID.
    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("job lock poisoned")
            .get(job_id)
            .cloned()
    }

    /// All jobs of a type, oldest first.
    pub fn jobs_of_type(&self, job_type: JobType) -> Vec<Job> {
        let jobs = self.jobs.lock().expect("job lock poisoned");
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.job_type == job_type)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching
    }

    /// Total job count.
    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Earliest time a job may be dispatched.
fn dispatch_time(job: &Job) -> DateTime<Utc> {
    job.scheduled_for.unwrap_or(job.created_at)
}

/// Drop the oldest terminal jobs of `job_type` in `status` beyond `keep`.
fn trim_terminal(jobs: &mut HashMap<JobId, Job>, job_type: JobType, status: JobStatus, keep: usize) {
    let mut terminal: Vec<(JobId, DateTime<Utc>)> = jobs
        .values()
        .filter(|job| job.job_type == job_type && job.status == status)
        .map(|job| (job.id.clone(), job.completed_at.unwrap_or(job.updated_at)))
        .collect();
    if terminal.len() <= keep {
        return;
    }
    terminal.sort_by(|a, b| a.1.cmp(&b.1));
    let excess = terminal.len() - keep;
    for (id, _) in terminal.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
