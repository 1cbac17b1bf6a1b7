//! Structured job logging.

use tracing::{error, info, warn, Span};

use clipforge_models::{JobId, JobType};

/// Per-job logger carrying the job ID and type on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    job_type: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, job_type: JobType) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_type: job_type.as_str(),
        }
    }

    pub fn started(&self, message: &str) {
        info!(job_id = %self.job_id, job_type = %self.job_type, "Job started: {}", message);
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, job_type = %self.job_type, "Job progress: {}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, job_type = %self.job_type, "Job warning: {}", message);
    }

    pub fn failed(&self, message: &str) {
        error!(job_id = %self.job_id, job_type = %self.job_type, "Job failed: {}", message);
    }

    pub fn completed(&self, message: &str) {
        info!(job_id = %self.job_id, job_type = %self.job_type, "Job completed: {}", message);
    }

    /// Span for handler execution so adapter logs inherit the job context.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, job_type = %self.job_type)
    }
}
