//! Status write-back for one job.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Job, JobStatus};
use crate::queue::{JobStore, JobUpdate};
use crate::Result;

/// Writes a job's status updates, refusing any that would move it backwards.
pub struct StatusReporter {
    store: Arc<dyn JobStore>,
    job_id: String,
    current: JobStatus,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn JobStore>, job: &Job) -> Self {
        Self {
            store,
            job_id: job.id.clone(),
            current: job.status,
        }
    }

    pub fn current(&self) -> JobStatus {
        self.current
    }

    /// Validate and write `update`.
    pub async fn advance(&mut self, update: JobUpdate) -> Result<()> {
        let next = self.current.transition_to(update.status())?;
        self.store.update(&self.job_id, update).await?;
        debug!(job_id = %self.job_id, from = %self.current, to = %next, "Job status advanced");
        self.current = next;
        Ok(())
    }

    /// Record a failure, unless the job already reached a terminal status.
    pub async fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if self.current.is_terminal() {
            warn!(
                job_id = %self.job_id,
                status = %self.current,
                "Not recording failure for a finished job"
            );
            return Ok(());
        }
        self.advance(JobUpdate::Failed {
            message: message.into(),
        })
        .await
    }
}
