//! Process-wide record of the jobs being handled.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

/// Ids of jobs claimed by this process.
///
/// A claim is taken atomically when a job is picked up and released exactly
/// once, when the returned [`ClaimGuard`] is dropped at the end of the job.
/// Membership is not persisted.
#[derive(Debug, Default)]
pub struct ProcessedJobs {
    ids: DashSet<String>,
}

impl ProcessedJobs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `job_id`, or return `None` if it is already claimed.
    pub fn try_claim(self: &Arc<Self>, job_id: &str) -> Option<ClaimGuard> {
        if !self.ids.insert(job_id.to_string()) {
            return None;
        }
        debug!(job_id, "Job claimed");
        Some(ClaimGuard {
            jobs: Arc::clone(self),
            job_id: job_id.to_string(),
        })
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.ids.contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Holds a job's claim; dropping it releases the id.
#[derive(Debug)]
pub struct ClaimGuard {
    jobs: Arc<ProcessedJobs>,
    job_id: String,
}

impl ClaimGuard {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.jobs.ids.remove(&self.job_id);
        debug!(job_id = %self.job_id, "Job claim released");
    }
}
