//! The remote job queue: change subscription and status write-back.

mod firestore;
mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use firestore::{FirestoreConfig, FirestoreJobStore};
pub use memory::MemoryJobStore;

use crate::Result;
use crate::domain::{Job, JobStatus};

/// Kind of change seen on a job document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A change to a job document matching the actionable-status filter.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub kind: ChangeKind,
    pub job: Job,
}

impl QueueEvent {
    pub fn added(job: Job) -> Self {
        Self {
            kind: ChangeKind::Added,
            job,
        }
    }

    pub fn modified(job: Job) -> Self {
        Self {
            kind: ChangeKind::Modified,
            job,
        }
    }
}

/// A status write for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Printing,
    /// All files printed; stamps `printedAt` with the server time.
    Completed { reprint: bool },
    PageCountCompleted { page_count: u64 },
    Failed { message: String },
}

impl JobUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            JobUpdate::Printing => JobStatus::Printing,
            JobUpdate::Completed { reprint: false } => JobStatus::Completed,
            JobUpdate::Completed { reprint: true } => JobStatus::ReprintCompleted,
            JobUpdate::PageCountCompleted { .. } => JobStatus::PageCountCompleted,
            JobUpdate::Failed { .. } => JobStatus::Error,
        }
    }
}

/// The remote job collection.
#[async_trait]
pub trait JobStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Subscribe to changes on jobs in an actionable status.
    ///
    /// Events may be delivered more than once for the same job; consumers are
    /// expected to deduplicate. The feed ends when `cancel` fires.
    async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<QueueEvent>>;

    /// Write a status update for `job_id`.
    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_status_mapping() {
        assert_eq!(JobUpdate::Printing.status(), JobStatus::Printing);
        assert_eq!(
            JobUpdate::Completed { reprint: true }.status(),
            JobStatus::ReprintCompleted
        );
        assert_eq!(
            JobUpdate::PageCountCompleted { page_count: 3 }.status(),
            JobStatus::PageCountCompleted
        );
        assert_eq!(
            JobUpdate::Failed {
                message: "x".to_string()
            }
            .status(),
            JobStatus::Error
        );
    }
}
