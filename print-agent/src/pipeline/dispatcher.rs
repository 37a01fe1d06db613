//! Queue intake: routes change events to workers, one claim per job.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::claims::{ClaimGuard, ProcessedJobs};
use crate::Result;
use crate::domain::{Job, JobStatus, OrderType};
use crate::queue::{ChangeKind, JobStore, QueueEvent};

/// Which worker handles a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum WorkerKind {
    Print,
    TestPage,
    PageCount,
}

/// Pick the worker for a job, or `None` if the agent should leave it alone.
///
/// Page-count requests are recognised by status alone; `ready` jobs are
/// routed by order type.
pub fn route(job: &Job) -> Option<WorkerKind> {
    match (job.status, job.order_type) {
        (JobStatus::PageCountRequest, _) => Some(WorkerKind::PageCount),
        (JobStatus::Ready, OrderType::Print) => Some(WorkerKind::Print),
        (JobStatus::Ready, OrderType::TestPage) => Some(WorkerKind::TestPage),
        _ => None,
    }
}

/// A job taken off the queue, holding its claim until it is dropped.
#[derive(Debug)]
pub struct ClaimedJob {
    pub job: Job,
    pub kind: WorkerKind,
    pub claim: ClaimGuard,
}

/// Listens to the job store and hands each new job to the worker queue.
pub struct JobDispatcher {
    store: Arc<dyn JobStore>,
    processed: Arc<ProcessedJobs>,
    queue: mpsc::UnboundedSender<ClaimedJob>,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        processed: Arc<ProcessedJobs>,
        queue: mpsc::UnboundedSender<ClaimedJob>,
    ) -> Self {
        Self {
            store,
            processed,
            queue,
        }
    }

    /// Handle one change event. Returns the worker kind if the job was queued.
    ///
    /// Never waits on a worker.
    pub fn handle(&self, event: QueueEvent) -> Option<WorkerKind> {
        if event.kind == ChangeKind::Removed {
            return None;
        }
        let job = event.job;
        let kind = route(&job)?;

        let Some(claim) = self.processed.try_claim(&job.id) else {
            debug!(job_id = %job.id, "Job already being handled");
            return None;
        };

        info!(
            job_id = %job.id,
            kind = %kind,
            files = job.files.len(),
            "Found new job"
        );
        if let Err(e) = self.queue.send(ClaimedJob { job, kind, claim }) {
            // The claim travels back with the rejected job and is released here.
            warn!(job_id = %e.0.job.id, "Worker queue closed; dropping job");
            return None;
        }
        Some(kind)
    }

    /// Consume the store's change feed until `cancel` fires or the feed ends.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut events = self.store.subscribe(cancel.child_token()).await?;
        info!(store = self.store.name(), "Job dispatcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(event);
                    }
                    None => {
                        warn!("Job feed ended");
                        break;
                    }
                },
            }
        }

        info!("Job dispatcher stopped");
        Ok(())
    }
}
