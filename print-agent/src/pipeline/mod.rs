//! Job processing pipeline.
//!
//! ```text
//! JobStore feed -> JobDispatcher -> claimed-job queue -> WorkerPool -> JobRunner -> JobWorker
//! ```
//!
//! The dispatcher claims each actionable job once in [`ProcessedJobs`] and
//! never waits on it; a fixed number of pool workers drain the queue, each
//! job running under a deadline.

mod claims;
mod context;
mod dispatcher;
mod runner;
mod status;
mod worker_pool;
pub mod workers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use claims::{ClaimGuard, ProcessedJobs};
pub use context::PipelineContext;
pub use dispatcher::{ClaimedJob, JobDispatcher, WorkerKind, route};
pub use runner::JobRunner;
pub use status::StatusReporter;
pub use worker_pool::{WorkerPool, WorkerPoolConfig};

use crate::Result;

/// The assembled pipeline: dispatcher plus worker pool.
pub struct PrintPipeline {
    runner: Arc<JobRunner>,
    processed: Arc<ProcessedJobs>,
    config: WorkerPoolConfig,
}

impl PrintPipeline {
    pub fn new(ctx: Arc<PipelineContext>, config: WorkerPoolConfig) -> Self {
        let job_timeout = Duration::from_secs(config.job_timeout_secs);
        Self {
            runner: Arc::new(JobRunner::new(ctx, job_timeout)),
            processed: ProcessedJobs::new(),
            config,
        }
    }

    /// Jobs currently claimed by this process.
    pub fn processed(&self) -> &Arc<ProcessedJobs> {
        &self.processed
    }

    /// Listen for jobs until `cancel` fires, then stop the workers.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::with_cancellation(self.config.clone(), cancel.clone());
        pool.start(rx, self.runner.clone());

        let dispatcher = JobDispatcher::new(
            self.runner.context().store.clone(),
            self.processed.clone(),
            tx,
        );
        let result = dispatcher.run(cancel).await;

        pool.stop().await;
        info!(claimed = self.processed.len(), "Pipeline stopped");
        result
    }
}
