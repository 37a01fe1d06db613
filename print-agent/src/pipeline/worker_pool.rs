//! Bounded pool of job workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::dispatcher::ClaimedJob;
use super::runner::JobRunner;

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum jobs processed at once.
    pub max_workers: usize,
    /// Job timeout in seconds.
    ///
    /// A job exceeding this is dropped mid-flight: its staged files are
    /// removed by their guards and any child process is killed.
    pub job_timeout_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout_secs: 1800, // 30 minutes
        }
    }
}

/// A fixed set of workers draining the claimed-job queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// Jobs currently being processed.
    active_workers: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a pool that also stops when `parent` is cancelled.
    pub fn with_cancellation(config: WorkerPoolConfig, parent: CancellationToken) -> Self {
        Self {
            config: WorkerPoolConfig {
                max_workers: config.max_workers.max(1),
                ..config
            },
            active_workers: Arc::new(AtomicUsize::new(0)),
            cancellation_token: parent.child_token(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Start the workers.
    pub fn start(&self, queue: mpsc::UnboundedReceiver<ClaimedJob>, runner: Arc<JobRunner>) {
        let queue = Arc::new(Mutex::new(queue));

        info!(
            max_workers = self.config.max_workers,
            job_timeout_secs = self.config.job_timeout_secs,
            "Starting worker pool"
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            return;
        };

        for i in 0..self.config.max_workers {
            let queue = queue.clone();
            let runner = runner.clone();
            let cancellation_token = self.cancellation_token.clone();
            let active_workers = self.active_workers.clone();

            join_set.spawn(async move {
                debug!("Worker {} started", i);

                loop {
                    // One worker waits on the queue at a time; the rest wait on the lock.
                    let next = {
                        let mut queue = queue.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancellation_token.cancelled() => None,
                            job = queue.recv() => job,
                        }
                    };
                    let Some(claimed) = next else {
                        break;
                    };

                    active_workers.fetch_add(1, Ordering::SeqCst);
                    debug!(job_id = %claimed.job.id, worker = i, "Worker picked up job");
                    // The runner has already logged and recorded the failure.
                    if let Err(e) = runner.run(claimed, &cancellation_token).await {
                        debug!(worker = i, error = %e, "Worker moving on after failed job");
                    }
                    active_workers.fetch_sub(1, Ordering::SeqCst);
                }

                debug!("Worker {} shutting down", i);
            });
        }
    }

    /// Stop the pool. Jobs in flight are aborted and recorded as failed;
    /// jobs still queued are released unclaimed.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.cancellation_token.cancel();

        // Take the join set out of the mutex before awaiting
        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    /// Number of jobs being processed right now.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}
