use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{JobStore, JobUpdate, QueueEvent};
use crate::domain::{Job, JobStatus};
use crate::{Error, Result};

const SUBSCRIBER_BUFFER: usize = 1024;

type Subscribers = Arc<Mutex<Vec<(u64, mpsc::Sender<QueueEvent>)>>>;

/// In-memory job collection with a full record of status writes.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<String, Job>,
    updates: Mutex<Vec<(String, JobUpdate)>>,
    subscribers: Subscribers,
    next_subscriber: AtomicU64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a job document, notifying subscribers if it is actionable.
    pub fn insert(&self, job: Job) {
        let existed = self.jobs.insert(job.id.clone(), job.clone()).is_some();
        if job.status.is_actionable() {
            let event = if existed {
                QueueEvent::modified(job)
            } else {
                QueueEvent::added(job)
            };
            self.broadcast(event);
        }
    }

    /// Deliver the current document for `job_id` again as a modification.
    pub fn redeliver(&self, job_id: &str) {
        if let Some(job) = self.job(job_id)
            && job.status.is_actionable()
        {
            self.broadcast(QueueEvent::modified(job));
        }
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|entry| entry.value().clone())
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|entry| entry.status)
    }

    /// Every update written for `job_id`, oldest first.
    pub fn updates(&self, job_id: &str) -> Vec<JobUpdate> {
        self.updates
            .lock()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    /// The statuses written for `job_id`, oldest first.
    pub fn status_history(&self, job_id: &str) -> Vec<JobStatus> {
        self.updates(job_id).iter().map(JobUpdate::status).collect()
    }

    /// Live change-feed subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn broadcast(&self, event: QueueEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        for (_, tx) in subscribers.iter() {
            if let Err(e) = tx.try_send(event.clone()) {
                warn!(job_id = %event.job.id, error = %e, "Dropped queue event");
            }
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<QueueEvent>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);

        // Like a snapshot listener, start with everything currently actionable.
        // Holding the lock while replaying means no concurrent insert is missed.
        {
            let mut subscribers = self.subscribers.lock();
            for entry in self.jobs.iter() {
                if entry.status.is_actionable() {
                    let _ = tx.try_send(QueueEvent::added(entry.value().clone()));
                }
            }
            subscribers.push((id, tx));
        }

        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            subscribers.lock().retain(|(sub, _)| *sub != id);
            debug!(subscriber = id, "Queue subscription closed");
        });

        Ok(rx)
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::not_found("Job", job_id))?;
        job.status = update.status();
        drop(job);

        self.updates.lock().push((job_id.to_string(), update));
        Ok(())
    }
}
