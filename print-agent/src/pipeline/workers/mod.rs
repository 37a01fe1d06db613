//! Job workers, one per kind of job.
//!
//! A worker owns a job from its first status write to its last. Errors are
//! returned to the runner, which records them against the job; every staged
//! file a worker creates is owned by a [`StagedFiles`](crate::staging::StagedFiles)
//! guard scoped to the step that made it.

mod cover;
mod page_count;
mod print;
mod test_page;

use async_trait::async_trait;

pub use cover::{cover_page_text, test_page_text};
pub use page_count::PageCountWorker;
pub use print::PrintWorker;
pub use test_page::TestPageWorker;

use super::context::PipelineContext;
use super::dispatcher::WorkerKind;
use super::status::StatusReporter;
use crate::Result;
use crate::domain::Job;

/// Processes one kind of job end to end.
#[async_trait]
pub trait JobWorker: Send + Sync {
    fn kind(&self) -> WorkerKind;

    /// Run `job` to its terminal status.
    ///
    /// Success statuses are written through `status`; on error the caller
    /// writes the failure.
    async fn run(&self, ctx: &PipelineContext, job: &Job, status: &mut StatusReporter)
    -> Result<()>;
}
