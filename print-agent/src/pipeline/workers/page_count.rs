use async_trait::async_trait;
use tracing::info;

use super::JobWorker;
use crate::Result;
use crate::domain::Job;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::dispatcher::WorkerKind;
use crate::pipeline::status::StatusReporter;
use crate::queue::JobUpdate;
use crate::staging::StagedFiles;
use crate::transform::page_count_async;

/// Converts an uploaded file and reports how many pages it prints to.
#[derive(Debug, Default)]
pub struct PageCountWorker;

#[async_trait]
impl JobWorker for PageCountWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::PageCount
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        status: &mut StatusReporter,
    ) -> Result<()> {
        let file = job.page_count_file()?;

        let mut engine = ctx.engine_scope();
        let mut staged = StagedFiles::new();
        let counted = async {
            let local = ctx.retrieve(&job.id, 0, &file, &mut staged).await?;
            let pdf = ctx.converter.to_pdf(&local, &mut engine, &mut staged).await?;
            page_count_async(pdf).await
        }
        .await;
        engine.release().await;
        drop(staged);
        let page_count = counted?;

        status
            .advance(JobUpdate::PageCountCompleted {
                page_count: page_count as u64,
            })
            .await?;
        info!(job_id = %job.id, page_count, "Page count written");
        Ok(())
    }
}
