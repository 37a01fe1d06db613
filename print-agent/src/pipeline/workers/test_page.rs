use async_trait::async_trait;
use chrono::Local;

use super::JobWorker;
use super::cover::{print_text_sheet, test_page_text};
use crate::Result;
use crate::domain::Job;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::dispatcher::WorkerKind;
use crate::pipeline::status::StatusReporter;
use crate::queue::JobUpdate;
use crate::staging::StagedFiles;

/// Prints a generated page naming the job and printer.
#[derive(Debug, Default)]
pub struct TestPageWorker;

#[async_trait]
impl JobWorker for TestPageWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::TestPage
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        status: &mut StatusReporter,
    ) -> Result<()> {
        status.advance(JobUpdate::Printing).await?;

        let mut engine = ctx.engine_scope();
        let mut staged = StagedFiles::new();
        let printed = print_text_sheet(
            ctx,
            &mut engine,
            &mut staged,
            job,
            "test_page.txt",
            test_page_text(&job.id, &job.printer_name, Local::now()),
            &job.id,
        )
        .await;
        engine.release().await;
        drop(staged);
        printed?;

        status
            .advance(JobUpdate::Completed { reprint: false })
            .await
    }
}
