use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use tracing::info;

use super::JobWorker;
use super::cover::{cover_page_text, print_text_sheet};
use crate::convert::SessionScope;
use crate::domain::{FileSpec, Job};
use crate::layout::{CollageRequest, render_collage_async};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::dispatcher::WorkerKind;
use crate::pipeline::status::StatusReporter;
use crate::printing::PrintSettings;
use crate::queue::JobUpdate;
use crate::staging::StagedFiles;
use crate::transform::prepare_document;
use crate::{Error, Result};

/// Prints every file of an order, in order, stopping at the first failure.
#[derive(Debug, Default)]
pub struct PrintWorker;

impl PrintWorker {
    async fn print_files(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        engine: &mut SessionScope,
    ) -> Result<()> {
        if job.binding.needs_cover_page() && job.has_documents() {
            let mut cover_files = StagedFiles::new();
            print_text_sheet(
                ctx,
                engine,
                &mut cover_files,
                job,
                "cover.txt",
                cover_page_text(job, Local::now()),
                &format!("{}-cover", job.id),
            )
            .await?;
        }

        let total = job.files.len();
        for (index, file) in job.files.iter().enumerate() {
            info!(
                job_id = %job.id,
                file = %file.display_name(index),
                position = index + 1,
                total,
                "Processing file"
            );

            let mut staged = StagedFiles::new();
            let (pdf, copies) = self
                .prepare_file(ctx, job, index, file, engine, &mut staged)
                .await?;
            ctx.printer
                .dispatch(
                    &job.printer_name,
                    &pdf,
                    &format!("{}-{}", job.id, index + 1),
                    PrintSettings::for_file(file, copies),
                )
                .await?;
        }
        Ok(())
    }

    /// Retrieve one file and turn it into the PDF to print, with the copy
    /// count the printer should apply.
    async fn prepare_file(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        index: usize,
        file: &FileSpec,
        engine: &mut SessionScope,
        staged: &mut StagedFiles,
    ) -> Result<(PathBuf, u32)> {
        let local = ctx.retrieve(&job.id, index, file, staged).await?;

        if file.is_image_file {
            let layout = file.layout();
            if !layout.is_collage() {
                let pdf = ctx.converter.to_pdf(&local, engine, staged).await?;
                return Ok((pdf, file.copies));
            }

            let output = ctx
                .staging
                .artifact(&job.id, &format!("collage_{}.pdf", index));
            let request = CollageRequest {
                copies: file.copies,
                layout,
                print_type: file.print_type,
                orientation: file.orientation,
                dpi: ctx.dpi,
            };
            render_collage_async(local, request, output.clone(), staged).await?;
            // Every copy is already on the collage pages.
            return Ok((output, 1));
        }

        let pdf = ctx.converter.to_pdf(&local, engine, staged).await?;
        let pdf = prepare_document(&pdf, file, &ctx.staging, &job.id, index, staged).await?;
        Ok((pdf, file.copies))
    }
}

#[async_trait]
impl JobWorker for PrintWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Print
    }

    async fn run(
        &self,
        ctx: &PipelineContext,
        job: &Job,
        status: &mut StatusReporter,
    ) -> Result<()> {
        status.advance(JobUpdate::Printing).await?;
        if job.files.is_empty() {
            return Err(Error::validation("No files found in the job."));
        }

        let mut engine = ctx.engine_scope();
        let printed = self.print_files(ctx, job, &mut engine).await;
        engine.release().await;
        printed?;

        status
            .advance(JobUpdate::Completed {
                reprint: job.is_reprint,
            })
            .await?;
        info!(
            job_id = %job.id,
            files = job.files.len(),
            status = %job.success_status(),
            "All files printed"
        );
        Ok(())
    }
}
