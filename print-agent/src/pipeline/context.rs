//! Shared services handed to every worker.

use std::path::PathBuf;
use std::sync::Arc;

use crate::convert::{EnginePool, PdfConverter, SessionScope};
use crate::domain::FileSpec;
use crate::printing::PrintDispatcher;
use crate::queue::JobStore;
use crate::retriever::{FileRetriever, ProgressReporter};
use crate::staging::{StagedFiles, StagingDir};
use crate::{Error, Result};

/// Everything a job worker needs, shared across workers.
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub retriever: FileRetriever,
    pub engines: Arc<EnginePool>,
    pub converter: PdfConverter,
    pub printer: PrintDispatcher,
    pub staging: StagingDir,
    /// Resolution for rendered images and collages.
    pub dpi: u32,
}

impl PipelineContext {
    /// A fresh, not yet leased, engine scope for one job.
    pub fn engine_scope(&self) -> SessionScope {
        SessionScope::new(self.engines.clone())
    }

    /// Download file `index` of `job_id` into staging as `{job}_{index}_{name}`.
    ///
    /// The local path is registered with `staged` before the download starts.
    pub async fn retrieve(
        &self,
        job_id: &str,
        index: usize,
        file: &FileSpec,
        staged: &mut StagedFiles,
    ) -> Result<PathBuf> {
        let name = file.display_name(index);
        let asset_id = file
            .asset_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::validation(format!("Missing Google Drive ID for file '{}'.", name))
            })?;

        let local = staged.track(
            self.staging
                .artifact(job_id, &format!("{}_{}", index, name)),
        );
        let mut progress = ProgressReporter::logging(job_id, name);
        self.retriever.fetch(asset_id, &local, &mut progress).await?;
        Ok(local)
    }
}
