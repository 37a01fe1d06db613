//! Local staging area for downloaded and intermediate files.
//!
//! Every artifact is named `{job_id}_{name}` so concurrent jobs never collide,
//! and every artifact is owned by a [`StagedFiles`] guard that deletes it when
//! the unit of work that created it ends, however it ends.
//!
//! Blocking writes started through [`StagedFiles::write_blocking`] keep running
//! on the blocking pool after a job is timed out or shut down. Such a write
//! removes its own output if the guard is already gone when it finishes.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{Error, Result};
use crate::utils::fs::{self, remove_file_quietly, sanitize_file_name};

/// The staging directory shared by all workers.
#[derive(Debug, Clone)]
pub struct StagingDir {
    root: PathBuf,
}

impl StagingDir {
    /// Open (creating if needed) the staging directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::ensure_dir_all_with_op("creating staging directory", &root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for an artifact belonging to `job_id`.
    ///
    /// `name` may come from user input; it is reduced to one path component.
    pub fn artifact(&self, job_id: &str, name: &str) -> PathBuf {
        let file_name = format!(
            "{}_{}",
            sanitize_file_name(job_id),
            sanitize_file_name(name)
        );
        self.root.join(file_name)
    }

    /// Files currently staged for `job_id`.
    pub fn files_for_job(&self, job_id: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}_", sanitize_file_name(job_id));
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| fs::io_error("listing staging directory", &self.root, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| fs::io_error("listing staging directory", &self.root, e))?;
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Remove every file left behind by a previous run.
    ///
    /// In-flight state is not persisted, so anything still staged at startup
    /// belongs to a process that no longer exists.
    pub async fn purge_leftovers(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| fs::io_error("listing staging directory", &self.root, e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fs::io_error("listing staging directory", &self.root, e))?
        {
            let path = entry.path();
            if path.is_file() && remove_file_quietly(&path) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, dir = %self.root.display(), "Removed leftover staged files");
        }
        Ok(removed)
    }
}

/// Drop guard over the staged files created by one unit of work.
#[derive(Debug, Default)]
pub struct StagedFiles {
    paths: Vec<PathBuf>,
    /// Cancelled when the guard drops; seen by writes still in flight.
    released: CancellationToken,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `path`; it is deleted when this guard is dropped.
    ///
    /// Register a path before the step that writes it, so a half-written
    /// file is still cleaned up if that step fails.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path.clone());
        }
        path
    }

    /// Track `output` and produce it with `write` on the blocking pool.
    ///
    /// If this guard is dropped before `write` finishes, the blocking task
    /// deletes `output` itself once it is done. A write that has not started
    /// by then is skipped.
    pub async fn write_blocking<T, F>(&mut self, output: impl Into<PathBuf>, write: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let output = self.track(output);
        let released = self.released.clone();

        tokio::task::spawn_blocking(move || {
            if released.is_cancelled() {
                return Err(Error::Other(format!(
                    "'{}' was abandoned before it was written",
                    output.display()
                )));
            }
            let result = write(&output);
            // The guard cancels before deleting, so either it saw this file
            // or this check sees the cancellation.
            if released.is_cancelled() && remove_file_quietly(&output) {
                debug!(path = %output.display(), "Removed output of an abandoned job");
            }
            result
        })
        .await?
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every tracked file now. Returns the number of paths cleared.
    pub fn cleanup(&mut self) -> usize {
        let mut cleared = 0;
        for path in self.paths.drain(..) {
            if remove_file_quietly(&path) {
                debug!(path = %path.display(), "Removed staged file");
                cleared += 1;
            }
        }
        cleared
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        self.released.cancel();
        self.cleanup();
    }
}
