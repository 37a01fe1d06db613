//! Headless LibreOffice conversion engine.
//!
//! Each session runs `soffice` against its own throwaway user profile, so two
//! sessions never contend for the profile lock and a crashed conversion leaves
//! nothing behind once the session's temp directory is dropped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_captured, silent_command};
use tempfile::TempDir;
use tracing::{debug, info};
use url::Url;

use super::engine::{ConversionEngine, EngineSession};
use crate::{Error, Result};

pub struct LibreOfficeEngine {
    soffice_path: String,
}

impl LibreOfficeEngine {
    pub fn new(soffice_path: impl Into<String>) -> Self {
        Self {
            soffice_path: soffice_path.into(),
        }
    }
}

#[async_trait]
impl ConversionEngine for LibreOfficeEngine {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    async fn open_session(&self) -> Result<Box<dyn EngineSession>> {
        let soffice_path = self.soffice_path.clone();
        let session =
            tokio::task::spawn_blocking(move || LibreOfficeSession::create(soffice_path)).await??;
        debug!(profile = %session.profile_arg, "Opened LibreOffice session");
        Ok(Box::new(session))
    }
}

struct LibreOfficeSession {
    soffice_path: String,
    profile_arg: String,
    out_dir: PathBuf,
    workspace: Option<TempDir>,
}

impl LibreOfficeSession {
    fn create(soffice_path: String) -> Result<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("print-agent-lo-")
            .tempdir()
            .map_err(|e| Error::conversion(format!("could not create engine profile: {}", e)))?;

        let profile_url = Url::from_directory_path(workspace.path().join("profile"))
            .map_err(|_| Error::conversion("engine profile path is not absolute"))?;

        Ok(Self {
            soffice_path,
            profile_arg: format!("-env:UserInstallation={}", profile_url),
            out_dir: workspace.path().join("out"),
            workspace: Some(workspace),
        })
    }
}

#[async_trait]
impl EngineSession for LibreOfficeSession {
    async fn convert(&mut self, input: &Path, output: &Path) -> Result<()> {
        let input = std::path::absolute(input)
            .map_err(|e| Error::io_path("resolving input path", input, e))?;
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| Error::io_path("creating engine output directory", &self.out_dir, e))?;

        let mut cmd = silent_command(&self.soffice_path);
        cmd.arg(&self.profile_arg)
            .args(["--headless", "--norestore", "--nologo", "--nolockcheck"])
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(&self.out_dir)
            .arg(&input);

        let result = run_captured(&mut cmd).await.map_err(|e| {
            Error::conversion(format!("failed to launch '{}': {}", self.soffice_path, e))
        })?;
        if !result.success() {
            return Err(Error::conversion(result.diagnostic()));
        }

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::conversion("input has no file name"))?;
        let produced = self.out_dir.join(format!("{}.pdf", stem));
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(Error::conversion(format!(
                "engine produced no PDF for '{}': {}",
                input.display(),
                result.diagnostic()
            )));
        }

        move_file(&produced, output).await?;
        info!(input = %input.display(), output = %output.display(), "Converted document to PDF");
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(workspace) = self.workspace.take() {
            tokio::task::spawn_blocking(move || workspace.close())
                .await?
                .map_err(|e| Error::conversion(format!("could not remove engine profile: {}", e)))?;
        }
        Ok(())
    }
}

/// Rename, falling back to copy + delete when the temp directory lives on a
/// different filesystem from the staging directory.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| Error::io_path("moving converted PDF", to, e))?;
    let _ = tokio::fs::remove_file(from).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_get_private_profiles_removed_on_close() {
        let first = LibreOfficeSession::create("soffice".to_string()).unwrap();
        let second = LibreOfficeSession::create("soffice".to_string()).unwrap();
        assert_ne!(first.profile_arg, second.profile_arg);
        assert!(first.profile_arg.starts_with("-env:UserInstallation=file://"));

        let root = first.workspace.as_ref().unwrap().path().to_path_buf();
        assert!(root.is_dir());
        Box::new(first).close().await.unwrap();
        assert!(!root.exists());
        Box::new(second).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.docx");
        std::fs::write(&input, b"not really a document").unwrap();

        let engine = LibreOfficeEngine::new("/nonexistent/soffice-binary");
        let mut session = engine.open_session().await.unwrap();
        let err = session
            .convert(&input, &dir.path().join("notes_converted.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conversion(_)));
        assert!(err.to_string().contains("failed to launch"));
        session.close().await.unwrap();
    }
}
