//! Print dispatch to the OS print system.
//!
//! Jobs go to a named printer through SumatraPDF's silent command-line
//! printing. The settings string it takes is built from the file's print
//! options in a fixed token order:
//!
//! ```text
//! {copies}x,{simplex|duplex|duplexshort},{portrait|landscape},papersize={size}[,{range}]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_captured, silent_command};
use tracing::{info, warn};

use crate::domain::{DuplexMode, FileSpec, Orientation};
use crate::{Error, Result};

/// Print options for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintSettings {
    pub copies: u32,
    pub duplex: DuplexMode,
    pub orientation: Orientation,
    pub paper_size: String,
    /// Restricts which pages the printer prints, e.g. `1-3,5`.
    pub page_range: Option<String>,
}

impl PrintSettings {
    /// One copy, one-sided, A4 portrait: used for cover and test pages.
    pub fn single_sheet() -> Self {
        Self {
            copies: 1,
            duplex: DuplexMode::OneSided,
            orientation: Orientation::Portrait,
            paper_size: "A4".to_string(),
            page_range: None,
        }
    }

    /// Settings from a file's options, printing `copies` copies.
    ///
    /// The page range is left unset: documents are already cut down to their
    /// selected pages before they are dispatched.
    pub fn for_file(file: &FileSpec, copies: u32) -> Self {
        Self {
            copies,
            duplex: file.duplex,
            orientation: file.orientation,
            paper_size: file.paper_size.clone(),
            page_range: None,
        }
    }

    /// The print-settings tokens, in order.
    pub fn tokens(&self) -> Vec<String> {
        let duplex = match self.duplex {
            DuplexMode::OneSided => "simplex",
            DuplexMode::DuplexLongEdge => "duplex",
            DuplexMode::DuplexShortEdge => "duplexshort",
        };
        let paper = if self.paper_size.trim().is_empty() {
            "A4"
        } else {
            self.paper_size.trim()
        };

        let mut tokens = vec![
            format!("{}x", self.copies),
            duplex.to_string(),
            self.orientation.to_string(),
            format!("papersize={}", paper),
        ];
        if let Some(range) = self.page_range.as_deref().map(str::trim)
            && !range.is_empty()
            && !range.eq_ignore_ascii_case("all")
        {
            tokens.push(range.to_string());
        }
        tokens
    }

    pub fn to_settings_string(&self) -> String {
        self.tokens().join(",")
    }
}

/// A request to print one PDF.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub printer: String,
    pub pdf_path: PathBuf,
    /// Human-readable label for logs, e.g. `{job}-{n}`.
    pub label: String,
    pub settings: PrintSettings,
}

/// Something that can put a PDF on a printer.
#[async_trait]
pub trait PrintBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit the request, returning once the print system has accepted it.
    async fn submit(&self, request: &PrintRequest) -> Result<()>;
}

/// Validates and forwards print requests to a backend.
pub struct PrintDispatcher {
    backend: Box<dyn PrintBackend>,
}

impl PrintDispatcher {
    pub fn new(backend: Box<dyn PrintBackend>) -> Self {
        Self { backend }
    }

    pub async fn dispatch(
        &self,
        printer: &str,
        pdf_path: &Path,
        label: &str,
        settings: PrintSettings,
    ) -> Result<()> {
        if printer.trim().is_empty() {
            return Err(Error::validation(format!(
                "No printer name set for '{}'",
                label
            )));
        }
        if settings.copies == 0 {
            return Err(Error::validation(format!(
                "Copy count must be at least 1 for '{}'",
                label
            )));
        }

        let request = PrintRequest {
            printer: printer.to_string(),
            pdf_path: pdf_path.to_path_buf(),
            label: label.to_string(),
            settings,
        };
        self.backend.submit(&request).await?;

        info!(
            printer = %request.printer,
            label = %request.label,
            settings = %request.settings.to_settings_string(),
            backend = self.backend.name(),
            "Print job sent"
        );
        Ok(())
    }
}

/// Configuration for the print backend.
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Explicit SumatraPDF executable; otherwise the standard install paths are searched.
    pub sumatra_path: Option<PathBuf>,
}

/// SumatraPDF command-line printing.
pub struct SumatraBackend {
    executable: Option<PathBuf>,
}

impl SumatraBackend {
    pub fn new(config: &PrinterConfig) -> Self {
        let executable = config.sumatra_path.clone().or_else(locate_sumatra);
        match &executable {
            Some(path) => info!(path = %path.display(), "Using SumatraPDF"),
            None => warn!("SumatraPDF not found; print jobs will fail until SUMATRA_PATH is set"),
        }
        Self { executable }
    }

    fn executable(&self) -> Result<&Path> {
        self.executable
            .as_deref()
            .ok_or_else(|| Error::config("SumatraPDF executable not found"))
    }
}

/// Look for SumatraPDF in its usual per-machine and per-user install locations.
fn locate_sumatra() -> Option<PathBuf> {
    const RELATIVE: &[&str] = &["SumatraPDF\\SumatraPDF.exe", "SumatraPDF/SumatraPDF.exe"];

    ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"]
        .iter()
        .filter_map(|var| std::env::var_os(var).map(PathBuf::from))
        .flat_map(|base| RELATIVE.iter().map(move |rel| base.join(rel)))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl PrintBackend for SumatraBackend {
    fn name(&self) -> &'static str {
        "sumatra"
    }

    async fn submit(&self, request: &PrintRequest) -> Result<()> {
        let executable = self.executable()?;

        let mut cmd = silent_command(executable);
        cmd.arg("-print-to")
            .arg(&request.printer)
            .args(["-silent", "-exit-on-print", "-print-settings"])
            .arg(request.settings.to_settings_string())
            .arg(&request.pdf_path);

        let output = run_captured(&mut cmd)
            .await
            .map_err(|e| Error::print_dispatch(&request.printer, e.to_string()))?;
        if !output.success() {
            return Err(Error::print_dispatch(&request.printer, output.diagnostic()));
        }
        Ok(())
    }
}
