//! Conversion of retrieved files to PDF.
//!
//! | Input                                  | Route                     |
//! |----------------------------------------|---------------------------|
//! | `.pdf`                                 | passed through unchanged  |
//! | `.doc` `.docx` `.txt`                  | office engine session     |
//! | `.jpg` `.jpeg` `.png` `.bmp` `.gif` `.tiff` | centred on an A4 page |
//!
//! Anything else is rejected with [`Error::UnsupportedType`].

mod engine;
mod libreoffice;
pub mod raster;

use std::path::{Path, PathBuf};

pub use engine::{
    ConversionEngine, EngineConfig, EngineLease, EnginePool, EngineSession, SessionScope,
};
pub use libreoffice::LibreOfficeEngine;
pub use raster::PageCanvas;

#[cfg(test)]
pub(crate) use engine::testing;

use crate::staging::StagedFiles;
use crate::{Error, Result};

/// How a file reaches PDF form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Office,
    Raster,
}

impl SourceKind {
    /// Classify a path by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "doc" | "docx" | "txt" => Ok(Self::Office),
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "tiff" => Ok(Self::Raster),
            "" => Err(Error::UnsupportedType("(no extension)".to_string())),
            other => Err(Error::UnsupportedType(format!(".{}", other))),
        }
    }
}

/// Converts staged inputs to PDF next to the input.
#[derive(Debug, Clone, Copy)]
pub struct PdfConverter {
    dpi: u32,
}

impl PdfConverter {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Where the converted PDF for `input` is written.
    pub fn converted_path(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        input.with_file_name(format!("{}_converted.pdf", stem))
    }

    /// Produce a PDF for `input`.
    ///
    /// PDFs are returned as-is. Any newly produced file is registered with
    /// `staged` before it is written.
    pub async fn to_pdf(
        &self,
        input: &Path,
        engine: &mut SessionScope,
        staged: &mut StagedFiles,
    ) -> Result<PathBuf> {
        let kind = SourceKind::from_path(input)?;
        let describe = |e: Error| match e {
            Error::Conversion(msg) => Error::conversion(format!("'{}': {}", file_label(input), msg)),
            other => Error::conversion(format!("'{}': {}", file_label(input), other)),
        };

        let output = match kind {
            SourceKind::Pdf => return Ok(input.to_path_buf()),
            SourceKind::Office => {
                let output = staged.track(Self::converted_path(input));
                engine.convert(input, &output).await.map_err(describe)?;
                output
            }
            SourceKind::Raster => {
                let output = Self::converted_path(input);
                let (src, dpi) = (input.to_path_buf(), self.dpi);
                staged
                    .write_blocking(output.clone(), move |dst| raster::image_to_pdf(&src, dst, dpi))
                    .await
                    .map_err(describe)?;
                output
            }
        };

        Ok(output)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
