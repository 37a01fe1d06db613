//! Per-file print settings carried inside a job.

use serde::{Deserialize, Serialize};

/// Page orientation requested for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Orientation {
    Landscape,
    #[default]
    #[serde(other)]
    Portrait,
}

impl Orientation {
    /// Classify a page by its geometry: taller than wide is portrait.
    pub fn from_dimensions(width: f32, height: f32) -> Self {
        if height > width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

/// Two-sided printing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplexMode {
    DuplexLongEdge,
    DuplexShortEdge,
    #[default]
    #[serde(other)]
    OneSided,
}

/// Colour mode for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintType {
    Bw,
    #[default]
    #[serde(other)]
    Color,
}

/// Grid policy for photo collages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutType {
    #[serde(rename = "2-up")]
    TwoUp,
    #[serde(rename = "4-up")]
    FourUp,
    #[serde(rename = "9-up")]
    NineUp,
    #[serde(rename = "contact-sheet")]
    ContactSheet,
    #[default]
    #[serde(rename = "full-page")]
    #[serde(other)]
    FullPage,
}

impl LayoutType {
    /// Grid as `(columns, rows)` for a page in the given orientation.
    pub fn grid(&self, orientation: Orientation) -> (u32, u32) {
        let landscape = orientation == Orientation::Landscape;
        match self {
            LayoutType::FullPage => (1, 1),
            LayoutType::TwoUp if landscape => (2, 1),
            LayoutType::TwoUp => (1, 2),
            LayoutType::FourUp => (2, 2),
            LayoutType::NineUp => (3, 3),
            LayoutType::ContactSheet if landscape => (7, 5),
            LayoutType::ContactSheet => (5, 7),
        }
    }
}

/// How a photo is scaled into its grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Cell fully covered, overflow cropped.
    Cover,
    /// Whole image visible, may leave margins.
    #[default]
    #[serde(other)]
    Contain,
}

/// Collage settings for an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageLayout {
    #[serde(rename = "type", default)]
    pub kind: LayoutType,
    #[serde(default)]
    pub fit: FitMode,
}

impl ImageLayout {
    pub fn new(kind: LayoutType, fit: FitMode) -> Self {
        Self { kind, fit }
    }

    pub fn is_collage(&self) -> bool {
        self.kind != LayoutType::FullPage
    }
}

fn default_copies() -> u32 {
    1
}

fn default_paper_size() -> String {
    "A4".to_string()
}

fn default_page_range() -> String {
    "all".to_string()
}

/// One input file within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    /// Unique name the file was uploaded under.
    #[serde(default)]
    pub file_name: Option<String>,
    /// User-facing file name.
    #[serde(default)]
    pub original_file_name: Option<String>,
    /// Remote asset id.
    #[serde(default, rename = "googleDriveFileId")]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub is_image_file: bool,
    #[serde(default = "default_copies")]
    pub copies: u32,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub duplex: DuplexMode,
    #[serde(default = "default_paper_size")]
    pub paper_size: String,
    #[serde(default = "default_page_range")]
    pub page_range: String,
    #[serde(default)]
    pub print_type: PrintType,
    #[serde(default)]
    pub image_layout: Option<ImageLayout>,
}

impl FileSpec {
    /// A file with default settings referring to the given remote asset.
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            file_name: None,
            original_file_name: None,
            asset_id: Some(asset_id.into()),
            is_image_file: false,
            copies: default_copies(),
            orientation: Orientation::Portrait,
            duplex: DuplexMode::OneSided,
            paper_size: default_paper_size(),
            page_range: default_page_range(),
            print_type: PrintType::Color,
            image_layout: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.original_file_name = Some(name.into());
        self
    }

    pub fn image(mut self, layout: ImageLayout) -> Self {
        self.is_image_file = true;
        self.image_layout = Some(layout);
        self
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_duplex(mut self, duplex: DuplexMode) -> Self {
        self.duplex = duplex;
        self
    }

    pub fn with_page_range(mut self, range: impl Into<String>) -> Self {
        self.page_range = range.into();
        self
    }

    pub fn with_print_type(mut self, print_type: PrintType) -> Self {
        self.print_type = print_type;
        self
    }

    /// Name shown in logs and cover pages; `index` is the file's position in the job.
    pub fn display_name(&self, index: usize) -> String {
        self.original_file_name
            .as_deref()
            .or(self.file_name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("file_{}", index + 1))
    }

    /// Collage settings, defaulting to a plain full page.
    pub fn layout(&self) -> ImageLayout {
        self.image_layout.unwrap_or_default()
    }

    /// Whether a page-range restriction other than `all` is present.
    pub fn has_page_range(&self) -> bool {
        let range = self.page_range.trim();
        !range.is_empty() && !range.eq_ignore_ascii_case("all")
    }
}
