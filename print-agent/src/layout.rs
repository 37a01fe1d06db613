//! Photo collage layout.
//!
//! `copies` instances of one photo are tiled row-major across a grid of
//! equal cells on A4 pages; `ceil(copies / cells_per_page)` pages are
//! produced and the last page may be partially filled. The resulting PDF is
//! printed once, since the copies are already on the pages.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use tracing::info;

use crate::convert::raster::{self, PageCanvas};
use crate::domain::{FitMode, ImageLayout, Orientation, PrintType};
use crate::staging::StagedFiles;
use crate::{Error, Result};

/// Where each copy goes: pagination and cell geometry for one collage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollagePlan {
    pub canvas: PageCanvas,
    pub columns: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    /// Number of photos on each page, in page order.
    pub pages: Vec<u32>,
}

impl CollagePlan {
    pub fn per_page(&self) -> u32 {
        self.columns * self.rows
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Top-left corner of cell `slot` (row-major) on a page.
    pub fn cell_origin(&self, slot: u32) -> (u32, u32) {
        let column = slot % self.columns;
        let row = slot / self.columns;
        (column * self.cell_width, row * self.cell_height)
    }
}

/// Plan a collage of `copies` photos without touching any pixels.
pub fn plan_collage(
    copies: u32,
    layout: ImageLayout,
    orientation: Orientation,
    dpi: u32,
) -> Result<CollagePlan> {
    if copies == 0 {
        return Err(Error::validation("collage needs at least one copy"));
    }

    let canvas = PageCanvas::a4(dpi, orientation);
    let (columns, rows) = layout.kind.grid(orientation);
    let per_page = columns * rows;

    let full_pages = copies / per_page;
    let remainder = copies % per_page;
    let mut pages = vec![per_page; full_pages as usize];
    if remainder > 0 {
        pages.push(remainder);
    }

    Ok(CollagePlan {
        canvas,
        columns,
        rows,
        cell_width: canvas.width / columns,
        cell_height: canvas.height / rows,
        pages,
    })
}

/// Scale (and optionally desaturate) `image` for a `cell_width x cell_height` cell.
///
/// `Contain` keeps the whole photo and only ever shrinks it; `Cover` fills the
/// cell exactly and crops the overflow around the centre.
pub fn fit_to_cell(
    image: DynamicImage,
    fit: FitMode,
    print_type: PrintType,
    cell_width: u32,
    cell_height: u32,
) -> RgbImage {
    let image = match print_type {
        PrintType::Bw => DynamicImage::ImageLuma8(image.grayscale().to_luma8()),
        PrintType::Color => image,
    };

    match fit {
        FitMode::Contain => raster::shrink_to_fit(image, cell_width, cell_height).to_rgb8(),
        FitMode::Cover => image
            .resize_to_fill(cell_width, cell_height, FilterType::Lanczos3)
            .to_rgb8(),
    }
}

/// Compose the pages of a collage.
pub fn compose_pages(photo: &RgbImage, plan: &CollagePlan) -> Vec<RgbImage> {
    let x_offset = plan.cell_width.saturating_sub(photo.width()) / 2;
    let y_offset = plan.cell_height.saturating_sub(photo.height()) / 2;

    plan.pages
        .iter()
        .map(|&count| {
            let mut page = plan.canvas.blank();
            for slot in 0..count {
                let (x, y) = plan.cell_origin(slot);
                imageops::overlay(
                    &mut page,
                    photo,
                    (x + x_offset) as i64,
                    (y + y_offset) as i64,
                );
            }
            page
        })
        .collect()
}

/// Options for one collage render.
#[derive(Debug, Clone, Copy)]
pub struct CollageRequest {
    pub copies: u32,
    pub layout: ImageLayout,
    pub print_type: PrintType,
    pub orientation: Orientation,
    pub dpi: u32,
}

/// Render `image_path` into a collage PDF at `output`.
pub fn render_collage(
    image_path: &Path,
    request: CollageRequest,
    output: &Path,
) -> Result<CollagePlan> {
    let plan = plan_collage(
        request.copies,
        request.layout,
        request.orientation,
        request.dpi,
    )?;

    let photo = raster::load_image(image_path).map_err(|e| Error::layout(e.to_string()))?;
    let photo = fit_to_cell(
        photo,
        request.layout.fit,
        request.print_type,
        plan.cell_width,
        plan.cell_height,
    );
    let pages = compose_pages(&photo, &plan);

    raster::write_image_pdf(&pages, &plan.canvas, output).map_err(|e| match e {
        Error::Layout(msg) => Error::Layout(msg),
        other => Error::layout(other.to_string()),
    })?;

    info!(
        copies = request.copies,
        grid = %format!("{}x{}", plan.columns, plan.rows),
        pages = plan.page_count(),
        output = %output.display(),
        "Rendered photo collage"
    );
    Ok(plan)
}

/// Render on the blocking pool, with `output` owned by `staged`.
pub async fn render_collage_async(
    image_path: PathBuf,
    request: CollageRequest,
    output: PathBuf,
    staged: &mut StagedFiles,
) -> Result<CollagePlan> {
    staged
        .write_blocking(output, move |out| render_collage(&image_path, request, out))
        .await
}
