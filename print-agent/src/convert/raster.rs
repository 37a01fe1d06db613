//! Raster page canvases and the image-only PDF writer.
//!
//! Pages are composed as RGB bitmaps at a fixed DPI, JPEG-encoded and placed
//! one per PDF page with a page size of `px * 72 / dpi` points, so the PDF
//! prints at exactly the physical size the bitmap was laid out for.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use tracing::debug;

use crate::domain::Orientation;
use crate::{Error, Result};

/// A4 at 300 DPI in pixels (8.27 x 11.69 in).
const A4_PORTRAIT_300DPI: (u32, u32) = (2481, 3508);
const REFERENCE_DPI: u32 = 300;
const JPEG_QUALITY: u8 = 92;

/// Pixel dimensions of one printed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCanvas {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl PageCanvas {
    /// An A4 sheet at `dpi`, swapped for landscape.
    pub fn a4(dpi: u32, orientation: Orientation) -> Self {
        let dpi = dpi.max(1);
        let scale = |px: u32| {
            let px = px as u64 * dpi as u64;
            ((px + REFERENCE_DPI as u64 / 2) / REFERENCE_DPI as u64) as u32
        };
        let (w, h) = (scale(A4_PORTRAIT_300DPI.0), scale(A4_PORTRAIT_300DPI.1));
        let (width, height) = match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        };
        Self { width, height, dpi }
    }

    /// A blank white page.
    pub fn blank(&self) -> RgbImage {
        RgbImage::from_pixel(self.width, self.height, Rgb([255, 255, 255]))
    }

    /// Page size in PDF points.
    pub fn size_points(&self) -> (f32, f32) {
        (
            self.width as f32 * 72.0 / self.dpi as f32,
            self.height as f32 * 72.0 / self.dpi as f32,
        )
    }
}

/// Decode an image file, sniffing the format from its contents.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| Error::io_path("opening image", path, e))?
        .with_guessed_format()
        .map_err(|e| Error::io_path("reading image", path, e))?;
    Ok(reader.decode()?)
}

/// Shrink `image` to fit inside `max_width x max_height`, keeping its aspect
/// ratio. Images that already fit are left untouched.
pub fn shrink_to_fit(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if image.width() <= max_width && image.height() <= max_height {
        return image;
    }
    image.resize(max_width, max_height, FilterType::Lanczos3)
}

/// Render a single image, centred and shrunk to fit, onto one A4 portrait page.
pub fn image_to_pdf(input: &Path, output: &Path, dpi: u32) -> Result<()> {
    let canvas = PageCanvas::a4(dpi, Orientation::Portrait);
    let image = shrink_to_fit(load_image(input)?, canvas.width, canvas.height).to_rgb8();

    let mut page = canvas.blank();
    let x = (canvas.width - image.width()) / 2;
    let y = (canvas.height - image.height()) / 2;
    imageops::overlay(&mut page, &image, x as i64, y as i64);

    write_image_pdf(&[page], &canvas, output)
}

/// Write `pages` as a PDF, one full-bleed image per page.
pub fn write_image_pdf(pages: &[RgbImage], canvas: &PageCanvas, output: &Path) -> Result<()> {
    if pages.is_empty() {
        return Err(Error::layout("no pages to write"));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let page_canvas = PageCanvas {
            width: page.width(),
            height: page.height(),
            dpi: canvas.dpi,
        };
        let (width_pt, height_pt) = page_canvas.size_points();

        let image_id = doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => page.width() as i64,
                    "Height" => page.height() as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8i64,
                    "Filter" => "DCTDecode",
                },
                encode_jpeg(page)?,
            )
            .with_compression(false),
        );

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        height_pt.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                width_pt.into(),
                height_pt.into(),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(output)?;
    debug!(path = %output.display(), pages = count, "Wrote image PDF");
    Ok(())
}

fn encode_jpeg(page: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(page)?;
    Ok(buf.into_inner())
}
