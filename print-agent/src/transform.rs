//! PDF transforms applied to documents before printing.
//!
//! Orientation is taken from the first page's media box. When it disagrees
//! with the requested orientation, every page gets a quarter turn. A page
//! range expression keeps only the selected pages, in document order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use tracing::{debug, info};

use crate::domain::{FileSpec, Orientation};
use crate::staging::{StagedFiles, StagingDir};
use crate::{Error, Result};

/// Guard against malformed documents with cyclic `/Parent` chains.
const MAX_TREE_DEPTH: usize = 32;

/// Parse a page range expression into sorted, 0-based page indices.
///
/// Empty or `all` (any case) selects every page. Otherwise a comma-separated
/// list of `N` or `A-B` tokens, 1-based and inclusive. Pages past
/// `max_pages` are dropped; malformed or reversed tokens select nothing;
/// duplicates collapse.
pub fn parse_page_range(expr: &str, max_pages: u32) -> Vec<u32> {
    let expr = expr.trim();
    if expr.is_empty() || expr.eq_ignore_ascii_case("all") {
        return (0..max_pages).collect();
    }

    let mut pages = BTreeSet::new();
    for token in expr.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => match (parse_page_number(a), parse_page_number(b)) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            },
            None => match parse_page_number(token) {
                Some(n) => (n, n),
                None => continue,
            },
        };

        let start = start.max(1);
        let end = end.min(max_pages);
        for page in start..=end {
            pages.insert(page - 1);
        }
    }
    pages.into_iter().collect()
}

fn parse_page_number(token: &str) -> Option<u32> {
    let token = token.trim();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Walk up the page tree to find a possibly inherited attribute.
fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(doc: &Document, object: &Object) -> Option<f32> {
    match resolve(doc, object) {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Orientation of the first page, if the document has one with a usable media box.
pub fn detect_orientation(doc: &Document) -> Option<Orientation> {
    let (_, &first) = doc.get_pages().iter().next()?;
    let media_box = inherited_attribute(doc, first, b"MediaBox")?.as_array().ok()?;
    if media_box.len() != 4 {
        return None;
    }
    let coords: Vec<f32> = media_box
        .iter()
        .map(|o| number(doc, o))
        .collect::<Option<_>>()?;

    let width = (coords[2] - coords[0]).abs();
    let height = (coords[3] - coords[1]).abs();
    Some(Orientation::from_dimensions(width, height))
}

/// Add a quarter turn to every page, respecting any existing rotation.
pub fn rotate_all_pages(doc: &mut Document) -> Result<usize> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for &page_id in &pages {
        let current = match inherited_attribute(doc, page_id, b"Rotate") {
            Some(Object::Integer(r)) => *r,
            _ => 0,
        };
        let rotated = (current + 90).rem_euclid(360);
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)?
            .set("Rotate", Object::Integer(rotated));
    }
    Ok(pages.len())
}

/// Outcome of an orientation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reorientation {
    /// The document already matched, or had no pages; nothing was written.
    Unchanged,
    /// Every page was turned and the result written to the output path.
    Rotated { detected: Orientation, pages: usize },
}

/// Rotate `input` into `output` if its orientation differs from `desired`.
pub fn correct_orientation(
    input: &Path,
    desired: Orientation,
    output: &Path,
) -> Result<Reorientation> {
    let mut doc = Document::load(input)?;

    let Some(detected) = detect_orientation(&doc) else {
        debug!(path = %input.display(), "No pages to orient");
        return Ok(Reorientation::Unchanged);
    };
    if detected == desired {
        return Ok(Reorientation::Unchanged);
    }

    let pages = rotate_all_pages(&mut doc)?;
    doc.save(output)?;
    info!(
        path = %input.display(),
        from = %detected,
        to = %desired,
        pages,
        "Rotated document"
    );
    Ok(Reorientation::Rotated { detected, pages })
}

/// Write the pages of `input` selected by `expr` to `output`.
///
/// Returns the number of pages kept. Selecting nothing is an error rather
/// than an empty print.
pub fn extract_pages(input: &Path, expr: &str, output: &Path) -> Result<usize> {
    let mut doc = Document::load(input)?;
    let total = doc.get_pages().len() as u32;
    let keep = parse_page_range(expr, total);
    if keep.is_empty() {
        return Err(Error::validation(format!(
            "page range '{}' selects no pages of {}",
            expr, total
        )));
    }

    let keep: BTreeSet<u32> = keep.into_iter().map(|i| i + 1).collect();
    let drop: Vec<u32> = (1..=total).filter(|n| !keep.contains(n)).collect();
    if !drop.is_empty() {
        doc.delete_pages(&drop);
        doc.prune_objects();
    }
    doc.save(output)?;

    info!(path = %input.display(), range = expr, kept = keep.len(), total, "Extracted page range");
    Ok(keep.len())
}

/// Number of pages in a PDF.
pub fn page_count(path: &Path) -> Result<usize> {
    Ok(Document::load(path)?.get_pages().len())
}

/// [`page_count`] on the blocking pool.
pub async fn page_count_async(path: PathBuf) -> Result<usize> {
    tokio::task::spawn_blocking(move || page_count(&path)).await?
}

/// Apply orientation correction and page selection for one document.
///
/// Intermediate PDFs are named `{job}_{index}_rotated.pdf` and
/// `{job}_{index}_subset.pdf` and are registered with `staged`. Returns the
/// path of the PDF to print.
pub async fn prepare_document(
    pdf: &Path,
    file: &FileSpec,
    staging: &StagingDir,
    job_id: &str,
    index: usize,
    staged: &mut StagedFiles,
) -> Result<PathBuf> {
    let rotated = staging.artifact(job_id, &format!("{}_rotated.pdf", index));
    let desired = file.orientation;
    let input = pdf.to_path_buf();
    let outcome = staged
        .write_blocking(rotated.clone(), move |out| {
            correct_orientation(&input, desired, out)
        })
        .await?;

    let current = match outcome {
        Reorientation::Rotated { .. } => rotated,
        Reorientation::Unchanged => pdf.to_path_buf(),
    };

    if !file.has_page_range() {
        return Ok(current);
    }

    let subset = staging.artifact(job_id, &format!("{}_subset.pdf", index));
    let expr = file.page_range.clone();
    staged
        .write_blocking(subset.clone(), move |out| extract_pages(&current, &expr, out))
        .await?;
    Ok(subset)
}
