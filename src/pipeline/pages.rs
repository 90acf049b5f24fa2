//! Page images: `DynamicImage` → `page_<n>.png` inside the workspace.
//!
//! Page numbers are 1-based and contiguous, and are not zero-padded:
//! `page_10.png` sorts before `page_2.png` lexically. The number in the name
//! is what identifies the page, never its position in a directory listing
//! or in the archive. [`page_number`] parses it back.

use crate::error::Pdf2ImgError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the image for 1-based page `page`.
pub fn page_file_name(page: usize) -> String {
    format!("page_{page}.png")
}

/// Recover the 1-based page number from a `page_<n>.png` name.
///
/// Returns `None` for anything not produced by [`page_file_name`].
pub fn page_number(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("page_")?.strip_suffix(".png")?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// PNG-encode every page into `workspace`, in order.
///
/// Blocking (PNG encoding is CPU-bound); call from `spawn_blocking`.
/// Returns the written paths in page order.
pub fn write_pages(workspace: &Path, pages: &[DynamicImage]) -> Result<Vec<PathBuf>, Pdf2ImgError> {
    let mut paths = Vec::with_capacity(pages.len());

    for (i, img) in pages.iter().enumerate() {
        let page = i + 1;
        let path = workspace.join(page_file_name(page));
        img.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| Pdf2ImgError::PageWriteFailed {
                page,
                path: path.clone(),
                detail: e.to_string(),
            })?;
        debug!("Wrote page {} → {}", page, path.display());
        paths.push(path);
    }

    Ok(paths)
}
