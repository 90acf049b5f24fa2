//! PDF rasterisation: turn a saved PDF into one `DynamicImage` per page.
//!
//! The orchestrator only sees the [`Rasterizer`] trait: "given a PDF path,
//! produce the page images in document order". [`PdfiumRasterizer`] is the
//! production implementation; tests substitute a fake that needs no native
//! library.
//!
//! ## Why a blocking trait?
//!
//! pdfium is a C++ library with thread-local state and no async API. The
//! orchestrator calls [`Rasterizer::rasterize`] from inside
//! `tokio::task::spawn_blocking`, so implementations are free to block.

use crate::error::Pdf2ImgError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Converts a PDF file into an ordered sequence of page images.
///
/// Implementations must return pages in document order: element `k` of the
/// result is page `k + 1`. Any failure is fatal to the request; partial
/// output is never returned.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, Pdf2ImgError>;
}

/// Production rasterizer backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32, max_pixels: u32, library_path: Option<PathBuf>) -> Self {
        Self {
            dpi,
            max_pixels,
            library_path,
        }
    }

    /// Build from the service configuration.
    pub fn from_config(config: &crate::config::ServerConfig) -> Self {
        Self::new(
            config.dpi,
            config.max_rendered_pixels,
            config.pdfium_library_path.clone(),
        )
    }

    /// Check that a pdfium library can be bound, without opening a document.
    ///
    /// Called once at startup so a missing library is reported immediately
    /// instead of on the first upload.
    pub fn probe(&self) -> Result<(), Pdf2ImgError> {
        self.bind().map(|_| ())
    }

    fn bind(&self) -> Result<Pdfium, Pdf2ImgError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Pdf2ImgError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    fn render_config(&self) -> PdfRenderConfig {
        PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32)
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<DynamicImage>, Pdf2ImgError> {
        check_pdf_magic(pdf_path)?;

        let pdfium = self.bind()?;
        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                Pdf2ImgError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2ImgError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);
        if total_pages == 0 {
            return Err(Pdf2ImgError::NoPages {
                path: pdf_path.to_path_buf(),
            });
        }

        let render_config = self.render_config();
        let mut images = Vec::with_capacity(total_pages);

        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| Pdf2ImgError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2ImgError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

/// Reject files that do not start with `%PDF` before handing them to pdfium.
///
/// pdfium's own error for a non-PDF is an opaque format code; this gives the
/// caller the first bytes of what was actually uploaded.
pub fn check_pdf_magic(path: &Path) -> Result<(), Pdf2ImgError> {
    let mut file = std::fs::File::open(path).map_err(|e| Pdf2ImgError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut magic = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut magic)
        .map_err(|e| Pdf2ImgError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if magic != b"%PDF" {
        return Err(Pdf2ImgError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn magic_accepts_pdf_header() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("a.pdf");
        std::fs::write(&p, b"%PDF-1.4\n%%EOF\n").unwrap();
        check_pdf_magic(&p).unwrap();
    }

    #[test]
    fn magic_rejects_other_content() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("notes");
        std::fs::write(&p, b"hello world").unwrap();
        match check_pdf_magic(&p).unwrap_err() {
            Pdf2ImgError::NotAPdf { magic, .. } => assert_eq!(magic, b"hell"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn magic_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("tiny.pdf");
        std::fs::write(&p, b"%P").unwrap();
        assert!(matches!(
            check_pdf_magic(&p).unwrap_err(),
            Pdf2ImgError::NotAPdf { .. }
        ));
    }

    #[test]
    fn non_pdf_fails_before_binding() {
        // No pdfium library is needed: the magic check runs first.
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("fake.pdf");
        std::fs::write(&p, b"GIF89a").unwrap();
        let r = PdfiumRasterizer::new(72, 1000, Some(dir.path().join("missing.so")));
        let err = r.rasterize(&p).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conversion);
    }
}
