//! Pipeline stages for PDF-to-images conversion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the rendering backend can be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! rasterize ──▶ pages ──▶ archive
//!  (pdfium)     (PNG)     (ZIP)
//! ```
//!
//! 1. [`rasterize`] — render every page to a `DynamicImage`; blocking, run
//!    in `spawn_blocking` because pdfium is not async-safe
//! 2. [`pages`]     — PNG-encode each image to `page_<n>.png` in the workspace
//! 3. [`archive`]   — pack the page files into one ZIP next to the workspace

pub mod archive;
pub mod pages;
pub mod rasterize;
