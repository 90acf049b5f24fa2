//! # edgequake-pdf2img
//!
//! Upload a PDF, get back a ZIP archive with one PNG per page.
//!
//! The crate is an HTTP service (see [`routes`]) wrapped around a small
//! library core that owns the interesting part: giving every upload an
//! isolated workspace, naming pages deterministically, building the archive,
//! and making sure every temporary file is removed afterwards, whether the
//! request succeeded, failed, or the client hung up mid-download.
//!
//! ## Request Lifecycle
//!
//! ```text
//! POST /upload
//!  │
//!  ├─ 1. Receive    new session workspace <root>/<uuid>/, upload streamed to disk
//!  ├─ 2. Rasterise  every page via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Pages      page_1.png … page_N.png written into the workspace
//!  ├─ 4. Archive    <root>/<uuid>-<name>.zip, entries in page order
//!  ├─ 5. Respond    archive streamed back as application/zip
//!  └─ 6. Clean up   workspace + archive removed once the body is dropped
//! ```
//!
//! Any failure in steps 1–4 removes the workspace before the error response
//! is written.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{routes, Converter, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().temp_root("/tmp/pdf2img").build()?;
//!     let app = routes::router(Arc::new(Converter::with_pdfium(config)));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2img` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod routes;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cleanup::{CleanupGuard, CleanupReport};
pub use config::{ErrorStatusMode, ServerConfig, ServerConfigBuilder, DEFAULT_MAX_UPLOAD_BYTES};
pub use convert::{Converter, Phase, RequestContext, Stage};
pub use error::{ErrorKind, Pdf2ImgError};
pub use output::{ArchiveStream, ConversionStats, ConvertedArchive};
pub use pipeline::rasterize::{PdfiumRasterizer, Rasterizer};
pub use session::Session;
