//! Configuration types for the PDF-to-images service.
//!
//! All behaviour is controlled through [`ServerConfig`], built via its
//! [`ServerConfigBuilder`]. The temporary-files root lives here too: it is
//! handed to the orchestrator at construction rather than read from a
//! process-wide global, so every test can point it at its own `TempDir`.

use crate::error::Pdf2ImgError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default upload limit: 200 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .temp_root("/var/tmp/pdf2img")
///     .dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root directory under which every session workspace and archive is
    /// created. Default: `<system temp>/pdf2img`.
    pub temp_root: PathBuf,

    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Keeps a 200-DPI render of a poster-sized page from allocating
    /// hundreds of megabytes.
    pub max_rendered_pixels: u32,

    /// Largest accepted upload, in bytes. Default: 200 MiB.
    pub max_upload_bytes: u64,

    /// How failures are reported over HTTP. Default: [`ErrorStatusMode::Distinct`].
    pub error_status: ErrorStatusMode,

    /// Explicit pdfium shared library. If `None`, the system library is used.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("pdf2img"),
            dpi: 200,
            max_rendered_pixels: 4000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            error_status: ErrorStatusMode::default(),
            pdfium_library_path: None,
        }
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Root directory for sessions and archives.
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = root.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn error_status(mut self, mode: ErrorStatusMode) -> Self {
        self.config.error_status = mode;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, Pdf2ImgError> {
        let c = &self.config;
        if c.temp_root.as_os_str().is_empty() {
            return Err(Pdf2ImgError::InvalidConfig(
                "Temporary root must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Pdf2ImgError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a failed conversion is signalled to HTTP callers.
///
/// The body is `{"error": "<message>"}` in both modes; only the status differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatusMode {
    /// 400 for upload errors, 422 for conversion errors, 500 for I/O errors. (default)
    #[default]
    Distinct,
    /// Always 200, for clients written against the original backend.
    Legacy,
}
