//! Error types for the edgequake-pdf2img library.
//!
//! Every failure that can end a conversion request is a variant of
//! [`Pdf2ImgError`]. Variants fall into three kinds, exposed through
//! [`Pdf2ImgError::kind`]:
//!
//! * [`ErrorKind::Upload`] — bad, missing or truncated input from the client.
//! * [`ErrorKind::Conversion`] — the rasterization engine rejected the document.
//! * [`ErrorKind::Io`] — a filesystem (or other server-side) failure.
//!
//! All three are handled the same way by the orchestrator: the session
//! workspace is torn down synchronously and no archive is produced. The HTTP
//! layer uses the kind to pick a status code.
//!
//! Cleanup failures after the response has been sent are not represented
//! here; they are logged and swallowed by [`crate::cleanup`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The three failure classes a request can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad, missing or truncated input.
    Upload,
    /// The rasterization engine rejected the document.
    Conversion,
    /// Filesystem or other server-side failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Upload => "upload",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Io => "io",
        })
    }
}

/// All fatal errors returned by the edgequake-pdf2img library.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The multipart body had no `file` field.
    #[error("No file provided. Use the form field 'file'.")]
    MissingFile,

    /// The multipart body could not be parsed.
    #[error("Malformed multipart upload: {detail}")]
    MalformedUpload { detail: String },

    /// The uploaded file had no usable name.
    #[error("Invalid upload filename {filename:?}")]
    InvalidFilename { filename: String },

    /// The uploaded file was zero bytes long.
    #[error("Uploaded file '{filename}' is empty")]
    EmptyUpload { filename: String },

    /// The upload exceeded the configured size limit.
    #[error("Uploaded file '{filename}' exceeds the {limit} byte limit")]
    UploadTooLarge { filename: String, limit: u64 },

    /// The upload stream broke off before it was complete.
    #[error("Upload of '{filename}' was interrupted: {detail}")]
    UploadInterrupted { filename: String, detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The file was saved, but it is not a PDF.
    #[error("Failed to convert PDF: '{path}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Failed to convert PDF: '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF is encrypted and cannot be opened without a password.
    #[error("Failed to convert PDF: '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// The PDF opened fine but has no pages to render.
    #[error("Failed to convert PDF: '{path}' has no pages")]
    NoPages { path: PathBuf },

    /// pdfium returned an error for a specific page.
    #[error("Failed to convert PDF: rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the per-session workspace directory.
    #[error("Failed to create workspace '{path}': {source}")]
    WorkspaceCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write the uploaded bytes to disk.
    #[error("Failed to save upload to '{path}': {source}")]
    UploadWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not encode or write a page image.
    #[error("Failed to write page {page} to '{path}': {detail}")]
    PageWriteFailed {
        page: usize,
        path: PathBuf,
        detail: String,
    },

    /// Could not create the archive or read one of its images.
    #[error("Failed to build archive '{path}': {detail}")]
    ArchiveFailed { path: PathBuf, detail: String },

    /// Could not open the finished archive for streaming.
    #[error("Failed to read archive '{path}': {source}")]
    ArchiveReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium on the library search path, or pass --pdfium-lib /path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ImgError {
    /// Which of the three failure classes this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Pdf2ImgError::MissingFile
            | Pdf2ImgError::MalformedUpload { .. }
            | Pdf2ImgError::InvalidFilename { .. }
            | Pdf2ImgError::EmptyUpload { .. }
            | Pdf2ImgError::UploadTooLarge { .. }
            | Pdf2ImgError::UploadInterrupted { .. } => ErrorKind::Upload,

            Pdf2ImgError::NotAPdf { .. }
            | Pdf2ImgError::CorruptPdf { .. }
            | Pdf2ImgError::PasswordRequired { .. }
            | Pdf2ImgError::NoPages { .. }
            | Pdf2ImgError::RasterisationFailed { .. } => ErrorKind::Conversion,

            Pdf2ImgError::WorkspaceCreateFailed { .. }
            | Pdf2ImgError::UploadWriteFailed { .. }
            | Pdf2ImgError::PageWriteFailed { .. }
            | Pdf2ImgError::ArchiveFailed { .. }
            | Pdf2ImgError::ArchiveReadFailed { .. }
            | Pdf2ImgError::PdfiumBindingFailed(_)
            | Pdf2ImgError::InvalidConfig(_)
            | Pdf2ImgError::Internal(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_are_upload_kind() {
        assert_eq!(Pdf2ImgError::MissingFile.kind(), ErrorKind::Upload);
        let e = Pdf2ImgError::EmptyUpload {
            filename: "a.pdf".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Upload);
        assert!(e.to_string().contains("a.pdf"));
    }

    #[test]
    fn conversion_messages_keep_original_prefix() {
        let e = Pdf2ImgError::NoPages {
            path: PathBuf::from("/tmp/x/empty.pdf"),
        };
        assert_eq!(e.kind(), ErrorKind::Conversion);
        assert!(e.to_string().starts_with("Failed to convert PDF"), "got: {e}");
    }

    #[test]
    fn not_a_pdf_shows_magic() {
        let e = Pdf2ImgError::NotAPdf {
            path: PathBuf::from("notes.txt"),
            magic: b"hell".to_vec(),
        };
        assert!(e.to_string().contains("[104, 101, 108, 108]"), "got: {e}");
    }

    #[test]
    fn io_errors_are_io_kind() {
        let e = Pdf2ImgError::WorkspaceCreateFailed {
            path: PathBuf::from("/nope"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(e.kind(), ErrorKind::Io);
        assert_eq!(
            Pdf2ImgError::PdfiumBindingFailed("missing".into()).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(ErrorKind::Conversion.to_string(), "conversion");
    }
}
