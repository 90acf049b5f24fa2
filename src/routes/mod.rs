//! HTTP surface.
//!
//! Endpoints:
//! - GET  /       - liveness message
//! - POST /upload - multipart PDF in, ZIP of page images out

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ErrorStatusMode;
use crate::convert::Converter;
use crate::error::{ErrorKind, Pdf2ImgError};

pub mod health;
pub mod upload;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
}

/// Build the application router around a shared [`Converter`].
pub fn router(converter: Arc<Converter>) -> Router {
    let body_limit = converter
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    // Any origin may call the service; no credentials are involved.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health::read_root))
        .route("/upload", post(upload::upload_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { converter })
}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Status code for a failed request under `mode`.
pub fn error_status(err: &Pdf2ImgError, mode: ErrorStatusMode) -> StatusCode {
    match mode {
        ErrorStatusMode::Legacy => StatusCode::OK,
        ErrorStatusMode::Distinct => match err.kind() {
            ErrorKind::Upload => StatusCode::BAD_REQUEST,
            ErrorKind::Conversion => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// Render a failed request as `{"error": "<message>"}`.
///
/// Server-side failures are logged in full but reported to the client
/// without filesystem details.
pub fn error_response(err: &Pdf2ImgError, mode: ErrorStatusMode) -> Response {
    let message = match err.kind() {
        ErrorKind::Io => {
            tracing::error!("Upload failed: {}", err);
            "An internal error occurred while processing the PDF".to_string()
        }
        _ => err.to_string(),
    };

    let body = Json(ErrorResponse { error: message });
    (error_status(err, mode), body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn distinct_status_per_kind() {
        let mode = ErrorStatusMode::Distinct;
        assert_eq!(error_status(&Pdf2ImgError::MissingFile, mode), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(
                &Pdf2ImgError::NoPages {
                    path: PathBuf::from("a.pdf")
                },
                mode
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&Pdf2ImgError::Internal("boom".into()), mode),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn legacy_is_always_ok() {
        let mode = ErrorStatusMode::Legacy;
        assert_eq!(error_status(&Pdf2ImgError::MissingFile, mode), StatusCode::OK);
        assert_eq!(
            error_status(&Pdf2ImgError::Internal("boom".into()), mode),
            StatusCode::OK
        );
    }
}
