//! POST /upload: one PDF in, one ZIP of page images out.

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use super::{error_response, AppState};
use crate::convert::Phase;
use crate::error::Pdf2ImgError;
use crate::output::ConvertedArchive;

/// Multipart form field carrying the PDF.
const FILE_FIELD: &str = "file";

/// Accept a multipart upload and answer with the page archive.
///
/// The first part named `file` is converted; other parts are skipped. The
/// archive is streamed straight from disk, and the session's files are
/// removed once the response body has been dropped.
pub async fn upload_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mode = state.converter.config().error_status;
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            let err = Pdf2ImgError::MalformedUpload {
                detail: e.body_text(),
            };
            return error_response(&err, mode);
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let err = Pdf2ImgError::MalformedUpload {
                    detail: e.body_text(),
                };
                return error_response(&err, mode);
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_owned);
        let converted = match state
            .converter
            .convert_upload(filename.as_deref(), Box::pin(field))
            .await
        {
            Ok(converted) => converted,
            Err(e) => return error_response(&e, mode),
        };

        return match archive_response(converted).await {
            Ok(response) => response,
            Err(e) => error_response(&e, mode),
        };
    }

    error_response(&Pdf2ImgError::MissingFile, mode)
}

/// Wrap a finished archive in a streaming `application/zip` response.
async fn archive_response(converted: ConvertedArchive) -> Result<Response, Pdf2ImgError> {
    let session_id = converted.session_id();
    let stats = converted.stats().clone();
    let disposition = content_disposition(converted.download_name());

    // Dropping `converted` on error runs its cleanup.
    let stream = converted.into_stream().await?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, stats.archive_bytes)
        .header("x-page-count", stats.page_count)
        .body(Body::from_stream(stream))
        .map_err(|e| Pdf2ImgError::Internal(format!("Failed to build response: {}", e)))?;

    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
        Err(e) => error!("Dropping Content-Disposition {:?}: {}", disposition, e),
    }

    info!(
        session_id = %session_id,
        phase = %Phase::Responded,
        pages = stats.page_count,
        bytes = stats.archive_bytes,
        "Streaming archive"
    );
    Ok(response.into_response())
}

/// `attachment; filename="..."`, with an RFC 5987 `filename*` for non-ASCII names.
pub(crate) fn content_disposition(download_name: &str) -> String {
    let ascii: String = download_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if ascii == download_name {
        format!("attachment; filename=\"{}\"", ascii)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii,
            urlencoding::encode(download_name)
        )
    }
}
