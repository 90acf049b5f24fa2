//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

/// GET /
pub async fn read_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "PDF to Image Converter Backend",
    })
}
