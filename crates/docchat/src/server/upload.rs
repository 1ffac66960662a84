//! Document upload endpoint

use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::context::ExtractedContext;
use crate::error::ApiError;
use crate::session::CorrelationToken;

/// Multipart field carrying the document
const FILE_FIELD: &str = "file";

/// Acknowledgement returned after a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub filename: String,
    /// Number of characters of extracted text
    pub characters: usize,
    pub message: String,
}

/// Handle `POST /upload`
///
/// Extracts the document's text and stores it under the caller's
/// correlation token, replacing any earlier upload for that token.
pub(super) async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<CorrelationToken>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("document").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let text = state
            .extractor
            .extract(&filename, bytes)
            .await
            .map_err(|e| {
                tracing::warn!(
                    token = %token,
                    filename = %filename,
                    error_type = "extraction",
                    "Upload rejected: {e}"
                );
                ApiError::from(e)
            })?;

        let characters = text.chars().count();
        state
            .store
            .put(token, ExtractedContext::new(text, filename.clone()));

        tracing::info!(
            token = %token,
            filename = %filename,
            characters,
            "Stored uploaded document"
        );

        return Ok(Json(UploadResponse {
            status: "ok".to_string(),
            message: format!("File uploaded and parsed successfully: {filename}"),
            filename,
            characters,
        }));
    }

    Err(ApiError::BadRequest {
        error_type: "missing_file",
        message: format!("Multipart field '{FILE_FIELD}' is required"),
    })
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest {
            error_type: "invalid_multipart",
            message: e.body_text(),
        }
    }
}
