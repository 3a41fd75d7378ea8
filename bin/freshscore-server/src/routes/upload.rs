//! Image upload endpoint.
//!
//! Accepts a `multipart/form-data` body with an `image` field, stores the
//! file under a randomized object name, and returns a presigned,
//! time-limited download link.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::models::upload::UploadResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(upload_image), components(schemas(UploadResponse)))]
pub struct UploadApi;

/// Register upload routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/image/upload", post(upload_image))
}

/// Store an image and mint a download link (`POST /api/image/upload`).
///
/// Only fields named `image` are consumed; the declared content type, when
/// present, must be `image/*`, and the body may not exceed the configured
/// size cap.
#[utoipa::path(
    post,
    path = "/api/image/upload",
    tag = "upload",
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Missing or invalid image field"),
        (status = 500, description = "Storage backend error"),
    )
)]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let max_bytes = state.config.storage.max_upload_size_mb * 1024 * 1024;

    let mut file_name: Option<String> = None;
    let mut data: Vec<u8> = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("invalid multipart payload: {e}")))?
    {
        if field.name() != Some("image") {
            continue;
        }

        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") {
                return Err(ServerError::BadRequest(format!(
                    "invalid file type: {content_type}; only images are accepted"
                )));
            }
        }

        file_name = Some(field.file_name().unwrap_or("upload").to_owned());

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ServerError::BadRequest(format!("failed to read upload: {e}")))?
        {
            data.extend_from_slice(&chunk);
            if data.len() > max_bytes {
                return Err(ServerError::BadRequest(format!(
                    "file exceeds the maximum of {}MB",
                    state.config.storage.max_upload_size_mb
                )));
            }
        }

        // First `image` field wins; remaining fields are not consumed.
        break;
    }

    let Some(file_name) = file_name else {
        return Err(ServerError::BadRequest(
            "missing multipart field: image".into(),
        ));
    };
    if data.is_empty() {
        return Err(ServerError::BadRequest("uploaded file is empty".into()));
    }

    debug!(file_name = %file_name, size_bytes = data.len(), "received image upload");
    let url = state.storage.upload(&file_name, data).await?;
    Ok(Json(UploadResponse { url }))
}
