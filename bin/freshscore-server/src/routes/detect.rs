//! Detection endpoints: submit a task, poll its state.
//!
//! `POST /api/image/detect` answers with a task id immediately; the model
//! call happens on the worker pool, decoupled from the request.  Poll
//! `GET /api/task/{task_id}` for the result.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::debug;
use utoipa::OpenApi;

use crate::db::TaskStore;
use crate::error::ServerError;
use crate::models::detection::{
    DetectImageRequest, DetectionTaskResponse, DetectionType, TaskResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(detect_image, get_task),
    components(schemas(DetectImageRequest, DetectionTaskResponse, DetectionType, TaskResponse))
)]
pub struct DetectApi;

/// Register detection routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/image/detect", post(detect_image))
        .route("/task/{task_id}", get(get_task))
}

/// Submit an image for detection (`POST /api/image/detect`).
///
/// Returns `{"task_id": "..."}` as soon as the work is scheduled; the HTTP
/// response is decoupled from detection latency.
#[utoipa::path(
    post,
    path = "/api/image/detect",
    tag = "detection",
    request_body = DetectImageRequest,
    responses(
        (status = 200, description = "Task accepted", body = DetectionTaskResponse),
        (status = 400, description = "Malformed request body"),
        (status = 503, description = "Worker pool saturated"),
    )
)]
pub async fn detect_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectImageRequest>,
) -> Result<Json<DetectionTaskResponse>, ServerError> {
    if request.image_url.trim().is_empty() {
        return Err(ServerError::BadRequest("image_url must not be empty".into()));
    }

    let task_id = state.detection.submit(request).await?;
    Ok(Json(DetectionTaskResponse { task_id }))
}

/// Poll a detection task (`GET /api/task/{task_id}`).
///
/// Returns the current row snapshot, including the intermediate `running`
/// state when polled mid-flight.
#[utoipa::path(
    get,
    path = "/api/task/{task_id}",
    tag = "detection",
    params(
        ("task_id" = String, Path, description = "ID of the task to retrieve")
    ),
    responses(
        (status = 200, description = "Task retrieved", body = TaskResponse),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResponse>, ServerError> {
    let record = state
        .store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("task {task_id} not found")))?;
    debug!(task_id = %record.task_id, row_id = record.id, status = %record.status, "task snapshot read");
    Ok(Json(record.to_response()))
}
