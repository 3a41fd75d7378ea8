use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body for `POST /api/image/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Time-limited, presigned download link for the stored image.
    pub url: String,
}
