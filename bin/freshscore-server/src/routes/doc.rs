use utoipa::OpenApi;

use crate::routes::{detect, health, upload};

#[derive(OpenApi)]
#[openapi(info(
    title = "freshscore-server",
    description = "freshscore API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(detect::DetectApi::openapi());
    root.merge(upload::UploadApi::openapi());
    root
}
