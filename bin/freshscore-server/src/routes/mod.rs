//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-id injection)
//! - Optional Swagger UI / OpenAPI spec endpoint
//!   (disable with `FRESHSCORE_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - Detection and upload routes under `/api`

pub mod detect;
pub mod doc;
pub mod health;
pub mod upload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    // Body limit: the configured upload cap plus room for multipart framing.
    let body_limit = state.config.storage.max_upload_size_mb * 1024 * 1024 + 64 * 1024;

    let api_router = Router::new()
        .merge(health::router())
        .nest(
            "/api",
            detect::router()
                .merge(upload::router())
                .layer(DefaultBodyLimit::max(body_limit)),
        );

    let mut app = Router::new().merge(api_router);

    // Enabled by default; disable in production to avoid exposing the API
    // structure.
    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
