//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::services::detection::DetectionService;
use crate::services::storage::StorageService;

/// State shared across all HTTP handlers.
///
/// The worker pool is not carried here: handlers reach it only through the
/// [`DetectionService`], which owns the submission path.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Persistent task store.
    pub store: Arc<SqliteStore>,
    /// Detection orchestrator.
    pub detection: Arc<DetectionService>,
    /// Upload orchestrator with the credential cache.
    pub storage: Arc<StorageService>,
}
