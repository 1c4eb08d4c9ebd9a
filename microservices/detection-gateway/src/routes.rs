//! Router configuration for the Detection Gateway API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::AppState;

/// Largest accepted image body
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/stats", get(handlers::stats))
        // Camera uploads
        .route("/upload", post(handlers::upload))
        .route("/summary", get(handlers::summary))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
