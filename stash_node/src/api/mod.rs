//! HTTP surface of the node.

mod files;
mod health;
mod login;

pub use files::*;
pub use health::*;
pub use login::*;

use crate::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the node's router.
///
/// `max_upload_bytes` caps request bodies, which bounds multipart uploads.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        // Files
        .route("/files/list", get(list_root))
        .route("/files/list/*path", get(list))
        .route("/files/mkdir/*path", post(mkdir))
        .route("/files/upload", post(upload_root))
        .route("/files/upload/*path", post(upload))
        .route("/files/download/*path", get(download))
        .route("/files/delete/*path", delete(delete_path))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
