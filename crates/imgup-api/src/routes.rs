//! API routes

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, post},
    Router,
};

use crate::extractors::AppState;
use crate::handlers::images;

/// Room left in the request body limit for multipart framing
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the API router.
///
/// Request bodies are capped slightly above `max_upload_bytes` so that an
/// oversized upload is cut off at the transport instead of being buffered.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(images::upload_image))
        .route("/delete", delete(images::delete_image))
        .route("/images/:name", delete(images::delete_image_by_name))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
}
