//! Image upload and delete handlers

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::TryStreamExt;
use imgup_upload::{DeleteTarget, StoredImage, KEY_FOLDER};
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AppState, JsonBody};

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Upload an image
///
/// POST /upload
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from)?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field.file_name().map(str::to_owned);
        // The multipart error stays attached so a body limit hit surfaces as 413
        let body = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(body));

        let stored = state.images.upload(reader, filename.as_deref()).await?;
        return Ok((StatusCode::CREATED, Json(UploadResponse::from(stored))));
    }

    Err(ApiError::bad_request(format!(
        "missing multipart field `{}`",
        FILE_FIELD
    )))
}

/// Delete an image named by its public URL or key
///
/// DELETE /delete
pub async fn delete_image(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<DeleteRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    let target = request.into_target()?;
    let description = target.to_string();

    state.images.delete(target).await?;

    Ok(Json(DeleteResponse::deleted(&description)))
}

/// Delete an image by object name
///
/// DELETE /images/:name
pub async fn delete_image_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let key = state
        .images
        .delete(DeleteTarget::ByKey(format!("{}{}", KEY_FOLDER, name)))
        .await?;

    Ok(Json(DeleteResponse::deleted(&key)))
}

// Request types
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl DeleteRequest {
    fn into_target(self) -> ApiResult<DeleteTarget> {
        match (self.url, self.key) {
            (Some(url), None) => Ok(DeleteTarget::ByUrl(url)),
            (None, Some(key)) => Ok(DeleteTarget::ByKey(key)),
            _ => Err(ApiError::bad_request(
                "exactly one of `url` or `key` is required",
            )),
        }
    }
}

// Response types
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

impl From<StoredImage> for UploadResponse {
    fn from(stored: StoredImage) -> Self {
        Self {
            url: stored.url,
            key: stored.key,
            content_type: stored.content_type,
            size: stored.size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

impl DeleteResponse {
    fn deleted(target: &str) -> Self {
        Self {
            message: format!("{} deleted successfully", target),
        }
    }
}
