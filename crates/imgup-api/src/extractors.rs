//! Shared handler state and request extractors

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use imgup_upload::ImageService;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub images: Arc<ImageService>,
}

impl AppState {
    pub fn new(images: Arc<ImageService>) -> Self {
        Self { images }
    }
}

/// JSON body extractor whose rejections use the API error format
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(rejection.body_text())
}
