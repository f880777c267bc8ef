//! API error handling
//!
//! Maps service errors to HTTP statuses with a small JSON body.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use imgup_upload::{StorageError, TypePolicy, UploadError};
use serde::Serialize;
use tracing::error;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnsupportedMediaType(String),
    PayloadTooLarge(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::UnsupportedMediaType(_) => "unsupported_type",
            ApiError::PayloadTooLarge(_) => "too_large",
            ApiError::BadGateway(_) => "storage_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        let msg = err.to_string();
        match err {
            UploadError::UnsupportedType(_) => {
                let accepted: Vec<_> = TypePolicy.allowed_types().collect();
                ApiError::UnsupportedMediaType(format!(
                    "{} (accepted: {})",
                    msg,
                    accepted.join(", ")
                ))
            }
            UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(msg),
            UploadError::Read(ref io) if is_too_large(io) => ApiError::PayloadTooLarge(msg),
            UploadError::Read(_) | UploadError::InvalidUrl(_) | UploadError::InvalidKey(_) => {
                ApiError::BadRequest(msg)
            }
            UploadError::Backend(StorageError::NotFound(_)) => ApiError::BadRequest(msg),
            UploadError::Backend(_) => {
                error!(error = %msg, "Object store call failed");
                ApiError::BadGateway(msg)
            }
            UploadError::RandomSource(_) => {
                error!(error = %msg, "Random source failure");
                ApiError::Internal(msg)
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

/// Whether a read failure came from the request body limit
fn is_too_large(err: &std::io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .is_some_and(|e| e.status() == StatusCode::PAYLOAD_TOO_LARGE)
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.message(),
            code: self.error_code(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_mapping() {
        let cases = [
            (
                UploadError::UnsupportedType("text/plain".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (UploadError::TooLarge { max: 10 }, StatusCode::PAYLOAD_TOO_LARGE),
            (UploadError::InvalidUrl("x".into()), StatusCode::BAD_REQUEST),
            (UploadError::InvalidKey("x".into()), StatusCode::BAD_REQUEST),
            (
                UploadError::Backend(StorageError::BackendError("down".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                UploadError::RandomSource("no entropy".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_unsupported_type_lists_accepted_types() {
        let err = ApiError::from(UploadError::UnsupportedType("text/plain".into()));
        let msg = err.message().to_string();

        assert!(msg.contains("text/plain"));
        assert!(msg.contains("image/png"));
        assert!(msg.contains("image/webp"));
    }

    #[test]
    fn test_plain_read_error_is_bad_request() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection reset");
        assert!(!is_too_large(&io));
        assert_eq!(
            ApiError::from(UploadError::Read(io)).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_validation_errors_are_client_errors() {
        for err in [
            UploadError::UnsupportedType("a".into()),
            UploadError::InvalidUrl("b".into()),
            UploadError::TooLarge { max: 1 },
        ] {
            assert!(err.is_client_error());
            assert!(ApiError::from(err).status_code().is_client_error());
        }
    }
}
