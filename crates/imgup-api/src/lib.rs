//! # imgup-api
//!
//! HTTP surface of the upload service: a multipart upload endpoint and two
//! delete endpoints (by public URL or key in a JSON body, or by object name
//! in the path).

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;

pub use extractors::AppState;
pub use routes::router;
