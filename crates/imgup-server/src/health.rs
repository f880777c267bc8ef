//! Health checks

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use imgup_upload::ImageService;
use serde::{Deserialize, Serialize};

/// Health check status.
///
/// Both states answer readiness probes with 200; `Degraded` flags a
/// configuration that works but should not run in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Individual component health
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Overall health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Reports on the image service and the store behind it.
///
/// The store is never contacted here; a bucket that went away shows up as
/// 502s on the API, not as a failed readiness probe.
pub struct HealthChecker {
    images: Arc<ImageService>,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(images: Arc<ImageService>) -> Self {
        Self {
            images,
            start_time: Instant::now(),
        }
    }

    pub fn check(&self) -> HealthReport {
        let components = vec![self.check_storage(), self.check_upload_limits()];

        let status = if components
            .iter()
            .any(|c| c.status == HealthStatus::Degraded)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
            timestamp: chrono::Utc::now(),
        }
    }

    fn check_storage(&self) -> ComponentHealth {
        let backend = self.images.storage_name();
        let prefix = self.images.codec().prefix();

        // An in-process store loses everything on restart
        let (status, message) = match backend {
            "memory" => (HealthStatus::Degraded, "Using in-memory storage"),
            _ => (HealthStatus::Healthy, "Object store configured"),
        };

        ComponentHealth {
            name: "storage".to_string(),
            status,
            message: Some(message.to_string()),
            details: Some(serde_json::json!({
                "backend": backend,
                "url_prefix": prefix,
            })),
        }
    }

    fn check_upload_limits(&self) -> ComponentHealth {
        ComponentHealth {
            name: "upload".to_string(),
            status: HealthStatus::Healthy,
            message: None,
            details: Some(serde_json::json!({
                "max_upload_bytes": self.images.max_upload_bytes(),
            })),
        }
    }
}

/// GET /health/live
pub async fn liveness() -> &'static str {
    "OK"
}

/// GET /health/ready
pub async fn readiness(State(checker): State<Arc<HealthChecker>>) -> Json<HealthReport> {
    Json(checker.check())
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
