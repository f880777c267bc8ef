//! Request metrics
//!
//! Counters are bumped by [`metrics_middleware`] and exported in Prometheus
//! text and JSON form.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info_span, Instrument};

/// Metrics collector
pub struct Metrics {
    pub http_requests_total: AtomicU64,
    /// Requests by status class
    pub http_requests_2xx: AtomicU64,
    pub http_requests_4xx: AtomicU64,
    pub http_requests_5xx: AtomicU64,
    pub http_request_duration_ms_total: AtomicU64,
    pub requests_in_flight: AtomicU64,
    /// Successful image operations
    pub images_uploaded: AtomicU64,
    pub images_deleted: AtomicU64,
    /// Uploads rejected with a 4xx
    pub uploads_rejected: AtomicU64,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Which image operation a request maps to, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageOp {
    Upload,
    Delete,
}

impl ImageOp {
    fn classify(method: &Method, path: &str) -> Option<Self> {
        match (method, path) {
            (&Method::POST, "/upload") => Some(Self::Upload),
            (&Method::DELETE, "/delete") => Some(Self::Delete),
            (&Method::DELETE, p) if p.starts_with("/images/") => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            http_requests_total: AtomicU64::new(0),
            http_requests_2xx: AtomicU64::new(0),
            http_requests_4xx: AtomicU64::new(0),
            http_requests_5xx: AtomicU64::new(0),
            http_request_duration_ms_total: AtomicU64::new(0),
            requests_in_flight: AtomicU64::new(0),
            images_uploaded: AtomicU64::new(0),
            images_deleted: AtomicU64::new(0),
            uploads_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an HTTP request
    pub fn record_request(&self, status: StatusCode, duration_ms: u64) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
        self.http_request_duration_ms_total
            .fetch_add(duration_ms, Ordering::Relaxed);

        if status.is_success() {
            self.http_requests_2xx.fetch_add(1, Ordering::Relaxed);
        } else if status.is_client_error() {
            self.http_requests_4xx.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            self.http_requests_5xx.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_image_op(&self, op: ImageOp, status: StatusCode) {
        match (op, status.is_success()) {
            (ImageOp::Upload, true) => {
                self.images_uploaded.fetch_add(1, Ordering::Relaxed);
            }
            (ImageOp::Upload, false) if status.is_client_error() => {
                self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
            }
            (ImageOp::Delete, true) => {
                self.images_deleted.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        counter(
            &mut out,
            "http_requests_total",
            "Total number of HTTP requests",
            self.http_requests_total.load(Ordering::Relaxed),
        );

        out.push_str("# HELP http_requests_by_status HTTP requests by status code range\n");
        out.push_str("# TYPE http_requests_by_status counter\n");
        for (class, value) in [
            ("2xx", &self.http_requests_2xx),
            ("4xx", &self.http_requests_4xx),
            ("5xx", &self.http_requests_5xx),
        ] {
            let _ = writeln!(
                out,
                "http_requests_by_status{{status=\"{}\"}} {}",
                class,
                value.load(Ordering::Relaxed)
            );
        }

        counter(
            &mut out,
            "http_request_duration_ms_total",
            "Total HTTP request duration in milliseconds",
            self.http_request_duration_ms_total.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "http_requests_in_flight",
            "Requests currently being served",
            self.requests_in_flight.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "images_uploaded_total",
            "Images stored successfully",
            self.images_uploaded.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "images_deleted_total",
            "Images deleted successfully",
            self.images_deleted.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "uploads_rejected_total",
            "Uploads refused because of the request or its content",
            self.uploads_rejected.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "uptime_seconds",
            "Server uptime in seconds",
            self.uptime_seconds(),
        );

        out
    }

    /// Export metrics as JSON
    pub fn export_json(&self) -> serde_json::Value {
        serde_json::json!({
            "http": {
                "requests_total": self.http_requests_total.load(Ordering::Relaxed),
                "requests_2xx": self.http_requests_2xx.load(Ordering::Relaxed),
                "requests_4xx": self.http_requests_4xx.load(Ordering::Relaxed),
                "requests_5xx": self.http_requests_5xx.load(Ordering::Relaxed),
                "request_duration_ms_total": self.http_request_duration_ms_total.load(Ordering::Relaxed),
                "in_flight": self.requests_in_flight.load(Ordering::Relaxed),
            },
            "images": {
                "uploaded": self.images_uploaded.load(Ordering::Relaxed),
                "deleted": self.images_deleted.load(Ordering::Relaxed),
                "rejected": self.uploads_rejected.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}\n# TYPE {} counter\n{} {}", name, help, name, name, value);
}

fn gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}\n# TYPE {} gauge\n{} {}", name, help, name, name, value);
}

/// Metrics middleware
pub async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let op = ImageOp::classify(&method, &uri);

    metrics.requests_in_flight.fetch_add(1, Ordering::Relaxed);

    let response = next
        .run(request)
        .instrument(info_span!("http_request", %method, %uri))
        .await;

    let duration = start.elapsed();
    let status = response.status();

    debug!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    metrics.record_request(status, duration.as_millis() as u64);
    if let Some(op) = op {
        metrics.record_image_op(op, status);
    }
    metrics.requests_in_flight.fetch_sub(1, Ordering::Relaxed);

    response
}

/// GET /metrics
pub async fn prometheus_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.export_prometheus()
}

/// GET /metrics.json
pub async fn json_metrics(State(metrics): State<Arc<Metrics>>) -> axum::Json<serde_json::Value> {
    axum::Json(metrics.export_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();

        metrics.record_request(StatusCode::CREATED, 50);
        metrics.record_request(StatusCode::UNSUPPORTED_MEDIA_TYPE, 10);
        metrics.record_request(StatusCode::BAD_GATEWAY, 100);

        assert_eq!(metrics.http_requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.http_requests_2xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.http_requests_4xx.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.http_requests_5xx.load(Ordering::Relaxed), 1);
        assert_eq!(
            metrics.http_request_duration_ms_total.load(Ordering::Relaxed),
            160
        );
    }

    #[test]
    fn test_classify_image_ops() {
        assert_eq!(
            ImageOp::classify(&Method::POST, "/upload"),
            Some(ImageOp::Upload)
        );
        assert_eq!(
            ImageOp::classify(&Method::DELETE, "/delete"),
            Some(ImageOp::Delete)
        );
        assert_eq!(
            ImageOp::classify(&Method::DELETE, "/images/abc.png"),
            Some(ImageOp::Delete)
        );
        assert_eq!(ImageOp::classify(&Method::GET, "/upload"), None);
        assert_eq!(ImageOp::classify(&Method::GET, "/health"), None);
    }

    #[test]
    fn test_image_op_counters() {
        let metrics = Metrics::new();

        metrics.record_image_op(ImageOp::Upload, StatusCode::CREATED);
        metrics.record_image_op(ImageOp::Upload, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        metrics.record_image_op(ImageOp::Upload, StatusCode::BAD_GATEWAY);
        metrics.record_image_op(ImageOp::Delete, StatusCode::OK);
        metrics.record_image_op(ImageOp::Delete, StatusCode::BAD_REQUEST);

        assert_eq!(metrics.images_uploaded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.uploads_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.images_deleted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record_request(StatusCode::OK, 50);
        metrics.record_image_op(ImageOp::Upload, StatusCode::CREATED);

        let output = metrics.export_prometheus();
        assert!(output.contains("http_requests_total 1\n"));
        assert!(output.contains("http_requests_by_status{status=\"2xx\"} 1\n"));
        assert!(output.contains("# TYPE images_uploaded_total counter\n"));
        assert!(output.contains("images_uploaded_total 1\n"));
        assert!(output.contains("uptime_seconds"));
    }

    #[test]
    fn test_json_export() {
        let metrics = Metrics::new();
        metrics.record_request(StatusCode::OK, 50);
        metrics.record_image_op(ImageOp::Delete, StatusCode::OK);

        let json = metrics.export_json();
        assert_eq!(json["http"]["requests_total"], 1);
        assert_eq!(json["images"]["deleted"], 1);
        assert_eq!(json["images"]["uploaded"], 0);
    }
}
