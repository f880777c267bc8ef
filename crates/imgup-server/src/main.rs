//! imgup server
//!
//! HTTP front end for the image upload service.

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use imgup_api::AppState;
use imgup_core::{AppConfig, StorageBackend};
use imgup_upload::{ImageService, KeyCodec, MemoryStorage, ObjectStore, S3Storage, ServiceConfig};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod health;
mod metrics;

use health::HealthChecker;
use metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        backend = ?config.storage.backend,
        "Starting imgup"
    );

    let images = Arc::new(build_image_service(&config));
    let app = build_router(&config, images, Arc::new(Metrics::new()));

    let addr = config.server_addr();
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,imgup_server=debug,imgup_api=debug,imgup_upload=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Wire the configured object store into an image service.
///
/// The codec and the store share one URL prefix so that every URL handed
/// out on upload parses back to its key on delete.
fn build_image_service(config: &AppConfig) -> ImageService {
    let settings = &config.storage.s3;
    let prefix = settings.public_url_prefix();

    let storage: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::S3 => {
            info!(bucket = %settings.bucket, region = %settings.region, "Using S3 storage");
            Arc::new(S3Storage::new(settings))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; uploaded images are lost on restart");
            Arc::new(MemoryStorage::new(prefix.clone()))
        }
    };

    ImageService::new(
        storage,
        KeyCodec::new(prefix),
        ServiceConfig::from(&config.upload),
    )
}

fn build_router(config: &AppConfig, images: Arc<ImageService>, metrics: Arc<Metrics>) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(Arc::new(HealthChecker::new(images.clone())));

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/metrics.json", get(metrics::json_metrics))
        .with_state(metrics.clone());

    let api_routes =
        imgup_api::router(config.upload.max_upload_bytes).with_state(AppState::new(images));

    Router::new()
        .merge(health_routes)
        .merge(metrics_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_seconds,
                )))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .layer(middleware::from_fn_with_state(
            metrics,
            metrics::metrics_middleware,
        ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
