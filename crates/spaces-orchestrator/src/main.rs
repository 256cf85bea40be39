//! Spaces Orchestrator - intent orchestration service for home spaces.
//!
//! The binary wires the store, the device bridge and the orchestration
//! service together and exposes health and readiness checks.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use spaces_orchestrator::{
    DevicePlatform, HttpDeviceBridge, InMemoryDirectory, NoopDevicePlatform, OrchestratorConfig,
    OrchestratorService, SpaceDirectory,
};
use spaces_store::{RocksStore, Store};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
struct AppState<S: Store> {
    service: Arc<OrchestratorService<S>>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "spaces-orchestrator",
    })
}

async fn ready_handler<S: Store + 'static>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let sentinel = spaces_core::SpaceId::from_bytes([0u8; 16]);
    match state.service.store().get_active_routing(&sentinel) {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

fn create_router<S: Store + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,spaces=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Spaces Orchestrator");

    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/spaces".to_string());

    let config = match std::env::var("ORCHESTRATION_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading orchestration config");
            OrchestratorConfig::load(&path)?
        }
        Err(_) => OrchestratorConfig::default(),
    };

    let store = Arc::new(RocksStore::open(&data_dir)?);
    tracing::info!(data_dir = %data_dir, "Initialized RocksDB store");

    let (platform, directory): (Arc<dyn DevicePlatform>, Arc<dyn SpaceDirectory>) =
        match std::env::var("DEVICE_BRIDGE_URL") {
            Ok(url) => {
                tracing::info!(url = %url, "Using device bridge");
                let bridge = Arc::new(HttpDeviceBridge::new(url)?);
                let platform: Arc<dyn DevicePlatform> = bridge.clone();
                let directory: Arc<dyn SpaceDirectory> = bridge;
                (platform, directory)
            }
            Err(_) => {
                tracing::warn!("DEVICE_BRIDGE_URL not set, device writes will be discarded");
                let platform: Arc<dyn DevicePlatform> = Arc::new(NoopDevicePlatform::new());
                let directory: Arc<dyn SpaceDirectory> = Arc::new(InMemoryDirectory::new());
                (platform, directory)
            }
        };

    let service = Arc::new(OrchestratorService::new(store, platform, directory, config));
    let app = create_router(AppState { service });

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let service = Arc::new(OrchestratorService::with_defaults(
            store,
            Arc::new(NoopDevicePlatform::new()),
            Arc::new(InMemoryDirectory::new()),
        ));
        (create_router(AppState { service }), dir)
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (app, _dir) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_reads_the_store() {
        let (app, _dir) = app();
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (app, _dir) = app();
        let response = app
            .oneshot(Request::builder().uri("/spaces").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
