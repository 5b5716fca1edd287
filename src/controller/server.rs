//! # HTTP Server
//!
//! Health probes and Prometheus metrics.
//!
//! - `/healthz` answers as soon as the server is up
//! - `/readyz` answers once the controller has started its watches
//! - `/metrics` serves the text exposition of the global registry

use crate::observability::metrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for probe handlers
#[derive(Debug, Default)]
pub struct ServerState {
    /// Set once the HTTP listener is bound
    pub is_serving: Arc<AtomicBool>,
    /// Set once the controller watches are running
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }
}

/// Build the probe and metrics router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

/// Bind `port` and serve until the process exits
pub async fn start_server(port: u16, state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");
    state.is_serving.store(true, Ordering::Relaxed);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_healthz_always_ok() {
        let server = TestServer::new(router(Arc::new(ServerState::new()))).unwrap();
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("ok");
    }

    #[tokio::test]
    async fn test_readyz_follows_state() {
        let state = Arc::new(ServerState::new());
        let server = TestServer::new(router(Arc::clone(&state))).unwrap();

        let response = server.get("/readyz").expect_failure().await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        state.mark_ready();
        server.get("/readyz").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_metrics_exposes_registered_counters() {
        // Another test may have registered already
        let _ = metrics::register_metrics();
        metrics::increment_reconciliations();

        let server = TestServer::new(router(Arc::new(ServerState::new()))).unwrap();
        let response = server.get("/metrics").await;
        response.assert_status_ok();
        assert!(response.text().contains("puller_reconciliations_total"));
    }
}
