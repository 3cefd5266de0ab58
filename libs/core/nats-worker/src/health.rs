//! Health and metrics endpoints for K8s liveness and readiness checks.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub broker_connected: bool,
}

/// Shared health state; cheap to clone.
#[derive(Clone, Default)]
pub struct HealthState {
    broker_connected: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new(connected: bool) -> Self {
        Self {
            broker_connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    /// Updated from the NATS connection event callback.
    pub fn set_broker_connected(&self, connected: bool) {
        self.broker_connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.broker_connected.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> HealthStatus {
        let broker_connected = self.is_ready();
        HealthStatus {
            status: if broker_connected { "healthy" } else { "degraded" },
            broker_connected,
        }
    }
}

/// Serves `/health`, `/ready` and, when a handle is attached, `/metrics`.
pub struct HealthServer {
    port: u16,
    state: HealthState,
    metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl HealthServer {
    pub fn new(port: u16, state: HealthState) -> Self {
        Self {
            port,
            state,
            metrics_handle: None,
        }
    }

    /// Set the metrics handle for /metrics endpoint.
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .with_state(self.state.clone());

        if let Some(handle) = self.metrics_handle.clone() {
            router = router.route(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            );
        }

        router
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let router = self.router();
        let addr = format!("0.0.0.0:{}", self.port);

        info!(addr = %addr, "Starting health server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

/// Liveness: the process is up and serving.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.status()))
}

/// Readiness: fails while the broker connection is down.
async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let code = if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(state.status()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_status(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ready_follows_broker_state() {
        let state = HealthState::new(true);
        let server = HealthServer::new(0, state.clone());

        let (code, body) = get_status(server.router(), "/ready").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        state.set_broker_connected(false);
        let (code, body) = get_status(server.router(), "/ready").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["broker_connected"], false);

        // Liveness does not depend on the broker
        let (code, _) = get_status(server.router(), "/health").await;
        assert_eq!(code, StatusCode::OK);
    }
}
