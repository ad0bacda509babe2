//! Liveness and metrics endpoint
//!
//! A secondary instance probes `/alive` on its primary; any 2xx means the
//! primary is handling traps.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state
#[derive(Clone, Default)]
pub struct LivenessState {
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

/// Create the liveness router
pub fn create_router(state: LivenessState) -> Router {
    Router::new()
        .route("/alive", get(alive_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Current epoch millis, never cached
async fn alive_handler() -> impl IntoResponse {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONTENT_TYPE, "text/plain"),
        ],
        millis.to_string(),
    )
}

async fn metrics_handler(State(state): State<LivenessState>) -> impl IntoResponse {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Serve the liveness endpoint on all interfaces
pub async fn serve(port: u16, state: LivenessState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Liveness available on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state)).await
}
