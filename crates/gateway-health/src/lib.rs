//! Health endpoint: lock-free connection counters plus a `GET /health`
//! router bound to loopback only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

/// Lock-free counters updated on the hot path by listeners and the bridge.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    pub ws_connections: AtomicU32,
    pub tcp_connections: AtomicU32,
    pub total_connections_accepted: AtomicU64,
    pub total_connections_rejected: AtomicU64,
}

impl AtomicMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ws_connections: self.ws_connections.load(Ordering::Relaxed),
            tcp_connections: self.tcp_connections.load(Ordering::Relaxed),
            total_connections_accepted: self.total_connections_accepted.load(Ordering::Relaxed),
            total_connections_rejected: self.total_connections_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub ws_connections: u32,
    pub tcp_connections: u32,
    pub total_connections_accepted: u64,
    pub total_connections_rejected: u64,
}

/// Shared state backing the `/health` handler.
pub struct HealthState {
    pub started_at: Instant,
    pub metrics: Arc<AtomicMetrics>,
    pub auth_enabled: bool,
    pub ws_max_connections: u32,
    pub tcp_max_connections: u32,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    checked_at: String,
    uptime_seconds: u64,
    auth_enabled: bool,
    ws_connections: u32,
    ws_max_connections: u32,
    tcp_connections: u32,
    tcp_max_connections: u32,
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<HealthState>>,
) -> (StatusCode, Json<HealthBody>) {
    let snapshot = state.metrics.snapshot();
    let body = HealthBody {
        status: "ok",
        checked_at: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        auth_enabled: state.auth_enabled,
        ws_connections: snapshot.ws_connections,
        ws_max_connections: state.ws_max_connections,
        tcp_connections: snapshot.tcp_connections,
        tcp_max_connections: state.tcp_max_connections,
    };
    (StatusCode::OK, Json(body))
}

/// Build the health-check router. Bind this to a loopback-only address;
/// every other route 404s by axum's default fallback.
#[must_use]
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = AtomicMetrics::new();
        metrics.ws_connections.fetch_add(2, Ordering::Relaxed);
        metrics.tcp_connections.fetch_add(1, Ordering::Relaxed);
        metrics
            .total_connections_accepted
            .fetch_add(3, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.ws_connections, 2);
        assert_eq!(snap.tcp_connections, 1);
        assert_eq!(snap.total_connections_accepted, 3);
    }
}
