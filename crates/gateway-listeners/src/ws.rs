//! WebSocket listener.
//!
//! Admission (blocklist, capacity, bearer token) happens at handshake time
//! via the `Authorization` header, before the upgrade completes, so a
//! rejected client never gets a WebSocket at all.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use gateway_auth::{AuditEvent, AuthCore};
use gateway_bridge::{PeerChannels, Session};
use gateway_health::AtomicMetrics;

use crate::ChildMode;

struct WsState {
    auth: Arc<AuthCore>,
    child_mode: ChildMode,
    metrics: Arc<AtomicMetrics>,
    max_connections: u32,
}

/// Build the axum router for the WebSocket listener.
#[must_use]
pub fn router(
    auth: Arc<AuthCore>,
    child_mode: ChildMode,
    metrics: Arc<AtomicMetrics>,
    max_connections: u32,
    cors_allowed_origins: &[String],
) -> Router {
    let state = Arc::new(WsState {
        auth,
        child_mode,
        metrics,
        max_connections,
    });

    let cors = if cors_allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/", get(ws_upgrade))
        .layer(cors)
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let peer = addr.ip().to_string();

    if state.auth.is_blocked(&peer) {
        state.auth.audit().emit(AuditEvent::BlockedConnection {
            peer: peer.clone(),
        });
        return StatusCode::FORBIDDEN.into_response();
    }

    if state.auth.config().auth_effectively_enabled() {
        let presented = bearer_token(&headers);
        if state.auth.authenticate(&peer, presented).is_err() {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    if state.metrics.ws_connections.load(Ordering::Relaxed) >= state.max_connections {
        state.auth.audit().emit(AuditEvent::ConnectionLimit {
            peer: peer.clone(),
            limit: state.max_connections,
        });
        state
            .metrics
            .total_connections_rejected
            .fetch_add(1, Ordering::Relaxed);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: String, state: Arc<WsState>) {
    state.metrics.ws_connections.fetch_add(1, Ordering::Relaxed);
    state
        .metrics
        .total_connections_accepted
        .fetch_add(1, Ordering::Relaxed);
    info!(%peer, "websocket connection accepted");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(128);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let forward_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Ok(text) = String::from_utf8(frame) {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text.into_bytes()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(bytes)) => {
                    if inbound_tx.send(bytes.to_vec()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let session = Session::new(peer.clone(), "ws");
    let peer_channels = PeerChannels {
        inbound: inbound_rx,
        outbound: outbound_tx,
    };

    let bridge_result = match &state.child_mode {
        ChildMode::Dedicated(child_cfg) => {
            gateway_bridge::run_dedicated(
                state.auth.clone(),
                session,
                peer_channels,
                child_cfg.clone(),
                true,
            )
            .await
        }
        ChildMode::Shared(shared) => {
            gateway_bridge::run_shared(
                state.auth.clone(),
                session,
                peer_channels,
                shared.registry.clone(),
                shared.correlation.clone(),
                shared.stdin.clone(),
                true,
            )
            .await
        }
    };

    if let Err(e) = bridge_result {
        warn!(%peer, error = %e, "websocket bridge session ended with an error");
    }

    recv_task.abort();
    forward_task.abort();
    state.metrics.ws_connections.fetch_sub(1, Ordering::Relaxed);
}
