//! TCP listener.
//!
//! Unlike the WebSocket listener there is no handshake header to carry a
//! bearer token, so authentication (when enabled) is deferred to the first
//! frame via the `authenticate` JSON-RPC method handled in
//! `gateway_bridge::handshake`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{info, warn};

use gateway_auth::{AuditEvent, AuthCore};
use gateway_bridge::{PeerChannels, Session};
use gateway_codec::FrameCodec;
use gateway_health::AtomicMetrics;

use crate::ChildMode;

/// Accept loop configuration for the TCP listener.
#[derive(Debug, Clone)]
pub struct TcpListenerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
}

/// Run the TCP accept loop until `shutdown` fires.
///
/// # Errors
/// Returns an error if the listener cannot bind to `cfg.bind_addr`.
pub async fn run(
    cfg: TcpListenerConfig,
    auth: Arc<AuthCore>,
    child_mode: ChildMode,
    metrics: Arc<AtomicMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "tcp listener bound");

    let max_connections = cfg.max_connections;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("tcp accept loop received shutdown signal");
                break;
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept tcp connection");
                        continue;
                    }
                };

                let peer = addr.ip().to_string();

                if auth.is_blocked(&peer) {
                    auth.audit().emit(AuditEvent::BlockedConnection { peer });
                    continue;
                }

                if metrics.tcp_connections.load(Ordering::Relaxed) >= max_connections {
                    auth.audit().emit(AuditEvent::ConnectionLimit {
                        peer,
                        limit: max_connections,
                    });
                    metrics.total_connections_rejected.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let auth = auth.clone();
                let child_mode = child_mode.clone();
                let metrics_task = metrics.clone();
                metrics.tcp_connections.fetch_add(1, Ordering::Relaxed);
                metrics.total_connections_accepted.fetch_add(1, Ordering::Relaxed);

                tokio::spawn(async move {
                    handle_connection(stream, peer, auth, child_mode).await;
                    metrics_task.tcp_connections.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }

    Ok(())
}

async fn handle_connection(stream: TcpStream, peer: String, auth: Arc<AuthCore>, child_mode: ChildMode) {
    let max_bytes = auth.config().max_message_bytes;
    let framed = Framed::new(stream, FrameCodec::new(max_bytes));
    let (mut sink, mut stream) = framed.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(128);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let write_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let read_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(frame) => {
                    if inbound_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "error decoding tcp frame");
                }
            }
        }
    });

    let session = Session::new(peer.clone(), "tcp");
    let peer_channels = PeerChannels {
        inbound: inbound_rx,
        outbound: outbound_tx,
    };

    let bridge_result = match &child_mode {
        ChildMode::Dedicated(child_cfg) => {
            gateway_bridge::run_dedicated(auth, session, peer_channels, child_cfg.clone(), false).await
        }
        ChildMode::Shared(shared) => {
            gateway_bridge::run_shared(
                auth,
                session,
                peer_channels,
                shared.registry.clone(),
                shared.correlation.clone(),
                shared.stdin.clone(),
                false,
            )
            .await
        }
    };

    if let Err(e) = bridge_result {
        warn!(%peer, error = %e, "tcp bridge session ended with an error");
    }

    read_task.abort();
    write_task.abort();
}
