//! Wires one peer connection to the orchestrator child process.
//!
//! Transport-agnostic: the listener layer adapts a WebSocket or raw TCP
//! connection into a pair of channels ([`PeerChannels`]) before handing it
//! here, so the pump loop below is identical for both transports.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use gateway_auth::{AuditEvent, AuthCore, AuthError};
use gateway_child::{ChildConfig, ChildError, ChildHandle};
use gateway_codec::{FrameCodec, FrameError};

use crate::correlation::CorrelationTable;
use crate::handshake::{HandshakeOutcome, handle_preauth_frame};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionState};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Child(#[from] ChildError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Half-duplex channel pair the listener layer hands to the bridge for one
/// peer connection: frames arriving from the peer, and a sink back to it.
pub struct PeerChannels {
    pub inbound: mpsc::Receiver<Vec<u8>>,
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// Run one session with a dedicated, per-connection child process.
///
/// Owns the child for the session's entire lifetime: on return (peer
/// disconnect, child exit, or protocol rejection) the child is killed.
pub async fn run_dedicated(
    auth: Arc<AuthCore>,
    mut session: Session,
    mut peer: PeerChannels,
    child_cfg: ChildConfig,
    preauthenticated: bool,
) -> Result<(), BridgeError> {
    auth.audit().emit(AuditEvent::ConnectionEstablished {
        peer: session.peer.clone(),
        transport: session.transport,
    });

    session
        .transition(SessionState::PreAuth)
        .expect("Accepted -> PreAuth is always legal");
    if preauthenticated {
        session
            .transition(SessionState::Ready)
            .expect("PreAuth -> Ready is always legal");
    }

    let mut child = ChildHandle::spawn(&child_cfg)?;
    let stdin = child.take_stdin().ok_or(ChildError::MissingHandle("stdin"))?;
    let stdout = child
        .take_stdout()
        .ok_or(ChildError::MissingHandle("stdout"))?;

    let mut child_writer = FramedWrite::new(stdin, FrameCodec::new(child_cfg_max(&child_cfg, &auth)));
    let mut child_reader = FramedRead::new(stdout, FrameCodec::new(child_cfg_max(&child_cfg, &auth)));

    let close_reason = loop {
        tokio::select! {
            maybe_frame = peer.inbound.recv() => {
                let Some(frame) = maybe_frame else {
                    break "peer disconnected".to_string();
                };

                if auth.account(&session.peer).is_err() {
                    continue;
                }

                let sanitized = match auth.validate_input(&session.peer, &frame) {
                    Ok(bytes) => bytes,
                    Err(_) => continue,
                };

                if session.is_ready() {
                    if child_writer.send(sanitized).await.is_err() {
                        break "child stdin closed".to_string();
                    }
                    continue;
                }

                match handle_preauth_frame(&auth, &session, &sanitized) {
                    HandshakeOutcome::Authenticated(reply) => {
                        session
                            .transition(SessionState::Ready)
                            .expect("PreAuth -> Ready is always legal");
                        let _ = peer.outbound.send(reply);
                    }
                    HandshakeOutcome::Replied(reply) => {
                        let _ = peer.outbound.send(reply);
                    }
                    HandshakeOutcome::Rejected(reply) => {
                        let _ = peer.outbound.send(reply);
                        break "rejected during handshake".to_string();
                    }
                    HandshakeOutcome::Forward(bytes) => {
                        session
                            .transition(SessionState::Ready)
                            .expect("PreAuth -> Ready is always legal");
                        if child_writer.send(bytes).await.is_err() {
                            break "child stdin closed".to_string();
                        }
                    }
                }
            }
            maybe_result = child_reader.next() => {
                match maybe_result {
                    Some(Ok(frame)) => {
                        if peer.outbound.send(frame).is_err() {
                            break "peer channel closed".to_string();
                        }
                    }
                    Some(Err(e)) => {
                        warn!(peer = %session.peer, error = %e, "error decoding child frame");
                    }
                    None => break "child process exited".to_string(),
                }
            }
        }
    };

    debug!(peer = %session.peer, reason = %close_reason, "closing session");
    let _ = session.transition(SessionState::Closed);
    let _ = child.kill_gracefully(child_cfg.shutdown_grace).await;
    auth.audit().emit(AuditEvent::ConnectionClosed {
        peer: session.peer.clone(),
        reason: close_reason,
    });
    Ok(())
}

// `ChildConfig` doesn't itself know the framing cap; it's carried on
// `AuthConfig` instead, since both transports share one message-size limit.
fn child_cfg_max(_cfg: &ChildConfig, auth: &AuthCore) -> usize {
    auth.config().max_message_bytes
}

/// Run one session against a shared, already-running child process.
///
/// The caller owns the single `FramedWrite` into the child's stdin behind a
/// mutex (many sessions write, one child reads) and the [`SessionRegistry`]
/// + [`CorrelationTable`] used to route responses back; see
/// [`shared_reader_loop`] for the other half of this pair.
pub async fn run_shared(
    auth: Arc<AuthCore>,
    mut session: Session,
    mut peer: PeerChannels,
    registry: Arc<SessionRegistry>,
    correlation: Arc<CorrelationTable>,
    child_stdin: Arc<TokioMutex<FramedWrite<tokio::process::ChildStdin, FrameCodec>>>,
    preauthenticated: bool,
) -> Result<(), BridgeError> {
    auth.audit().emit(AuditEvent::ConnectionEstablished {
        peer: session.peer.clone(),
        transport: session.transport,
    });
    session
        .transition(SessionState::PreAuth)
        .expect("Accepted -> PreAuth is always legal");
    if preauthenticated {
        session
            .transition(SessionState::Ready)
            .expect("PreAuth -> Ready is always legal");
    }

    registry.register(session.id, peer.outbound.clone());

    let close_reason = loop {
        let Some(frame) = peer.inbound.recv().await else {
            break "peer disconnected".to_string();
        };

        if auth.account(&session.peer).is_err() {
            continue;
        }

        let sanitized = match auth.validate_input(&session.peer, &frame) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };

        if session.is_ready() {
            if let Err(e) = forward_with_correlation(
                &session,
                sanitized,
                &correlation,
                &child_stdin,
            )
            .await
            {
                warn!(peer = %session.peer, error = %e, "failed forwarding to shared child");
                break "child stdin closed".to_string();
            }
            continue;
        }

        match handle_preauth_frame(&auth, &session, &sanitized) {
            HandshakeOutcome::Authenticated(reply) => {
                session
                    .transition(SessionState::Ready)
                    .expect("PreAuth -> Ready is always legal");
                let _ = peer.outbound.send(reply);
            }
            HandshakeOutcome::Replied(reply) => {
                let _ = peer.outbound.send(reply);
            }
            HandshakeOutcome::Rejected(reply) => {
                let _ = peer.outbound.send(reply);
                break "rejected during handshake".to_string();
            }
            HandshakeOutcome::Forward(bytes) => {
                session
                    .transition(SessionState::Ready)
                    .expect("PreAuth -> Ready is always legal");
                if let Err(e) =
                    forward_with_correlation(&session, bytes, &correlation, &child_stdin).await
                {
                    warn!(peer = %session.peer, error = %e, "failed forwarding to shared child");
                    break "child stdin closed".to_string();
                }
            }
        }
    };

    registry.unregister(session.id);
    correlation.cancel_session(session.id);
    let _ = session.transition(SessionState::Closed);
    auth.audit().emit(AuditEvent::ConnectionClosed {
        peer: session.peer.clone(),
        reason: close_reason,
    });
    Ok(())
}

async fn forward_with_correlation(
    session: &Session,
    frame: Vec<u8>,
    correlation: &CorrelationTable,
    child_stdin: &TokioMutex<FramedWrite<tokio::process::ChildStdin, FrameCodec>>,
) -> Result<(), FrameError> {
    let rewritten = match serde_json::from_slice::<serde_json::Value>(&frame) {
        Ok(mut value) => {
            if let Some(id) = value.get("id").cloned() {
                let wire_id = correlation.register(session.id, id);
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("id".to_string(), serde_json::Value::String(wire_id));
                }
                serde_json::to_vec(&value).unwrap_or(frame)
            } else {
                frame
            }
        }
        Err(_) => frame,
    };

    let mut writer = child_stdin.lock().await;
    writer.send(rewritten).await
}

/// Read responses from the shared child's stdout and route each one back to
/// the session that issued the matching request. Frames with no tracked
/// correlation (e.g. orchestrator-initiated notifications) are broadcast to
/// every registered session.
pub async fn shared_reader_loop(
    child_stdout: tokio::process::ChildStdout,
    max_message_bytes: usize,
    registry: Arc<SessionRegistry>,
    correlation: Arc<CorrelationTable>,
) {
    let mut reader = FramedRead::new(child_stdout, FrameCodec::new(max_message_bytes));
    loop {
        match reader.next().await {
            Some(Ok(frame)) => route_response(&frame, &registry, &correlation),
            Some(Err(e)) => warn!(error = %e, "error decoding shared child frame"),
            None => {
                info!("shared child process stdout closed");
                break;
            }
        }
    }
}

fn route_response(frame: &[u8], registry: &SessionRegistry, correlation: &CorrelationTable) {
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(frame) else {
        registry.broadcast(frame);
        return;
    };

    let wire_id = value.get("id").and_then(|v| v.as_str()).map(str::to_string);
    let Some(wire_id) = wire_id else {
        registry.broadcast(frame);
        return;
    };

    let Some(pending) = correlation.resolve(&wire_id) else {
        registry.broadcast(frame);
        return;
    };

    if let Some(obj) = value.as_object_mut() {
        obj.insert("id".to_string(), pending.original_id);
    }
    let rewritten = serde_json::to_vec(&value).unwrap_or_else(|_| frame.to_vec());
    if !registry.deliver(pending.session_id, rewritten) {
        debug!(session_id = %pending.session_id, "dropping response for session that already closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_auth::AuthConfig;
    use std::time::Duration;

    fn disabled_auth() -> Arc<AuthCore> {
        Arc::new(AuthCore::new(AuthConfig {
            auth_enabled: false,
            auth_token: None,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 1000,
            block_duration: Duration::from_secs(60),
            max_message_bytes: 1_000_000,
            auto_block_on_rate_limit: false,
        }))
    }

    #[test]
    fn auth_config_helper_reads_max_message_bytes() {
        let auth = disabled_auth();
        let cfg = ChildConfig {
            command: "true".to_string(),
            args: vec![],
            shutdown_grace: Duration::from_millis(200),
            respawn_backoff: gateway_child::BackoffPolicy::default(),
        };
        assert_eq!(child_cfg_max(&cfg, &auth), 1_000_000);
    }

    #[tokio::test]
    async fn route_response_delivers_to_correlated_session() {
        let registry = Arc::new(SessionRegistry::new());
        let correlation = Arc::new(CorrelationTable::new());
        let session_id = uuid::Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(session_id, tx);
        let wire_id = correlation.register(session_id, serde_json::Value::from(7));

        let frame = serde_json::to_vec(&serde_json::json!({
            "jsonrpc": "2.0", "id": wire_id, "result": {}
        }))
        .unwrap();
        route_response(&frame, &registry, &correlation);

        let delivered = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&delivered).unwrap();
        assert_eq!(value["id"], 7);
    }

    #[tokio::test]
    async fn route_response_broadcasts_uncorrelated_frame() {
        let registry = Arc::new(SessionRegistry::new());
        let correlation = Arc::new(CorrelationTable::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(uuid::Uuid::new_v4(), tx);

        let frame = serde_json::to_vec(&serde_json::json!({
            "jsonrpc": "2.0", "method": "notifications/progress", "params": {}
        }))
        .unwrap();
        route_response(&frame, &registry, &correlation);

        assert!(rx.try_recv().is_ok());
    }
}
