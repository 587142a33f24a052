//! Structured security audit logging for gateway sessions.
//!
//! Every event is emitted through `tracing` under the `audit::gateway`
//! target so it can be routed independently of ordinary application logs
//! (see the `--audit-log` / `MCP_AUDIT_LOG` sink in the `gateway` binary).

use tracing::{info, warn};
use uuid::Uuid;

/// One security-relevant occurrence in a session's lifetime.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    ConnectionEstablished { peer: String, transport: &'static str },
    ConnectionClosed { peer: String, reason: String },
    ConnectionTimeout { peer: String },
    ConnectionLimit { peer: String, limit: u32 },
    BlockedConnection { peer: String },
    InvalidAuth { peer: String, reason: String },
    AuthSuccess { peer: String },
    AuthFailed { peer: String, reason: String },
    RateLimitExceeded { peer: String, count: u32 },
    InvalidInput { peer: String, reason: String },
    WebsocketError { peer: String, reason: String },
    ServerShutdown,
}

impl AuditEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::ConnectionTimeout { .. } => "connection_timeout",
            Self::ConnectionLimit { .. } => "connection_limit",
            Self::BlockedConnection { .. } => "blocked_connection",
            Self::InvalidAuth { .. } => "invalid_auth",
            Self::AuthSuccess { .. } => "auth_success",
            Self::AuthFailed { .. } => "auth_failed",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::InvalidInput { .. } => "invalid_input",
            Self::WebsocketError { .. } => "websocket_error",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

/// Emits [`AuditEvent`]s through `tracing` with a stable `audit_id` per call.
#[derive(Debug, Clone, Default)]
pub struct AuditLog;

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn emit(&self, event: AuditEvent) {
        let audit_id = Uuid::new_v4();
        let kind = event.kind();
        match &event {
            AuditEvent::ConnectionEstablished { peer, transport } => info!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, transport = %transport,
                "connection established"
            ),
            AuditEvent::ConnectionClosed { peer, reason } => info!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, reason = %reason,
                "connection closed"
            ),
            AuditEvent::ConnectionTimeout { peer } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer,
                "connection timed out"
            ),
            AuditEvent::ConnectionLimit { peer, limit } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, limit = %limit,
                "connection limit reached"
            ),
            AuditEvent::BlockedConnection { peer } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer,
                "connection rejected: peer is blocked"
            ),
            AuditEvent::InvalidAuth { peer, reason } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, reason = %reason,
                "invalid auth presentation"
            ),
            AuditEvent::AuthSuccess { peer } => info!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer,
                "authentication succeeded"
            ),
            AuditEvent::AuthFailed { peer, reason } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, reason = %reason,
                "authentication failed"
            ),
            AuditEvent::RateLimitExceeded { peer, count } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, count = %count,
                "rate limit exceeded"
            ),
            AuditEvent::InvalidInput { peer, reason } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, reason = %reason,
                "invalid input rejected"
            ),
            AuditEvent::WebsocketError { peer, reason } => warn!(
                target: "audit::gateway",
                %audit_id, event_type = kind, peer = %peer, reason = %reason,
                "websocket error"
            ),
            AuditEvent::ServerShutdown => info!(
                target: "audit::gateway",
                %audit_id, event_type = kind,
                "server shutting down"
            ),
        }
    }
}
