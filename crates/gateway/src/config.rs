//! Process-wide configuration surface, loaded once at startup from CLI
//! flags and environment variables and shared read-only for the rest of
//! the process lifetime.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

use gateway_child::{BackoffPolicy, ChildConfig};
use gateway_listeners::ChildMode;

/// Which child-process sharing policy the TCP listener uses.
#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum TcpMode {
    DedicatedPerConnection,
    SharedPersistent,
}

#[derive(Parser, Debug)]
#[command(
    name = "gateway",
    version,
    about = "Bridges a stdio JSON-RPC orchestrator to WebSocket and TCP clients"
)]
pub struct GatewayConfig {
    /// Require a bearer token on the WebSocket listener.
    #[arg(long, env = "WS_AUTH_ENABLED", default_value_t = false)]
    pub ws_auth_enabled: bool,

    /// Bearer token accepted by the WebSocket listener.
    #[arg(long, env = "WS_AUTH_TOKEN", default_value = "")]
    pub ws_auth_token: String,

    /// Bearer token accepted by the TCP listener's `authenticate` handshake.
    /// Empty disables TCP auth.
    #[arg(long, env = "TCP_AUTH_TOKEN", default_value = "")]
    pub tcp_auth_token: String,

    /// Reserved for a future JWT-based auth mode. Not consulted by this
    /// gateway.
    #[arg(long, env = "JWT_SECRET", default_value = "")]
    pub jwt_secret: String,

    /// Address the WebSocket listener binds to.
    #[arg(long, env = "MCP_BRIDGE_PORT", default_value = "0.0.0.0:8765")]
    pub ws_listen: SocketAddr,

    /// Address the TCP listener binds to.
    #[arg(long, env = "MCP_TCP_PORT", default_value = "0.0.0.0:8766")]
    pub tcp_listen: SocketAddr,

    /// Address the health endpoint binds to. Loopback-only by convention.
    #[arg(long, env = "MCP_HEALTH_PORT", default_value = "127.0.0.1:8767")]
    pub health_listen: SocketAddr,

    /// Kept distinct from `health_listen` for deployments that colocate a
    /// WS-specific health probe on its own port; defaults to the same
    /// value.
    #[arg(long, env = "MCP_WS_HEALTH_PORT", default_value = "127.0.0.1:8767")]
    pub ws_health_listen: SocketAddr,

    #[arg(long, env = "WS_MAX_CONNECTIONS", default_value_t = 256)]
    pub ws_max_connections: u32,

    #[arg(long, env = "TCP_MAX_CONNECTIONS", default_value_t = 256)]
    pub tcp_max_connections: u32,

    #[arg(long, env = "WS_CONNECTION_TIMEOUT", default_value_t = 300)]
    pub ws_connection_timeout_secs: u64,

    #[arg(long, env = "TCP_CONNECTION_TIMEOUT", default_value_t = 300)]
    pub tcp_connection_timeout_secs: u64,

    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    pub rate_limit_window_ms: u64,

    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 120)]
    pub rate_limit_max_requests: u32,

    #[arg(long, env = "MAX_REQUEST_SIZE", default_value_t = 1_048_576)]
    pub max_request_size: usize,

    /// Comma-separated list of allowed CORS origins. Empty means "allow
    /// any origin".
    #[arg(long, env = "CORS_ALLOWED_ORIGINS", default_value = "")]
    pub cors_allowed_origins: String,

    #[arg(long, env = "MCP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Write audit/log output to this file instead of stderr.
    #[arg(long, env = "MCP_AUDIT_LOG")]
    pub audit_log: Option<String>,

    /// Whether sustained rate-limit violations escalate to an IP block.
    #[arg(long, env = "RATE_LIMIT_AUTO_BLOCK", default_value_t = true)]
    pub rate_limit_auto_block: bool,

    /// How long a rate-limit violator stays blocked, in seconds.
    #[arg(long, env = "BLOCK_DURATION_SECS", default_value_t = 900)]
    pub block_duration_secs: u64,

    /// The orchestrator command to spawn (one dedicated child per WS/TCP
    /// session in dedicated mode, or a single shared child in
    /// `shared-persistent` TCP mode).
    #[arg(long, env = "MCP_ORCHESTRATOR_COMMAND", default_value = "node")]
    pub orchestrator_command: String,

    /// Arguments passed to the orchestrator command, space-separated.
    #[arg(long, env = "MCP_ORCHESTRATOR_ARGS", default_value = "")]
    pub orchestrator_args: String,

    /// Grace period given to a child process before it is force-killed.
    #[arg(long, env = "CHILD_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub child_shutdown_grace_secs: u64,

    /// TCP listener's child-sharing policy.
    #[arg(long, env = "TCP_MODE", value_enum, default_value_t = TcpMode::DedicatedPerConnection)]
    pub tcp_mode: TcpMode,
}

impl GatewayConfig {
    #[must_use]
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[must_use]
    pub fn orchestrator_arg_list(&self) -> Vec<String> {
        self.orchestrator_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    #[must_use]
    pub fn child_config(&self) -> ChildConfig {
        ChildConfig {
            command: self.orchestrator_command.clone(),
            args: self.orchestrator_arg_list(),
            shutdown_grace: Duration::from_secs(self.child_shutdown_grace_secs),
            respawn_backoff: BackoffPolicy::default(),
        }
    }

    #[must_use]
    pub fn ws_auth_config(&self) -> gateway_auth::AuthConfig {
        gateway_auth::AuthConfig {
            auth_enabled: self.ws_auth_enabled,
            auth_token: Some(SecretString::from(self.ws_auth_token.clone())),
            rate_limit_window: Duration::from_millis(self.rate_limit_window_ms),
            rate_limit_max: self.rate_limit_max_requests,
            block_duration: Duration::from_secs(self.block_duration_secs),
            max_message_bytes: self.max_request_size,
            auto_block_on_rate_limit: self.rate_limit_auto_block,
        }
    }

    #[must_use]
    pub fn tcp_auth_config(&self) -> gateway_auth::AuthConfig {
        gateway_auth::AuthConfig {
            auth_enabled: true,
            auth_token: Some(SecretString::from(self.tcp_auth_token.clone())),
            rate_limit_window: Duration::from_millis(self.rate_limit_window_ms),
            rate_limit_max: self.rate_limit_max_requests,
            block_duration: Duration::from_secs(self.block_duration_secs),
            max_message_bytes: self.max_request_size,
            auto_block_on_rate_limit: self.rate_limit_auto_block,
        }
    }
}

/// Placeholder for the eventual dedicated-vs-shared `ChildMode` the binary
/// wires up for the TCP listener; WS always uses a dedicated child.
#[must_use]
pub fn ws_child_mode(cfg: &GatewayConfig) -> ChildMode {
    ChildMode::Dedicated(cfg.child_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origins_splits_and_trims() {
        let mut cfg = GatewayConfig::parse_from(["gateway"]);
        cfg.cors_allowed_origins = " https://a.example , https://b.example".to_string();
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn empty_cors_origins_is_empty_vec() {
        let cfg = GatewayConfig::parse_from(["gateway"]);
        assert!(cfg.cors_origins().is_empty());
    }

    #[test]
    fn orchestrator_args_split_on_whitespace() {
        let mut cfg = GatewayConfig::parse_from(["gateway"]);
        cfg.orchestrator_args = "--stdio --quiet".to_string();
        assert_eq!(
            cfg.orchestrator_arg_list(),
            vec!["--stdio".to_string(), "--quiet".to_string()]
        );
    }
}
