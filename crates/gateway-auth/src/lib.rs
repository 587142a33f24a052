//! Admission control for the MCP bridge gateway: token authentication,
//! sliding-window rate limiting, IP blocklisting, JSON-RPC envelope
//! validation/sanitization, and structured security audit logging.
//!
//! [`AuthCore`] wires these pieces together behind a single `Arc`-shared
//! handle so listener tasks never touch the individual components directly.

pub mod audit;
pub mod blocklist;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod sanitize;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use audit::{AuditEvent, AuditLog};
pub use blocklist::Blocklist;
pub use config::AuthConfig;
pub use error::AuthError;
pub use rate_limit::{RateLimiter, RateOutcome};
pub use sanitize::ValidateOutcome;

/// Shared admission-control state for one gateway process.
pub struct AuthCore {
    config: AuthConfig,
    rate_limiter: RateLimiter,
    blocklist: Blocklist,
    audit: AuditLog,
}

impl AuthCore {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_window, config.rate_limit_max);
        Self {
            config,
            rate_limiter,
            blocklist: Blocklist::new(),
            audit: AuditLog::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Reject a connecting peer outright if it is currently blocked.
    pub fn admit(&self, peer: &str) -> Result<(), AuthError> {
        if self.blocklist.is_blocked(peer) {
            self.audit.emit(AuditEvent::BlockedConnection {
                peer: peer.to_string(),
            });
            return Err(AuthError::Blocked);
        }
        Ok(())
    }

    /// Account one request against `peer`'s sliding window. Optionally
    /// escalates to a block once `auth_effectively_enabled` is irrelevant:
    /// auto-block applies regardless of whether token auth is on.
    pub fn account(&self, peer: &str) -> Result<(), AuthError> {
        match self.rate_limiter.account(peer) {
            RateOutcome::Ok => Ok(()),
            RateOutcome::Throttled => {
                let count = self.rate_limiter.current_count(peer);
                self.audit.emit(AuditEvent::RateLimitExceeded {
                    peer: peer.to_string(),
                    count,
                });
                if self.config.auto_block_on_rate_limit {
                    self.blocklist.block(peer, self.config.block_duration);
                }
                Err(AuthError::RateLimited)
            }
        }
    }

    /// Validate a presented bearer token against the configured one. No-op
    /// (always succeeds) when auth is not effectively enabled.
    pub fn authenticate(&self, peer: &str, presented: Option<&str>) -> Result<(), AuthError> {
        if !self.config.auth_effectively_enabled() {
            return Ok(());
        }
        let Some(expected) = self.config.auth_token.as_ref() else {
            return Ok(());
        };
        match presented {
            None => {
                self.audit.emit(AuditEvent::InvalidAuth {
                    peer: peer.to_string(),
                    reason: "no credentials presented".to_string(),
                });
                Err(AuthError::Unauthenticated)
            }
            Some(token) if token::tokens_match(token, expected) => {
                self.audit.emit(AuditEvent::AuthSuccess {
                    peer: peer.to_string(),
                });
                Ok(())
            }
            Some(_) => {
                self.audit.emit(AuditEvent::AuthFailed {
                    peer: peer.to_string(),
                    reason: "token mismatch".to_string(),
                });
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Validate and sanitize one inbound frame.
    pub fn validate_input(&self, peer: &str, bytes: &[u8]) -> Result<Vec<u8>, AuthError> {
        match sanitize::validate(bytes, self.config.max_message_bytes) {
            ValidateOutcome::Ok(sanitized) => Ok(sanitized),
            ValidateOutcome::Invalid(reason) => {
                self.audit.emit(AuditEvent::InvalidInput {
                    peer: peer.to_string(),
                    reason: reason.clone(),
                });
                Err(AuthError::InvalidInput(reason))
            }
        }
    }

    #[must_use]
    pub fn is_blocked(&self, peer: &str) -> bool {
        self.blocklist.is_blocked(peer)
    }

    pub fn block(&self, peer: &str) {
        self.blocklist.block(peer, self.config.block_duration);
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.rate_limiter.tracked_clients()
    }

    #[must_use]
    pub fn blocked_peers(&self) -> usize {
        self.blocklist.len()
    }
}

/// Spawn a background task that periodically purges expired rate-limit
/// windows and blocklist entries. The returned handle is aborted by the
/// gateway's shutdown path.
pub fn spawn_sweeper(core: Arc<AuthCore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            core.rate_limiter.sweep();
            core.blocklist.sweep();
        }
    })
}
