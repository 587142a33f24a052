//! Configuration surface for [`crate::AuthCore`].

use secrecy::SecretString;
use std::time::Duration;

/// Read-only configuration for token auth, rate limiting and the blocklist.
///
/// Constructed once at process start and shared via `Arc` with the rest of
/// the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Whether sessions must present a valid bearer token before any
    /// non-handshake traffic is forwarded.
    pub auth_enabled: bool,
    /// The single accepted bearer token. `None`/empty implies `auth_enabled`
    /// is treated as false regardless of the explicit flag.
    pub auth_token: Option<SecretString>,
    /// Sliding window duration for rate limiting.
    pub rate_limit_window: Duration,
    /// Maximum requests allowed per client within `rate_limit_window`.
    pub rate_limit_max: u32,
    /// How long a rate-limit violator remains blocked after escalation.
    pub block_duration: Duration,
    /// Per-frame input cap in bytes.
    pub max_message_bytes: usize,
    /// Whether sustained rate-limit violations escalate to a block.
    pub auto_block_on_rate_limit: bool,
}

impl AuthConfig {
    /// Effective auth-enabled flag, accounting for an absent/empty token.
    #[must_use]
    pub fn auth_effectively_enabled(&self) -> bool {
        self.auth_enabled
            && self
                .auth_token
                .as_ref()
                .is_some_and(|t| !secrecy::ExposeSecret::expose_secret(t).is_empty())
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("auth_enabled", &self.auth_enabled)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("rate_limit_window", &self.rate_limit_window)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("block_duration", &self.block_duration)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("auto_block_on_rate_limit", &self.auto_block_on_rate_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn base() -> AuthConfig {
        AuthConfig {
            auth_enabled: true,
            auth_token: Some(SecretString::from("abc".to_string())),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 5,
            block_duration: Duration::from_secs(300),
            max_message_bytes: 1_000_000,
            auto_block_on_rate_limit: true,
        }
    }

    #[test]
    fn empty_token_disables_auth_effectively() {
        let mut cfg = base();
        cfg.auth_token = Some(SecretString::from(String::new()));
        assert!(!cfg.auth_effectively_enabled());

        cfg.auth_token = None;
        assert!(!cfg.auth_effectively_enabled());
    }

    #[test]
    fn present_token_enables_auth() {
        assert!(base().auth_effectively_enabled());
    }
}
