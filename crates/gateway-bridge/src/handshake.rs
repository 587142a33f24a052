//! Local handling of the `authenticate` and `initialize` JSON-RPC methods.
//!
//! Both are answered by the gateway itself rather than forwarded to the
//! orchestrator child: `authenticate` gates the `PreAuth -> Ready`
//! transition, and `initialize` reports gateway-level session info without
//! needing a round trip through the child process.

use gateway_auth::AuthCore;
use serde_json::{Value, json};

use crate::session::Session;

/// What the bridge loop should do after processing one pre-ready frame.
pub enum HandshakeOutcome {
    /// Send `response` to the peer and transition the session to `Ready`.
    Authenticated(Vec<u8>),
    /// Send `response` to the peer; the session stays in `PreAuth` (e.g. a
    /// locally-answered `initialize` that doesn't itself authenticate).
    Replied(Vec<u8>),
    /// Send `response` to the peer and close the connection.
    Rejected(Vec<u8>),
    /// Not a locally-handled method; forward `frame` to the child as-is.
    /// Only reachable once auth is not effectively enabled.
    Forward(Vec<u8>),
}

fn jsonrpc_error(id: &Value, code: i64, message: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    }))
    .unwrap_or_default()
}

fn jsonrpc_result(id: &Value, result: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
    .unwrap_or_default()
}

/// Process one frame received while `session` is not yet `Ready`.
pub fn handle_preauth_frame(auth: &AuthCore, session: &Session, frame: &[u8]) -> HandshakeOutcome {
    let parsed: Option<Value> = serde_json::from_slice(frame).ok();
    let Some(value) = parsed else {
        return HandshakeOutcome::Rejected(jsonrpc_error(
            &Value::Null,
            -32700,
            "Parse error: pre-authentication frames must be JSON-RPC",
        ));
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let method = value.get("method").and_then(Value::as_str).unwrap_or("");

    match method {
        "authenticate" => {
            let token = value
                .get("params")
                .and_then(|p| p.get("token"))
                .and_then(Value::as_str);
            match auth.authenticate(&session.peer, token) {
                Ok(()) => HandshakeOutcome::Authenticated(jsonrpc_result(
                    &id,
                    json!({ "authenticated": true, "session_id": session.id.to_string() }),
                )),
                Err(e) => HandshakeOutcome::Rejected(jsonrpc_error(&id, -32000, &e.to_string())),
            }
        }
        "initialize" => {
            if auth.config().auth_effectively_enabled() {
                HandshakeOutcome::Rejected(jsonrpc_error(
                    &id,
                    -32001,
                    "authentication required before initialize",
                ))
            } else {
                HandshakeOutcome::Replied(jsonrpc_result(
                    &id,
                    json!({ "session_id": session.id.to_string(), "gateway": true }),
                ))
            }
        }
        _ => {
            if auth.config().auth_effectively_enabled() {
                HandshakeOutcome::Rejected(jsonrpc_error(
                    &id,
                    -32002,
                    "authentication required",
                ))
            } else {
                HandshakeOutcome::Forward(frame.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_auth::AuthConfig;
    use secrecy::SecretString;
    use std::time::Duration;

    fn auth_with_token() -> AuthCore {
        AuthCore::new(AuthConfig {
            auth_enabled: true,
            auth_token: Some(SecretString::from("s3cret".to_string())),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 100,
            block_duration: Duration::from_secs(60),
            max_message_bytes: 1_000_000,
            auto_block_on_rate_limit: false,
        })
    }

    fn auth_disabled() -> AuthCore {
        AuthCore::new(AuthConfig {
            auth_enabled: false,
            auth_token: None,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 100,
            block_duration: Duration::from_secs(60),
            max_message_bytes: 1_000_000,
            auto_block_on_rate_limit: false,
        })
    }

    #[test]
    fn correct_token_authenticates() {
        let auth = auth_with_token();
        let session = Session::new("1.2.3.4".to_string(), "tcp");
        let frame = br#"{"jsonrpc":"2.0","id":1,"method":"authenticate","params":{"token":"s3cret"}}"#;
        assert!(matches!(
            handle_preauth_frame(&auth, &session, frame),
            HandshakeOutcome::Authenticated(_)
        ));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let auth = auth_with_token();
        let session = Session::new("1.2.3.4".to_string(), "tcp");
        let frame = br#"{"jsonrpc":"2.0","id":1,"method":"authenticate","params":{"token":"wrong"}}"#;
        assert!(matches!(
            handle_preauth_frame(&auth, &session, frame),
            HandshakeOutcome::Rejected(_)
        ));
    }

    #[test]
    fn other_methods_rejected_until_authenticated() {
        let auth = auth_with_token();
        let session = Session::new("1.2.3.4".to_string(), "tcp");
        let frame = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        assert!(matches!(
            handle_preauth_frame(&auth, &session, frame),
            HandshakeOutcome::Rejected(_)
        ));
    }

    #[test]
    fn initialize_is_answered_locally_when_auth_disabled() {
        let auth = auth_disabled();
        let session = Session::new("1.2.3.4".to_string(), "tcp");
        let frame = br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        assert!(matches!(
            handle_preauth_frame(&auth, &session, frame),
            HandshakeOutcome::Replied(_)
        ));
    }

    #[test]
    fn non_jsonrpc_frame_is_rejected() {
        let auth = auth_disabled();
        let session = Session::new("1.2.3.4".to_string(), "tcp");
        assert!(matches!(
            handle_preauth_frame(&auth, &session, b"not json"),
            HandshakeOutcome::Rejected(_)
        ));
    }

    #[test]
    fn unrecognized_method_forwards_when_auth_disabled() {
        let auth = auth_disabled();
        let session = Session::new("1.2.3.4".to_string(), "tcp");
        let frame = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        assert!(matches!(
            handle_preauth_frame(&auth, &session, frame),
            HandshakeOutcome::Forward(_)
        ));
    }
}
