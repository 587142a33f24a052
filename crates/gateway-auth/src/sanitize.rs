//! JSON-RPC envelope validation and recursive payload sanitization.
//!
//! Operates entirely on the neutral `serde_json::Value` model rather than
//! adopting any host object model, so prototype-pollution-style key names
//! are simply never re-inserted on serialization (see DESIGN.md).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Reserved keys dropped during sanitization to prevent prototype-pollution
/// style payloads from reaching the child process.
const RESERVED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static JAVASCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid regex"));
static EVENT_HANDLER_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("valid regex"));
static KEY_DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9 ._-]").expect("valid regex"));

/// Outcome of [`validate`].
#[derive(Debug)]
pub enum ValidateOutcome {
    /// Accepted, possibly after sanitization. Opaque non-JSON text passes
    /// through unchanged.
    Ok(Vec<u8>),
    /// Rejected with a human-readable reason (used verbatim in the
    /// `-32600` JSON-RPC error message on TCP).
    Invalid(String),
}

/// Validate and sanitize one frame's payload before it reaches the child
/// process.
#[must_use]
pub fn validate(bytes: &[u8], max_message_bytes: usize) -> ValidateOutcome {
    if bytes.len() > max_message_bytes {
        return ValidateOutcome::Invalid("Input too large".to_string());
    }

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return ValidateOutcome::Invalid("Input is not valid UTF-8".to_string()),
    };

    let Ok(value) = serde_json::from_str::<Value>(text) else {
        // Not JSON at all: accepted as opaque text.
        return ValidateOutcome::Ok(bytes.to_vec());
    };

    if let Value::Object(ref obj) = value
        && let Some(jsonrpc) = obj.get("jsonrpc")
    {
        if jsonrpc != "2.0" {
            return ValidateOutcome::Invalid("jsonrpc version must be \"2.0\"".to_string());
        }
        if !obj.contains_key("method") && !obj.contains_key("id") {
            return ValidateOutcome::Invalid(
                "JSON-RPC message must carry a method or an id".to_string(),
            );
        }
    }

    let sanitized = sanitize(value);
    match serde_json::to_vec(&sanitized) {
        Ok(bytes) => ValidateOutcome::Ok(bytes),
        Err(e) => ValidateOutcome::Invalid(format!("failed to re-serialize payload: {e}")),
    }
}

/// Recursively sanitize a JSON value: drop reserved keys, strip disallowed
/// characters from remaining keys, and scrub script-injection patterns from
/// string values. Never panics.
#[must_use]
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let clean_key = KEY_DISALLOWED_CHARS.replace_all(&key, "").into_owned();
                if clean_key.is_empty() {
                    continue;
                }
                out.insert(clean_key, sanitize(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::String(s) => Value::String(sanitize_string(&s)),
        other => other,
    }
}

fn sanitize_string(input: &str) -> String {
    let without_scripts = SCRIPT_TAG.replace_all(input, "");
    let without_js_scheme = JAVASCRIPT_SCHEME.replace_all(&without_scripts, "");
    EVENT_HANDLER_ATTR
        .replace_all(&without_js_scheme, "")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn oversize_is_rejected() {
        match validate(b"xxxxxxxxxx", 5) {
            ValidateOutcome::Invalid(reason) => assert_eq!(reason, "Input too large"),
            ValidateOutcome::Ok(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn non_utf8_is_rejected() {
        match validate(&[0xFF, 0xFE], 100) {
            ValidateOutcome::Invalid(_) => {}
            ValidateOutcome::Ok(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn non_json_passes_through_as_opaque_text() {
        match validate(b"hello world", 100) {
            ValidateOutcome::Ok(bytes) => assert_eq!(bytes, b"hello world"),
            ValidateOutcome::Invalid(r) => panic!("unexpected rejection: {r}"),
        }
    }

    #[test]
    fn jsonrpc_wrong_version_is_rejected() {
        let payload = br#"{"jsonrpc":"1.0","id":1,"method":"x"}"#;
        match validate(payload, 1000) {
            ValidateOutcome::Invalid(_) => {}
            ValidateOutcome::Ok(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn jsonrpc_without_method_or_id_is_rejected() {
        let payload = br#"{"jsonrpc":"2.0","params":{}}"#;
        match validate(payload, 1000) {
            ValidateOutcome::Invalid(_) => {}
            ValidateOutcome::Ok(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn sanitizes_prototype_pollution_and_script_injection() {
        let payload = br#"{"jsonrpc":"2.0","id":9,"method":"x","params":{"__proto__":{"a":1},"ok":"<script>bad</script>hi"}}"#;
        match validate(payload, 10_000) {
            ValidateOutcome::Ok(bytes) => {
                let value: Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(
                    value,
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": 9,
                        "method": "x",
                        "params": {"ok": "hi"}
                    })
                );
            }
            ValidateOutcome::Invalid(r) => panic!("unexpected rejection: {r}"),
        }
    }

    #[test]
    fn strips_javascript_scheme_and_event_handlers() {
        let value = serde_json::json!({
            "href": "javascript:alert(1)",
            "tag": "<div onclick=alert(1)>hi</div>",
        });
        let sanitized = sanitize(value);
        assert_eq!(sanitized["href"], "alert(1)");
        assert_eq!(sanitized["tag"], "<div alert(1)>hi</div>");
    }

    #[test]
    fn strips_disallowed_key_characters() {
        let value = serde_json::json!({"a<b>c": 1});
        let sanitized = sanitize(value);
        assert_eq!(sanitized["abc"], 1);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let value = serde_json::json!({
            "__proto__": {"a": 1},
            "ok": "<script>bad</script>still here",
            "nested": {"constructor": "x", "fine": "value"},
        });
        let once = sanitize(value);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitize_never_panics_on_arbitrary_input() {
        let inputs = [
            Value::Null,
            Value::Bool(true),
            serde_json::json!(42),
            serde_json::json!([1, "x", {"__proto__": 1}]),
            serde_json::json!({"": "empty key"}),
        ];
        for v in inputs {
            let _ = sanitize(v);
        }
    }
}
