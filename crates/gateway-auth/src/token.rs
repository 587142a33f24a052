//! Constant-time bearer token comparison.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Compares a presented token against the configured secret without leaking
/// timing information derived from the content of either string.
///
/// Mismatched lengths short-circuit to `false`: this leaks the fact that the
/// lengths differ, not anything about the characters themselves, which is
/// the same trade-off the wider ecosystem makes when comparing opaque
/// shared secrets with `subtle`.
#[must_use]
pub fn tokens_match(presented: &str, configured: &SecretString) -> bool {
    let expected = configured.expose_secret().as_bytes();
    let presented = presented.as_bytes();

    if expected.len() != presented.len() {
        return false;
    }

    expected.ct_eq(presented).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_identical_tokens() {
        let secret = SecretString::from("super-secret-token".to_string());
        assert!(tokens_match("super-secret-token", &secret));
    }

    #[test]
    fn rejects_wrong_token() {
        let secret = SecretString::from("super-secret-token".to_string());
        assert!(!tokens_match("wrong", &secret));
        assert!(!tokens_match("super-secret-tokeN", &secret));
    }

    #[test]
    fn rejects_different_length() {
        let secret = SecretString::from("abc".to_string());
        assert!(!tokens_match("abcd", &secret));
        assert!(!tokens_match("ab", &secret));
    }
}
