//! IP blocklist with lazy TTL expiry.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Peer IP → expiry time. Entries are evicted lazily on access and by the
/// background sweeper.
#[derive(Default)]
pub struct Blocklist {
    entries: DashMap<String, Instant>,
}

impl Blocklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `ip` for `duration` from now.
    pub fn block(&self, ip: &str, duration: Duration) {
        self.entries.insert(ip.to_string(), Instant::now() + duration);
    }

    /// Whether `ip` is currently blocked. Expired entries are removed as a
    /// side effect.
    #[must_use]
    pub fn is_blocked(&self, ip: &str) -> bool {
        let Some(expiry) = self.entries.get(ip).map(|e| *e) else {
            return false;
        };
        if Instant::now() >= expiry {
            self.entries.remove(ip);
            false
        } else {
            true
        }
    }

    /// Drop every entry whose TTL has elapsed. Run periodically; failure
    /// must never affect `is_blocked`.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, expiry| *expiry > now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_and_reports() {
        let list = Blocklist::new();
        assert!(!list.is_blocked("1.2.3.4"));
        list.block("1.2.3.4", Duration::from_secs(60));
        assert!(list.is_blocked("1.2.3.4"));
    }

    #[test]
    fn expires_and_unblocks() {
        let list = Blocklist::new();
        list.block("1.2.3.4", Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!list.is_blocked("1.2.3.4"));
        assert!(list.is_empty());
    }

    #[test]
    fn sweep_evicts_expired() {
        let list = Blocklist::new();
        list.block("a", Duration::from_millis(5));
        list.block("b", Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(15));
        list.sweep();
        assert_eq!(list.len(), 1);
        assert!(list.is_blocked("b"));
    }
}
