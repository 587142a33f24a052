//! Request/response correlation for shared-persistent child sessions.
//!
//! When many peer sessions share one orchestrator process, two peers could
//! legitimately both send a JSON-RPC request with `id: 1`. Before
//! forwarding, the gateway rewrites the `id` to a process-wide unique wire
//! id and remembers which session + original id it stood in for; the
//! response's `id` is rewritten back before it reaches the peer.

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// What a wire id stood in for.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub session_id: Uuid,
    pub original_id: Value,
}

/// Shared table of in-flight request correlations.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: DashMap<String, PendingRequest>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request on behalf of `session_id`, returning the wire id
    /// to substitute into the outgoing frame's `id` field.
    pub fn register(&self, session_id: Uuid, original_id: Value) -> String {
        let wire_id = Uuid::new_v4().to_string();
        self.pending.insert(
            wire_id.clone(),
            PendingRequest {
                session_id,
                original_id,
            },
        );
        wire_id
    }

    /// Resolve and remove a wire id once its response arrives.
    #[must_use]
    pub fn resolve(&self, wire_id: &str) -> Option<PendingRequest> {
        self.pending.remove(wire_id).map(|(_, v)| v)
    }

    /// Drop every pending request belonging to `session_id`, e.g. on
    /// session close, so responses for a dead session are not misrouted.
    pub fn cancel_session(&self, session_id: Uuid) {
        self.pending.retain(|_, req| req.session_id != session_id);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_resolves() {
        let table = CorrelationTable::new();
        let session = Uuid::new_v4();
        let wire_id = table.register(session, Value::from(1));
        let resolved = table.resolve(&wire_id).unwrap();
        assert_eq!(resolved.session_id, session);
        assert_eq!(resolved.original_id, Value::from(1));
        assert!(table.resolve(&wire_id).is_none());
    }

    #[test]
    fn colliding_original_ids_across_sessions_stay_distinct() {
        let table = CorrelationTable::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let wire_a = table.register(a, Value::from(1));
        let wire_b = table.register(b, Value::from(1));
        assert_ne!(wire_a, wire_b);
        assert_eq!(table.resolve(&wire_a).unwrap().session_id, a);
        assert_eq!(table.resolve(&wire_b).unwrap().session_id, b);
    }

    #[test]
    fn cancel_session_drops_only_its_entries() {
        let table = CorrelationTable::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        table.register(a, Value::from(1));
        let wire_b = table.register(b, Value::from(2));
        table.cancel_session(a);
        assert_eq!(table.pending_count(), 1);
        assert!(table.resolve(&wire_b).is_some());
    }
}
