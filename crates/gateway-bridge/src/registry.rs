//! Registry of live sessions' outbound channels, used in shared-persistent
//! mode to route a child response back to the peer that asked for it.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Maps a session id to the sender half of its outbound-to-peer channel.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, mpsc::UnboundedSender<Vec<u8>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: Uuid, outbound: mpsc::UnboundedSender<Vec<u8>>) {
        self.sessions.insert(session_id, outbound);
    }

    pub fn unregister(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }

    /// Deliver a frame to `session_id`'s peer. Returns `false` if the
    /// session is gone or its channel has closed.
    pub fn deliver(&self, session_id: Uuid, frame: Vec<u8>) -> bool {
        match self.sessions.get(&session_id) {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Broadcast a frame to every registered session, e.g. an
    /// orchestrator-initiated notification in shared mode.
    pub fn broadcast(&self, frame: &[u8]) {
        for entry in self.sessions.iter() {
            let _ = entry.value().send(frame.to_vec());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
