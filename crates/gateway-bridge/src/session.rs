//! Per-connection session state machine.

use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of one bridged connection.
///
/// Transitions only move forward: `Accepted -> PreAuth -> Ready -> Closed`.
/// A session that fails authentication or admission goes straight to
/// `Closed` without passing through `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport-level connection accepted, nothing read yet.
    Accepted,
    /// Awaiting a successful local `authenticate`/`initialize` handshake.
    PreAuth,
    /// Authenticated (or auth disabled) and forwarding traffic to the
    /// orchestrator child.
    Ready,
    /// Terminated; no further frames are accepted or forwarded.
    Closed,
}

impl SessionState {
    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Accepted, Self::PreAuth)
                | (Self::Accepted, Self::Closed)
                | (Self::PreAuth, Self::Ready)
                | (Self::PreAuth, Self::Closed)
                | (Self::Ready, Self::Closed)
        )
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("illegal session transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// Identity and bookkeeping for one bridged connection.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub peer: String,
    pub transport: &'static str,
    state: SessionState,
    pub accepted_at: Instant,
}

impl Session {
    #[must_use]
    pub fn new(peer: String, transport: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            transport,
            state: SessionState::Accepted,
            accepted_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, rejecting any transition not permitted by the state
    /// machine.
    ///
    /// # Errors
    /// Returns [`SessionError::IllegalTransition`] if `next` is not reachable
    /// from the current state.
    pub fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_canonical_path() {
        let mut session = Session::new("1.2.3.4".to_string(), "ws");
        assert_eq!(session.state(), SessionState::Accepted);
        session.transition(SessionState::PreAuth).unwrap();
        session.transition(SessionState::Ready).unwrap();
        assert!(session.is_ready());
        session.transition(SessionState::Closed).unwrap();
        assert!(session.is_closed());
    }

    #[test]
    fn rejects_skipping_preauth() {
        let mut session = Session::new("1.2.3.4".to_string(), "tcp");
        assert!(session.transition(SessionState::Ready).is_err());
    }

    #[test]
    fn accepted_can_close_directly_on_admission_failure() {
        let mut session = Session::new("1.2.3.4".to_string(), "tcp");
        session.transition(SessionState::Closed).unwrap();
        assert!(session.is_closed());
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = Session::new("1.2.3.4".to_string(), "tcp");
        session.transition(SessionState::Closed).unwrap();
        assert!(session.transition(SessionState::Ready).is_err());
    }
}
