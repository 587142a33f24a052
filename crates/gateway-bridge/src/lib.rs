//! Session state machine and peer<->orchestrator bridging.
//!
//! [`bridge::run_dedicated`] and [`bridge::run_shared`] are the two entry
//! points a listener hands a freshly accepted connection to, once it has
//! been turned into a [`bridge::PeerChannels`] pair.

pub mod bridge;
pub mod correlation;
pub mod handshake;
pub mod registry;
pub mod session;
pub mod shared_child;

pub use bridge::{BridgeError, PeerChannels, run_dedicated, run_shared, shared_reader_loop};
pub use correlation::CorrelationTable;
pub use registry::SessionRegistry;
pub use session::{Session, SessionError, SessionState};
pub use shared_child::{SharedChild, spawn_shared};
