//! WebSocket and TCP listeners for the MCP bridge gateway.

pub mod tcp;
pub mod ws;

use std::sync::Arc;

use gateway_bridge::SharedChild;
use gateway_child::ChildConfig;

/// Whether each accepted connection gets its own orchestrator process, or
/// all connections share one already-running process.
#[derive(Clone)]
pub enum ChildMode {
    Dedicated(ChildConfig),
    Shared(Arc<SharedChild>),
}

pub use tcp::{TcpListenerConfig, run as run_tcp};
pub use ws::router as ws_router;
