//! Bootstraps the single orchestrator process used by shared-persistent
//! sessions, along with the registry/correlation state every session's
//! bridge loop needs to reach it.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tokio_util::codec::FramedWrite;

use gateway_child::{ChildConfig, ChildError, ChildHandle};
use gateway_codec::FrameCodec;

use crate::bridge::shared_reader_loop;
use crate::correlation::CorrelationTable;
use crate::registry::SessionRegistry;

/// Everything a per-session bridge loop needs to talk to the shared child.
pub struct SharedChild {
    pub stdin: Arc<TokioMutex<FramedWrite<tokio::process::ChildStdin, FrameCodec>>>,
    pub registry: Arc<SessionRegistry>,
    pub correlation: Arc<CorrelationTable>,
}

/// Spawn the shared orchestrator process and its response-routing task.
///
/// Returns the [`SharedChild`] handle sessions bridge against, plus the
/// [`ChildHandle`] the caller owns for eventual graceful shutdown.
///
/// # Errors
/// Propagates [`ChildError`] from [`ChildHandle::spawn`].
pub fn spawn_shared(
    cfg: &ChildConfig,
    max_message_bytes: usize,
) -> Result<(Arc<SharedChild>, ChildHandle), ChildError> {
    let mut handle = ChildHandle::spawn(cfg)?;
    let stdin = handle
        .take_stdin()
        .ok_or(ChildError::MissingHandle("stdin"))?;
    let stdout = handle
        .take_stdout()
        .ok_or(ChildError::MissingHandle("stdout"))?;

    let registry = Arc::new(SessionRegistry::new());
    let correlation = Arc::new(CorrelationTable::new());

    tokio::spawn(shared_reader_loop(
        stdout,
        max_message_bytes,
        registry.clone(),
        correlation.clone(),
    ));

    let shared = Arc::new(SharedChild {
        stdin: Arc::new(TokioMutex::new(FramedWrite::new(
            stdin,
            FrameCodec::new(max_message_bytes),
        ))),
        registry,
        correlation,
    });

    Ok((shared, handle))
}
