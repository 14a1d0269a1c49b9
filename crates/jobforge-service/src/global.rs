//! Process-wide singleton accessor for a `QueueService`, for callers that
//! would rather reach for a free function than thread an `Arc<QueueService>`
//! through their whole call stack.

use crate::error::{ServiceErrorKind, ServiceResult};
use crate::service::QueueService;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::Arc;

static INSTANCE: OnceCell<RwLock<Option<Arc<QueueService>>>> = OnceCell::new();

fn slot() -> &'static RwLock<Option<Arc<QueueService>>> {
    INSTANCE.get_or_init(|| RwLock::new(None))
}

/// Installs `service` as the process-wide instance. Fails if one is
/// already installed — call [`terminate`] first to replace it.
pub fn initialize(service: Arc<QueueService>) -> ServiceResult<()> {
    let mut guard = slot().write();
    if guard.is_some() {
        return Err(ServiceErrorKind::AlreadyInitialized.into());
    }
    *guard = Some(service);
    Ok(())
}

/// Returns the process-wide instance, or an error if none has been
/// installed.
pub fn current() -> ServiceResult<Arc<QueueService>> {
    slot()
        .read()
        .clone()
        .ok_or_else(|| ServiceErrorKind::NotInitialized.into())
}

/// Removes the process-wide instance, if any, allowing a fresh
/// [`initialize`] call. Does not stop the service's queues — callers
/// should `stop_all` before terminating.
pub fn terminate() {
    *slot().write() = None;
}
