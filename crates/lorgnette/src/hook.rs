//! The process-wide step intake.
//!
//! The host delivers notifications through free functions; they forward to
//! the one installed dispatcher, if any. Installation is explicit (a
//! dispatcher is an owned instance with a start/stop lifecycle, never
//! ambient state), so idle means every entry point is a cheap no-op.

use parking_lot::RwLock;
use std::sync::Arc;

use lorgnette_types::{Identity, StepEvent};

use crate::dispatch::Dispatcher;
use crate::error::TraceError;

static ACTIVE: RwLock<Option<Arc<Dispatcher>>> = RwLock::new(None);

pub fn install(dispatcher: Arc<Dispatcher>) -> Result<(), TraceError> {
    let mut slot = ACTIVE.write();
    if slot.is_some() {
        return Err(TraceError::AlreadyActive);
    }
    *slot = Some(dispatcher);
    Ok(())
}

/// Removes `dispatcher` from the slot; fails if a different dispatcher is
/// installed, so one tracer cannot tear down another's session.
pub fn uninstall(dispatcher: &Arc<Dispatcher>) -> Result<(), TraceError> {
    let mut slot = ACTIVE.write();
    match slot.as_ref() {
        Some(active) if Arc::ptr_eq(active, dispatcher) => {
            *slot = None;
            Ok(())
        }
        _ => Err(TraceError::NotActive),
    }
}

pub fn is_active() -> bool {
    ACTIVE.read().is_some()
}

/// Step notification entry point for the host. Serial delivery is the
/// host's contract; the handler runs synchronously on the caller.
pub fn emit(step: &StepEvent) {
    let guard = ACTIVE.read();
    if let Some(dispatcher) = guard.as_ref() {
        dispatcher.handle_step(step);
    }
}

/// Drop notification entry point for the host.
pub fn object_dropped(identity: Identity) {
    let guard = ACTIVE.read();
    if let Some(dispatcher) = guard.as_ref() {
        dispatcher.object_dropped(identity);
    }
}
