//! Shared "in flight" flag serializing remote auth calls.
//!
//! Exactly one remote auth call may be outstanding at a time across the
//! credential flow and the social flow. A second trigger while the flag is
//! set is rejected, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle to the shared busy flag. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a remote call is currently outstanding.
    pub fn is_set(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claim the flag for one remote call. Returns `None` if another call is
    /// already outstanding. The flag clears when the guard drops, so every
    /// return path of the claiming operation releases it.
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then(|| InFlightGuard {
                busy: Arc::clone(&self.busy),
            })
    }
}

/// RAII guard for one outstanding remote call.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}
