//! # Listener Registrations
//!
//! A [`Registration`] binds one [`Callback`] to one event id inside one
//! dispatcher. Registrations are recycled through the
//! [`PoolRegistry`](crate::PoolRegistry) rather than dropped.
//!
//! ## Lifecycle
//!
//! ```text
//! Unattached ──fill──▶ Live ──remove──▶ Deleted ──re-add──▶ Live
//!                        │                 │
//!                        └────teardown─────┴──────▶ Released (back to pool)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::callback::Callback;
use crate::memory::Recycle;

#[derive(Default)]
struct RegistrationState {
    deleted: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

/// Pooled record pairing a callback handle with a deleted flag.
///
/// Clones share state: a fire pass holds clones of the registrations it is
/// walking, so a removal made by an earlier listener in the same pass is
/// seen when the pass reaches the removed entry.
#[derive(Clone, Default)]
pub struct Registration {
    state: Arc<RegistrationState>,
}

impl Registration {
    /// Attaches `callback` and marks the registration live.
    pub fn fill(&self, callback: Callback) {
        *self.state.callback.lock() = Some(callback);
        self.state.deleted.store(false, Ordering::Release);
    }

    /// Returns `true` if this registration holds `callback`, live or not.
    #[must_use]
    pub fn holds(&self, callback: &Callback) -> bool {
        self.state
            .callback
            .lock()
            .as_ref()
            .is_some_and(|held| held.same_handle(callback))
    }

    /// Returns `true` if removed and awaiting release.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.state.deleted.load(Ordering::Acquire)
    }

    /// Returns `true` if filled and not deleted.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_deleted() && self.state.callback.lock().is_some()
    }

    /// Returns the callback if the registration is live.
    ///
    /// The handle is cloned out so the registration lock is not held while
    /// the listener runs.
    #[must_use]
    pub fn live_callback(&self) -> Option<Callback> {
        if self.is_deleted() {
            return None;
        }
        self.state.callback.lock().clone()
    }

    /// Marks the registration deleted. Returns `true` if it was live.
    pub fn mark_deleted(&self) -> bool {
        !self.state.deleted.swap(true, Ordering::AcqRel) && self.state.callback.lock().is_some()
    }

    /// Clears the deleted flag.
    pub fn revive(&self) {
        self.state.deleted.store(false, Ordering::Release);
    }
}

impl Recycle for Registration {
    fn recycle(&mut self) {
        let callback = self.state.callback.lock().take();
        self.state.deleted.store(false, Ordering::Release);
        // Listener closures may own dispatchers; drop them outside the lock.
        drop(callback);
    }

    fn is_recycled(&self) -> bool {
        !self.is_deleted() && self.state.callback.lock().is_none()
    }

    fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("deleted", &self.is_deleted())
            .field("callback", &*self.state.callback.lock())
            .finish()
    }
}
