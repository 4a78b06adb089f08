//! # Event Dispatcher
//!
//! Owner-scoped map from an integer event id to an insertion-ordered list of
//! pooled [`Registration`]s.
//!
//! ## Signatures
//!
//! The first listener attached to an event id binds the id to its argument
//! types. Later listeners and fire calls with other argument types are
//! rejected with [`PoolError::SignatureMismatch`]. The binding lasts until
//! the id has no attached registrations left.
//!
//! ## Re-entrancy
//!
//! Listeners routinely subscribe, unsubscribe (themselves or others) and fire
//! further events from inside a fire pass:
//!
//! ```text
//! fire(id)
//!   ├── lock table, snapshot live registrations into a pooled Vec, unlock
//!   ├── for each snapshot entry: skip if deleted by now, else invoke
//!   └── release snapshot; if outermost pass, release retired registrations
//! ```
//!
//! - Removal only flips a flag, so it is visible to the in-flight pass.
//! - Appends land in the table, not the snapshot, so they wait for the next pass.
//! - Deleted registrations of an id are detached at the start of the next
//!   add or remove on that id, unless a pass is running.
//! - Teardown and compaction detach registrations immediately but park them;
//!   they return to the pool only once no pass is running.
//!
//! No lock is held while a listener runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::callback::{Callback, Signature};
use super::registration::Registration;
use crate::error::{PoolError, PoolResult};
use crate::memory::PoolRegistry;

/// Integer event identifier.
pub type EventId = i32;

/// Registrations attached to one event id.
struct EventListeners {
    /// Bound by the first listener.
    signature: Signature,
    /// Insertion order.
    registrations: Vec<Registration>,
}

#[derive(Default)]
struct ListenerTable {
    listeners: HashMap<EventId, EventListeners>,
    /// Detached registrations waiting for the current fire pass to end.
    retired: Vec<Registration>,
}

impl ListenerTable {
    /// Fails if `event` is bound to a different signature.
    fn check_signature(&self, event: EventId, found: Signature) -> PoolResult<()> {
        match self.listeners.get(&event) {
            Some(entry) if entry.signature != found => {
                tracing::warn!(
                    event,
                    expected = entry.signature.name(),
                    found = found.name(),
                    "rejected mismatched signature"
                );
                Err(PoolError::SignatureMismatch {
                    event,
                    expected: entry.signature.name(),
                    found: found.name(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Returns the registration under `event` holding `callback`, live or not.
    fn holder(&self, event: EventId, callback: &Callback) -> Option<&Registration> {
        self.listeners
            .get(&event)?
            .registrations
            .iter()
            .find(|reg| reg.holds(callback))
    }

    fn attach(&mut self, event: EventId, signature: Signature, registration: Registration) {
        self.listeners
            .entry(event)
            .or_insert_with(|| EventListeners {
                signature,
                registrations: Vec::new(),
            })
            .registrations
            .push(registration);
    }

    /// Moves the deleted registrations of `event` to the retired list and
    /// unbinds the id if nothing is left. Returns how many moved.
    fn retire_deleted(&mut self, event: EventId) -> usize {
        let Self { listeners, retired } = self;
        let Some(entry) = listeners.get_mut(&event) else {
            return 0;
        };

        let before = retired.len();
        entry.registrations.retain(|reg| {
            if reg.is_deleted() {
                retired.push(reg.clone());
                false
            } else {
                true
            }
        });
        let emptied = entry.registrations.is_empty();

        if emptied {
            listeners.remove(&event);
        }
        retired.len() - before
    }
}

/// Marks a fire pass in progress for as long as it lives.
struct FirePass<'a> {
    firing: &'a AtomicUsize,
}

impl Drop for FirePass<'_> {
    fn drop(&mut self) {
        self.firing.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Per-owner event dispatcher backed by pooled registrations.
///
/// One dispatcher belongs to one owner (a running game session, say). All
/// methods take `&self`, so listeners holding a handle to the dispatcher may
/// call back into it while an event is being fired.
///
/// # Example
///
/// ```rust,ignore
/// const EVENT_TURN_ENDED: EventId = 1;
///
/// let dispatcher = EventDispatcher::new();
/// let on_turn = Callback::unary(|turn: &u32| println!("turn {turn} ended"));
///
/// dispatcher.add_listener(EVENT_TURN_ENDED, &on_turn)?;
/// dispatcher.fire1(EVENT_TURN_ENDED, &7u32)?;
///
/// // Bound to `(u32,)` now
/// assert!(dispatcher.fire(EVENT_TURN_ENDED).is_err());
///
/// // Registrations go back to the pool
/// dispatcher.teardown()?;
/// ```
pub struct EventDispatcher {
    /// Source of registrations and fire snapshots.
    pool: Arc<PoolRegistry>,
    /// Listener table and parked registrations.
    table: Mutex<ListenerTable>,
    /// Number of fire passes currently running.
    firing: AtomicUsize,
}

impl EventDispatcher {
    /// Creates a dispatcher backed by the process-wide pool registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(Arc::clone(PoolRegistry::global()))
    }

    /// Creates a dispatcher backed by `pool`.
    #[must_use]
    pub fn with_pool(pool: Arc<PoolRegistry>) -> Self {
        Self {
            pool,
            table: Mutex::new(ListenerTable::default()),
            firing: AtomicUsize::new(0),
        }
    }

    /// Returns the pool registry backing this dispatcher.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<PoolRegistry> {
        &self.pool
    }

    /// Returns `true` while at least one fire pass is running.
    #[inline]
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.firing.load(Ordering::Acquire) > 0
    }

    /// Returns the number of live listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: EventId) -> usize {
        self.table.lock().listeners.get(&event).map_or(0, |entry| {
            entry.registrations.iter().filter(|reg| reg.is_live()).count()
        })
    }

    /// Returns the number of event ids with attached registrations.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.table.lock().listeners.len()
    }

    /// Subscribes `callback` to `event`.
    ///
    /// If a registration under `event` already holds this handle it is made
    /// live again instead of appending a duplicate. Otherwise a registration
    /// is taken from the pool and appended. Outside a fire pass, deleted
    /// registrations of `event` go back to the pool first.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SignatureMismatch`] if `event` is bound to other
    /// argument types. Propagates pool errors.
    pub fn add_listener(&self, event: EventId, callback: &Callback) -> PoolResult<()> {
        let signature = callback.signature();

        let revived = {
            let mut table = self.table.lock();
            let revived = table
                .holder(event, callback)
                .map(Registration::revive)
                .is_some();
            if !self.is_firing() {
                table.retire_deleted(event);
            }
            if revived {
                Ok(true)
            } else {
                table.check_signature(event, signature).map(|()| false)
            }
        };
        self.flush_retired()?;
        if revived? {
            return Ok(());
        }

        let registration: Registration = self.pool.acquire()?;
        registration.fill(callback.clone());

        // Re-checked: a listener may have changed the table while it was unlocked.
        let (spare, outcome) = {
            let mut table = self.table.lock();
            if let Err(err) = table.check_signature(event, signature) {
                (Some(registration), Err(err))
            } else if table
                .holder(event, callback)
                .map(Registration::revive)
                .is_some()
            {
                (Some(registration), Ok(()))
            } else {
                table.attach(event, signature, registration);
                (None, Ok(()))
            }
        };

        if let Some(spare) = spare {
            self.pool.release(spare)?;
        }
        outcome
    }

    /// Unsubscribes `callback` from `event`.
    ///
    /// The registration is only marked deleted. The list keeps its length and
    /// the registration stays attached until the next add or remove on
    /// `event` outside a fire pass, [`EventDispatcher::compact`] or
    /// [`EventDispatcher::teardown`].
    ///
    /// # Returns
    ///
    /// `true` if a live registration was found.
    ///
    /// # Errors
    ///
    /// Propagates strict-mode release errors.
    pub fn remove_listener(&self, event: EventId, callback: &Callback) -> PoolResult<bool> {
        let removed = {
            let mut table = self.table.lock();
            if !self.is_firing() {
                table.retire_deleted(event);
            }
            table
                .listeners
                .get(&event)
                .and_then(|entry| {
                    entry
                        .registrations
                        .iter()
                        .find(|reg| !reg.is_deleted() && reg.holds(callback))
                })
                .is_some_and(Registration::mark_deleted)
        };

        self.flush_retired()?;
        Ok(removed)
    }

    /// Unsubscribes every listener of `event`, lazily.
    ///
    /// # Returns
    ///
    /// The number of listeners that were live.
    pub fn remove_all_listeners(&self, event: EventId) -> usize {
        let table = self.table.lock();
        table.listeners.get(&event).map_or(0, |entry| {
            entry
                .registrations
                .iter()
                .filter(|reg| reg.mark_deleted())
                .count()
        })
    }

    /// Fires `event` to its nullary listeners.
    ///
    /// # Returns
    ///
    /// The number of listeners invoked.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SignatureMismatch`] if `event` is bound to
    /// listeners taking arguments. Propagates pool errors from the snapshot
    /// buffer or parked releases.
    pub fn fire(&self, event: EventId) -> PoolResult<usize> {
        self.dispatch(event, Signature::of::<()>(), Callback::call0)
    }

    /// Fires `event` to its unary listeners taking `&A`.
    ///
    /// # Errors
    ///
    /// See [`EventDispatcher::fire`].
    pub fn fire1<A: 'static>(&self, event: EventId, a: &A) -> PoolResult<usize> {
        self.dispatch(event, Signature::of::<(A,)>(), |callback| callback.call1(a))
    }

    /// Fires `event` to its binary listeners taking `(&A, &B)`.
    ///
    /// # Errors
    ///
    /// See [`EventDispatcher::fire`].
    pub fn fire2<A: 'static, B: 'static>(&self, event: EventId, a: &A, b: &B) -> PoolResult<usize> {
        self.dispatch(event, Signature::of::<(A, B)>(), |callback| callback.call2(a, b))
    }

    /// Fires `event` to its ternary listeners taking `(&A, &B, &C)`.
    ///
    /// # Errors
    ///
    /// See [`EventDispatcher::fire`].
    pub fn fire3<A: 'static, B: 'static, C: 'static>(
        &self,
        event: EventId,
        a: &A,
        b: &B,
        c: &C,
    ) -> PoolResult<usize> {
        self.dispatch(event, Signature::of::<(A, B, C)>(), |callback| {
            callback.call3(a, b, c)
        })
    }

    /// Detaches deleted registrations and returns them to the pool.
    ///
    /// Inside a fire pass the detached registrations are parked and released
    /// when the outermost pass ends.
    ///
    /// # Returns
    ///
    /// The number of registrations detached.
    ///
    /// # Errors
    ///
    /// Propagates strict-mode release errors.
    pub fn compact(&self) -> PoolResult<usize> {
        let compacted = {
            let mut table = self.table.lock();
            let ListenerTable { listeners, retired } = &mut *table;
            let before = retired.len();
            listeners.retain(|_, entry| {
                entry.registrations.retain(|reg| {
                    if reg.is_deleted() {
                        retired.push(reg.clone());
                        false
                    } else {
                        true
                    }
                });
                !entry.registrations.is_empty()
            });
            retired.len() - before
        };

        self.flush_retired()?;
        Ok(compacted)
    }

    /// Returns every registration, live or deleted, to the pool and clears
    /// the table. The dispatcher can be reused afterwards.
    ///
    /// # Returns
    ///
    /// The number of registrations detached.
    ///
    /// # Errors
    ///
    /// Propagates strict-mode release errors.
    pub fn teardown(&self) -> PoolResult<usize> {
        let detached = {
            let mut table = self.table.lock();
            let ListenerTable { listeners, retired } = &mut *table;
            let mut detached = 0;
            for (_, entry) in listeners.drain() {
                detached += entry.registrations.len();
                for registration in entry.registrations {
                    registration.mark_deleted();
                    retired.push(registration);
                }
            }
            detached
        };

        self.flush_retired()?;
        Ok(detached)
    }

    fn dispatch<F>(&self, event: EventId, signature: Signature, mut invoke: F) -> PoolResult<usize>
    where
        F: FnMut(&Callback) -> bool,
    {
        let mut pass: Vec<Registration> = self.pool.acquire()?;
        let checked = {
            let table = self.table.lock();
            let checked = table.check_signature(event, signature);
            if checked.is_ok() {
                if let Some(entry) = table.listeners.get(&event) {
                    pass.extend(entry.registrations.iter().filter(|reg| reg.is_live()).cloned());
                }
                if !pass.is_empty() {
                    self.firing.fetch_add(1, Ordering::AcqRel);
                }
            }
            checked
        };

        if checked.is_err() || pass.is_empty() {
            self.pool.release(pass)?;
            return checked.map(|()| 0);
        }

        let guard = FirePass {
            firing: &self.firing,
        };

        let mut invoked = 0;
        for registration in &pass {
            // Removed earlier in this pass.
            let Some(callback) = registration.live_callback() else {
                continue;
            };
            if invoke(&callback) {
                invoked += 1;
            }
        }

        self.pool.release(pass)?;
        drop(guard);
        self.flush_retired()?;
        Ok(invoked)
    }

    /// Releases parked registrations unless a fire pass is running.
    ///
    /// Every parked registration is offered to the pool even if an earlier
    /// one is rejected; the first rejection is returned.
    fn flush_retired(&self) -> PoolResult<()> {
        let retired = {
            let mut table = self.table.lock();
            if self.firing.load(Ordering::Acquire) > 0 || table.retired.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut table.retired)
        };

        tracing::trace!(count = retired.len(), "releasing retired registrations");
        let mut outcome = Ok(());
        for registration in retired {
            if let Err(err) = self.pool.release(registration) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(%err, "dispatcher teardown on drop failed");
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("events", &self.event_count())
            .field("firing", &self.is_firing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{OnceLock, Weak};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn setup() -> (Arc<PoolRegistry>, Arc<EventDispatcher>) {
        let pool = Arc::new(PoolRegistry::new());
        pool.set_strict(true);
        let dispatcher = Arc::new(EventDispatcher::with_pool(Arc::clone(&pool)));
        (pool, dispatcher)
    }

    fn logger(log: &Log, name: &'static str) -> Callback {
        let log = Arc::clone(log);
        Callback::nullary(move || log.lock().push(name))
    }

    fn created_registrations(pool: &PoolRegistry) -> u64 {
        pool.stats::<Registration>().map_or(0, |stats| stats.created)
    }

    #[test]
    fn test_dispatch_in_insertion_order() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();

        for name in ["a", "b", "c"] {
            dispatcher.add_listener(1, &logger(&log, name)).unwrap();
        }

        assert_eq!(dispatcher.fire(1).unwrap(), 3);
        assert_eq!(*log.lock(), ["a", "b", "c"]);
    }

    #[test]
    fn test_add_listener_is_idempotent() {
        let (pool, dispatcher) = setup();
        let log = Log::default();
        let f = logger(&log, "f");

        dispatcher.add_listener(1, &f).unwrap();
        dispatcher.add_listener(1, &f).unwrap();

        assert_eq!(dispatcher.listener_count(1), 1);
        assert_eq!(created_registrations(&pool), 1);
        assert_eq!(dispatcher.fire(1).unwrap(), 1);
    }

    #[test]
    fn test_readd_revives_deleted_registration() {
        let (pool, dispatcher) = setup();
        let log = Log::default();
        let f = logger(&log, "f");

        dispatcher.add_listener(1, &f).unwrap();
        assert!(dispatcher.remove_listener(1, &f).unwrap());
        assert_eq!(dispatcher.listener_count(1), 0);

        dispatcher.add_listener(1, &f).unwrap();
        assert_eq!(dispatcher.listener_count(1), 1);
        // Revived in place, no second registration.
        assert_eq!(created_registrations(&pool), 1);
    }

    #[test]
    fn test_noop_conditions() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();
        let f = logger(&log, "f");

        assert!(!dispatcher.remove_listener(9, &f).unwrap());
        assert_eq!(dispatcher.fire(9).unwrap(), 0);
        assert_eq!(dispatcher.event_count(), 0);

        dispatcher.add_listener(1, &f).unwrap();
        assert!(dispatcher.remove_listener(1, &f).unwrap());
        assert!(!dispatcher.remove_listener(1, &f).unwrap());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_self_removal_during_fire() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();
        let slot: Arc<OnceLock<Callback>> = Arc::new(OnceLock::new());

        let f = {
            let log = Arc::clone(&log);
            let slot = Arc::clone(&slot);
            let weak: Weak<EventDispatcher> = Arc::downgrade(&dispatcher);
            Callback::nullary(move || {
                log.lock().push("f");
                if let (Some(dispatcher), Some(me)) = (weak.upgrade(), slot.get()) {
                    dispatcher.remove_listener(5, me).unwrap();
                }
            })
        };
        assert!(slot.set(f.clone()).is_ok());

        dispatcher.add_listener(5, &f).unwrap();
        dispatcher.add_listener(5, &logger(&log, "g")).unwrap();

        assert_eq!(dispatcher.fire(5).unwrap(), 2);
        assert_eq!(dispatcher.fire(5).unwrap(), 1);
        assert_eq!(*log.lock(), ["f", "g", "g"]);
    }

    #[test]
    fn test_removal_of_later_listener_is_seen_by_pass() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();
        let g = logger(&log, "g");

        let f = {
            let log = Arc::clone(&log);
            let g = g.clone();
            let weak = Arc::downgrade(&dispatcher);
            Callback::nullary(move || {
                log.lock().push("f");
                if let Some(dispatcher) = weak.upgrade() {
                    dispatcher.remove_listener(5, &g).unwrap();
                }
            })
        };

        dispatcher.add_listener(5, &f).unwrap();
        dispatcher.add_listener(5, &g).unwrap();

        assert_eq!(dispatcher.fire(5).unwrap(), 1);
        assert_eq!(*log.lock(), ["f"]);
    }

    #[test]
    fn test_append_during_fire_is_deferred() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();
        let late = logger(&log, "late");

        let f = {
            let log = Arc::clone(&log);
            let late = late.clone();
            let weak = Arc::downgrade(&dispatcher);
            Callback::nullary(move || {
                log.lock().push("f");
                if let Some(dispatcher) = weak.upgrade() {
                    dispatcher.add_listener(3, &late).unwrap();
                }
            })
        };

        dispatcher.add_listener(3, &f).unwrap();
        assert_eq!(dispatcher.fire(3).unwrap(), 1);
        assert_eq!(*log.lock(), ["f"]);

        assert_eq!(dispatcher.fire(3).unwrap(), 2);
        assert_eq!(*log.lock(), ["f", "f", "late"]);
    }

    #[test]
    fn test_nested_fire() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();

        let outer = {
            let log = Arc::clone(&log);
            let weak = Arc::downgrade(&dispatcher);
            Callback::nullary(move || {
                log.lock().push("outer");
                if let Some(dispatcher) = weak.upgrade() {
                    assert!(dispatcher.is_firing());
                    dispatcher.fire(2).unwrap();
                }
            })
        };

        dispatcher.add_listener(1, &outer).unwrap();
        dispatcher.add_listener(2, &logger(&log, "inner")).unwrap();

        dispatcher.fire(1).unwrap();
        assert_eq!(*log.lock(), ["outer", "inner"]);
        assert!(!dispatcher.is_firing());
    }

    #[test]
    fn test_typed_arities() {
        let (_pool, dispatcher) = setup();
        let total = Arc::new(Mutex::new(0i64));

        let unary = {
            let total = Arc::clone(&total);
            Callback::unary(move |n: &i64| *total.lock() += n)
        };
        let binary = {
            let total = Arc::clone(&total);
            Callback::binary(move |a: &i64, b: &i64| *total.lock() += a * b)
        };
        let ternary = {
            let total = Arc::clone(&total);
            Callback::ternary(move |a: &i64, b: &i64, label: &String| {
                *total.lock() += a + b + i64::try_from(label.len()).unwrap();
            })
        };

        dispatcher.add_listener(7, &unary).unwrap();
        dispatcher.add_listener(8, &binary).unwrap();
        dispatcher.add_listener(9, &ternary).unwrap();

        assert_eq!(dispatcher.fire1(7, &10i64).unwrap(), 1);
        assert_eq!(dispatcher.fire2(8, &2i64, &3i64).unwrap(), 1);
        assert_eq!(dispatcher.fire3(9, &1i64, &1i64, &"xy".to_string()).unwrap(), 1);
        assert_eq!(*total.lock(), 10 + 6 + 4);
    }

    #[test]
    fn test_event_bound_to_first_signature() {
        let (pool, dispatcher) = setup();
        let hits = Arc::new(Mutex::new(0u32));
        let unary = {
            let hits = Arc::clone(&hits);
            Callback::unary(move |n: &u32| *hits.lock() += n)
        };

        dispatcher.add_listener(7, &unary).unwrap();

        let err = dispatcher
            .add_listener(7, &Callback::nullary(|| {}))
            .unwrap_err();
        assert!(matches!(err, PoolError::SignatureMismatch { event: 7, .. }));
        assert!(matches!(
            dispatcher.add_listener(7, &Callback::unary(|_: &u64| {})),
            Err(PoolError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            dispatcher.fire(7),
            Err(PoolError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            dispatcher.fire1(7, &1u64),
            Err(PoolError::SignatureMismatch { .. })
        ));
        assert!(matches!(
            dispatcher.fire2(7, &1u32, &2u32),
            Err(PoolError::SignatureMismatch { .. })
        ));
        assert_eq!(*hits.lock(), 0);

        // Rejected listeners were never attached.
        assert_eq!(dispatcher.listener_count(7), 1);
        assert_eq!(created_registrations(&pool), 1);
        assert_eq!(dispatcher.fire1(7, &3u32).unwrap(), 1);
        assert_eq!(*hits.lock(), 3);

        // Unregistered ids are not bound to anything.
        assert_eq!(dispatcher.fire2(99, &1u8, &2u8).unwrap(), 0);
    }

    #[test]
    fn test_signature_unbound_once_event_is_empty() {
        let (_pool, dispatcher) = setup();
        let unary = Callback::unary(|_: &u32| {});
        let nullary = Callback::nullary(|| {});

        dispatcher.add_listener(7, &unary).unwrap();
        assert!(dispatcher.remove_listener(7, &unary).unwrap());

        // The deleted registration is detached first, which frees the id.
        dispatcher.add_listener(7, &nullary).unwrap();
        assert_eq!(dispatcher.fire(7).unwrap(), 1);
        assert!(dispatcher.fire1(7, &1u32).is_err());
    }

    #[test]
    fn test_churn_reuses_registrations() {
        let (pool, dispatcher) = setup();
        let log = Log::default();

        for _ in 0..1000 {
            let fresh = logger(&log, "fresh");
            dispatcher.add_listener(1, &fresh).unwrap();
            assert!(dispatcher.remove_listener(1, &fresh).unwrap());
        }

        assert_eq!(created_registrations(&pool), 1);
        assert!(dispatcher.event_count() <= 1);
        let stats = pool.stats::<Registration>().unwrap();
        assert_eq!(stats.released, 999);
    }

    #[test]
    fn test_removal_during_fire_is_not_compacted() {
        let (pool, dispatcher) = setup();
        let log = Log::default();
        let g = logger(&log, "g");

        let f = {
            let g = g.clone();
            let weak = Arc::downgrade(&dispatcher);
            Callback::nullary(move || {
                if let Some(dispatcher) = weak.upgrade() {
                    dispatcher.remove_listener(2, &g).unwrap();
                    // Another add on the same id mid-pass must not detach `g`.
                    dispatcher.add_listener(2, &g).unwrap();
                    dispatcher.remove_listener(2, &g).unwrap();
                }
            })
        };

        dispatcher.add_listener(2, &f).unwrap();
        dispatcher.add_listener(2, &g).unwrap();

        assert_eq!(dispatcher.fire(2).unwrap(), 1);
        assert!(log.lock().is_empty());
        assert_eq!(pool.stats::<Registration>().unwrap().released, 0);
    }

    #[test]
    fn test_flush_releases_whole_batch() {
        let (pool, dispatcher) = setup();
        let parked: Registration = pool.acquire().unwrap();
        let alias = parked.clone();
        pool.release(parked).unwrap();

        dispatcher.table.lock().retired = vec![alias, Registration::default(), Registration::default()];

        assert!(matches!(
            dispatcher.flush_retired(),
            Err(PoolError::DoubleRelease { .. })
        ));
        let stats = pool.stats::<Registration>().unwrap();
        assert_eq!(stats.idle, 3);
        assert_eq!(stats.released, 3);
        assert!(dispatcher.table.lock().retired.is_empty());
    }

    #[test]
    fn test_remove_all_listeners() {
        let (_pool, dispatcher) = setup();
        let log = Log::default();

        dispatcher.add_listener(4, &logger(&log, "a")).unwrap();
        dispatcher.add_listener(4, &logger(&log, "b")).unwrap();

        assert_eq!(dispatcher.remove_all_listeners(4), 2);
        assert_eq!(dispatcher.remove_all_listeners(4), 0);
        assert_eq!(dispatcher.fire(4).unwrap(), 0);
        // Still attached until compaction.
        assert_eq!(dispatcher.event_count(), 1);
    }

    #[test]
    fn test_compact_returns_deleted_to_pool() {
        let (pool, dispatcher) = setup();
        let log = Log::default();
        let a = logger(&log, "a");

        dispatcher.add_listener(1, &a).unwrap();
        dispatcher.add_listener(1, &logger(&log, "b")).unwrap();
        assert!(dispatcher.remove_listener(1, &a).unwrap());

        assert_eq!(dispatcher.compact().unwrap(), 1);
        assert_eq!(dispatcher.listener_count(1), 1);
        assert_eq!(pool.stats::<Registration>().unwrap().idle, 1);

        dispatcher.remove_all_listeners(1);
        assert_eq!(dispatcher.compact().unwrap(), 1);
        assert_eq!(dispatcher.event_count(), 0);
    }

    #[test]
    fn test_teardown_during_fire_is_deferred() {
        let (pool, dispatcher) = setup();
        let log = Log::default();

        let f = {
            let log = Arc::clone(&log);
            let weak = Arc::downgrade(&dispatcher);
            Callback::nullary(move || {
                log.lock().push("f");
                if let Some(dispatcher) = weak.upgrade() {
                    assert_eq!(dispatcher.teardown().unwrap(), 2);
                    // Parked until the pass ends.
                    assert_eq!(dispatcher.pool().stats::<Registration>().unwrap().idle, 0);
                }
            })
        };

        dispatcher.add_listener(1, &f).unwrap();
        dispatcher.add_listener(1, &logger(&log, "g")).unwrap();

        assert_eq!(dispatcher.fire(1).unwrap(), 1);
        assert_eq!(*log.lock(), ["f"]);
        assert_eq!(pool.stats::<Registration>().unwrap().idle, 2);
        assert_eq!(dispatcher.event_count(), 0);
    }

    #[test]
    fn test_teardown_returns_registrations() {
        let (pool, dispatcher) = setup();
        let log = Log::default();

        for event in 0..4 {
            dispatcher.add_listener(event, &logger(&log, "x")).unwrap();
        }
        assert!(!dispatcher.remove_listener(0, &logger(&log, "unrelated")).unwrap());

        assert_eq!(dispatcher.teardown().unwrap(), 4);
        assert_eq!(dispatcher.event_count(), 0);
        assert_eq!(dispatcher.fire(0).unwrap(), 0);

        let stats = pool.stats::<Registration>().unwrap();
        assert_eq!(stats.idle, 4);
        assert_eq!(stats.created, 4);

        // Reusable afterwards, with no new construction.
        for event in 0..4 {
            dispatcher.add_listener(event, &logger(&log, "y")).unwrap();
        }
        assert_eq!(created_registrations(&pool), 4);
    }

    #[test]
    fn test_drop_tears_down() {
        let pool = Arc::new(PoolRegistry::new());
        {
            let dispatcher = EventDispatcher::with_pool(Arc::clone(&pool));
            dispatcher.add_listener(1, &Callback::nullary(|| {})).unwrap();
            dispatcher.add_listener(2, &Callback::nullary(|| {})).unwrap();
        }
        assert_eq!(pool.stats::<Registration>().unwrap().idle, 2);
    }

    #[test]
    fn test_fire_snapshot_buffer_is_pooled() {
        let (pool, dispatcher) = setup();
        let log = Log::default();
        dispatcher.add_listener(1, &logger(&log, "a")).unwrap();

        for _ in 0..10 {
            dispatcher.fire(1).unwrap();
        }

        let stats = pool.stats::<Vec<Registration>>().unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 9);
    }
}
