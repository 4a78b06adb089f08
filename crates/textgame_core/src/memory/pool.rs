//! # Recycling Collections
//!
//! A [`Collection`] is a thread-safe queue of idle instances of one concrete
//! type. Instances are popped on acquire, reset and pushed back on release.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{PoolError, PoolResult};

/// A type whose instances can be parked in a [`Collection`] and reused.
///
/// Construction goes through [`Default`], so a type that cannot be built
/// without arguments is rejected at compile time rather than at acquire.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct PathScratch { nodes: Vec<u32> }
///
/// impl Recycle for PathScratch {
///     fn recycle(&mut self) { self.nodes.clear(); }
///     fn is_recycled(&self) -> bool { self.nodes.is_empty() }
/// }
/// ```
pub trait Recycle: Default + Send + 'static {
    /// Resets the instance to its idle state. Runs on every release.
    fn recycle(&mut self);

    /// Returns `true` if the instance is in its idle state.
    ///
    /// Checked after [`Recycle::recycle`] when strict checking is enabled.
    fn is_recycled(&self) -> bool {
        true
    }

    /// Returns `true` if `self` and `other` are the same physical instance.
    ///
    /// Uniquely owned values can never be released twice, so the default
    /// reports no aliasing. Shared handles override this with pointer identity.
    fn same_instance(&self, _other: &Self) -> bool {
        false
    }
}

impl<T: Send + 'static> Recycle for Vec<T> {
    #[inline]
    fn recycle(&mut self) {
        self.clear();
    }

    #[inline]
    fn is_recycled(&self) -> bool {
        self.is_empty()
    }
}

/// Counters describing the traffic through one collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Instances currently waiting in the idle queue.
    pub idle: usize,
    /// Instances constructed by acquire misses or pre-warming.
    pub created: u64,
    /// Acquires served from the idle queue.
    pub reused: u64,
    /// Successful releases.
    pub released: u64,
}

/// Idle queue for a single recycled type.
///
/// The queue is guarded by its own mutex. The lock is held only for the
/// queue operation itself: construction, reset hooks and destructors all run
/// outside of it, so a destructor that releases into another collection (or
/// this one) cannot deadlock.
pub struct Collection<T: Recycle> {
    /// Idle instances, reused in FIFO order.
    idle: Mutex<VecDeque<T>>,
    /// Instances constructed by this collection.
    created: AtomicU64,
    /// Acquires served from the idle queue.
    reused: AtomicU64,
    /// Successful releases.
    released: AtomicU64,
}

impl<T: Recycle> Collection<T> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Returns the name of the type this collection serves.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    /// Returns the number of idle instances.
    #[inline]
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Returns a snapshot of the collection counters.
    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            idle: self.idle_count(),
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }

    /// Takes an idle instance, or constructs a fresh one if none is parked.
    pub fn acquire(&self) -> T {
        let parked = self.idle.lock().pop_front();
        if let Some(item) = parked {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return item;
        }

        self.created.fetch_add(1, Ordering::Relaxed);
        T::default()
    }

    /// Resets `item` and parks it in the idle queue.
    ///
    /// # Arguments
    ///
    /// * `item` - The instance to recycle
    /// * `strict` - Verify the reset hook and reject double releases
    ///
    /// # Errors
    ///
    /// With `strict` set, returns [`PoolError::NotRecycled`] if the reset hook
    /// left the instance dirty and [`PoolError::DoubleRelease`] if the same
    /// instance is already parked. Without `strict` this never fails.
    pub fn release(&self, mut item: T, strict: bool) -> PoolResult<()> {
        item.recycle();

        if strict && !item.is_recycled() {
            tracing::warn!(type_name = self.type_name(), "rejected release of dirty instance");
            return Err(PoolError::NotRecycled {
                type_name: self.type_name(),
            });
        }

        let mut idle = self.idle.lock();
        // O(n) scan, strict mode only.
        if strict && idle.iter().any(|parked| parked.same_instance(&item)) {
            drop(idle);
            tracing::warn!(type_name = self.type_name(), "rejected double release");
            return Err(PoolError::DoubleRelease {
                type_name: self.type_name(),
            });
        }
        idle.push_back(item);
        drop(idle);

        self.released.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Constructs `count` fresh instances and parks them.
    ///
    /// Used ahead of known load spikes so acquires there never construct.
    pub fn pre_warm(&self, count: usize) {
        if count == 0 {
            return;
        }

        let fresh: Vec<T> = (0..count).map(|_| T::default()).collect();
        self.idle.lock().extend(fresh);
        self.created.fetch_add(count as u64, Ordering::Relaxed);
        tracing::trace!(type_name = self.type_name(), count, "pre-warmed collection");
    }

    /// Drops up to `count` idle instances.
    ///
    /// Instances currently handed out are invisible to the collection and are
    /// never affected.
    ///
    /// # Returns
    ///
    /// The number of instances dropped.
    pub fn trim(&self, count: usize) -> usize {
        let dropped: Vec<T> = {
            let mut idle = self.idle.lock();
            let count = count.min(idle.len());
            idle.drain(..count).collect()
        };

        let trimmed = dropped.len();
        drop(dropped);
        tracing::trace!(type_name = self.type_name(), trimmed, "trimmed collection");
        trimmed
    }

    /// Drops every idle instance.
    ///
    /// # Returns
    ///
    /// The number of instances dropped.
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.idle.lock());
        let cleared = dropped.len();
        drop(dropped);
        cleared
    }
}

impl<T: Recycle> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Recycle> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("type_name", &self.type_name())
            .field("stats", &self.stats())
            .finish()
    }
}
