//! # Pool Registry
//!
//! Process-wide map from a recycled type to its dedicated [`Collection`].
//!
//! ## Locking
//!
//! ```text
//! PoolRegistry
//!   ├── RwLock<HashMap<TypeId, Arc<dyn ErasedCollection>>>   (write: creation only)
//!   └── Collection<T>
//!         └── Mutex<VecDeque<T>>                              (per queue operation)
//! ```
//!
//! Acquire and release take the registry lock for read, clone the collection
//! handle and drop the read guard before touching the queue. No thread ever
//! holds two collection locks at once.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::pool::{Collection, CollectionStats, Recycle};
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::events::Registration;

/// The process-wide registry, created by [`PoolRegistry::install`] or on the
/// first call to [`PoolRegistry::global`].
static GLOBAL: OnceLock<Arc<PoolRegistry>> = OnceLock::new();

/// Type-erased view of a [`Collection`], used for registry-wide operations.
trait ErasedCollection: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn clear(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Recycle> ErasedCollection for Collection<T> {
    fn type_name(&self) -> &'static str {
        Collection::type_name(self)
    }

    fn clear(&self) -> usize {
        Collection::clear(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Registry of per-type recycling collections.
///
/// Collections are created lazily on first use of a type and live until
/// [`PoolRegistry::remove_collection`] or [`PoolRegistry::clear_all`].
///
/// # Example
///
/// ```rust,ignore
/// let pool = PoolRegistry::new();
///
/// let scratch: Vec<u32> = pool.acquire()?;
/// // ... use it ...
/// pool.release(scratch)?;
/// ```
pub struct PoolRegistry {
    /// One collection per recycled type.
    collections: RwLock<HashMap<TypeId, Arc<dyn ErasedCollection>>>,
    /// Strict validation of releases, shared by every collection.
    strict: AtomicBool,
}

impl PoolRegistry {
    /// Creates an empty registry with strict checking disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            strict: AtomicBool::new(false),
        }
    }

    /// Creates a registry from configuration.
    ///
    /// Applies the strict flag and pre-warms the dispatcher's registration
    /// collection.
    ///
    /// # Errors
    ///
    /// See [`PoolRegistry::try_collection`].
    pub fn with_config(config: &PoolConfig) -> PoolResult<Self> {
        let registry = Self::new();
        registry.set_strict(config.strict_checks);
        if config.registration_prewarm > 0 {
            registry.pre_warm::<Registration>(config.registration_prewarm)?;
        }
        Ok(registry)
    }

    /// Installs the process-wide registry.
    ///
    /// This is the explicit initialization point. Call it once at startup,
    /// before anything touches [`PoolRegistry::global`].
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AlreadyInstalled`] if the global registry already
    /// exists, including when it was created lazily by `global()`.
    pub fn install(config: &PoolConfig) -> PoolResult<Arc<Self>> {
        let registry = Arc::new(Self::with_config(config)?);
        GLOBAL
            .set(Arc::clone(&registry))
            .map_err(|_| PoolError::AlreadyInstalled)?;

        tracing::debug!(strict = config.strict_checks, "installed global pool registry");
        Ok(registry)
    }

    /// Returns the process-wide registry.
    ///
    /// Falls back to the default configuration if [`PoolRegistry::install`]
    /// was never called.
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        GLOBAL.get_or_init(|| Arc::new(Self::new()))
    }

    /// Returns whether strict checking is enabled.
    #[inline]
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::Relaxed)
    }

    /// Enables or disables strict checking for every collection.
    #[inline]
    pub fn set_strict(&self, strict: bool) {
        self.strict.store(strict, Ordering::Relaxed);
    }

    /// Returns the number of registered collections.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.read().len()
    }

    /// Returns the collection for `T`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TypeMismatch`] if the slot for `T` holds a
    /// collection of another type.
    pub fn try_collection<T: Recycle>(&self) -> PoolResult<Arc<Collection<T>>> {
        let type_id = TypeId::of::<T>();

        // Fast path: read lock
        let existing = self.collections.read().get(&type_id).cloned();
        let erased = match existing {
            Some(erased) => erased,
            None => {
                let mut collections = self.collections.write();
                Arc::clone(collections.entry(type_id).or_insert_with(|| {
                    tracing::debug!(type_name = std::any::type_name::<T>(), "created collection");
                    let fresh: Arc<dyn ErasedCollection> = Arc::new(Collection::<T>::new());
                    fresh
                }))
            }
        };

        let found = erased.type_name();
        erased
            .into_any()
            .downcast::<Collection<T>>()
            .map_err(|_| PoolError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    /// Takes an idle `T`, or constructs one if its collection is empty.
    ///
    /// # Errors
    ///
    /// See [`PoolRegistry::try_collection`].
    pub fn acquire<T: Recycle>(&self) -> PoolResult<T> {
        Ok(self.try_collection::<T>()?.acquire())
    }

    /// Resets `item` and parks it in its type's collection.
    ///
    /// # Errors
    ///
    /// In strict mode, [`PoolError::DoubleRelease`] and
    /// [`PoolError::NotRecycled`]. See also [`PoolRegistry::try_collection`].
    pub fn release<T: Recycle>(&self, item: T) -> PoolResult<()> {
        self.try_collection::<T>()?.release(item, self.is_strict())
    }

    /// Constructs `count` idle instances of `T` ahead of demand.
    ///
    /// # Errors
    ///
    /// See [`PoolRegistry::try_collection`].
    pub fn pre_warm<T: Recycle>(&self, count: usize) -> PoolResult<()> {
        self.try_collection::<T>()?.pre_warm(count);
        Ok(())
    }

    /// Drops up to `count` idle instances of `T`, returning how many went.
    ///
    /// # Errors
    ///
    /// See [`PoolRegistry::try_collection`].
    pub fn trim<T: Recycle>(&self, count: usize) -> PoolResult<usize> {
        Ok(self.try_collection::<T>()?.trim(count))
    }

    /// Drops every idle instance of `T` but keeps its collection registered.
    ///
    /// # Errors
    ///
    /// See [`PoolRegistry::try_collection`].
    pub fn clear<T: Recycle>(&self) -> PoolResult<usize> {
        Ok(self.try_collection::<T>()?.clear())
    }

    /// Returns the counters of `T`'s collection without creating it.
    #[must_use]
    pub fn stats<T: Recycle>(&self) -> Option<CollectionStats> {
        let erased = self.collections.read().get(&TypeId::of::<T>()).cloned()?;
        erased
            .into_any()
            .downcast::<Collection<T>>()
            .ok()
            .map(|collection| collection.stats())
    }

    /// Clears and unregisters `T`'s collection.
    ///
    /// # Returns
    ///
    /// `true` if a collection existed.
    pub fn remove_collection<T: Recycle>(&self) -> bool {
        let removed = self.collections.write().remove(&TypeId::of::<T>());
        match removed {
            Some(collection) => {
                collection.clear();
                tracing::debug!(type_name = collection.type_name(), "removed collection");
                true
            }
            None => false,
        }
    }

    /// Drops every idle queue and unregisters every collection.
    ///
    /// Teardown entry point for process shutdown and test harnesses.
    /// Instances currently handed out are unaffected and may be released
    /// again later, which recreates their collection.
    pub fn clear_all(&self) {
        let collections = std::mem::take(&mut *self.collections.write());
        let mut dropped = 0;
        for collection in collections.values() {
            dropped += collection.clear();
        }
        tracing::debug!(collections = collections.len(), dropped, "cleared pool registry");
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("collections", &self.collection_count())
            .field("strict", &self.is_strict())
            .finish()
    }
}
