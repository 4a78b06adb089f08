//! # Pool Error Types
//!
//! All errors that can occur in the pool registry and the event dispatcher.
//!
//! Every variant is a programming or configuration mistake. Nothing here is
//! transient, so nothing is ever retried.

use thiserror::Error;

use crate::events::EventId;

/// Errors that can occur while pooling objects or dispatching events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A typed request reached a collection bound to a different type.
    #[error("collection type mismatch: requested {expected}, collection holds {found}")]
    TypeMismatch {
        /// The type the caller asked for.
        expected: &'static str,
        /// The type the collection was created for.
        found: &'static str,
    },

    /// An instance was released while it already sat in the idle queue.
    ///
    /// Only reported when strict checking is enabled.
    #[error("double release: instance of {type_name} is already pooled")]
    DoubleRelease {
        /// The pooled type.
        type_name: &'static str,
    },

    /// The reset hook ran but the instance still reports live state.
    ///
    /// Only reported when strict checking is enabled.
    #[error("reset hook left an instance of {type_name} dirty")]
    NotRecycled {
        /// The pooled type.
        type_name: &'static str,
    },

    /// A listener or fire call does not match the argument types bound to
    /// its event id by the event's first listener.
    #[error("event {event} takes {expected}, got {found}")]
    SignatureMismatch {
        /// The event id.
        event: EventId,
        /// Argument tuple bound to the event.
        expected: &'static str,
        /// Argument tuple of the rejected listener or fire call.
        found: &'static str,
    },

    /// The process-wide registry was installed (or lazily created) already.
    #[error("the global pool registry is already installed")]
    AlreadyInstalled,

    /// Invalid configuration input.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for pool and dispatcher operations.
pub type PoolResult<T> = Result<T, PoolError>;
