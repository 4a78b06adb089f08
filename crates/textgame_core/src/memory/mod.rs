//! # Memory Management
//!
//! Type-keyed recycling of short-lived bookkeeping objects.
//!
//! ## Design Philosophy
//!
//! Objects that are created and discarded at a high rate are parked in a
//! per-type idle queue instead of being dropped:
//! - Acquire pops an idle instance or constructs one on a miss
//! - Release runs the type's reset hook and parks the instance again
//! - Pre-warming moves construction ahead of known load points

mod pool;
mod registry;

pub use pool::{Collection, CollectionStats, Recycle};
pub use registry::PoolRegistry;
