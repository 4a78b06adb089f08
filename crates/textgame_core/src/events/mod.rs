//! # Event Dispatch
//!
//! Owner-scoped listener registries built on pooled registrations.
//!
//! ## Design Philosophy
//!
//! - Each owner (a game session, a level) creates its own dispatcher
//! - Removal is lazy: a flag flip, never a length change under iteration
//! - Registrations and fire snapshots are recycled through the pool registry

mod callback;
mod dispatcher;
mod registration;

pub use callback::Callback;
pub use dispatcher::{EventDispatcher, EventId};
pub use registration::Registration;
