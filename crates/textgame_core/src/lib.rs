//! # TEXTGAME Core
//!
//! Pooled event dispatch for text-game sessions:
//! - A process-wide, type-keyed object pool for short-lived bookkeeping objects
//! - Per-owner event dispatchers that stay consistent while listeners
//!   subscribe and unsubscribe from inside a fire pass
//!
//! ## Architecture Rules
//!
//! 1. **Recycle, don't reallocate** - Registrations and fire snapshots come
//!    from the pool registry and go back to it
//! 2. **Lazy removal** - Unsubscribing flips a flag; lists never shrink under
//!    an in-flight pass
//! 3. **No lock across a listener** - Listeners may re-enter their dispatcher
//!
//! ## Example
//!
//! ```rust,ignore
//! use textgame_core::{Callback, EventDispatcher, PoolConfig, PoolRegistry};
//!
//! PoolRegistry::install(&PoolConfig::from_toml_file("pool.toml")?)?;
//!
//! let session = EventDispatcher::new();
//! let on_input = Callback::unary(|line: &String| println!("> {line}"));
//! session.add_listener(EVENT_INPUT, &on_input)?;
//! session.fire1(EVENT_INPUT, &"look".to_string())?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod events;
pub mod memory;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use events::{Callback, EventDispatcher, EventId, Registration};
pub use memory::{Collection, CollectionStats, PoolRegistry, Recycle};
