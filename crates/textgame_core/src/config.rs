//! # Pool Configuration
//!
//! Loaded once at startup, before the global registry is installed.
//!
//! ```toml
//! strict_checks = true
//! registration_prewarm = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Startup configuration for a [`PoolRegistry`](crate::PoolRegistry).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Validate every release: reject double releases and instances whose
    /// reset hook left them dirty. Off by default for throughput.
    pub strict_checks: bool,
    /// Listener registrations to construct up front.
    pub registration_prewarm: usize,
}

impl PoolConfig {
    /// Development config: strict checks on, nothing pre-warmed.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            strict_checks: true,
            registration_prewarm: 0,
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the text is not valid TOML or
    /// a key has the wrong type.
    pub fn from_toml_str(text: &str) -> PoolResult<Self> {
        toml::from_str(text).map_err(|err| PoolError::InvalidConfig(err.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| PoolError::InvalidConfig(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
