//! # Configuration System
//!
//! Hierarchical TOML configuration for the mirror.
//!
//! ## Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.axmirror/config.toml`
//! 3. **Project config** - `./.axmirror/config.toml`
//!
//! ## Usage Example
//!
//! ```toml
//! # ~/.axmirror/config.toml
//! [adapter]
//! messaging_timeout_ms = 250
//!
//! [workers]
//! max_blocking = 4
//! ```
//!
//! ```rust,no_run
//! use axmirror_core::config::MirrorConfig;
//!
//! fn example() -> Result<(), axmirror_core::errors::ConfigError> {
//!     let config = MirrorConfig::load_hierarchy()?;
//!     let timeout = config.adapter.messaging_timeout();
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod loading;
pub mod types;

pub use types::{AdapterConfig, MirrorConfig, WorkerConfig};

use crate::errors::ConfigError;

impl MirrorConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }
}

/// Reject configurations the mirror cannot run with.
pub fn validate_config(config: &MirrorConfig) -> Result<(), ConfigError> {
    if config.workers.max_blocking() == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "workers.max_blocking must be greater than zero".to_string(),
        });
    }
    Ok(())
}
