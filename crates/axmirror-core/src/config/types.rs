//! Configuration type definitions.
//!
//! # Example Configuration
//!
//! ```toml
//! [adapter]
//! messaging_timeout_ms = 0
//!
//! [workers]
//! max_blocking = 8
//! ```

use serde::{Deserialize, Serialize};

use crate::adapter::MessagingTimeout;
use crate::config::defaults::{DEFAULT_MAX_BLOCKING, DEFAULT_MESSAGING_TIMEOUT_MS};

/// Configuration loaded from TOML config files.
///
/// Fields left out of a file fall through to the next source in the
/// hierarchy, and finally to the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MirrorConfig {
    #[serde(default)]
    pub adapter: AdapterConfig,

    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Upper bound on a single service call. Zero means the service default,
    /// which is reported as unspecified.
    #[serde(default)]
    pub messaging_timeout_ms: Option<u64>,
}

impl AdapterConfig {
    pub fn messaging_timeout_ms(&self) -> u64 {
        self.messaging_timeout_ms
            .unwrap_or(DEFAULT_MESSAGING_TIMEOUT_MS)
    }

    pub fn messaging_timeout(&self) -> MessagingTimeout {
        MessagingTimeout::from_millis(self.messaging_timeout_ms())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum number of blocking service calls in flight at once.
    #[serde(default)]
    pub max_blocking: Option<usize>,
}

impl WorkerConfig {
    pub fn max_blocking(&self) -> usize {
        self.max_blocking.unwrap_or(DEFAULT_MAX_BLOCKING)
    }
}
