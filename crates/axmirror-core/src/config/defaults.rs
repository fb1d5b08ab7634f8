//! Built-in fallback values for configuration fields.

/// Zero leaves the call timeout to the service.
pub const DEFAULT_MESSAGING_TIMEOUT_MS: u64 = 0;

/// Default bound on concurrent blocking service calls.
pub const DEFAULT_MAX_BLOCKING: usize = 8;
