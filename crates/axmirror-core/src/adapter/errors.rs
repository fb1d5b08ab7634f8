use std::time::Duration;

use tracing::warn;

use crate::errors::MirrorError;
use crate::service::{Attribute, ElementRef, ServiceFault};

/// Closed set of failures surfaced to consumers of the mirror.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("Service did not respond within {}", describe_timeout(.timeout))]
    Timeout { timeout: Option<Duration> },

    #[error("Object is no longer valid: {cause}")]
    InvalidObject { cause: String },

    #[error("Value rejected as illegal for the attribute")]
    IllegalValue,

    #[error("Service reported a failure: {cause}")]
    AdapterFailure { cause: String },
}

fn describe_timeout(timeout: &Option<Duration>) -> String {
    match timeout {
        Some(duration) => format!("{}ms", duration.as_millis()),
        None => "the unspecified service timeout".to_string(),
    }
}

impl AdapterError {
    pub fn invalid_object(cause: impl Into<String>) -> Self {
        AdapterError::InvalidObject {
            cause: cause.into(),
        }
    }

    pub fn is_invalid_object(&self) -> bool {
        matches!(self, AdapterError::InvalidObject { .. })
    }

    /// Error used when initialization of a cell fails: timeouts and invalid
    /// objects pass through, everything else becomes an invalid object.
    pub(crate) fn into_initialization_error(self) -> Self {
        match self {
            AdapterError::Timeout { .. } | AdapterError::InvalidObject { .. } => self,
            other => AdapterError::InvalidObject {
                cause: other.to_string(),
            },
        }
    }
}

impl MirrorError for AdapterError {
    fn error_code(&self) -> &'static str {
        match self {
            AdapterError::Timeout { .. } => "ADAPTER_TIMEOUT",
            AdapterError::InvalidObject { .. } => "ADAPTER_INVALID_OBJECT",
            AdapterError::IllegalValue => "ADAPTER_ILLEGAL_VALUE",
            AdapterError::AdapterFailure { .. } => "ADAPTER_FAILURE",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, AdapterError::IllegalValue)
    }
}

/// Which adapter call raised a fault; absence and write refusals depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Read,
    Write,
    Subscribe,
}

/// Map a raw service fault onto the closed error set.
///
/// Unrecognized faults are logged and folded into `InvalidObject`.
pub(crate) fn classify_fault(
    fault: ServiceFault,
    operation: Operation,
    element: ElementRef,
    attribute: Option<Attribute>,
    timeout: Option<Duration>,
) -> AdapterError {
    match (fault, operation) {
        (ServiceFault::CannotComplete, _) => AdapterError::Timeout { timeout },
        (ServiceFault::InvalidElement, _) => AdapterError::InvalidObject {
            cause: ServiceFault::InvalidElement.to_string(),
        },
        (ServiceFault::IllegalArgument, _) => AdapterError::IllegalValue,
        (ServiceFault::AttributeUnsupported, Operation::Write) => AdapterError::IllegalValue,
        (ServiceFault::Failure, _) => AdapterError::AdapterFailure {
            cause: ServiceFault::Failure.to_string(),
        },
        (unexpected, operation) => {
            warn!(
                event = "core.adapter.unexpected_fault",
                element = %element,
                attribute = ?attribute,
                operation = ?operation,
                fault = %unexpected,
            );
            AdapterError::InvalidObject {
                cause: format!("unexpected service fault: {unexpected}"),
            }
        }
    }
}
