//! axmirror-core: live mirror of remote application and window state
//!
//! Keeps a locally queryable copy of objects exposed by an asynchronous
//! attribute service (an application process and its windows) in step with
//! the remote side, under any interleaving of in-flight reads, change
//! notifications and local writes.
//!
//! # Main Entry Points
//!
//! - [`entity`] - [`Application`] and [`Window`] delegates and [`MirrorContext`]
//! - [`service`] - The [`AttributeService`] capability and an in-memory implementation
//! - [`adapter`] - Timeout-bounded, pooled service calls and [`AdapterError`]
//! - [`notifier`] - Event sinks
//! - [`config`] - Configuration management

pub mod adapter;
pub mod config;
pub mod entity;
pub mod errors;
pub mod events;
pub mod logging;
pub mod notifier;
pub mod property;
pub mod service;

// Re-export commonly used types at crate root for convenience
pub use adapter::{AdapterError, AttributeAdapter, MessagingTimeout, WorkerPool};
pub use config::MirrorConfig;
pub use entity::{Application, MirrorContext, Window};
pub use errors::{ConfigError, MirrorError, MirrorResult};
pub use events::{Event, Origin, PropertyChange};
pub use notifier::{BroadcastNotifier, EventNotifier, EventRecorder};
pub use service::{
    AttrValue, Attribute, AttributeService, ElementRef, InMemoryService, Notification,
    NotificationKind, NotificationSink, Point, ServiceFault, Size,
};
