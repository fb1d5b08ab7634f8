//! Capability interface of the external attribute service.
//!
//! The synchronization engine only ever talks to [`AttributeService`]; the
//! concrete transport (an OS accessibility binding, the in-memory service used
//! by tests) is chosen by whoever builds the [`crate::MirrorContext`].

pub mod memory;
pub mod types;

use std::fmt;
use std::sync::Arc;

pub use memory::{CallGate, InMemoryService};
pub use types::{
    AttrValue, Attribute, ElementRef, Notification, NotificationKind, Point, ServiceFault, Size,
    SubscriptionId,
};

/// Per-attribute outcome of a batched read.
pub type AttributeReply = Result<AttrValue, ServiceFault>;

/// Blocking binding to the remote introspection service.
///
/// Every method may block for up to the service's messaging timeout, so the
/// adapter only calls them from the worker pool.
pub trait AttributeService: Send + Sync + 'static {
    fn read(&self, element: ElementRef, attribute: Attribute) -> Result<AttrValue, ServiceFault>;

    /// Read several attributes of one object in a single round trip.
    ///
    /// The outer error fails the whole batch; the inner results are per
    /// attribute, in request order.
    fn read_many(
        &self,
        element: ElementRef,
        attributes: &[Attribute],
    ) -> Result<Vec<AttributeReply>, ServiceFault> {
        Ok(attributes
            .iter()
            .map(|attribute| self.read(element, *attribute))
            .collect())
    }

    fn write(
        &self,
        element: ElementRef,
        attribute: Attribute,
        value: AttrValue,
    ) -> Result<(), ServiceFault>;

    fn subscribe(
        &self,
        element: ElementRef,
        kinds: &[NotificationKind],
        sink: NotificationSink,
    ) -> Result<SubscriptionId, ServiceFault>;

    fn unsubscribe(&self, subscription: SubscriptionId);
}

/// Callback the service uses to push notifications for one subscription.
#[derive(Clone)]
pub struct NotificationSink {
    deliver: Arc<dyn Fn(Notification) + Send + Sync>,
}

impl NotificationSink {
    pub fn new(deliver: impl Fn(Notification) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn deliver(&self, notification: Notification) {
        (self.deliver)(notification)
    }
}

impl fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSink").finish_non_exhaustive()
    }
}
