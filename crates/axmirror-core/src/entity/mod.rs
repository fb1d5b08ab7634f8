//! Entity delegates: one actor task per mirrored object.
//!
//! Every [`Window`] and [`Application`] handle fronts a tokio task that owns
//! the entity's property cells (and, for applications, the window
//! collection). Notifications, read and write completions, and `set_*`
//! requests all arrive on that task's single queue, so one entity is never
//! mutated concurrently while different entities proceed in parallel.
//!
//! Everything that feeds the queue from outside (notification sinks,
//! in-flight reads and writes, child windows) holds only a weak sender. The
//! actor stops once the last handle is dropped or the entity is invalidated,
//! and late completions are dropped on the floor.

pub mod application;
mod children;
pub mod window;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::{debug, trace};

pub use application::Application;
pub use window::Window;

use crate::adapter::{AdapterError, AttributeAdapter, WorkerPool};
use crate::config::{MirrorConfig, validate_config};
use crate::errors::ConfigError;
use crate::notifier::EventNotifier;
use crate::property::{Next, PendingWrite};
use crate::service::{
    AttrValue, Attribute, AttributeService, ElementRef, Notification, NotificationSink,
};

/// Everything an entity needs to talk to the service and report changes.
#[derive(Clone)]
pub struct MirrorContext {
    adapter: AttributeAdapter,
    notifier: Arc<dyn EventNotifier>,
}

impl MirrorContext {
    pub fn new(adapter: AttributeAdapter, notifier: Arc<dyn EventNotifier>) -> Self {
        Self { adapter, notifier }
    }

    /// Build the adapter from validated configuration.
    pub fn from_config(
        service: Arc<dyn AttributeService>,
        config: &MirrorConfig,
        notifier: Arc<dyn EventNotifier>,
    ) -> Result<Self, ConfigError> {
        validate_config(config)?;
        let workers = NonZeroUsize::new(config.workers.max_blocking()).ok_or_else(|| {
            ConfigError::InvalidConfiguration {
                message: "workers.max_blocking must be at least 1".to_string(),
            }
        })?;
        let adapter = AttributeAdapter::new(
            service,
            WorkerPool::new(workers),
            config.adapter.messaging_timeout(),
        );
        Ok(Self::new(adapter, notifier))
    }

    pub fn adapter(&self) -> &AttributeAdapter {
        &self.adapter
    }

    pub fn notifier(&self) -> &Arc<dyn EventNotifier> {
        &self.notifier
    }
}

/// Completion of a refresh read, routed back by cell attribute.
#[derive(Debug)]
pub(crate) struct ReadDone {
    pub attribute: Attribute,
    pub generation: u64,
    pub result: Result<Option<AttrValue>, AdapterError>,
}

/// Completion of a write, routed back by cell attribute.
#[derive(Debug)]
pub(crate) struct WriteDone {
    pub attribute: Attribute,
    pub write_id: u64,
    pub result: Result<(), AdapterError>,
}

/// Validity flag shared between an actor and its handles.
#[derive(Debug)]
pub(crate) struct Validity(AtomicBool);

impl Validity {
    pub fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn is_valid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns true only for the call that performed the transition.
    pub fn mark_invalid(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Sink that pushes notifications into an actor's queue.
pub(crate) fn notification_sink<M>(actor: WeakUnboundedSender<M>) -> NotificationSink
where
    M: From<Notification> + Send + 'static,
{
    NotificationSink::new(move |notification| {
        if let Some(tx) = actor.upgrade() {
            let _ = tx.send(M::from(notification));
        } else {
            trace!(
                event = "core.entity.notification_dropped",
                element = %notification.element,
            );
        }
    })
}

/// Read `attribute` of `element` on the worker pool and report back as generation `generation`.
pub(crate) fn spawn_read<M>(
    adapter: &AttributeAdapter,
    actor: &WeakUnboundedSender<M>,
    element: ElementRef,
    attribute: Attribute,
    generation: u64,
) where
    M: From<ReadDone> + Send + 'static,
{
    let adapter = adapter.clone();
    let actor = actor.clone();
    tokio::spawn(async move {
        let result = adapter.read(element, attribute).await;
        if let Some(tx) = actor.upgrade() {
            let _ = tx.send(M::from(ReadDone {
                attribute,
                generation,
                result,
            }));
        }
    });
}

/// Dispatch `write` on the worker pool. The completion is routed to the
/// cell named `cell`, which need not be the attribute written.
pub(crate) fn spawn_write<M>(
    adapter: &AttributeAdapter,
    actor: &WeakUnboundedSender<M>,
    cell: Attribute,
    write: PendingWrite,
) where
    M: From<WriteDone> + Send + 'static,
{
    let adapter = adapter.clone();
    let actor = actor.clone();
    tokio::spawn(async move {
        let PendingWrite {
            write_id,
            target: (element, attribute),
            value,
        } = write;
        let result = adapter.write(element, attribute, value).await;
        if let Some(tx) = actor.upgrade() {
            let _ = tx.send(M::from(WriteDone {
                attribute: cell,
                write_id,
                result,
            }));
        }
    });
}

/// Start whatever the cell for `attribute` of `element` asked for.
pub(crate) fn dispatch<M>(
    adapter: &AttributeAdapter,
    actor: &WeakUnboundedSender<M>,
    element: ElementRef,
    attribute: Attribute,
    next: Next,
) where
    M: From<ReadDone> + From<WriteDone> + Send + 'static,
{
    match next {
        Next::Idle => {}
        Next::Read(generation) => spawn_read(adapter, actor, element, attribute, generation),
        Next::Write(write) => {
            debug!(
                event = "core.entity.write_started",
                element = %element,
                attribute = %attribute,
                target = %write.target.0,
            );
            spawn_write(adapter, actor, attribute, write)
        }
    }
}
