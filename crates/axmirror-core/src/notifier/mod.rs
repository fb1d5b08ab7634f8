//! Event sinks shared by every entity of a mirror.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::Event;

/// Receives fully-formed events from every entity's actor.
///
/// Called concurrently from several actors; an implementation must publish
/// each event whole and must not block for long.
pub trait EventNotifier: Send + Sync + 'static {
    fn publish(&self, event: Event);
}

/// Fans events out to any number of tokio broadcast receivers.
///
/// Slow receivers lag and lose the oldest events, as with any
/// [`broadcast`] channel.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Event>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventNotifier for BroadcastNotifier {
    fn publish(&self, event: Event) {
        let kind = event.kind();
        if self.sender.send(event).is_err() {
            trace!(event = "core.notifier.no_receivers", kind = kind);
        }
    }
}

/// Keeps every published event in memory, in publish order.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl EventNotifier for EventRecorder {
    fn publish(&self, event: Event) {
        debug!(
            event = "core.notifier.recorded",
            kind = event.kind(),
            element = %event.element(),
        );
        self.lock().push(event);
    }
}
