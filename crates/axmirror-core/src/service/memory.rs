//! In-memory [`AttributeService`] with fault injection and call gating.
//!
//! Objects live in a map guarded by one mutex. Notifications are never
//! generated implicitly; callers post them with [`InMemoryService::post`] or
//! [`InMemoryService::post_to`] so they fully control the interleaving of
//! value changes, notifications and reads.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::types::{
    AttrValue, Attribute, ElementRef, Notification, NotificationKind, ServiceFault, SubscriptionId,
};
use super::{AttributeReply, AttributeService, NotificationSink};

type Key = (ElementRef, Attribute);

#[derive(Default)]
pub struct InMemoryService {
    state: Mutex<MemoryState>,
    next_subscription: AtomicU64,
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<ElementRef, MemoryObject>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    read_gates: HashMap<Key, Arc<Gate>>,
    write_gates: HashMap<Key, Arc<Gate>>,
    batch_gates: HashMap<ElementRef, Arc<Gate>>,
    faults: HashMap<Key, VecDeque<ServiceFault>>,
    rejected_writes: HashSet<Key>,
    illegal_writes: HashSet<Key>,
    reads: HashMap<Key, usize>,
    writes: HashMap<Key, usize>,
    batch_reads: HashMap<ElementRef, usize>,
}

struct MemoryObject {
    alive: bool,
    attributes: HashMap<Attribute, AttrValue>,
}

struct Subscription {
    element: ElementRef,
    kinds: Vec<NotificationKind>,
    sink: NotificationSink,
}

impl MemoryState {
    fn next_fault(&mut self, key: Key) -> Option<ServiceFault> {
        self.faults.get_mut(&key).and_then(VecDeque::pop_front)
    }

    fn live_object(&self, element: ElementRef) -> Result<&MemoryObject, ServiceFault> {
        match self.objects.get(&element) {
            Some(object) if object.alive => Ok(object),
            _ => Err(ServiceFault::InvalidElement),
        }
    }

    fn apply_write(&mut self, key: Key, value: AttrValue) -> Result<(), ServiceFault> {
        let (element, attribute) = key;
        *self.writes.entry(key).or_default() += 1;
        if let Some(fault) = self.next_fault(key) {
            return Err(fault);
        }
        self.live_object(element)?;
        if self.illegal_writes.contains(&key) {
            return Err(ServiceFault::IllegalArgument);
        }
        if self.rejected_writes.contains(&key) {
            return Ok(());
        }

        // Raising a window makes it the main window of the application listing it.
        if attribute == Attribute::Main && value == AttrValue::Bool(true) {
            for object in self.objects.values_mut() {
                let lists_window = matches!(
                    object.attributes.get(&Attribute::Windows),
                    Some(AttrValue::Elements(windows)) if windows.contains(&element)
                );
                if lists_window {
                    object
                        .attributes
                        .insert(Attribute::MainWindow, AttrValue::Element(element));
                }
            }
        }

        if let Some(object) = self.objects.get_mut(&element) {
            object.attributes.insert(attribute, value);
        }
        Ok(())
    }
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a live object with its initial attribute values.
    pub fn add_object(
        &self,
        element: ElementRef,
        attributes: impl IntoIterator<Item = (Attribute, AttrValue)>,
    ) {
        self.lock().objects.insert(
            element,
            MemoryObject {
                alive: true,
                attributes: attributes.into_iter().collect(),
            },
        );
    }

    /// Change a value without posting any notification.
    pub fn set_attribute(&self, element: ElementRef, attribute: Attribute, value: AttrValue) {
        if let Some(object) = self.lock().objects.get_mut(&element) {
            object.attributes.insert(attribute, value);
        }
    }

    pub fn remove_attribute(&self, element: ElementRef, attribute: Attribute) {
        if let Some(object) = self.lock().objects.get_mut(&element) {
            object.attributes.remove(&attribute);
        }
    }

    pub fn attribute(&self, element: ElementRef, attribute: Attribute) -> Option<AttrValue> {
        self.lock()
            .objects
            .get(&element)
            .and_then(|object| object.attributes.get(&attribute).cloned())
    }

    /// Mark an object destroyed. Every later call naming it fails with
    /// [`ServiceFault::InvalidElement`].
    pub fn destroy(&self, element: ElementRef) {
        if let Some(object) = self.lock().objects.get_mut(&element) {
            object.alive = false;
        }
    }

    /// Post a notification about `element` to the subscriptions on `element`.
    pub fn post(&self, element: ElementRef, kind: NotificationKind) {
        self.post_to(element, kind, element);
    }

    /// Post a notification whose reported source is `source` to the
    /// subscriptions held on `subscriber`.
    pub fn post_to(&self, subscriber: ElementRef, kind: NotificationKind, source: ElementRef) {
        let sinks: Vec<NotificationSink> = self
            .lock()
            .subscriptions
            .values()
            .filter(|s| s.element == subscriber && s.kinds.contains(&kind))
            .map(|s| s.sink.clone())
            .collect();

        debug!(
            event = "service.memory.notification_posted",
            subscriber = %subscriber,
            source = %source,
            kind = ?kind,
            receivers = sinks.len(),
        );

        // Delivered outside the lock: sinks may call straight back into the service.
        for sink in sinks {
            sink.deliver(Notification::new(kind, source));
        }
    }

    /// Hold the next read of `attribute` on `element` after its value has been
    /// captured, until the returned gate is released or dropped.
    pub fn pause_next_read(&self, element: ElementRef, attribute: Attribute) -> CallGate {
        let gate = Arc::new(Gate::default());
        self.lock().read_gates.insert((element, attribute), gate.clone());
        CallGate { gate }
    }

    /// Hold the next write of `attribute` on `element` once it has been
    /// applied, until the returned gate is released or dropped.
    pub fn pause_next_write(&self, element: ElementRef, attribute: Attribute) -> CallGate {
        let gate = Arc::new(Gate::default());
        self.lock().write_gates.insert((element, attribute), gate.clone());
        CallGate { gate }
    }

    /// Hold the next batched read of `element` after its values have been
    /// captured.
    pub fn pause_next_batch(&self, element: ElementRef) -> CallGate {
        let gate = Arc::new(Gate::default());
        self.lock().batch_gates.insert(element, gate.clone());
        CallGate { gate }
    }

    /// Fail the next read or write of `attribute` on `element` with `fault`.
    pub fn inject_fault(&self, element: ElementRef, attribute: Attribute, fault: ServiceFault) {
        self.lock()
            .faults
            .entry((element, attribute))
            .or_default()
            .push_back(fault);
    }

    /// Accept writes to `attribute` on `element` but silently ignore them.
    pub fn reject_writes(&self, element: ElementRef, attribute: Attribute) {
        self.lock().rejected_writes.insert((element, attribute));
    }

    /// Refuse writes to `attribute` on `element` as semantically illegal.
    pub fn refuse_writes_as_illegal(&self, element: ElementRef, attribute: Attribute) {
        self.lock().illegal_writes.insert((element, attribute));
    }

    pub fn read_count(&self, element: ElementRef, attribute: Attribute) -> usize {
        self.lock()
            .reads
            .get(&(element, attribute))
            .copied()
            .unwrap_or(0)
    }

    pub fn write_count(&self, element: ElementRef, attribute: Attribute) -> usize {
        self.lock()
            .writes
            .get(&(element, attribute))
            .copied()
            .unwrap_or(0)
    }

    pub fn batch_read_count(&self, element: ElementRef) -> usize {
        self.lock().batch_reads.get(&element).copied().unwrap_or(0)
    }

    pub fn subscription_count(&self, element: ElementRef) -> usize {
        self.lock()
            .subscriptions
            .values()
            .filter(|s| s.element == element)
            .count()
    }
}

impl AttributeService for InMemoryService {
    fn read(&self, element: ElementRef, attribute: Attribute) -> Result<AttrValue, ServiceFault> {
        let key = (element, attribute);
        let (value, gate) = {
            let mut state = self.lock();
            *state.reads.entry(key).or_default() += 1;
            if let Some(fault) = state.next_fault(key) {
                return Err(fault);
            }
            let value = state
                .live_object(element)?
                .attributes
                .get(&attribute)
                .cloned()
                .ok_or(ServiceFault::NoValue);
            (value, state.read_gates.remove(&key))
        };

        if let Some(gate) = gate {
            gate.hold();
        }
        value
    }

    fn read_many(
        &self,
        element: ElementRef,
        attributes: &[Attribute],
    ) -> Result<Vec<AttributeReply>, ServiceFault> {
        let (replies, gate) = {
            let mut state = self.lock();
            *state.batch_reads.entry(element).or_default() += 1;
            state.live_object(element)?;

            let mut replies = Vec::with_capacity(attributes.len());
            for attribute in attributes {
                if let Some(fault) = state.next_fault((element, *attribute)) {
                    replies.push(Err(fault));
                    continue;
                }
                let reply = state
                    .live_object(element)?
                    .attributes
                    .get(attribute)
                    .cloned()
                    .ok_or(ServiceFault::NoValue);
                replies.push(reply);
            }
            (replies, state.batch_gates.remove(&element))
        };

        if let Some(gate) = gate {
            gate.hold();
        }
        Ok(replies)
    }

    fn write(
        &self,
        element: ElementRef,
        attribute: Attribute,
        value: AttrValue,
    ) -> Result<(), ServiceFault> {
        let key = (element, attribute);
        let gate = {
            let mut state = self.lock();
            state.apply_write(key, value)?;
            state.write_gates.remove(&key)
        };

        if let Some(gate) = gate {
            gate.hold();
        }
        Ok(())
    }

    fn subscribe(
        &self,
        element: ElementRef,
        kinds: &[NotificationKind],
        sink: NotificationSink,
    ) -> Result<SubscriptionId, ServiceFault> {
        let mut state = self.lock();
        state.live_object(element)?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);
        state.subscriptions.insert(
            id,
            Subscription {
                element,
                kinds: kinds.to_vec(),
                sink,
            },
        );
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.lock().subscriptions.remove(&subscription);
    }
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    opened: Condvar,
}

#[derive(Default)]
struct GateState {
    held: bool,
    open: bool,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hold(&self) {
        let mut state = self.lock();
        state.held = true;
        while !state.open {
            state = self
                .opened
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn open(&self) {
        self.lock().open = true;
        self.opened.notify_all();
    }
}

/// Handle on a call paused by one of the `pause_next_*` methods of
/// [`InMemoryService`].
///
/// Dropping the handle releases the call.
pub struct CallGate {
    gate: Arc<Gate>,
}

impl CallGate {
    pub fn release(&self) {
        self.gate.open();
    }

    /// Whether a call has reached the gate.
    pub fn is_held(&self) -> bool {
        self.gate.lock().held
    }

    pub async fn wait_until_held(&self) {
        while !self.is_held() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for CallGate {
    fn drop(&mut self) {
        self.gate.open();
    }
}
