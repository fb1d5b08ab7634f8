use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;

use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use super::value::FromAttrValue;
use crate::adapter::AdapterError;
use crate::events::Origin;
use crate::service::{AttrValue, Attribute, ElementRef};

/// Channel on which a `set` caller receives the cell's resulting value.
pub(crate) type Reply<T> = oneshot::Sender<Result<Option<T>, AdapterError>>;

/// Bound shared by every value a cell can hold.
pub trait CellValue: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Debug + Send + Sync + 'static> CellValue for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Uninitialized,
    Ready,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// The one operation a cell has outstanding against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Read { generation: u64, origin: Origin },
    Write { write_id: u64 },
}

/// A read completion that matched the outstanding generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Accepted {
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Change<T> {
    pub old: Option<T>,
    pub new: Option<T>,
}

#[derive(Debug)]
pub(crate) enum Completion<T> {
    Stale,
    Applied {
        change: Option<Change<T>>,
        origin: Origin,
    },
    Failed {
        error: AdapterError,
    },
}

/// A write the owning actor has to dispatch. The target may be another
/// element than the cell's owner.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingWrite {
    pub write_id: u64,
    pub target: (ElementRef, Attribute),
    pub value: AttrValue,
}

/// What the cell wants dispatched next, if anything.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Next {
    Idle,
    Read(u64),
    Write(PendingWrite),
}

#[derive(Debug, PartialEq)]
pub(crate) enum WriteOutcome {
    /// The write went through or was refused as illegal; read back `generation`.
    Refresh(u64),
    /// The caller has been told about the failure.
    Failed,
    Invalidated(AdapterError),
}

/// Cached value of one remote attribute.
///
/// A cell never performs I/O itself. The owning entity actor asks it what to
/// dispatch, and feeds completions back. At most one read or write is
/// outstanding per cell: notifications arriving meanwhile fold into a dirty
/// flag and `set`s queue in arrival order. Only the completion carrying the
/// highest generation issued so far is ever applied.
pub(crate) struct Property<T: CellValue> {
    attribute: Attribute,
    requirement: Requirement,
    state: CellState,
    value: Option<T>,
    generation: u64,
    in_flight: Option<InFlight>,
    dirty: bool,
    next_write: u64,
    queued: VecDeque<PendingWrite>,
    writes: HashMap<u64, Reply<T>>,
    waiters: Vec<Reply<T>>,
    published: watch::Sender<Option<T>>,
}

impl<T: CellValue> Property<T> {
    pub fn new(attribute: Attribute, requirement: Requirement) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            attribute,
            requirement,
            state: CellState::Uninitialized,
            value: None,
            generation: 0,
            in_flight: None,
            dirty: false,
            next_write: 0,
            queued: VecDeque::new(),
            writes: HashMap::new(),
            waiters: Vec::new(),
            published,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.published.subscribe()
    }

    fn missing(&self) -> AdapterError {
        AdapterError::invalid_object(format!("required attribute {} is missing", self.attribute))
    }

    fn publish(&self) {
        self.published.send_replace(self.value.clone());
    }

    fn reply_all(&mut self, result: Result<Option<T>, AdapterError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    /// Resolve the cell's initial value. Notifications that arrived before
    /// it was known leave the cell dirty; [`CellControl::resume`] picks
    /// that up.
    pub fn initialize(&mut self, value: Option<T>) -> Result<(), AdapterError> {
        if self.state != CellState::Uninitialized {
            return Ok(());
        }
        if value.is_none() && self.requirement == Requirement::Required {
            return Err(self.missing());
        }
        self.value = value;
        self.state = CellState::Ready;
        self.publish();
        Ok(())
    }

    /// Start a read. The generation is bumped before the read is dispatched,
    /// which supersedes whatever read was outstanding.
    pub fn issue_refresh(&mut self, origin: Origin) -> u64 {
        self.generation += 1;
        self.in_flight = Some(InFlight::Read {
            generation: self.generation,
            origin,
        });
        self.dirty = false;
        self.generation
    }

    /// Match a returning read against the outstanding one.
    pub fn accept(&mut self, generation: u64) -> Option<Accepted> {
        match self.in_flight {
            Some(InFlight::Read {
                generation: outstanding,
                origin,
            }) if outstanding == generation && self.state != CellState::Invalid => {
                self.in_flight = None;
                Some(Accepted { origin })
            }
            _ => None,
        }
    }

    /// Whether `generation` is still the newest one issued.
    pub fn is_current(&self, generation: u64) -> bool {
        self.state == CellState::Ready && self.generation == generation
    }

    /// Settle `generation` on `value`. Returns the transition, if any.
    pub fn resolve(&mut self, generation: u64, value: Option<T>) -> Option<Change<T>> {
        if !self.is_current(generation) {
            return None;
        }
        let change = if value != self.value {
            let old = std::mem::replace(&mut self.value, value);
            self.publish();
            Some(Change {
                old,
                new: self.value.clone(),
            })
        } else {
            None
        };
        self.reply_all(Ok(self.value.clone()));
        change
    }

    /// Settle `generation` as failed without touching the value.
    pub fn fail(&mut self, generation: u64, error: &AdapterError) {
        if self.is_current(generation) {
            self.reply_all(Err(error.clone()));
        }
    }

    /// Settle `generation` without applying what it read.
    pub fn discard(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.reply_all(Ok(self.value.clone()));
        }
    }

    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<Option<T>, AdapterError>,
    ) -> Completion<T> {
        let Some(accepted) = self.accept(generation) else {
            return Completion::Stale;
        };
        let result = match result {
            Ok(None) if self.requirement == Requirement::Required => Err(self.missing()),
            other => other,
        };
        match result {
            Ok(value) => Completion::Applied {
                change: self.resolve(generation, value),
                origin: accepted.origin,
            },
            Err(error) => {
                self.fail(generation, &error);
                Completion::Failed { error }
            }
        }
    }

    /// Register a `set`. Returns the write to dispatch now, or `None` if it
    /// was queued behind the outstanding operation.
    pub fn begin_write(
        &mut self,
        reply: Reply<T>,
        target: (ElementRef, Attribute),
        value: AttrValue,
    ) -> Option<PendingWrite> {
        if self.state == CellState::Invalid {
            let _ = reply.send(Err(AdapterError::invalid_object("entity is invalid")));
            return None;
        }
        self.next_write += 1;
        self.writes.insert(self.next_write, reply);
        let write = PendingWrite {
            write_id: self.next_write,
            target,
            value,
        };
        if self.in_flight.is_some() || self.state != CellState::Ready {
            debug!(
                event = "core.property.write_queued",
                attribute = %self.attribute,
                queued = self.queued.len() + 1,
            );
            self.queued.push_back(write);
            return None;
        }
        self.in_flight = Some(InFlight::Write {
            write_id: write.write_id,
        });
        Some(write)
    }
}

impl<T: CellValue + FromAttrValue> Property<T> {
    fn convert(&self, raw: Option<AttrValue>) -> Result<Option<T>, AdapterError> {
        raw.map(|value| {
            T::from_attr(value).map_err(|unexpected| {
                warn!(
                    event = "core.property.unexpected_value_type",
                    attribute = %self.attribute,
                    kind = unexpected.kind(),
                );
                AdapterError::invalid_object(format!(
                    "unexpected {} value for {}",
                    unexpected.kind(),
                    self.attribute
                ))
            })
        })
        .transpose()
    }

    /// Initialize from the batched fetch result for this attribute.
    pub fn initialize_from(
        &mut self,
        fetched: Result<Option<AttrValue>, AdapterError>,
    ) -> Result<(), AdapterError> {
        let value = fetched
            .and_then(|raw| self.convert(raw))
            .map_err(AdapterError::into_initialization_error)?;
        self.initialize(value)
    }

    pub fn complete_raw(
        &mut self,
        generation: u64,
        result: Result<Option<AttrValue>, AdapterError>,
    ) -> Completion<T> {
        let result = result.and_then(|raw| self.convert(raw));
        self.complete(generation, result)
    }
}

#[cfg(test)]
impl<T: CellValue> Property<T> {
    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// Type-erased operations the entity actors route by attribute.
pub(crate) trait CellControl: Send {
    /// A notification named this cell. Returns a generation to read now, or
    /// `None` if the read was folded into the outstanding operation.
    fn notification_received(&mut self) -> Option<u64>;

    /// Pick the next operation once nothing is outstanding: a queued write
    /// first, then a refresh owed to notifications.
    fn resume(&mut self) -> Next;

    fn write_completed(&mut self, write_id: u64, result: Result<(), AdapterError>) -> WriteOutcome;

    fn invalidate(&mut self, cause: &str);
}

impl<T: CellValue> CellControl for Property<T> {
    fn notification_received(&mut self) -> Option<u64> {
        match self.state {
            CellState::Invalid => None,
            CellState::Ready if self.in_flight.is_none() => {
                Some(self.issue_refresh(Origin::External))
            }
            CellState::Uninitialized | CellState::Ready => {
                self.dirty = true;
                None
            }
        }
    }

    fn resume(&mut self) -> Next {
        if self.state != CellState::Ready || self.in_flight.is_some() {
            return Next::Idle;
        }
        if let Some(write) = self.queued.pop_front() {
            self.in_flight = Some(InFlight::Write {
                write_id: write.write_id,
            });
            return Next::Write(write);
        }
        if self.dirty {
            return Next::Read(self.issue_refresh(Origin::External));
        }
        Next::Idle
    }

    fn write_completed(&mut self, write_id: u64, result: Result<(), AdapterError>) -> WriteOutcome {
        if self.in_flight == Some(InFlight::Write { write_id }) {
            self.in_flight = None;
        }
        let reply = self.writes.remove(&write_id);
        if self.state == CellState::Invalid {
            if let Some(reply) = reply {
                let _ = reply.send(Err(AdapterError::invalid_object("entity is invalid")));
            }
            return WriteOutcome::Failed;
        }

        match result {
            Ok(()) | Err(AdapterError::IllegalValue) => {
                if result.is_err() {
                    debug!(
                        event = "core.property.write_refused",
                        attribute = %self.attribute,
                    );
                }
                let generation = self.issue_refresh(Origin::Local);
                if let Some(reply) = reply {
                    self.waiters.push(reply);
                }
                WriteOutcome::Refresh(generation)
            }
            Err(error) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(error.clone()));
                }
                if error.is_invalid_object() {
                    WriteOutcome::Invalidated(error)
                } else {
                    WriteOutcome::Failed
                }
            }
        }
    }

    fn invalidate(&mut self, cause: &str) {
        if self.state == CellState::Invalid {
            return;
        }
        self.state = CellState::Invalid;
        self.in_flight = None;
        self.dirty = false;
        self.queued.clear();
        let error = AdapterError::invalid_object(cause);
        self.reply_all(Err(error.clone()));
        for (_, reply) in self.writes.drain() {
            let _ = reply.send(Err(error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Point;
    use std::time::Duration;

    const OWNER: ElementRef = ElementRef::new(7);

    fn ready_cell(title: &str) -> Property<String> {
        let mut cell = Property::new(Attribute::Title, Requirement::Required);
        cell.initialize(Some(title.to_string())).unwrap();
        cell
    }

    fn text(value: &str) -> Result<Option<String>, AdapterError> {
        Ok(Some(value.to_string()))
    }

    fn set_title(
        cell: &mut Property<String>,
        title: &str,
    ) -> (Option<PendingWrite>, oneshot::Receiver<Result<Option<String>, AdapterError>>) {
        let (reply, receiver) = oneshot::channel();
        let write = cell.begin_write(
            reply,
            (OWNER, Attribute::Title),
            AttrValue::String(title.to_string()),
        );
        (write, receiver)
    }

    #[test]
    fn test_initialize_required_missing_fails() {
        let mut cell: Property<String> = Property::new(Attribute::Title, Requirement::Required);
        let error = cell.initialize_from(Ok(None)).unwrap_err();
        assert!(error.is_invalid_object());
        assert!(error.to_string().contains("title"));
        assert_eq!(cell.state(), CellState::Uninitialized);
    }

    #[test]
    fn test_initialize_optional_absent() {
        let mut cell: Property<bool> = Property::new(Attribute::Fullscreen, Requirement::Optional);
        let receiver = cell.subscribe();
        assert_eq!(cell.initialize_from(Ok(None)), Ok(()));
        assert_eq!(cell.state(), CellState::Ready);
        assert_eq!(cell.value(), None);
        assert_eq!(*receiver.borrow(), None);
        assert_eq!(cell.resume(), Next::Idle);
    }

    #[test]
    fn test_initialize_error_mapping() {
        let mut cell: Property<bool> = Property::new(Attribute::Hidden, Requirement::Optional);
        let timeout = AdapterError::Timeout {
            timeout: Some(Duration::from_millis(10)),
        };
        assert_eq!(cell.initialize_from(Err(timeout.clone())), Err(timeout));

        let mut cell: Property<bool> = Property::new(Attribute::Hidden, Requirement::Optional);
        let error = cell
            .initialize_from(Err(AdapterError::AdapterFailure {
                cause: "busy".to_string(),
            }))
            .unwrap_err();
        assert!(error.is_invalid_object());
    }

    #[test]
    fn test_type_mismatch_is_invalid_object() {
        let mut cell: Property<Point> = Property::new(Attribute::Position, Requirement::Required);
        let error = cell
            .initialize_from(Ok(Some(AttrValue::Bool(true))))
            .unwrap_err();
        assert!(error.is_invalid_object());
    }

    #[test]
    fn test_refresh_applies_changed_value() {
        let mut cell = ready_cell("a");
        let receiver = cell.subscribe();
        let generation = cell.notification_received().unwrap();
        assert!(cell.is_in_flight());

        match cell.complete(generation, text("b")) {
            Completion::Applied {
                change: Some(change),
                origin,
            } => {
                assert_eq!(change.old.as_deref(), Some("a"));
                assert_eq!(change.new.as_deref(), Some("b"));
                assert_eq!(origin, Origin::External);
            }
            other => panic!("unexpected completion: {other:?}"),
        }
        assert_eq!(receiver.borrow().as_deref(), Some("b"));
        assert!(!cell.is_in_flight());
        assert_eq!(cell.resume(), Next::Idle);
    }

    #[test]
    fn test_equal_value_emits_no_change() {
        let mut cell = ready_cell("a");
        let generation = cell.notification_received().unwrap();
        assert!(matches!(
            cell.complete(generation, text("a")),
            Completion::Applied { change: None, .. }
        ));
    }

    #[test]
    fn test_older_generation_never_applied_after_newer() {
        let mut cell = ready_cell("a");
        let first = cell.issue_refresh(Origin::External);
        let second = cell.issue_refresh(Origin::Local);
        assert!(second > first);

        assert!(matches!(
            cell.complete(second, text("second")),
            Completion::Applied { .. }
        ));
        assert!(matches!(
            cell.complete(first, text("first")),
            Completion::Stale
        ));
        assert_eq!(cell.value().map(String::as_str), Some("second"));
    }

    #[test]
    fn test_superseded_completion_discarded_even_if_it_arrives_first() {
        let mut cell = ready_cell("a");
        let first = cell.issue_refresh(Origin::External);
        let second = cell.issue_refresh(Origin::External);

        assert!(matches!(
            cell.complete(first, text("first")),
            Completion::Stale
        ));
        assert_eq!(cell.value().map(String::as_str), Some("a"));
        assert!(cell.is_in_flight());
        assert!(matches!(
            cell.complete(second, text("a")),
            Completion::Applied { change: None, .. }
        ));
    }

    #[test]
    fn test_notifications_coalesce_into_one_follow_up() {
        let mut cell = ready_cell("a");
        let generation = cell.notification_received().unwrap();
        assert_eq!(cell.notification_received(), None);
        assert_eq!(cell.notification_received(), None);
        assert_eq!(cell.notification_received(), None);

        cell.complete(generation, text("b"));
        assert_eq!(cell.resume(), Next::Read(generation + 1));
        assert!(matches!(
            cell.complete(generation + 1, text("b")),
            Completion::Applied { change: None, .. }
        ));
        assert_eq!(cell.resume(), Next::Idle);
    }

    #[test]
    fn test_follow_up_owed_after_failure() {
        let mut cell = ready_cell("a");
        let generation = cell.notification_received().unwrap();
        cell.notification_received();
        match cell.complete(
            generation,
            Err(AdapterError::Timeout { timeout: None }),
        ) {
            Completion::Failed { error } => {
                assert_eq!(error, AdapterError::Timeout { timeout: None });
            }
            other => panic!("unexpected completion: {other:?}"),
        }
        assert_eq!(cell.value().map(String::as_str), Some("a"));
        assert_eq!(cell.state(), CellState::Ready);
        assert!(matches!(cell.resume(), Next::Read(_)));
    }

    #[test]
    fn test_required_value_disappearing_fails() {
        let mut cell = ready_cell("a");
        let generation = cell.notification_received().unwrap();
        match cell.complete(generation, Ok(None)) {
            Completion::Failed { error } => assert!(error.is_invalid_object()),
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn test_uninitialized_notification_defers_refresh() {
        let mut cell: Property<String> = Property::new(Attribute::Title, Requirement::Required);
        assert_eq!(cell.notification_received(), None);
        assert_eq!(cell.initialize(Some("a".to_string())), Ok(()));
        assert_eq!(cell.resume(), Next::Read(1));
    }

    #[test]
    fn test_write_then_refresh_is_local() {
        let mut cell = ready_cell("a");
        let (write, mut receiver) = set_title(&mut cell, "b");
        let write = write.expect("idle cell dispatches at once");
        assert_eq!(write.target, (OWNER, Attribute::Title));
        assert!(cell.is_in_flight());

        let WriteOutcome::Refresh(generation) = cell.write_completed(write.write_id, Ok(()))
        else {
            panic!("expected a refresh");
        };
        assert!(receiver.try_recv().is_err());

        match cell.complete(generation, text("b")) {
            Completion::Applied { origin, change } => {
                assert_eq!(origin, Origin::Local);
                assert!(change.is_some());
            }
            other => panic!("unexpected completion: {other:?}"),
        }
        assert_eq!(receiver.try_recv().unwrap(), Ok(Some("b".to_string())));
    }

    #[test]
    fn test_illegal_value_write_still_refreshes() {
        let mut cell = ready_cell("a");
        let (write, mut receiver) = set_title(&mut cell, "b");

        let WriteOutcome::Refresh(generation) =
            cell.write_completed(write.unwrap().write_id, Err(AdapterError::IllegalValue))
        else {
            panic!("expected a refresh");
        };
        cell.complete(generation, text("a"));
        assert_eq!(receiver.try_recv().unwrap(), Ok(Some("a".to_string())));
    }

    #[test]
    fn test_write_timeout_replies_without_refresh() {
        let mut cell = ready_cell("a");
        let (write, mut receiver) = set_title(&mut cell, "b");
        let before = cell.generation();

        let timeout = AdapterError::Timeout { timeout: None };
        assert_eq!(
            cell.write_completed(write.unwrap().write_id, Err(timeout.clone())),
            WriteOutcome::Failed
        );
        assert_eq!(receiver.try_recv().unwrap(), Err(timeout));
        assert_eq!(cell.generation(), before);
        assert!(!cell.is_in_flight());
        assert_eq!(cell.resume(), Next::Idle);
    }

    #[test]
    fn test_write_invalid_object_invalidates() {
        let mut cell = ready_cell("a");
        let (write, mut receiver) = set_title(&mut cell, "b");
        let error = AdapterError::invalid_object("gone");
        assert_eq!(
            cell.write_completed(write.unwrap().write_id, Err(error.clone())),
            WriteOutcome::Invalidated(error.clone())
        );
        assert_eq!(receiver.try_recv().unwrap(), Err(error));
    }

    #[test]
    fn test_set_during_write_waits_for_confirmation() {
        let mut cell = ready_cell("a");
        let (first, mut first_reply) = set_title(&mut cell, "b");
        let first = first.unwrap();
        let (second, mut second_reply) = set_title(&mut cell, "c");
        assert_eq!(second, None);

        // The confirming read of the first write still blocks the second.
        let WriteOutcome::Refresh(generation) = cell.write_completed(first.write_id, Ok(()))
        else {
            panic!("expected a refresh");
        };
        assert_eq!(cell.resume(), Next::Idle);
        cell.complete(generation, text("b"));
        assert_eq!(first_reply.try_recv().unwrap(), Ok(Some("b".to_string())));

        let Next::Write(second) = cell.resume() else {
            panic!("expected the queued write");
        };
        assert_eq!(second.value, AttrValue::String("c".to_string()));
        let WriteOutcome::Refresh(generation) = cell.write_completed(second.write_id, Ok(()))
        else {
            panic!("expected a refresh");
        };
        cell.complete(generation, text("c"));
        assert_eq!(second_reply.try_recv().unwrap(), Ok(Some("c".to_string())));
        assert_eq!(cell.value().map(String::as_str), Some("c"));
    }

    #[test]
    fn test_set_during_read_is_queued() {
        let mut cell = ready_cell("a");
        let generation = cell.notification_received().unwrap();
        let (write, _reply) = set_title(&mut cell, "b");
        assert_eq!(write, None);

        cell.complete(generation, text("a"));
        assert!(matches!(cell.resume(), Next::Write(_)));
    }

    #[test]
    fn test_notification_during_write_is_folded() {
        let mut cell = ready_cell("a");
        let (write, _reply) = set_title(&mut cell, "b");
        assert_eq!(cell.notification_received(), None);

        // The confirming read starts after the notification and covers it.
        let WriteOutcome::Refresh(generation) =
            cell.write_completed(write.unwrap().write_id, Ok(()))
        else {
            panic!("expected a refresh");
        };
        cell.complete(generation, text("b"));
        assert_eq!(cell.resume(), Next::Idle);
    }

    #[test]
    fn test_notification_during_failed_write_is_refreshed() {
        let mut cell = ready_cell("a");
        let (write, _reply) = set_title(&mut cell, "b");
        assert_eq!(cell.notification_received(), None);

        let failure = AdapterError::AdapterFailure {
            cause: "busy".to_string(),
        };
        assert_eq!(
            cell.write_completed(write.unwrap().write_id, Err(failure)),
            WriteOutcome::Failed
        );
        assert!(matches!(cell.resume(), Next::Read(_)));
    }

    #[test]
    fn test_superseded_set_resolves_with_latest() {
        let mut cell = ready_cell("a");
        let (write, mut receiver) = set_title(&mut cell, "b");
        let WriteOutcome::Refresh(set_generation) =
            cell.write_completed(write.unwrap().write_id, Ok(()))
        else {
            panic!("expected a refresh");
        };
        let later = cell.issue_refresh(Origin::External);

        assert!(matches!(
            cell.complete(set_generation, text("from set")),
            Completion::Stale
        ));
        assert!(receiver.try_recv().is_err());

        cell.complete(later, text("latest"));
        assert_eq!(receiver.try_recv().unwrap(), Ok(Some("latest".to_string())));
    }

    #[test]
    fn test_discard_keeps_value_and_answers_waiters() {
        let mut cell = ready_cell("a");
        let (write, mut receiver) = set_title(&mut cell, "b");
        let WriteOutcome::Refresh(generation) =
            cell.write_completed(write.unwrap().write_id, Ok(()))
        else {
            panic!("expected a refresh");
        };
        assert!(cell.accept(generation).is_some());
        cell.discard(generation);
        assert_eq!(receiver.try_recv().unwrap(), Ok(Some("a".to_string())));
    }

    #[test]
    fn test_invalidate_is_terminal() {
        let mut cell = ready_cell("a");
        let generation = cell.notification_received().unwrap();
        let (queued, mut receiver) = set_title(&mut cell, "b");
        assert_eq!(queued, None);

        cell.invalidate("destroyed");
        assert_eq!(cell.state(), CellState::Invalid);
        assert!(receiver.try_recv().unwrap().unwrap_err().is_invalid_object());
        assert_eq!(cell.notification_received(), None);
        assert!(matches!(
            cell.complete(generation, text("b")),
            Completion::Stale
        ));
        assert_eq!(cell.resume(), Next::Idle);
        assert_eq!(cell.value().map(String::as_str), Some("a"));

        let (late, mut late_reply) = set_title(&mut cell, "c");
        assert_eq!(late, None);
        assert!(late_reply.try_recv().unwrap().unwrap_err().is_invalid_object());
    }
}
