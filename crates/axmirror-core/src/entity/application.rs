use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

use super::children::{Resolution, Upserted, WindowCollection};
use super::window::Window;
use super::{MirrorContext, ReadDone, Validity, WriteDone, dispatch, notification_sink};
use crate::adapter::{AdapterError, FetchedAttributes};
use crate::events::{Event, Origin, PropertyChange};
use crate::property::{
    CellControl, CellValue, Change, Completion, FromAttrValue, IntoAttrValue, Next, Property,
    Reply, Requirement, WriteOutcome,
};
use crate::service::{
    AttrValue, Attribute, ElementRef, Notification, NotificationKind, SubscriptionId,
};

const APPLICATION_NOTIFICATIONS: &[NotificationKind] = &[
    NotificationKind::ElementDestroyed,
    NotificationKind::WindowCreated,
    NotificationKind::MainWindowChanged,
    NotificationKind::FocusedWindowChanged,
    NotificationKind::ApplicationHidden,
    NotificationKind::ApplicationShown,
];

const APPLICATION_ATTRIBUTES: &[Attribute] = &[
    Attribute::Hidden,
    Attribute::MainWindow,
    Attribute::FocusedWindow,
];

const COMPOSITES: [Attribute; 2] = [Attribute::MainWindow, Attribute::FocusedWindow];

pub(crate) enum ApplicationWrite {
    Hidden(bool, Reply<bool>),
    MainWindow(Window, Reply<Window>),
}

pub(crate) enum ApplicationMessage {
    Notification(Notification),
    Fetched(Result<FetchedAttributes, AdapterError>),
    Enumerated(Result<Option<AttrValue>, AdapterError>),
    WindowInitialized {
        element: ElementRef,
        result: Result<Window, AdapterError>,
    },
    /// A child window invalidated itself.
    WindowInvalidated {
        element: ElementRef,
    },
    ReadDone(ReadDone),
    WriteDone(WriteDone),
    Write(ApplicationWrite),
}

impl From<Notification> for ApplicationMessage {
    fn from(notification: Notification) -> Self {
        ApplicationMessage::Notification(notification)
    }
}

impl From<ReadDone> for ApplicationMessage {
    fn from(done: ReadDone) -> Self {
        ApplicationMessage::ReadDone(done)
    }
}

impl From<WriteDone> for ApplicationMessage {
    fn from(done: WriteDone) -> Self {
        ApplicationMessage::WriteDone(done)
    }
}

struct ApplicationShared {
    element: ElementRef,
    validity: Validity,
    hidden: watch::Receiver<Option<bool>>,
    main_window: watch::Receiver<Option<Window>>,
    focused_window: watch::Receiver<Option<Window>>,
    windows: watch::Receiver<Vec<Window>>,
}

/// Live mirror of one remote application and its windows.
#[derive(Clone)]
pub struct Application {
    shared: Arc<ApplicationShared>,
    tx: UnboundedSender<ApplicationMessage>,
}

impl Application {
    /// Subscribe to `element`, fetch its attributes, enumerate its windows and
    /// start mirroring it.
    ///
    /// Resolves once every property and the window collection hold an
    /// initial value. Until then no events are published for the
    /// application.
    pub async fn initialize(
        ctx: &MirrorContext,
        element: ElementRef,
    ) -> Result<Application, AdapterError> {
        debug!(event = "core.application.initialize_started", element = %element);

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = tx.downgrade();

        let subscription = ctx
            .adapter()
            .subscribe(element, APPLICATION_NOTIFICATIONS, notification_sink(actor.clone()))
            .await
            .map_err(|e| {
                debug!(event = "core.application.subscribe_failed", element = %element, error = %e);
                e.into_initialization_error()
            })?;

        let hidden = Property::new(Attribute::Hidden, Requirement::Required);
        let main_window = Property::new(Attribute::MainWindow, Requirement::Optional);
        let focused_window = Property::new(Attribute::FocusedWindow, Requirement::Optional);
        let (windows_tx, windows_rx) = watch::channel(Vec::new());

        let shared = Arc::new(ApplicationShared {
            element,
            validity: Validity::new(),
            hidden: hidden.subscribe(),
            main_window: main_window.subscribe(),
            focused_window: focused_window.subscribe(),
            windows: windows_rx,
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let state = ApplicationActor {
            ctx: ctx.clone(),
            shared: shared.clone(),
            actor: actor.clone(),
            subscription,
            phase: Phase::Initializing {
                ready: Some(ready_tx),
                fetched: false,
                enumerated: false,
            },
            hidden,
            main_window,
            focused_window,
            windows: WindowCollection::default(),
            windows_tx,
            deferred: HashMap::new(),
        };
        tokio::spawn(state.run(rx));

        let adapter = ctx.adapter().clone();
        let reply_to = actor.clone();
        tokio::spawn(async move {
            let fetched = adapter.read_many(element, APPLICATION_ATTRIBUTES).await;
            if let Some(tx) = reply_to.upgrade() {
                let _ = tx.send(ApplicationMessage::Fetched(fetched));
            }
        });

        let adapter = ctx.adapter().clone();
        tokio::spawn(async move {
            let enumerated = adapter.read(element, Attribute::Windows).await;
            if let Some(tx) = actor.upgrade() {
                let _ = tx.send(ApplicationMessage::Enumerated(enumerated));
            }
        });

        let application = Application { shared, tx };
        match ready_rx.await {
            Ok(Ok(())) => Ok(application),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AdapterError::invalid_object(format!(
                "application {element} stopped during initialization"
            ))),
        }
    }

    pub fn element(&self) -> ElementRef {
        self.shared.element
    }

    pub fn is_valid(&self) -> bool {
        self.shared.validity.is_valid()
    }

    /// Identity comparison of the underlying remote objects.
    pub fn equal_to(&self, other: &Application) -> bool {
        self.element() == other.element()
    }

    pub fn is_hidden(&self) -> bool {
        self.shared.hidden.borrow().unwrap_or_default()
    }

    pub fn main_window(&self) -> Option<Window> {
        self.shared.main_window.borrow().clone()
    }

    pub fn focused_window(&self) -> Option<Window> {
        self.shared.focused_window.borrow().clone()
    }

    /// Live windows, ordered by element.
    pub fn windows(&self) -> Vec<Window> {
        self.shared.windows.borrow().clone()
    }

    pub fn window(&self, element: ElementRef) -> Option<Window> {
        self.shared
            .windows
            .borrow()
            .iter()
            .find(|window| window.element() == element)
            .cloned()
    }

    pub async fn set_hidden(&self, hidden: bool) -> Result<bool, AdapterError> {
        self.request(|reply| ApplicationWrite::Hidden(hidden, reply))
            .await
            .map(Option::unwrap_or_default)
    }

    /// Make `window` the main window. Resolves to the main window read back
    /// after the write, which may differ if the application refused.
    pub async fn set_main_window(&self, window: &Window) -> Result<Option<Window>, AdapterError> {
        let window = window.clone();
        self.request(|reply| ApplicationWrite::MainWindow(window, reply))
            .await
    }

    async fn request<T>(
        &self,
        write: impl FnOnce(Reply<T>) -> ApplicationWrite,
    ) -> Result<Option<T>, AdapterError> {
        let gone = || {
            AdapterError::invalid_object(format!("application {} is invalid", self.element()))
        };
        if !self.is_valid() {
            return Err(gone());
        }
        let (reply, response) = oneshot::channel();
        self.tx
            .send(ApplicationMessage::Write(write(reply)))
            .map_err(|_| gone())?;
        response.await.map_err(|_| gone())?
    }
}

impl PartialEq for Application {
    fn eq(&self, other: &Self) -> bool {
        self.equal_to(other)
    }
}

impl Eq for Application {}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("element", &self.element())
            .field("valid", &self.is_valid())
            .finish()
    }
}

enum Phase {
    Initializing {
        ready: Option<oneshot::Sender<Result<(), AdapterError>>>,
        fetched: bool,
        enumerated: bool,
    },
    Ready,
}

/// A composite read whose window is not in the collection yet.
#[derive(Debug, Clone, Copy)]
struct Deferred {
    /// Zero for the initial fetch, which initializes the cell instead.
    generation: u64,
    element: ElementRef,
    origin: Origin,
}

struct ApplicationActor {
    ctx: MirrorContext,
    shared: Arc<ApplicationShared>,
    actor: WeakUnboundedSender<ApplicationMessage>,
    subscription: SubscriptionId,
    phase: Phase,
    hidden: Property<bool>,
    main_window: Property<Window>,
    focused_window: Property<Window>,
    windows: WindowCollection,
    windows_tx: watch::Sender<Vec<Window>>,
    deferred: HashMap<Attribute, Deferred>,
}

impl ApplicationActor {
    async fn run(mut self, mut rx: UnboundedReceiver<ApplicationMessage>) {
        while self.shared.validity.is_valid() {
            let Some(message) = rx.recv().await else {
                break;
            };
            self.handle(message);
        }
        self.shutdown();
    }

    fn element(&self) -> ElementRef {
        self.shared.element
    }

    fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready)
    }

    fn handle_ref(&self) -> Option<Application> {
        self.actor.upgrade().map(|tx| Application {
            shared: self.shared.clone(),
            tx,
        })
    }

    /// Events only flow once the application has been handed out.
    fn publish(&self, event: Event) {
        if self.is_ready() {
            self.ctx.notifier.publish(event);
        } else {
            trace!(
                event = "core.application.event_suppressed",
                element = %self.element(),
                kind = event.kind(),
            );
        }
    }

    fn publish_change<T>(
        &self,
        change: Option<Change<T>>,
        origin: Origin,
        event: fn(PropertyChange<Application, T>) -> Event,
    ) {
        if let Some(change) = change
            && let Some(subject) = self.handle_ref()
        {
            self.publish(event(PropertyChange {
                subject,
                old: change.old,
                new: change.new,
                origin,
            }));
        }
    }

    fn handle(&mut self, message: ApplicationMessage) {
        match message {
            ApplicationMessage::Notification(notification) => self.notification(notification),
            ApplicationMessage::Fetched(result) => self.fetched(result),
            ApplicationMessage::Enumerated(result) => self.enumerated(result),
            ApplicationMessage::WindowInitialized { element, result } => {
                self.window_initialized(element, result)
            }
            ApplicationMessage::WindowInvalidated { element } => self.remove_window(element),
            ApplicationMessage::ReadDone(done) => self.read_done(done),
            ApplicationMessage::WriteDone(done) => self.write_done(done),
            ApplicationMessage::Write(write) => self.write(write),
        }
    }

    fn cell(&mut self, attribute: Attribute) -> Option<&mut dyn CellControl> {
        match attribute {
            Attribute::Hidden => Some(&mut self.hidden),
            Attribute::MainWindow => Some(&mut self.main_window),
            Attribute::FocusedWindow => Some(&mut self.focused_window),
            _ => None,
        }
    }

    fn composite(&mut self, attribute: Attribute) -> &mut Property<Window> {
        if attribute == Attribute::FocusedWindow {
            &mut self.focused_window
        } else {
            &mut self.main_window
        }
    }

    // Initialization

    fn fetched(&mut self, result: Result<FetchedAttributes, AdapterError>) {
        let mut fetched = match result {
            Ok(fetched) => fetched,
            Err(e) => return self.fail_initialization(e.into_initialization_error()),
        };

        match self.hidden.initialize_from(fetched.take(Attribute::Hidden)) {
            Ok(()) => self.resume(Attribute::Hidden),
            Err(e) => return self.fail_initialization(e),
        }

        for attribute in COMPOSITES {
            let reference = fetched
                .take(attribute)
                .and_then(|raw| decode_reference(attribute, raw))
                .map_err(AdapterError::into_initialization_error);
            match reference {
                Ok(None) => self.initialize_composite(attribute, None),
                Ok(Some(element)) => match self.windows.resolve(element) {
                    Resolution::Live(window) => self.initialize_composite(attribute, Some(window)),
                    Resolution::Destroyed => self.initialize_composite(attribute, None),
                    Resolution::Unknown => {
                        self.deferred.insert(
                            attribute,
                            Deferred {
                                generation: 0,
                                element,
                                origin: Origin::External,
                            },
                        );
                    }
                },
                Err(e) => return self.fail_initialization(e),
            }
        }

        if let Phase::Initializing { fetched, .. } = &mut self.phase {
            *fetched = true;
        }
        self.try_finish_initialization();
    }

    fn initialize_composite(&mut self, attribute: Attribute, window: Option<Window>) {
        match self.composite(attribute).initialize(window) {
            Ok(()) => self.resume(attribute),
            Err(e) => self.fail_initialization(e),
        }
    }

    fn enumerated(&mut self, result: Result<Option<AttrValue>, AdapterError>) {
        let elements = match result
            .and_then(decode_windows)
            .map_err(AdapterError::into_initialization_error)
        {
            Ok(elements) => elements,
            Err(e) => return self.fail_initialization(e),
        };

        let to_initialize = self.windows.merge_enumeration(elements);
        debug!(
            event = "core.application.windows_enumerated",
            element = %self.element(),
            new = to_initialize.len(),
        );
        for element in to_initialize {
            self.spawn_window(element);
        }

        if let Phase::Initializing { enumerated, .. } = &mut self.phase {
            *enumerated = true;
        }
        self.collection_changed();
    }

    fn try_finish_initialization(&mut self) {
        if !self.shared.validity.is_valid() {
            return;
        }
        let Phase::Initializing {
            fetched: true,
            enumerated: true,
            ..
        } = self.phase
        else {
            return;
        };
        if self.windows.has_pending() {
            return;
        }

        // The collection has settled; anything still unresolved is absent.
        for attribute in COMPOSITES {
            if self
                .deferred
                .get(&attribute)
                .is_some_and(|deferred| deferred.generation == 0)
            {
                self.deferred.remove(&attribute);
                debug!(
                    event = "core.application.composite_unresolved",
                    element = %self.element(),
                    attribute = %attribute,
                );
                self.initialize_composite(attribute, None);
            }
        }
        if !self.shared.validity.is_valid() {
            return;
        }

        let Phase::Initializing { ready, .. } = std::mem::replace(&mut self.phase, Phase::Ready)
        else {
            return;
        };
        info!(
            event = "core.application.initialized",
            element = %self.element(),
            windows = self.windows.len(),
        );
        for window in self.windows.children() {
            window.surface();
        }
        if let Some(ready) = ready {
            let _ = ready.send(Ok(()));
        }
    }

    fn fail_initialization(&mut self, error: AdapterError) {
        warn!(
            event = "core.application.initialize_failed",
            element = %self.element(),
            error = %error,
        );
        if let Phase::Initializing { ready, .. } = &mut self.phase
            && let Some(ready) = ready.take()
        {
            let _ = ready.send(Err(error.clone()));
        }
        self.invalidate(&error.to_string());
    }

    // Window collection

    fn spawn_window(&self, element: ElementRef) {
        let ctx = self.ctx.clone();
        let parent = self.actor.clone();
        tokio::spawn(async move {
            let result = Window::initialize_with_parent(&ctx, element, Some(parent.clone())).await;
            if let Some(tx) = parent.upgrade() {
                let _ = tx.send(ApplicationMessage::WindowInitialized { element, result });
            }
        });
    }

    fn upsert_window(&mut self, element: ElementRef) {
        if self.windows.begin_upsert(element) {
            debug!(
                event = "core.application.window_upsert",
                element = %self.element(),
                window = %element,
            );
            self.spawn_window(element);
        }
    }

    fn window_initialized(&mut self, element: ElementRef, result: Result<Window, AdapterError>) {
        match result {
            Ok(window) if !window.is_valid() => {
                debug!(
                    event = "core.application.window_died_during_initialize",
                    element = %self.element(),
                    window = %element,
                );
                self.windows.abandon(element, true);
            }
            Ok(window) => match self.windows.finish_upsert(element, window.clone()) {
                Upserted::Added => {
                    if self.is_ready() {
                        self.publish(Event::WindowCreated {
                            window: window.clone(),
                        });
                        window.surface();
                    }
                }
                Upserted::Suppressed(window) => {
                    debug!(
                        event = "core.application.window_suppressed",
                        element = %self.element(),
                        window = %element,
                    );
                    drop(window);
                }
            },
            Err(e) => {
                debug!(
                    event = "core.application.window_initialize_failed",
                    element = %self.element(),
                    window = %element,
                    error = %e,
                );
                let destroyed = e.is_invalid_object();
                self.windows.abandon(element, destroyed);
                if !destroyed {
                    self.abandon_deferred(element, &e);
                }
            }
        }
        self.collection_changed();
    }

    /// Settle steady-state composite reads waiting on a window that will not
    /// appear. Initial reads are left to startup, which resolves them to
    /// absent.
    fn abandon_deferred(&mut self, element: ElementRef, error: &AdapterError) {
        let abandoned: Vec<(Attribute, Deferred)> = self
            .deferred
            .iter()
            .filter(|(_, deferred)| deferred.element == element && deferred.generation != 0)
            .map(|(attribute, deferred)| (*attribute, *deferred))
            .collect();
        for (attribute, deferred) in abandoned {
            self.deferred.remove(&attribute);
            if !self.composite(attribute).is_current(deferred.generation) {
                continue;
            }
            self.composite(attribute).fail(deferred.generation, error);
            self.refresh_failed(attribute, error.clone());
        }
    }

    fn remove_window(&mut self, element: ElementRef) {
        if let Some(window) = self.windows.remove(element) {
            debug!(
                event = "core.application.window_removed",
                element = %self.element(),
                window = %element,
            );
            self.publish(Event::WindowDestroyed {
                window: window.clone(),
            });
            window.destroyed();
        }
        self.collection_changed();
    }

    fn collection_changed(&mut self) {
        self.windows_tx.send_replace(self.windows.children());

        let pending: Vec<(Attribute, Deferred)> =
            self.deferred.iter().map(|(a, d)| (*a, *d)).collect();
        for (attribute, deferred) in pending {
            match self.windows.resolve(deferred.element) {
                Resolution::Unknown => continue,
                Resolution::Live(window) => {
                    self.deferred.remove(&attribute);
                    self.resolve_deferred(attribute, deferred, Some(window));
                }
                Resolution::Destroyed => {
                    self.deferred.remove(&attribute);
                    debug!(
                        event = "core.application.composite_destroyed",
                        element = %self.element(),
                        attribute = %attribute,
                        window = %deferred.element,
                    );
                    if deferred.generation == 0 {
                        self.initialize_composite(attribute, None);
                    } else {
                        self.composite(attribute).discard(deferred.generation);
                    }
                }
            }
            if !self.shared.validity.is_valid() {
                return;
            }
        }

        self.try_finish_initialization();
    }

    fn resolve_deferred(
        &mut self,
        attribute: Attribute,
        deferred: Deferred,
        window: Option<Window>,
    ) {
        if deferred.generation == 0 {
            self.initialize_composite(attribute, window);
            return;
        }
        let change = self.composite(attribute).resolve(deferred.generation, window);
        self.publish_change(change, deferred.origin, composite_event(attribute));
    }

    // Notifications and refreshes

    fn notification(&mut self, notification: Notification) {
        let element = self.element();
        trace!(
            event = "core.application.notification",
            element = %element,
            kind = ?notification.kind,
            source = %notification.element,
        );

        match notification.kind {
            NotificationKind::WindowCreated => self.upsert_window(notification.element),
            NotificationKind::ElementDestroyed if notification.element == element => {
                self.invalidate("application destroyed")
            }
            NotificationKind::ElementDestroyed => self.remove_window(notification.element),
            kind => {
                let attribute = match kind {
                    NotificationKind::ApplicationHidden | NotificationKind::ApplicationShown => {
                        Attribute::Hidden
                    }
                    NotificationKind::MainWindowChanged => Attribute::MainWindow,
                    NotificationKind::FocusedWindowChanged => Attribute::FocusedWindow,
                    kind => {
                        debug!(
                            event = "core.application.notification_unrouted",
                            element = %element,
                            kind = ?kind,
                        );
                        return;
                    }
                };
                if attribute == Attribute::Hidden && notification.element != element {
                    debug!(
                        event = "core.application.foreign_source",
                        element = %element,
                        source = %notification.element,
                        kind = ?kind,
                    );
                }
                self.notify(attribute);
            }
        }
    }

    fn notify(&mut self, attribute: Attribute) {
        let Some(cell) = self.cell(attribute) else {
            return;
        };
        if let Some(generation) = cell.notification_received() {
            self.read(attribute, generation);
        }
    }

    fn resume(&mut self, attribute: Attribute) {
        if let Some(cell) = self.cell(attribute) {
            let next = cell.resume();
            self.dispatch(attribute, next);
        }
    }

    fn read(&self, attribute: Attribute, generation: u64) {
        self.dispatch(attribute, Next::Read(generation));
    }

    fn dispatch(&self, attribute: Attribute, next: Next) {
        dispatch(&self.ctx.adapter, &self.actor, self.element(), attribute, next);
    }

    fn read_done(&mut self, done: ReadDone) {
        let ReadDone {
            attribute,
            generation,
            result,
        } = done;
        match attribute {
            Attribute::Hidden => {
                let completion = self.hidden.complete_raw(generation, result);
                self.settle(attribute, completion, Event::ApplicationHiddenChanged);
            }
            Attribute::MainWindow | Attribute::FocusedWindow => {
                self.composite_done(attribute, generation, result)
            }
            other => warn!(
                event = "core.application.unknown_read",
                element = %self.element(),
                attribute = %other,
            ),
        }
    }

    fn settle<T: CellValue>(
        &mut self,
        attribute: Attribute,
        completion: Completion<T>,
        event: fn(PropertyChange<Application, T>) -> Event,
    ) {
        match completion {
            Completion::Stale => trace!(
                event = "core.application.stale_read",
                element = %self.element(),
                attribute = %attribute,
            ),
            Completion::Applied { change, origin } => {
                self.publish_change(change, origin, event);
                self.resume(attribute);
            }
            Completion::Failed { error } => self.refresh_failed(attribute, error),
        }
    }

    fn refresh_failed(&mut self, attribute: Attribute, error: AdapterError) {
        if error.is_invalid_object() {
            self.invalidate(&error.to_string());
            return;
        }
        warn!(
            event = "core.application.refresh_failed",
            element = %self.element(),
            attribute = %attribute,
            error = %error,
        );
        self.publish(Event::RefreshFailed {
            element: self.element(),
            attribute,
            error,
        });
        self.resume(attribute);
    }

    fn composite_done(
        &mut self,
        attribute: Attribute,
        generation: u64,
        result: Result<Option<AttrValue>, AdapterError>,
    ) {
        let Some(accepted) = self.composite(attribute).accept(generation) else {
            trace!(
                event = "core.application.stale_read",
                element = %self.element(),
                attribute = %attribute,
            );
            return;
        };
        // Whatever this read finds supersedes an older deferred resolution.
        self.deferred.remove(&attribute);

        match result.and_then(|raw| decode_reference(attribute, raw)) {
            Err(error) => {
                self.composite(attribute).fail(generation, &error);
                self.refresh_failed(attribute, error);
                return;
            }
            Ok(None) => {
                let change = self.composite(attribute).resolve(generation, None);
                self.publish_change(change, accepted.origin, composite_event(attribute));
            }
            Ok(Some(element)) => match self.windows.resolve(element) {
                Resolution::Live(window) => {
                    let change = self.composite(attribute).resolve(generation, Some(window));
                    self.publish_change(change, accepted.origin, composite_event(attribute));
                }
                Resolution::Destroyed => {
                    debug!(
                        event = "core.application.composite_destroyed",
                        element = %self.element(),
                        attribute = %attribute,
                        window = %element,
                    );
                    self.composite(attribute).discard(generation);
                }
                Resolution::Unknown => {
                    debug!(
                        event = "core.application.composite_deferred",
                        element = %self.element(),
                        attribute = %attribute,
                        window = %element,
                    );
                    self.deferred.insert(
                        attribute,
                        Deferred {
                            generation,
                            element,
                            origin: accepted.origin,
                        },
                    );
                    // The application names a window it has not announced yet.
                    self.upsert_window(element);
                }
            },
        }

        self.resume(attribute);
    }

    // Writes

    fn write(&mut self, write: ApplicationWrite) {
        let element = self.element();
        let (attribute, pending) = match write {
            ApplicationWrite::Hidden(hidden, reply) => (
                Attribute::Hidden,
                self.hidden
                    .begin_write(reply, (element, Attribute::Hidden), hidden.into_attr()),
            ),
            ApplicationWrite::MainWindow(window, reply) => (
                Attribute::MainWindow,
                self.main_window.begin_write(
                    reply,
                    (window.element(), Attribute::Main),
                    true.into_attr(),
                ),
            ),
        };
        if let Some(pending) = pending {
            self.dispatch(attribute, Next::Write(pending));
        }
    }

    fn write_done(&mut self, done: WriteDone) {
        let Some(cell) = self.cell(done.attribute) else {
            return;
        };
        match cell.write_completed(done.write_id, done.result) {
            WriteOutcome::Refresh(generation) => self.read(done.attribute, generation),
            WriteOutcome::Failed => self.resume(done.attribute),
            WriteOutcome::Invalidated(error) if done.attribute == Attribute::MainWindow => {
                // The window written to is gone, not the application.
                debug!(
                    event = "core.application.main_window_write_invalid",
                    element = %self.element(),
                    error = %error,
                );
                self.resume(done.attribute);
            }
            WriteOutcome::Invalidated(error) => self.invalidate(&error.to_string()),
        }
    }

    // Lifecycle

    fn invalidate(&mut self, cause: &str) {
        if !self.shared.validity.mark_invalid() {
            return;
        }
        let element = self.element();
        info!(event = "core.application.invalidated", element = %element, cause = cause);

        self.hidden.invalidate(cause);
        self.main_window.invalidate(cause);
        self.focused_window.invalidate(cause);
        self.deferred.clear();

        if let Phase::Initializing { ready, .. } = &mut self.phase
            && let Some(ready) = ready.take()
        {
            let _ = ready.send(Err(AdapterError::invalid_object(cause)));
        }
        if self.is_ready() {
            if let Some(application) = self.handle_ref() {
                self.ctx
                    .notifier
                    .publish(Event::ApplicationDestroyed { application });
            }
            for window in self.windows.drain() {
                self.ctx.notifier.publish(Event::WindowDestroyed {
                    window: window.clone(),
                });
                window.destroyed();
            }
            self.windows_tx.send_replace(Vec::new());
        }
    }

    fn shutdown(&mut self) {
        if let Phase::Initializing { ready, .. } = &mut self.phase
            && let Some(ready) = ready.take()
        {
            let _ = ready.send(Err(AdapterError::invalid_object("application delegate stopped")));
        }
        let cause = "application delegate stopped";
        self.hidden.invalidate(cause);
        self.main_window.invalidate(cause);
        self.focused_window.invalidate(cause);
        self.ctx.adapter.unsubscribe(self.subscription);
        debug!(event = "core.application.stopped", element = %self.element());
    }
}

fn composite_event(attribute: Attribute) -> fn(PropertyChange<Application, Window>) -> Event {
    if attribute == Attribute::FocusedWindow {
        Event::ApplicationFocusedWindowChanged
    } else {
        Event::ApplicationMainWindowChanged
    }
}

fn unexpected(attribute: Attribute, value: &AttrValue) -> AdapterError {
    warn!(
        event = "core.application.unexpected_value_type",
        attribute = %attribute,
        kind = value.kind(),
    );
    AdapterError::invalid_object(format!("unexpected {} value for {}", value.kind(), attribute))
}

fn decode_reference(
    attribute: Attribute,
    raw: Option<AttrValue>,
) -> Result<Option<ElementRef>, AdapterError> {
    raw.map(|value| ElementRef::from_attr(value).map_err(|value| unexpected(attribute, &value)))
        .transpose()
}

/// The window list is required: an absent list fails like a missing attribute.
fn decode_windows(raw: Option<AttrValue>) -> Result<Vec<ElementRef>, AdapterError> {
    let value = raw.ok_or_else(|| {
        AdapterError::invalid_object(format!(
            "required attribute {} is missing",
            Attribute::Windows
        ))
    })?;
    Vec::<ElementRef>::from_attr(value).map_err(|value| unexpected(Attribute::Windows, &value))
}
