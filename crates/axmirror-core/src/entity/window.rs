use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

use super::application::ApplicationMessage;
use super::{MirrorContext, ReadDone, Validity, WriteDone, dispatch, notification_sink};
use crate::adapter::AdapterError;
use crate::events::{Event, PropertyChange};
use crate::property::{
    CellControl, CellValue, Completion, IntoAttrValue, Next, Property, Reply, Requirement,
    WriteOutcome,
};
use crate::service::{
    Attribute, ElementRef, Notification, NotificationKind, Point, Size, SubscriptionId,
};

const WINDOW_NOTIFICATIONS: &[NotificationKind] = &[
    NotificationKind::ElementDestroyed,
    NotificationKind::WindowMoved,
    NotificationKind::WindowResized,
    NotificationKind::TitleChanged,
    NotificationKind::WindowMiniaturized,
    NotificationKind::WindowDeminiaturized,
];

const WINDOW_ATTRIBUTES: &[Attribute] = &[
    Attribute::Position,
    Attribute::Size,
    Attribute::Title,
    Attribute::Minimized,
    Attribute::Fullscreen,
];

pub(crate) enum WindowWrite {
    Position(Point, Reply<Point>),
    Size(Size, Reply<Size>),
    Minimized(bool, Reply<bool>),
    Fullscreen(bool, Reply<bool>),
}

pub(crate) enum WindowMessage {
    Notification(Notification),
    ReadDone(ReadDone),
    WriteDone(WriteDone),
    Write(WindowWrite),
    /// The owning application saw this window go away.
    Destroyed,
}

impl From<Notification> for WindowMessage {
    fn from(notification: Notification) -> Self {
        WindowMessage::Notification(notification)
    }
}

impl From<ReadDone> for WindowMessage {
    fn from(done: ReadDone) -> Self {
        WindowMessage::ReadDone(done)
    }
}

impl From<WriteDone> for WindowMessage {
    fn from(done: WriteDone) -> Self {
        WindowMessage::WriteDone(done)
    }
}

struct WindowShared {
    element: ElementRef,
    validity: Validity,
    /// Cleared for a child window until its application has announced it.
    surfaced: AtomicBool,
    position: watch::Receiver<Option<Point>>,
    size: watch::Receiver<Option<Size>>,
    title: watch::Receiver<Option<String>>,
    minimized: watch::Receiver<Option<bool>>,
    fullscreen: watch::Receiver<Option<bool>>,
}

/// Live mirror of one remote window.
///
/// Cloning is cheap; every clone observes the same state. Two handles are
/// equal iff they mirror the same remote object.
#[derive(Clone)]
pub struct Window {
    shared: Arc<WindowShared>,
    tx: UnboundedSender<WindowMessage>,
}

impl Window {
    /// Subscribe to `element`, fetch its attributes and start mirroring it.
    ///
    /// Fails if the window is already gone, a required attribute is missing,
    /// or the subscription or fetch fails.
    pub async fn initialize(
        ctx: &MirrorContext,
        element: ElementRef,
    ) -> Result<Window, AdapterError> {
        Self::initialize_with_parent(ctx, element, None).await
    }

    pub(crate) async fn initialize_with_parent(
        ctx: &MirrorContext,
        element: ElementRef,
        parent: Option<WeakUnboundedSender<ApplicationMessage>>,
    ) -> Result<Window, AdapterError> {
        debug!(event = "core.window.initialize_started", element = %element);

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = tx.downgrade();

        // Subscribe before the first read so no change between the two is missed.
        let subscription = ctx
            .adapter()
            .subscribe(element, WINDOW_NOTIFICATIONS, notification_sink(actor.clone()))
            .await
            .map_err(|e| {
                debug!(event = "core.window.subscribe_failed", element = %element, error = %e);
                e.into_initialization_error()
            })?;

        let cells = match Self::fetch_cells(ctx, element).await {
            Ok(cells) => cells,
            Err(e) => {
                debug!(event = "core.window.initialize_failed", element = %element, error = %e);
                ctx.adapter().unsubscribe(subscription);
                return Err(e);
            }
        };

        let shared = Arc::new(WindowShared {
            element,
            validity: Validity::new(),
            surfaced: AtomicBool::new(parent.is_none()),
            position: cells.position.subscribe(),
            size: cells.size.subscribe(),
            title: cells.title.subscribe(),
            minimized: cells.minimized.subscribe(),
            fullscreen: cells.fullscreen.subscribe(),
        });

        let actor = WindowActor {
            ctx: ctx.clone(),
            shared: shared.clone(),
            actor,
            parent,
            subscription,
            cells,
        };
        tokio::spawn(actor.run(rx));

        info!(event = "core.window.initialized", element = %element);
        Ok(Window { shared, tx })
    }

    async fn fetch_cells(
        ctx: &MirrorContext,
        element: ElementRef,
    ) -> Result<WindowCells, AdapterError> {
        let mut fetched = ctx
            .adapter()
            .read_many(element, WINDOW_ATTRIBUTES)
            .await
            .map_err(AdapterError::into_initialization_error)?;

        let mut cells = WindowCells::new();
        cells.position.initialize_from(fetched.take(Attribute::Position))?;
        cells.size.initialize_from(fetched.take(Attribute::Size))?;
        cells.title.initialize_from(fetched.take(Attribute::Title))?;
        cells.minimized.initialize_from(fetched.take(Attribute::Minimized))?;
        cells.fullscreen.initialize_from(fetched.take(Attribute::Fullscreen))?;
        Ok(cells)
    }

    pub fn element(&self) -> ElementRef {
        self.shared.element
    }

    pub fn is_valid(&self) -> bool {
        self.shared.validity.is_valid()
    }

    /// Identity comparison of the underlying remote objects.
    pub fn equal_to(&self, other: &Window) -> bool {
        self.element() == other.element()
    }

    pub fn position(&self) -> Point {
        self.shared.position.borrow().unwrap_or_default()
    }

    pub fn size(&self) -> Size {
        self.shared.size.borrow().unwrap_or_default()
    }

    pub fn title(&self) -> String {
        self.shared.title.borrow().clone().unwrap_or_default()
    }

    pub fn is_minimized(&self) -> bool {
        self.shared.minimized.borrow().unwrap_or_default()
    }

    /// `None` when the window does not report fullscreen state.
    pub fn is_fullscreen(&self) -> Option<bool> {
        *self.shared.fullscreen.borrow()
    }

    /// Move the window. Resolves to the position read back after the write.
    pub async fn set_position(&self, position: Point) -> Result<Point, AdapterError> {
        self.request(|reply| WindowWrite::Position(position, reply))
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn set_size(&self, size: Size) -> Result<Size, AdapterError> {
        self.request(|reply| WindowWrite::Size(size, reply))
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn set_minimized(&self, minimized: bool) -> Result<bool, AdapterError> {
        self.request(|reply| WindowWrite::Minimized(minimized, reply))
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn set_fullscreen(&self, fullscreen: bool) -> Result<Option<bool>, AdapterError> {
        self.request(|reply| WindowWrite::Fullscreen(fullscreen, reply))
            .await
    }

    async fn request<T>(
        &self,
        write: impl FnOnce(Reply<T>) -> WindowWrite,
    ) -> Result<Option<T>, AdapterError> {
        let gone = || AdapterError::invalid_object(format!("window {} is invalid", self.element()));
        if !self.is_valid() {
            return Err(gone());
        }
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WindowMessage::Write(write(reply)))
            .map_err(|_| gone())?;
        response.await.map_err(|_| gone())?
    }

    /// Let the window publish its own events once its application has
    /// announced it.
    pub(crate) fn surface(&self) {
        self.shared.surfaced.store(true, Ordering::Release);
    }

    /// Stop mirroring after the owner learned the window was destroyed.
    pub(crate) fn destroyed(&self) {
        let _ = self.tx.send(WindowMessage::Destroyed);
    }
}

impl PartialEq for Window {
    fn eq(&self, other: &Self) -> bool {
        self.equal_to(other)
    }
}

impl Eq for Window {}

impl Hash for Window {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element().hash(state);
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("element", &self.element())
            .field("valid", &self.is_valid())
            .finish()
    }
}

struct WindowCells {
    position: Property<Point>,
    size: Property<Size>,
    title: Property<String>,
    minimized: Property<bool>,
    fullscreen: Property<bool>,
}

impl WindowCells {
    fn new() -> Self {
        Self {
            position: Property::new(Attribute::Position, Requirement::Required),
            size: Property::new(Attribute::Size, Requirement::Required),
            title: Property::new(Attribute::Title, Requirement::Required),
            minimized: Property::new(Attribute::Minimized, Requirement::Required),
            fullscreen: Property::new(Attribute::Fullscreen, Requirement::Optional),
        }
    }

    fn control(&mut self, attribute: Attribute) -> Option<&mut dyn CellControl> {
        match attribute {
            Attribute::Position => Some(&mut self.position),
            Attribute::Size => Some(&mut self.size),
            Attribute::Title => Some(&mut self.title),
            Attribute::Minimized => Some(&mut self.minimized),
            Attribute::Fullscreen => Some(&mut self.fullscreen),
            _ => None,
        }
    }

    fn invalidate(&mut self, cause: &str) {
        for attribute in WINDOW_ATTRIBUTES {
            if let Some(cell) = self.control(*attribute) {
                cell.invalidate(cause);
            }
        }
    }
}

struct WindowActor {
    ctx: MirrorContext,
    shared: Arc<WindowShared>,
    actor: WeakUnboundedSender<WindowMessage>,
    parent: Option<WeakUnboundedSender<ApplicationMessage>>,
    subscription: SubscriptionId,
    cells: WindowCells,
}

impl WindowActor {
    async fn run(mut self, mut rx: UnboundedReceiver<WindowMessage>) {
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

    /// A handle for event subjects. `None` once every consumer handle is gone.
    fn handle_ref(&self) -> Option<Window> {
        self.actor.upgrade().map(|tx| Window {
            shared: self.shared.clone(),
            tx,
        })
    }

    fn publish(&self, event: Event) {
        if self.shared.surfaced.load(Ordering::Acquire) {
            self.ctx.notifier.publish(event);
        } else {
            trace!(
                event = "core.window.event_suppressed",
                element = %self.element(),
                kind = event.kind(),
            );
        }
    }

    fn handle(&mut self, message: WindowMessage) {
        match message {
            WindowMessage::Notification(notification) => self.notification(notification),
            WindowMessage::ReadDone(done) => self.read_done(done),
            WindowMessage::WriteDone(done) => self.write_done(done),
            WindowMessage::Write(write) => self.write(write),
            WindowMessage::Destroyed => self.invalidate("window destroyed"),
        }
    }

    fn notification(&mut self, notification: Notification) {
        let element = self.element();
        trace!(
            event = "core.window.notification",
            element = %element,
            kind = ?notification.kind,
        );

        if notification.kind == NotificationKind::ElementDestroyed {
            if notification.element == element {
                self.invalidate("element destroyed");
            } else {
                debug!(
                    event = "core.window.foreign_destroy_ignored",
                    element = %element,
                    source = %notification.element,
                );
            }
            return;
        }

        if notification.element != element {
            debug!(
                event = "core.window.foreign_source",
                element = %element,
                source = %notification.element,
                kind = ?notification.kind,
            );
        }

        match notification.kind {
            NotificationKind::WindowMoved => self.notify(Attribute::Position),
            NotificationKind::WindowResized => {
                self.notify(Attribute::Size);
                self.notify(Attribute::Fullscreen);
            }
            NotificationKind::TitleChanged => self.notify(Attribute::Title),
            NotificationKind::WindowMiniaturized | NotificationKind::WindowDeminiaturized => {
                self.notify(Attribute::Minimized)
            }
            kind => debug!(
                event = "core.window.notification_unrouted",
                element = %element,
                kind = ?kind,
            ),
        }
    }

    fn notify(&mut self, attribute: Attribute) {
        let Some(cell) = self.cells.control(attribute) else {
            return;
        };
        if let Some(generation) = cell.notification_received() {
            self.read(attribute, generation);
        }
    }

    fn resume(&mut self, attribute: Attribute) {
        if let Some(cell) = self.cells.control(attribute) {
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
            Attribute::Position => {
                let completion = self.cells.position.complete_raw(generation, result);
                self.settle(attribute, completion, Event::WindowPositionChanged);
            }
            Attribute::Size => {
                let completion = self.cells.size.complete_raw(generation, result);
                self.settle(attribute, completion, Event::WindowSizeChanged);
            }
            Attribute::Title => {
                let completion = self.cells.title.complete_raw(generation, result);
                self.settle(attribute, completion, Event::WindowTitleChanged);
            }
            Attribute::Minimized => {
                let completion = self.cells.minimized.complete_raw(generation, result);
                self.settle(attribute, completion, Event::WindowMinimizedChanged);
            }
            Attribute::Fullscreen => {
                let completion = self.cells.fullscreen.complete_raw(generation, result);
                self.settle(attribute, completion, Event::WindowFullscreenChanged);
            }
            other => warn!(
                event = "core.window.unknown_read",
                element = %self.element(),
                attribute = %other,
            ),
        }
    }

    fn settle<T: CellValue>(
        &mut self,
        attribute: Attribute,
        completion: Completion<T>,
        event: fn(PropertyChange<Window, T>) -> Event,
    ) {
        let element = self.element();
        match completion {
            Completion::Stale => {
                trace!(event = "core.window.stale_read", element = %element, attribute = %attribute)
            }
            Completion::Applied { change, origin } => {
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
                self.resume(attribute);
            }
            Completion::Failed { error } => {
                if error.is_invalid_object() {
                    self.invalidate(&error.to_string());
                    return;
                }
                warn!(
                    event = "core.window.refresh_failed",
                    element = %element,
                    attribute = %attribute,
                    error = %error,
                );
                self.publish(Event::RefreshFailed {
                    element,
                    attribute,
                    error,
                });
                self.resume(attribute);
            }
        }
    }

    fn write(&mut self, write: WindowWrite) {
        let element = self.element();
        let (attribute, pending) = match write {
            WindowWrite::Position(position, reply) => (
                Attribute::Position,
                self.cells.position.begin_write(
                    reply,
                    (element, Attribute::Position),
                    position.into_attr(),
                ),
            ),
            WindowWrite::Size(size, reply) => (
                Attribute::Size,
                self.cells
                    .size
                    .begin_write(reply, (element, Attribute::Size), size.into_attr()),
            ),
            WindowWrite::Minimized(minimized, reply) => (
                Attribute::Minimized,
                self.cells.minimized.begin_write(
                    reply,
                    (element, Attribute::Minimized),
                    minimized.into_attr(),
                ),
            ),
            WindowWrite::Fullscreen(fullscreen, reply) => (
                Attribute::Fullscreen,
                self.cells.fullscreen.begin_write(
                    reply,
                    (element, Attribute::Fullscreen),
                    fullscreen.into_attr(),
                ),
            ),
        };
        if let Some(pending) = pending {
            self.dispatch(attribute, Next::Write(pending));
        }
    }

    fn write_done(&mut self, done: WriteDone) {
        let Some(cell) = self.cells.control(done.attribute) else {
            return;
        };
        match cell.write_completed(done.write_id, done.result) {
            WriteOutcome::Refresh(generation) => self.read(done.attribute, generation),
            WriteOutcome::Failed => self.resume(done.attribute),
            WriteOutcome::Invalidated(error) => self.invalidate(&error.to_string()),
        }
    }

    fn invalidate(&mut self, cause: &str) {
        if !self.shared.validity.mark_invalid() {
            return;
        }
        let element = self.element();
        info!(event = "core.window.invalidated", element = %element, cause = cause);

        self.cells.invalidate(cause);
        // A child window's destruction is announced by its application.
        match &self.parent {
            Some(parent) => {
                if let Some(parent) = parent.upgrade() {
                    let _ = parent.send(ApplicationMessage::WindowInvalidated { element });
                }
            }
            None => {
                if let Some(window) = self.handle_ref() {
                    self.publish(Event::WindowDestroyed { window });
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.cells.invalidate("window delegate stopped");
        self.ctx.adapter.unsubscribe(self.subscription);
        debug!(event = "core.window.stopped", element = %self.element());
    }
}
