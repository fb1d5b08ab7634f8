//! Typed change events published by the entity delegates.

use serde::{Deserialize, Serialize};

use crate::adapter::AdapterError;
use crate::entity::{Application, Window};
use crate::service::{Attribute, ElementRef, Point, Size};

/// Who caused a change: the remote side, or a `set_*` call on this mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    External,
    Local,
}

/// One observed transition of a property's resolved value.
#[derive(Debug, Clone)]
pub struct PropertyChange<S, T> {
    pub subject: S,
    pub old: Option<T>,
    pub new: Option<T>,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub enum Event {
    WindowCreated { window: Window },
    WindowDestroyed { window: Window },
    WindowPositionChanged(PropertyChange<Window, Point>),
    WindowSizeChanged(PropertyChange<Window, Size>),
    WindowTitleChanged(PropertyChange<Window, String>),
    WindowMinimizedChanged(PropertyChange<Window, bool>),
    WindowFullscreenChanged(PropertyChange<Window, bool>),
    ApplicationHiddenChanged(PropertyChange<Application, bool>),
    ApplicationMainWindowChanged(PropertyChange<Application, Window>),
    ApplicationFocusedWindowChanged(PropertyChange<Application, Window>),
    ApplicationDestroyed { application: Application },
    /// A steady-state refresh failed without invalidating the entity.
    RefreshFailed {
        element: ElementRef,
        attribute: Attribute,
        error: AdapterError,
    },
}

impl Event {
    /// Origin of a property change. Lifecycle events are always external.
    pub fn origin(&self) -> Origin {
        match self {
            Event::WindowPositionChanged(change) => change.origin,
            Event::WindowSizeChanged(change) => change.origin,
            Event::WindowTitleChanged(change) => change.origin,
            Event::WindowMinimizedChanged(change) => change.origin,
            Event::WindowFullscreenChanged(change) => change.origin,
            Event::ApplicationHiddenChanged(change) => change.origin,
            Event::ApplicationMainWindowChanged(change) => change.origin,
            Event::ApplicationFocusedWindowChanged(change) => change.origin,
            Event::WindowCreated { .. }
            | Event::WindowDestroyed { .. }
            | Event::ApplicationDestroyed { .. }
            | Event::RefreshFailed { .. } => Origin::External,
        }
    }

    /// The object the event is about.
    pub fn element(&self) -> ElementRef {
        match self {
            Event::WindowCreated { window } | Event::WindowDestroyed { window } => window.element(),
            Event::WindowPositionChanged(change) => change.subject.element(),
            Event::WindowSizeChanged(change) => change.subject.element(),
            Event::WindowTitleChanged(change) => change.subject.element(),
            Event::WindowMinimizedChanged(change) => change.subject.element(),
            Event::WindowFullscreenChanged(change) => change.subject.element(),
            Event::ApplicationHiddenChanged(change) => change.subject.element(),
            Event::ApplicationMainWindowChanged(change) => change.subject.element(),
            Event::ApplicationFocusedWindowChanged(change) => change.subject.element(),
            Event::ApplicationDestroyed { application } => application.element(),
            Event::RefreshFailed { element, .. } => *element,
        }
    }

    /// Short stable name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::WindowCreated { .. } => "window_created",
            Event::WindowDestroyed { .. } => "window_destroyed",
            Event::WindowPositionChanged(_) => "window_position_changed",
            Event::WindowSizeChanged(_) => "window_size_changed",
            Event::WindowTitleChanged(_) => "window_title_changed",
            Event::WindowMinimizedChanged(_) => "window_minimized_changed",
            Event::WindowFullscreenChanged(_) => "window_fullscreen_changed",
            Event::ApplicationHiddenChanged(_) => "application_hidden_changed",
            Event::ApplicationMainWindowChanged(_) => "application_main_window_changed",
            Event::ApplicationFocusedWindowChanged(_) => "application_focused_window_changed",
            Event::ApplicationDestroyed { .. } => "application_destroyed",
            Event::RefreshFailed { .. } => "refresh_failed",
        }
    }
}
