use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to an application or window owned by the attribute service.
///
/// Two references compare equal iff the service considers them the same
/// underlying object. A reference can become permanently invalid at any
/// time; nothing about the handle itself changes when that happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef(u64);

impl ElementRef {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Named attribute of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Position,
    Size,
    Title,
    Minimized,
    Fullscreen,
    Main,
    Hidden,
    MainWindow,
    FocusedWindow,
    Windows,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Position => "position",
            Attribute::Size => "size",
            Attribute::Title => "title",
            Attribute::Minimized => "minimized",
            Attribute::Fullscreen => "fullscreen",
            Attribute::Main => "main",
            Attribute::Hidden => "hidden",
            Attribute::MainWindow => "main_window",
            Attribute::FocusedWindow => "focused_window",
            Attribute::Windows => "windows",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Untyped attribute value as exchanged with the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Point(Point),
    Size(Size),
    String(String),
    Bool(bool),
    Element(ElementRef),
    Elements(Vec<ElementRef>),
}

impl AttrValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Point(_) => "point",
            AttrValue::Size(_) => "size",
            AttrValue::String(_) => "string",
            AttrValue::Bool(_) => "bool",
            AttrValue::Element(_) => "element",
            AttrValue::Elements(_) => "elements",
        }
    }
}

/// Change notifications the service can push for a subscribed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    ElementDestroyed,
    WindowCreated,
    WindowMoved,
    WindowResized,
    TitleChanged,
    WindowMiniaturized,
    WindowDeminiaturized,
    MainWindowChanged,
    FocusedWindowChanged,
    ApplicationHidden,
    ApplicationShown,
}

/// A delivered notification. `element` is the object the service reports as
/// the source, which is not always the subscribed object (a window creation
/// arrives on the application's subscription carrying the new window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub element: ElementRef,
}

impl Notification {
    pub fn new(kind: NotificationKind, element: ElementRef) -> Self {
        Self { kind, element }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Raw fault codes raised by the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceFault {
    #[error("service could not complete the request")]
    CannotComplete,

    #[error("element is invalid")]
    InvalidElement,

    #[error("illegal argument")]
    IllegalArgument,

    #[error("service failure")]
    Failure,

    #[error("attribute has no value")]
    NoValue,

    #[error("attribute unsupported")]
    AttributeUnsupported,

    #[error("notification unsupported")]
    NotificationUnsupported,

    #[error("service API disabled")]
    ApiDisabled,

    #[error("unrecognized fault code {0}")]
    Other(i32),
}

impl ServiceFault {
    /// Whether a read fault means "the attribute is absent" rather than an error.
    pub fn is_absence(&self) -> bool {
        matches!(self, ServiceFault::NoValue | ServiceFault::AttributeUnsupported)
    }
}
