//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axmirror_core::{
    AttrValue, Attribute, AttributeAdapter, ElementRef, Event, EventRecorder, InMemoryService,
    MessagingTimeout, MirrorContext, Point, Size, WorkerPool,
};

pub const APP: ElementRef = ElementRef::new(1);
pub const W1: ElementRef = ElementRef::new(11);
pub const W2: ElementRef = ElementRef::new(12);
pub const W3: ElementRef = ElementRef::new(13);

pub struct Fixture {
    pub service: Arc<InMemoryService>,
    pub recorder: Arc<EventRecorder>,
    pub ctx: MirrorContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_timeout(0)
    }

    pub fn with_timeout(timeout_ms: u64) -> Self {
        let service = Arc::new(InMemoryService::new());
        let recorder = Arc::new(EventRecorder::new());
        let adapter = AttributeAdapter::new(
            service.clone(),
            WorkerPool::new(NonZeroUsize::new(8).unwrap()),
            MessagingTimeout::from_millis(timeout_ms),
        );
        let ctx = MirrorContext::new(adapter, recorder.clone());
        Self {
            service,
            recorder,
            ctx,
        }
    }

    pub fn add_window(&self, element: ElementRef, title: &str) {
        self.service.add_object(element, window_attributes(title));
    }

    /// An application listing `windows`, with `main` as main and focused window.
    pub fn add_application(&self, windows: &[ElementRef], main: Option<ElementRef>) {
        let mut attributes = vec![
            (Attribute::Hidden, AttrValue::Bool(false)),
            (Attribute::Windows, AttrValue::Elements(windows.to_vec())),
        ];
        if let Some(main) = main {
            attributes.push((Attribute::MainWindow, AttrValue::Element(main)));
            attributes.push((Attribute::FocusedWindow, AttrValue::Element(main)));
        }
        self.service.add_object(APP, attributes);
    }

    pub fn events(&self) -> Vec<Event> {
        self.recorder.events()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.recorder.events().iter().filter(|e| predicate(e)).count()
    }
}

pub fn window_attributes(title: &str) -> Vec<(Attribute, AttrValue)> {
    vec![
        (Attribute::Position, AttrValue::Point(Point::new(0.0, 0.0))),
        (Attribute::Size, AttrValue::Size(Size::new(800.0, 600.0))),
        (Attribute::Title, AttrValue::String(title.to_string())),
        (Attribute::Minimized, AttrValue::Bool(false)),
    ]
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

/// Give in-flight reads and notifications time to drain.
pub async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
