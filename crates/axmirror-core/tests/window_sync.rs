//! Integration tests for a single mirrored window.
//!
//! Each test drives an `InMemoryService` directly: values change silently
//! and notifications are posted by hand, so the interleaving of reads,
//! notifications and writes is fully controlled.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axmirror_core::{
    AdapterError, AttrValue, Attribute, BroadcastNotifier, Event, MirrorContext, NotificationKind,
    Origin, Point, ServiceFault, Size, Window,
};
use common::{Fixture, W1, W2, eventually, quiesce};

fn is_title_change(event: &Event) -> bool {
    matches!(event, Event::WindowTitleChanged(_))
}

#[tokio::test]
async fn test_initialize_reads_all_attributes() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");

    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    assert_eq!(window.element(), W1);
    assert!(window.is_valid());
    assert_eq!(window.title(), "Notes");
    assert_eq!(window.position(), Point::new(0.0, 0.0));
    assert_eq!(window.size(), Size::new(800.0, 600.0));
    assert!(!window.is_minimized());
    assert_eq!(window.is_fullscreen(), None);

    assert_eq!(fixture.service.batch_read_count(W1), 1);
    assert_eq!(fixture.service.subscription_count(W1), 1);
    assert!(fixture.recorder.is_empty());
}

#[tokio::test]
async fn test_initialize_missing_required_attribute_fails() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    fixture.service.remove_attribute(W1, Attribute::Title);

    let error = Window::initialize(&fixture.ctx, W1).await.unwrap_err();
    assert!(error.is_invalid_object());

    // The subscription taken before the fetch is released again.
    eventually(|| fixture.service.subscription_count(W1) == 0).await;
}

#[tokio::test]
async fn test_initialize_destroyed_window_fails() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    fixture.service.destroy(W1);

    let error = Window::initialize(&fixture.ctx, W1).await.unwrap_err();
    assert!(error.is_invalid_object());
}

#[tokio::test]
async fn test_initialize_timeout_is_reported() {
    let fixture = Fixture::with_timeout(250);
    fixture.add_window(W1, "Notes");
    fixture
        .service
        .inject_fault(W1, Attribute::Position, ServiceFault::CannotComplete);

    let error = Window::initialize(&fixture.ctx, W1).await.unwrap_err();
    assert_eq!(
        error,
        AdapterError::Timeout {
            timeout: Some(Duration::from_millis(250))
        }
    );
}

#[tokio::test]
async fn test_notification_publishes_one_event() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    fixture
        .service
        .set_attribute(W1, Attribute::Title, AttrValue::String("Draft".to_string()));
    fixture.service.post(W1, NotificationKind::TitleChanged);

    eventually(|| window.title() == "Draft").await;
    eventually(|| fixture.count(is_title_change) == 1).await;

    match &fixture.events()[0] {
        Event::WindowTitleChanged(change) => {
            assert!(change.subject.equal_to(&window));
            assert_eq!(change.old.as_deref(), Some("Notes"));
            assert_eq!(change.new.as_deref(), Some("Draft"));
            assert_eq!(change.origin, Origin::External);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // A notification without a change reads again but publishes nothing.
    fixture.service.post(W1, NotificationKind::TitleChanged);
    eventually(|| fixture.service.read_count(W1, Attribute::Title) == 2).await;
    quiesce().await;
    assert_eq!(fixture.count(is_title_change), 1);
}

#[tokio::test]
async fn test_notifications_coalesce_during_read() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "A");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    let gate = fixture.service.pause_next_read(W1, Attribute::Title);
    fixture
        .service
        .set_attribute(W1, Attribute::Title, AttrValue::String("B".to_string()));
    fixture.service.post(W1, NotificationKind::TitleChanged);
    gate.wait_until_held().await;

    for _ in 0..3 {
        fixture.service.post(W1, NotificationKind::TitleChanged);
    }
    fixture
        .service
        .set_attribute(W1, Attribute::Title, AttrValue::String("C".to_string()));
    gate.release();

    eventually(|| window.title() == "C").await;
    quiesce().await;

    // One read in flight plus exactly one follow-up.
    assert_eq!(fixture.service.read_count(W1, Attribute::Title), 2);
    let titles: Vec<_> = fixture
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::WindowTitleChanged(change) => change.new,
            _ => None,
        })
        .collect();
    assert_eq!(titles, vec!["B".to_string(), "C".to_string()]);
}

#[tokio::test]
async fn test_set_position_confirms_with_one_read() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    let position = window.set_position(Point::new(10.0, 20.0)).await.unwrap();

    assert_eq!(position, Point::new(10.0, 20.0));
    assert_eq!(window.position(), Point::new(10.0, 20.0));
    assert_eq!(fixture.service.write_count(W1, Attribute::Position), 1);
    assert_eq!(fixture.service.read_count(W1, Attribute::Position), 1);

    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].origin(), Origin::Local);
}

#[tokio::test]
async fn test_rejected_write_resolves_to_actual_value() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    fixture.service.reject_writes(W1, Attribute::Size);
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    let size = window.set_size(Size::new(10.0, 10.0)).await.unwrap();

    assert_eq!(size, Size::new(800.0, 600.0));
    assert_eq!(fixture.service.read_count(W1, Attribute::Size), 1);
    assert!(fixture.recorder.is_empty());
}

#[tokio::test]
async fn test_illegal_write_is_absorbed() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    fixture
        .service
        .refuse_writes_as_illegal(W1, Attribute::Minimized);
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    assert_eq!(window.set_minimized(true).await, Ok(false));
    assert_eq!(fixture.service.read_count(W1, Attribute::Minimized), 1);
}

#[tokio::test]
async fn test_write_failure_is_returned_without_refresh() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();
    fixture
        .service
        .inject_fault(W1, Attribute::Position, ServiceFault::Failure);

    let error = window
        .set_position(Point::new(5.0, 5.0))
        .await
        .unwrap_err();

    assert!(matches!(error, AdapterError::AdapterFailure { .. }));
    assert_eq!(fixture.service.read_count(W1, Attribute::Position), 0);
    assert!(window.is_valid());
}

fn position_changes(fixture: &Fixture) -> Vec<(Option<Point>, Option<Point>, Origin)> {
    fixture
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::WindowPositionChanged(change) => Some((change.old, change.new, change.origin)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_set_waits_for_in_flight_read() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    // A notification-triggered read captures the intermediate position and stalls.
    let gate = fixture.service.pause_next_read(W1, Attribute::Position);
    fixture.service.set_attribute(
        W1,
        Attribute::Position,
        AttrValue::Point(Point::new(1.0, 1.0)),
    );
    fixture.service.post(W1, NotificationKind::WindowMoved);
    gate.wait_until_held().await;

    let set = {
        let window = window.clone();
        tokio::spawn(async move { window.set_position(Point::new(2.0, 2.0)).await })
    };
    quiesce().await;
    assert_eq!(fixture.service.write_count(W1, Attribute::Position), 0);

    gate.release();
    assert_eq!(set.await.unwrap(), Ok(Point::new(2.0, 2.0)));
    quiesce().await;

    assert_eq!(window.position(), Point::new(2.0, 2.0));
    assert_eq!(
        position_changes(&fixture),
        vec![
            (
                Some(Point::new(0.0, 0.0)),
                Some(Point::new(1.0, 1.0)),
                Origin::External
            ),
            (
                Some(Point::new(1.0, 1.0)),
                Some(Point::new(2.0, 2.0)),
                Origin::Local
            ),
        ]
    );
}

#[tokio::test]
async fn test_overlapping_sets_apply_in_order() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    let gate = fixture.service.pause_next_write(W1, Attribute::Position);
    let first = {
        let window = window.clone();
        tokio::spawn(async move { window.set_position(Point::new(1.0, 1.0)).await })
    };
    gate.wait_until_held().await;

    let second = {
        let window = window.clone();
        tokio::spawn(async move { window.set_position(Point::new(2.0, 2.0)).await })
    };
    quiesce().await;
    // The second write waits until the first has been confirmed.
    assert_eq!(fixture.service.write_count(W1, Attribute::Position), 1);

    gate.release();
    assert_eq!(first.await.unwrap(), Ok(Point::new(1.0, 1.0)));
    assert_eq!(second.await.unwrap(), Ok(Point::new(2.0, 2.0)));

    assert_eq!(
        fixture.service.attribute(W1, Attribute::Position),
        Some(AttrValue::Point(Point::new(2.0, 2.0)))
    );
    assert_eq!(window.position(), Point::new(2.0, 2.0));
    assert_eq!(fixture.service.write_count(W1, Attribute::Position), 2);
    assert_eq!(fixture.service.read_count(W1, Attribute::Position), 2);

    let origins: Vec<_> = position_changes(&fixture)
        .into_iter()
        .map(|(_, new, origin)| (new, origin))
        .collect();
    assert_eq!(
        origins,
        vec![
            (Some(Point::new(1.0, 1.0)), Origin::Local),
            (Some(Point::new(2.0, 2.0)), Origin::Local),
        ]
    );
}

#[tokio::test]
async fn test_notification_during_write_is_folded_into_confirmation() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    let gate = fixture.service.pause_next_write(W1, Attribute::Position);
    let set = {
        let window = window.clone();
        tokio::spawn(async move { window.set_position(Point::new(3.0, 3.0)).await })
    };
    gate.wait_until_held().await;

    fixture.service.post(W1, NotificationKind::WindowMoved);
    fixture.service.post(W1, NotificationKind::WindowMoved);
    quiesce().await;
    assert_eq!(fixture.service.read_count(W1, Attribute::Position), 0);

    gate.release();
    assert_eq!(set.await.unwrap(), Ok(Point::new(3.0, 3.0)));
    quiesce().await;

    // The confirming read also answers the notifications.
    assert_eq!(fixture.service.read_count(W1, Attribute::Position), 1);
    assert_eq!(
        position_changes(&fixture),
        vec![(
            Some(Point::new(0.0, 0.0)),
            Some(Point::new(3.0, 3.0)),
            Origin::Local
        )]
    );
}

#[tokio::test]
async fn test_refresh_timeout_keeps_value() {
    let fixture = Fixture::with_timeout(250);
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    fixture
        .service
        .inject_fault(W1, Attribute::Title, ServiceFault::CannotComplete);
    fixture
        .service
        .set_attribute(W1, Attribute::Title, AttrValue::String("Draft".to_string()));
    fixture.service.post(W1, NotificationKind::TitleChanged);

    eventually(|| {
        fixture.count(|event| {
            matches!(
                event,
                Event::RefreshFailed {
                    attribute: Attribute::Title,
                    error: AdapterError::Timeout { timeout: Some(_) },
                    ..
                }
            )
        }) == 1
    })
    .await;
    assert!(window.is_valid());
    assert_eq!(window.title(), "Notes");

    // No automatic retry; the next notification picks the value up.
    fixture.service.post(W1, NotificationKind::TitleChanged);
    eventually(|| window.title() == "Draft").await;
}

#[tokio::test]
async fn test_optional_attribute_appears_later() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();
    assert_eq!(window.is_fullscreen(), None);

    fixture
        .service
        .set_attribute(W1, Attribute::Fullscreen, AttrValue::Bool(true));
    fixture.service.post(W1, NotificationKind::WindowResized);

    eventually(|| window.is_fullscreen() == Some(true)).await;
    quiesce().await;
    let changes: Vec<_> = fixture
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::WindowFullscreenChanged(change) => Some((change.old, change.new)),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![(None, Some(true))]);
    // The size did not change, so only the fullscreen change is published.
    assert_eq!(fixture.events().len(), 1);
}

#[tokio::test]
async fn test_mismatched_source_refreshes() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    fixture
        .service
        .set_attribute(W1, Attribute::Title, AttrValue::String("Draft".to_string()));
    fixture
        .service
        .post_to(W1, NotificationKind::TitleChanged, W2);

    eventually(|| window.title() == "Draft").await;
}

#[tokio::test]
async fn test_destroyed_window_is_terminal() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    fixture.service.destroy(W1);
    fixture.service.post(W1, NotificationKind::ElementDestroyed);
    eventually(|| !window.is_valid()).await;

    fixture
        .service
        .set_attribute(W1, Attribute::Title, AttrValue::String("Ghost".to_string()));
    fixture.service.post(W1, NotificationKind::TitleChanged);
    fixture.service.post(W1, NotificationKind::ElementDestroyed);
    quiesce().await;

    let events = fixture.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::WindowDestroyed { window: w } if w.equal_to(&window)));
    assert!(
        window
            .set_position(Point::new(1.0, 1.0))
            .await
            .unwrap_err()
            .is_invalid_object()
    );
    assert_eq!(window.title(), "Notes");
    eventually(|| fixture.service.subscription_count(W1) == 0).await;
}

#[tokio::test]
async fn test_invalid_object_on_refresh_invalidates() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();

    // Destroyed without a destruction notification: the next read finds out.
    fixture.service.destroy(W1);
    fixture.service.post(W1, NotificationKind::WindowMoved);

    eventually(|| !window.is_valid()).await;
    assert_eq!(
        fixture.count(|event| matches!(event, Event::WindowDestroyed { .. })),
        1
    );
    assert_eq!(
        fixture.count(|event| matches!(event, Event::RefreshFailed { .. })),
        0
    );
}

#[tokio::test]
async fn test_dropping_last_handle_unsubscribes() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let window = Window::initialize(&fixture.ctx, W1).await.unwrap();
    let clone = window.clone();
    assert_eq!(clone, window);

    drop(window);
    quiesce().await;
    assert_eq!(fixture.service.subscription_count(W1), 1);

    drop(clone);
    eventually(|| fixture.service.subscription_count(W1) == 0).await;
}

#[tokio::test]
async fn test_broadcast_notifier_receives_events() {
    let fixture = Fixture::new();
    fixture.add_window(W1, "Notes");
    let notifier = Arc::new(BroadcastNotifier::new(16));
    let mut events = notifier.subscribe();
    let ctx = MirrorContext::new(fixture.ctx.adapter().clone(), notifier);
    let window = Window::initialize(&ctx, W1).await.unwrap();

    window.set_minimized(true).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        Event::WindowMinimizedChanged(change) => {
            assert_eq!(change.new, Some(true));
            assert_eq!(change.origin, Origin::Local);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
