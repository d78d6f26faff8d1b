//! NotificationCenter lifecycle through a manual clock

use mdnote::notification::{self, NotificationCenter, NotificationEvent, NotificationKind};
use mdnote::scheduler::ManualClock;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn center() -> (Rc<ManualClock>, NotificationCenter) {
    let clock = Rc::new(ManualClock::default());
    let center = NotificationCenter::new(clock.clone(), Duration::from_secs(3));
    (clock, center)
}

#[test]
fn test_notification_expires_after_duration() {
    let (clock, center) = center();
    let removed = Rc::new(RefCell::new(Vec::new()));
    let sink = removed.clone();
    center.subscribe(move |event| {
        if let NotificationEvent::Removed(n) = event {
            sink.borrow_mut().push(n.id);
        }
    });

    let id = center.show(NotificationKind::Info, "t", "m", Some(Duration::from_millis(100)));
    clock.advance(Duration::from_millis(50));
    assert_eq!(center.count(), 1);

    clock.advance(Duration::from_millis(100));
    assert_eq!(center.count(), 0);
    assert_eq!(*removed.borrow(), vec![id]);
}

#[test]
fn test_dismiss_before_expiry_removes_once() {
    let (clock, center) = center();
    let removed = Rc::new(RefCell::new(0));
    let counter = removed.clone();
    center.subscribe(move |event| {
        if matches!(event, NotificationEvent::Removed(_)) {
            *counter.borrow_mut() += 1;
        }
    });

    let id = center.warning("Heads up", "disk almost full");
    assert!(center.dismiss(id));
    assert!(!center.dismiss(id));
    clock.advance(Duration::from_secs(10));

    assert_eq!(*removed.borrow(), 1);
    assert_eq!(clock.pending_timers(), 0);
}

#[test]
fn test_zero_duration_is_sticky() {
    let (clock, center) = center();
    center.show(NotificationKind::Error, "Sticky", "stays", Some(Duration::ZERO));
    clock.advance(Duration::from_secs(3600));
    assert_eq!(center.count(), 1);
    assert_eq!(center.dismiss_all(), 1);
    assert_eq!(center.count(), 0);
}

#[test]
fn test_active_is_newest_first_with_unique_ids() {
    let (_clock, center) = center();
    let first = center.info("one", "");
    let second = center.success("two", "");
    assert_ne!(first, second);

    let titles: Vec<String> = center.active().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["two".to_string(), "one".to_string()]);
}

#[test]
fn test_listener_may_dismiss_during_dispatch() {
    let (_clock, center) = center();
    let handle = center.clone();
    center.subscribe(move |event| {
        if let NotificationEvent::Added(n) = event {
            handle.dismiss(n.id);
        }
    });

    center.info("transient", "");
    assert_eq!(center.count(), 0);
}

#[test]
fn test_global_center_install_and_teardown() {
    let (_clock, center) = center();
    assert!(notification::install_global(center.clone()).is_none());
    notification::global().unwrap().info("hello", "world");
    assert_eq!(center.count(), 1);

    assert!(notification::teardown_global());
    assert_eq!(center.count(), 0);
    assert!(notification::global().is_none());
}
