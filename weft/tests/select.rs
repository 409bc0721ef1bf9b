use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use weft::{Loop, Notifier, select, time};

#[weft::test]
async fn select_single_future() {
    let result = select! {
        async { 42 } => |v| v * 2,
    };

    assert_eq!(result, 84);
}

#[weft::test]
async fn select_prefers_earlier_branch_when_both_ready() {
    let result = select! {
        async { 10 } => |v| v,
        async { 20 } => |v| v,
    };

    assert_eq!(result, 10);
}

#[weft::test]
async fn select_branches_with_different_types() {
    let result = select! {
        time::sleep(Duration::from_secs(60)) => |_| String::from("timer"),
        async { "hello" } => |v| format!("string: {v}"),
    };

    assert_eq!(result, "string: hello");
}

#[weft::test]
async fn select_with_captured_values_and_patterns() {
    let multiplier = 10;

    let scaled = select! {
        time::sleep(Duration::from_secs(60)) => |_| 0,
        async { 5 } => |v| v * multiplier,
    };

    let summed = select! {
        async { (1, 2) } => |(a, b)| a + b,
        async { (3, 4) } => |(a, b)| a * b,
    };

    assert_eq!(scaled, 50);
    assert_eq!(summed, 3);
}

#[weft::test]
async fn select_drops_losing_timer() {
    let winner = select! {
        time::sleep(Duration::from_millis(5)) => |_| "short",
        time::sleep(Duration::from_secs(60)) => |_| "long",
    };

    assert_eq!(winner, "short");
    assert_eq!(Loop::local().pending_timers(), 0);
}

#[weft::test]
async fn select_never_resumes_a_loser() {
    let touched = Rc::new(Cell::new(false));
    let flag = touched.clone();

    select! {
        time::sleep(Duration::from_millis(5)) => |_| {},
        async move {
            time::sleep(Duration::from_millis(15)).await;
            flag.set(true);
        } => |_| {},
    };

    time::sleep(Duration::from_millis(30)).await;
    assert!(!touched.get());
}

#[weft::test]
async fn select_notification_against_timer() {
    let notifier = Notifier::<u32>::new();
    let sender = notifier.clone();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        sender.notify(&7);
    });

    let result = select! {
        notifier.wait() => |v| Some(v),
        time::sleep(Duration::from_secs(5)) => |_| None,
    };

    assert_eq!(result, Some(7));
    assert!(notifier.is_empty());
}
