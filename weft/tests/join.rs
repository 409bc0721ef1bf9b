use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use weft::{Loop, join, time};

#[test]
fn join_single_future() {
    let result = Loop::local().block_on(async { join!(async { 42 }) });

    assert_eq!(result, 42);
}

#[test]
fn join_mixed_types() {
    let result = Loop::local().block_on(async {
        join!(async { "hello" }, async { 42 }, async { vec![true] })
    });

    assert_eq!(result, ("hello", 42, vec![true]));
}

#[test]
fn join_with_trailing_comma() {
    let (a, b) = Loop::local().block_on(async { join!(async { 1 }, async { 2 },) });

    assert_eq!(a + b, 3);
}

#[weft::test]
async fn join_waits_for_every_timer_concurrently() {
    let start = Instant::now();

    let ((), ()) = join!(
        time::sleep(Duration::from_millis(20)),
        time::sleep(Duration::from_millis(20)),
    );

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(20));
    assert!(elapsed < Duration::from_millis(500));
}

#[weft::test]
async fn join_completion_order_follows_deadlines() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let (slow, fast) = (order.clone(), order.clone());

    join!(
        async move {
            time::sleep(Duration::from_millis(20)).await;
            slow.borrow_mut().push("slow");
        },
        async move {
            time::sleep(Duration::from_millis(5)).await;
            fast.borrow_mut().push("fast");
        },
    );

    assert_eq!(*order.borrow(), vec!["fast", "slow"]);
}
