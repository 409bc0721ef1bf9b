use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use weft::{Loop, TimerToken, task, time};

/// `RUST_LOG=weft=trace` shows every timer firing.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[weft::test]
async fn timers_fire_in_deadline_order_and_never_early() {
    init_logging();
    let event_loop = Loop::local();
    let start = Instant::now();
    let fired = Rc::new(RefCell::new(Vec::new()));

    for ms in [30u64, 10, 20] {
        let fired = fired.clone();
        event_loop
            .delay(Duration::from_millis(ms), move || {
                fired.borrow_mut().push((ms, start.elapsed()));
            })
            .detach();
    }

    time::sleep(Duration::from_millis(60)).await;

    let fired = fired.borrow();
    let order: Vec<u64> = fired.iter().map(|(ms, _)| *ms).collect();
    assert_eq!(order, vec![10, 20, 30]);

    for (ms, at) in fired.iter() {
        assert!(*at >= Duration::from_millis(*ms), "{ms} ms timer fired at {at:?}");
    }
}

#[weft::test]
async fn aborted_sleeper_never_resumes() {
    let resumed = Rc::new(Cell::new(false));
    let flag = resumed.clone();

    let sleeper = task::spawn(async move {
        time::sleep(Duration::from_millis(20)).await;
        flag.set(true);
    });

    time::sleep(Duration::from_millis(5)).await;
    sleeper.abort();

    time::sleep(Duration::from_millis(40)).await;

    assert!(sleeper.is_aborted());
    assert!(!resumed.get());
    assert_eq!(Loop::local().pending_timers(), 0);
}

#[weft::test]
async fn repeating_timer_stops_on_cancel() {
    init_logging();
    let ticks = Rc::new(Cell::new(0u32));
    let counter = ticks.clone();

    let token = Loop::local().repeat(Duration::from_millis(5), move || {
        counter.set(counter.get() + 1);
    });

    time::sleep(Duration::from_millis(30)).await;
    assert!(token.cancel());

    let seen = ticks.get();
    assert!(seen >= 2, "only {seen} ticks");

    time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ticks.get(), seen);
    assert!(!token.is_pending());
}

#[weft::test]
async fn dropping_a_token_cancels_its_timer() {
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();

    let token = Loop::local().delay(Duration::from_millis(5), move || flag.set(true));
    drop(token);

    time::sleep(Duration::from_millis(20)).await;
    assert!(!fired.get());
}

#[weft::test]
async fn spawned_tasks_finish_and_yield_output() {
    let handle = task::spawn(async {
        time::sleep(Duration::from_millis(5)).await;
        "done"
    });

    assert!(!handle.is_finished());
    time::sleep(Duration::from_millis(20)).await;

    assert!(handle.is_finished());
    assert_eq!(handle.try_take(), Some("done"));
}

#[weft::test]
async fn first_of_reports_winning_index() {
    let (index, ()) = task::first_of(vec![
        time::sleep(Duration::from_secs(60)),
        time::sleep(Duration::from_millis(5)),
        time::sleep(Duration::from_secs(60)),
    ])
    .await;

    assert_eq!(index, 1);
    assert_eq!(Loop::local().pending_timers(), 0);
}

#[test]
fn run_returns_stop_code() {
    let event_loop = Loop::local();
    let handle = event_loop.handle();

    event_loop.delay(Duration::from_millis(5), move || handle.stop(3)).detach();

    assert_eq!(event_loop.run(), 3);
}

#[test]
fn run_once_blocks_while_stop_is_pending() {
    let event_loop = Loop::local();
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();

    event_loop.delay(Duration::from_millis(20), move || flag.set(true)).detach();
    event_loop.stop(4);

    let mut turns = 0;
    while !fired.get() {
        event_loop.run_once();
        turns += 1;
    }

    assert!(turns <= 5, "{turns} turns while a stop was pending");
    assert_eq!(event_loop.run(), 4);
}

#[test]
fn self_cancel_survives_nested_turn() {
    init_logging();
    let event_loop = Loop::local();
    let ticks = Rc::new(Cell::new(0u32));
    let cancelled = Rc::new(Cell::new(false));
    let own_token: Rc<RefCell<Option<TimerToken>>> = Rc::default();

    let token = {
        let ticks = ticks.clone();
        let cancelled = cancelled.clone();
        let own_token = own_token.clone();

        event_loop.repeat(Duration::from_millis(5), move || {
            ticks.set(ticks.get() + 1);
            Loop::local().block_on(time::sleep(Duration::from_millis(1)));

            if let Some(token) = own_token.borrow().as_ref() {
                cancelled.set(token.cancel());
            }
        })
    };
    *own_token.borrow_mut() = Some(token);

    let handle = event_loop.handle();
    event_loop.delay(Duration::from_millis(40), move || handle.stop(0)).detach();
    assert_eq!(event_loop.run(), 0);

    assert!(cancelled.get());
    assert_eq!(ticks.get(), 1);
    assert_eq!(event_loop.pending_timers(), 0);

    own_token.borrow_mut().take();
}
