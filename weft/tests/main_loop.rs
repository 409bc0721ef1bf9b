use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing_subscriber::EnvFilter;
use weft::{Dispatch, Error, Loop, Notifier, main_handle};

// One test: the main loop is process-wide state.
#[test]
fn main_dispatch_lifecycle() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let notifier = Notifier::<u32>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let _sub = {
        let seen = seen.clone();
        notifier.subscribe(Dispatch::Main, move |v| {
            seen.lock().unwrap().push((*v, thread::current().id()));
        })
    };

    // Without a main loop the callback runs inline.
    let sender = notifier.clone();
    let inline_thread = thread::spawn(move || {
        sender.notify(&1);
        thread::current().id()
    })
    .join()
    .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(1, inline_thread)]);

    let event_loop = Loop::local();
    event_loop.make_main().unwrap();
    event_loop.make_main().unwrap();
    assert!(event_loop.is_main());

    let rival = thread::spawn(|| matches!(Loop::local().make_main(), Err(Error::MainExists)));
    assert!(rival.join().unwrap());

    // With one, delivery happens on the loop's thread.
    let sender = notifier.clone();
    let stopper = event_loop.handle();
    thread::spawn(move || {
        sender.notify(&2);
        stopper.post(|| Loop::local().stop(0));
    });

    assert_eq!(event_loop.run(), 0);
    assert_eq!(seen.lock().unwrap()[1], (2, thread::current().id()));

    // Unsubscribing drops deliveries still queued on the main loop.
    let late_calls = Arc::new(AtomicUsize::new(0));
    let sub = {
        let late_calls = late_calls.clone();
        notifier.subscribe(Dispatch::Main, move |_| {
            late_calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    notifier.notify(&3);
    drop(sub);
    assert_eq!(notifier.len(), 1);

    event_loop.post(|| Loop::local().stop(0));
    assert_eq!(event_loop.run(), 0);
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    assert_eq!(seen.lock().unwrap().len(), 3);

    weft::shutdown();
    assert!(main_handle().is_none());
    assert!(matches!(event_loop.make_main(), Err(Error::Stopped)));
}
