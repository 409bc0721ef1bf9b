//! Property and behaviour tests for `Observer` and `link`.
//!
//! 1. An edit notifies once if the value changed, never otherwise
//! 2. The version counts notifying edits
//! 3. A linked pair propagates each change exactly once each way

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use proptest::prelude::*;
use weft::{Dispatch, Observer, Subscription, link};

fn counter<T: Clone + PartialEq + Send + 'static>(
    observer: &Observer<T>,
) -> (Subscription, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let sub = {
        let calls = calls.clone();
        observer.subscribe(Dispatch::Synchronous, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };
    (sub, calls)
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Equality-gated notification
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn each_set_notifies_iff_value_changes(values in proptest::collection::vec(0u8..4, 0..64)) {
        let observer = Observer::new(0u8);
        let (_sub, calls) = counter(&observer);

        let mut current = 0u8;
        let mut expected = 0usize;

        for value in values {
            let before = calls.load(Ordering::SeqCst);
            observer.set(value);
            let delta = calls.load(Ordering::SeqCst) - before;

            if value == current {
                prop_assert_eq!(delta, 0);
            } else {
                prop_assert_eq!(delta, 1);
                expected += 1;
            }
            current = value;
        }

        prop_assert_eq!(observer.get(), current);
        prop_assert_eq!(observer.version(), expected as u64);
    }

    #[test]
    fn proxy_edits_publish_only_net_change(
        pushes in proptest::collection::vec(any::<u8>(), 0..8),
        pops in 0usize..8,
    ) {
        let observer = Observer::new(Vec::<u8>::new());
        let (_sub, calls) = counter(&observer);

        {
            let mut proxy = observer.edit();
            proxy.extend(&pushes);
            for _ in 0..pops.min(pushes.len()) {
                proxy.pop();
            }
        }

        let changed = pushes.len() > pops;
        prop_assert_eq!(calls.load(Ordering::SeqCst), usize::from(changed));
    }
}

#[test]
fn notification_carries_the_new_value() {
    let observer = Observer::new(String::from("a"));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    let _sub = {
        let seen = seen.clone();
        observer.subscribe(Dispatch::Synchronous, move |v: &String| {
            seen.lock().unwrap().push(v.clone());
        })
    };

    observer.edit().push('b');
    observer.set(String::from("c"));

    assert_eq!(*seen.lock().unwrap(), vec!["ab", "c"]);
}

#[test]
fn edits_from_many_threads_are_serialised() {
    let observer = Observer::new(0u32);
    let (_sub, calls) = counter(&observer);

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let observer = observer.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    *observer.edit() += 1;
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(observer.get(), 4000);
    assert_eq!(observer.version(), 4000);
    assert_eq!(calls.load(Ordering::SeqCst), 4000);
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Linked observers
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn link_copies_initial_value() {
    let a = Observer::new(5);
    let b = Observer::new(0);

    let _link = link(&a, &b);

    assert_eq!(b.get(), 5);
    assert_eq!(a.get(), 5);
}

#[test]
fn linked_set_propagates_once_each_way() {
    let a = Observer::new(0);
    let b = Observer::new(0);
    let _link = link(&a, &b);

    let (_sa, calls_a) = counter(&a);
    let (_sb, calls_b) = counter(&b);

    b.set(9);
    assert_eq!(a.get(), 9);
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 1);

    a.set(4);
    assert_eq!(b.get(), 4);
    assert_eq!(calls_a.load(Ordering::SeqCst), 2);
    assert_eq!(calls_b.load(Ordering::SeqCst), 2);

    assert_eq!(a.version(), 2);
    assert_eq!(b.version(), 2);
}

#[test]
fn unlinked_observers_diverge() {
    let a = Observer::new(1);
    let b = Observer::new(1);

    link(&a, &b).unlink();
    a.set(2);

    assert_eq!(b.get(), 1);
}

#[test]
fn chain_of_links_reaches_the_end() {
    let a = Observer::new(0);
    let b = Observer::new(0);
    let c = Observer::new(0);

    let _ab = link(&a, &b);
    let _bc = link(&b, &c);

    a.set(3);
    assert_eq!(c.get(), 3);

    c.set(8);
    assert_eq!(a.get(), 8);
}
