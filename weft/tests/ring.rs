use std::sync::{Arc, Mutex};
use std::thread;

use weft::Loop;
use weft::sync::ring;

const PRODUCERS: usize = 8;
const PER_PRODUCER: usize = 10_000;

#[test]
fn every_message_arrives_in_per_producer_order() {
    let (producer, mut consumer) = ring::channel::<(usize, usize)>(256);

    let writers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let producer = producer.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    while producer.full() {
                        thread::yield_now();
                    }
                    producer.write((id, seq));
                }
            })
        })
        .collect();
    drop(producer);

    let mut next = [0usize; PRODUCERS];
    let mut received = 0;

    while received < PRODUCERS * PER_PRODUCER {
        match consumer.try_read() {
            Some((id, seq)) => {
                assert_eq!(seq, next[id], "producer {id} out of order");
                next[id] += 1;
                received += 1;
            }
            None => thread::yield_now(),
        }
    }

    for writer in writers {
        writer.join().unwrap();
    }

    assert!(next.iter().all(|&n| n == PER_PRODUCER));
    assert!(consumer.is_empty());
}

#[test]
fn posts_from_other_threads_run_on_the_loop_in_order() {
    let event_loop = Loop::local();
    let owner = thread::current().id();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let posters: Vec<_> = (0..4)
        .map(|id| {
            let handle = event_loop.handle();
            let seen = seen.clone();
            thread::spawn(move || {
                for seq in 0..500 {
                    let seen = seen.clone();
                    handle.post(move || {
                        assert_eq!(thread::current().id(), owner);
                        seen.lock().unwrap().push((id, seq));
                    });
                }
            })
        })
        .collect();

    // Posts outnumber the ring, so the loop has to drain while they arrive.
    let handle = event_loop.handle();
    let stopper = thread::spawn(move || {
        for poster in posters {
            poster.join().unwrap();
        }
        let stop = handle.clone();
        handle.post(move || stop.stop(0));
    });

    assert_eq!(event_loop.run(), 0);
    stopper.join().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4 * 500);

    for id in 0..4 {
        let order: Vec<_> = seen.iter().filter(|(p, _)| *p == id).map(|(_, s)| *s).collect();
        assert_eq!(order, (0..500).collect::<Vec<_>>());
    }
}

#[test]
fn posting_to_a_dropped_loop_is_a_no_op() {
    let handle = thread::spawn(|| Loop::local().handle()).join().unwrap();

    assert!(handle.is_closed());
    handle.post(|| panic!("ran on a dead loop"));
    handle.wake();
}
