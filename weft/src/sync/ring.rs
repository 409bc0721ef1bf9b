//! Wait-free multiple-producer, single-consumer ring buffer.
//!
//! The loop uses this ring to accept closures from foreign threads.
//! Producers never block each other or the consumer: a write is one
//! fetch-add on the head counter followed by filling the reserved slot.
//!
//! Every slot moves through `Empty → Copying → Ready → Empty`:
//!
//! - a producer claims an index, flips its slot from `Empty` to
//!   `Copying`, moves the value in and publishes `Ready`;
//! - the consumer claims the next index, waits for `Ready`, moves the
//!   value out and hands the slot back as `Empty`.
//!
//! The ring does not refuse writes when full. Producers must check
//! [`Producer::full`] first; the [`SLACK`] slots of headroom cover
//! producers that raced past the check at the same time.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Headroom reserved for producers that pass the `full()` check
/// concurrently. This bounds the number of threads that may write at once.
pub const SLACK: usize = 16;

const EMPTY: u8 = 0;
const COPYING: u8 = 1;
const READY: u8 = 2;

/// Keeps the head and tail counters on separate cache lines.
#[repr(align(64))]
struct CachePadded<T>(T);

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

struct Slot<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

struct Ring<T> {
    slots: Box<[Slot<T>]>,

    /// Next index a producer will claim. Monotonic, never wraps in practice.
    head: CachePadded<AtomicU64>,

    /// Next index the consumer will claim.
    tail: CachePadded<AtomicU64>,
}

// Safety: a slot's value is only touched by the thread that moved its
// state into `Copying` (producer) or observed `Ready` (consumer).
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, index: u64) -> &Slot<T> {
        &self.slots[(index % self.slots.len() as u64) as usize]
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        head.saturating_sub(tail) as usize
    }

    fn full(&self) -> bool {
        self.len() >= self.capacity() - SLACK
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            if *slot.state.get_mut() == READY {
                // Safety: `Ready` slots hold an initialised value nobody read.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

/// Creates a ring with room for `capacity` messages.
///
/// # Panics
///
/// Panics if `capacity` is not larger than twice [`SLACK`].
///
/// # Examples
///
/// ```
/// let (producer, mut consumer) = weft::sync::ring::channel::<u32>(64);
///
/// producer.write(1);
/// producer.write(2);
///
/// assert_eq!(consumer.try_read(), Some(1));
/// assert_eq!(consumer.try_read(), Some(2));
/// assert_eq!(consumer.try_read(), None);
/// ```
pub fn channel<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(
        capacity > SLACK * 2,
        "ring capacity must be larger than twice its slack ({SLACK})"
    );

    let slots = (0..capacity)
        .map(|_| Slot {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        })
        .collect();

    let ring = Arc::new(Ring {
        slots,
        head: CachePadded(AtomicU64::new(0)),
        tail: CachePadded(AtomicU64::new(0)),
    });

    (Producer { ring: ring.clone() }, Consumer { ring })
}

/// Writing side of the ring. Cheap to clone and shareable between threads.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.clone(),
        }
    }
}

impl<T: Send> Producer<T> {
    /// Writes a message into the ring.
    ///
    /// Wait-free as long as the caller checked [`full`](Self::full)
    /// beforehand. If the ring is overfilled the write waits for the
    /// consumer to free the slot, and per-producer order is no longer
    /// guaranteed.
    pub fn write(&self, value: T) {
        let index = self.ring.head.fetch_add(1, Ordering::Relaxed);
        let slot = self.ring.slot(index);

        while slot
            .state
            .compare_exchange_weak(EMPTY, COPYING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }

        // Safety: the `Copying` state gives this thread exclusive access.
        unsafe { (*slot.value.get()).write(value) };

        slot.state.store(READY, Ordering::Release);
    }
}

impl<T> Producer<T> {
    /// Returns `true` when producers should hold off writing.
    ///
    /// Relaxed and advisory: the ring may drain or fill right after.
    pub fn full(&self) -> bool {
        self.ring.full()
    }

    /// Approximate number of queued messages.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no message appears to be queued.
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Reading side of the ring. There is exactly one per ring.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T: Send> Consumer<T> {
    /// Reads the next message, spinning until its producer finishes
    /// writing it.
    ///
    /// Only call this when [`is_empty`](Self::is_empty) returned `false`;
    /// otherwise it spins until some producer writes.
    pub fn read(&mut self) -> T {
        let index = self.ring.tail.fetch_add(1, Ordering::Relaxed);
        let slot = self.ring.slot(index);

        while slot.state.load(Ordering::Acquire) != READY {
            std::hint::spin_loop();
        }

        // Safety: `Ready` means the producer finished writing, and only
        // this consumer reads.
        let value = unsafe { (*slot.value.get()).assume_init_read() };

        slot.state.store(EMPTY, Ordering::Release);
        value
    }

    /// Reads the next message if one appears to be queued.
    pub fn try_read(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        Some(self.read())
    }
}

impl<T> Consumer<T> {
    /// Returns `true` when producers should hold off writing.
    pub fn full(&self) -> bool {
        self.ring.full()
    }

    /// Approximate number of queued messages. A message whose producer has
    /// claimed its slot but not finished writing is already counted.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no message appears to be queued.
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.ring.len())
            .field("capacity", &self.ring.capacity())
            .finish()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.ring.len())
            .field("capacity", &self.ring.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn full_leaves_slack() {
        let (producer, mut consumer) = channel::<usize>(SLACK * 2 + 1);

        let mut written = 0;
        while !producer.full() {
            producer.write(written);
            written += 1;
        }

        assert_eq!(written, SLACK + 1);
        assert_eq!(consumer.len(), written);

        for expected in 0..written {
            assert_eq!(consumer.read(), expected);
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn slots_are_reused_after_wrapping() {
        let (producer, mut consumer) = channel::<u64>(40);

        for round in 0..10u64 {
            for i in 0..20 {
                producer.write(round * 100 + i);
            }
            for i in 0..20 {
                assert_eq!(consumer.read(), round * 100 + i);
            }
        }
    }

    #[test]
    fn unread_messages_are_dropped_with_the_ring() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;

        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (producer, mut consumer) = channel(64);
        for _ in 0..5 {
            producer.write(Counted);
        }
        drop(consumer.read());
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);

        drop(producer);
        drop(consumer);
        assert_eq!(DROPS.load(Ordering::SeqCst), 5);
    }
}
