use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

pub(crate) type TimerCallback = Box<dyn FnMut()>;

/// Stand-in for deadlines past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + duration`, clamped to about thirty years out on overflow.
pub(crate) fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// An entry in the timer heap.
///
/// Entries are never removed from the heap on cancellation; a popped
/// entry whose `seq` no longer matches its timer's slot is skipped.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Registration order, used to break deadline ties FIFO.
    seq: u64,

    /// Stable timer id, as held by the `TimerToken`.
    id: u64,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders entries by deadline, then by registration order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerSlot {
    deadline: Instant,
    seq: u64,
    repeat: Option<Duration>,
    callback: TimerCallback,
}

/// A timer taken out of the queue to be fired.
pub(crate) struct Due {
    pub(crate) id: u64,
    pub(crate) deadline: Instant,
    pub(crate) repeat: Option<Duration>,
    pub(crate) callback: TimerCallback,
}

/// The loop's timers: a min-heap of deadlines plus the live timer slots.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    slots: HashMap<u64, TimerSlot>,
    next_id: u64,
    next_seq: u64,

    /// Timers whose callbacks are running, innermost last. A callback may
    /// run a nested turn through `Loop::block_on`.
    firing: Vec<Firing>,
}

struct Firing {
    id: u64,
    repeats: bool,
    cancelled: bool,
}

impl TimerQueue {
    pub(crate) fn insert(
        &mut self,
        deadline: Instant,
        repeat: Option<Duration>,
        callback: TimerCallback,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.push(id, deadline, repeat, callback);
        id
    }

    fn push(&mut self, id: u64, deadline: Instant, repeat: Option<Duration>, callback: TimerCallback) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(TimerEntry { deadline, seq, id });
        self.slots.insert(
            id,
            TimerSlot {
                deadline,
                seq,
                repeat,
                callback,
            },
        );
    }

    /// Cancels a timer. Returns `false` if it already fired or was cancelled.
    ///
    /// The callback is returned rather than dropped so the caller can drop
    /// it outside any borrow of the queue.
    pub(crate) fn cancel(&mut self, id: u64) -> (bool, Option<TimerCallback>) {
        if let Some(slot) = self.slots.remove(&id) {
            return (true, Some(slot.callback));
        }

        // A one-shot already fired once its callback started.
        match self.firing.iter_mut().find(|f| f.id == id) {
            Some(firing) if firing.repeats && !firing.cancelled => {
                firing.cancelled = true;
                (true, None)
            }
            _ => (false, None),
        }
    }

    /// Current sequence number; timers registered from now on get a
    /// larger one.
    pub(crate) fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Pops the earliest timer due at `now` that was registered before
    /// `watermark`.
    pub(crate) fn pop_due(&mut self, now: Instant, watermark: u64) -> Option<Due> {
        loop {
            let entry = self.heap.peek()?;

            if entry.deadline > now {
                return None;
            }

            let live = self
                .slots
                .get(&entry.id)
                .is_some_and(|slot| slot.seq == entry.seq);

            if !live {
                self.heap.pop();
                continue;
            }

            if entry.seq >= watermark {
                return None;
            }

            let entry = self.heap.pop()?;
            let slot = self.slots.remove(&entry.id)?;
            self.firing.push(Firing {
                id: entry.id,
                repeats: slot.repeat.is_some(),
                cancelled: false,
            });

            return Some(Due {
                id: entry.id,
                deadline: slot.deadline,
                repeat: slot.repeat,
                callback: slot.callback,
            });
        }
    }

    /// Ends the firing of `due`, re-arming it if it repeats and was not
    /// cancelled by its own callback.
    pub(crate) fn finish(&mut self, due: Due, now: Instant) {
        let cancelled = match self.firing.iter().rposition(|f| f.id == due.id) {
            Some(index) => self.firing.remove(index).cancelled,
            None => false,
        };

        if let (Some(interval), false) = (due.repeat, cancelled) {
            let deadline = next_deadline(due.deadline, interval, now);
            self.push(due.id, deadline, Some(interval), due.callback);
        }
    }

    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            let live = self
                .slots
                .get(&entry.id)
                .is_some_and(|slot| slot.seq == entry.seq);

            if live {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }

        None
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.slots.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<TimerCallback> {
        self.heap.clear();
        self.slots.drain().map(|(_, slot)| slot.callback).collect()
    }
}

/// Next deadline of a repeating timer, skipping periods already missed.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline_after(previous, interval);
    if next >= now {
        return next;
    }

    if interval.is_zero() {
        return now;
    }

    let missed = (now - previous).as_nanos() / interval.as_nanos();
    let skip = interval.as_nanos() * (missed + 1);

    deadline_after(previous, Duration::from_nanos(skip.min(u64::MAX as u128) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    fn noop() -> TimerCallback {
        Box::new(|| {})
    }

    #[test]
    fn ties_fire_in_registration_order() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();

        let first = queue.insert(now, None, noop());
        let second = queue.insert(now, None, noop());
        let earlier = queue.insert(now - Duration::from_millis(1), None, noop());

        let watermark = queue.watermark();
        let mut order = Vec::new();
        while let Some(due) = queue.pop_due(now, watermark) {
            order.push(due.id);
            queue.finish(due, now);
        }

        assert_eq!(order, vec![earlier, first, second]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn cancelled_entries_are_skipped() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();

        let id = queue.insert(now, None, noop());
        assert!(queue.cancel(id).0);
        assert!(!queue.cancel(id).0);

        assert!(queue.pop_due(now, queue.watermark()).is_none());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn repeat_skips_missed_periods() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);

        assert_eq!(next_deadline(start, interval, start), start + interval);
        assert_eq!(
            next_deadline(start, interval, start + Duration::from_millis(35)),
            start + Duration::from_millis(40)
        );
    }

    #[test]
    fn self_cancel_prevents_rearm() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();
        let fired = Rc::new(RefCell::new(0));

        let counter = fired.clone();
        let id = queue.insert(
            now,
            Some(Duration::from_millis(5)),
            Box::new(move || *counter.borrow_mut() += 1),
        );

        let mut due = queue.pop_due(now, queue.watermark()).unwrap();
        (due.callback)();
        assert!(queue.cancel(id).0);
        queue.finish(due, now);

        assert_eq!(*fired.borrow(), 1);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn timers_registered_during_a_pass_wait_for_the_next() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();

        queue.insert(now, None, noop());
        let watermark = queue.watermark();
        queue.insert(now, None, noop());

        assert!(queue.pop_due(now, watermark).is_some());
        queue.firing.clear();
        assert!(queue.pop_due(now, watermark).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancelling_a_firing_one_shot_is_a_no_op() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();

        let id = queue.insert(now, None, noop());
        let due = queue.pop_due(now, queue.watermark()).unwrap();

        assert!(!queue.cancel(id).0);
        queue.finish(due, now);
        assert!(!queue.cancel(id).0);
    }

    #[test]
    fn nested_firing_keeps_outer_cancel() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();

        let outer = queue.insert(now, Some(Duration::from_millis(5)), noop());
        let outer_due = queue.pop_due(now, queue.watermark()).unwrap();

        // A nested turn fires another timer while `outer` is running.
        let inner = queue.insert(now, Some(Duration::from_millis(5)), noop());
        let inner_due = queue.pop_due(now, queue.watermark()).unwrap();
        assert_eq!(inner_due.id, inner);
        queue.finish(inner_due, now);

        assert!(queue.cancel(outer).0);
        queue.finish(outer_due, now);

        assert!(!queue.contains(outer));
        assert!(queue.contains(inner));
    }

    #[test]
    fn huge_durations_clamp_instead_of_overflowing() {
        let now = Instant::now();

        let far = deadline_after(now, Duration::MAX);
        assert!(far > now + Duration::from_secs(86400 * 365));

        let next = next_deadline(now, Duration::MAX, now);
        assert!(next > now);
    }
}
