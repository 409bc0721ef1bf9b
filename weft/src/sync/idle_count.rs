use super::mutex::UnfairMutex;
use super::subsystem::Subsystem;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Marks a record whose thread is not inside a read-side section.
const IDLE: u64 = u64::MAX;

static NEXT_DOMAIN: AtomicU64 = AtomicU64::new(1);

static GLOBAL: Subsystem<IdleCount> = Subsystem::new();

/// Per-thread, per-domain reader state.
struct Record {
    /// Epoch observed when the outermost guard was taken, or `IDLE`.
    active: AtomicU64,

    /// Guard nesting depth. Only the owning thread changes it.
    depth: AtomicU32,

    /// Cleared when the owning thread exits.
    alive: AtomicBool,
}

/// The records a thread registered, one per domain it read from.
struct ThreadRecords(RefCell<Vec<(u64, Arc<Record>)>>);

impl Drop for ThreadRecords {
    fn drop(&mut self) {
        for (_, record) in self.0.get_mut().drain(..) {
            record.active.store(IDLE, Ordering::Release);
            record.alive.store(false, Ordering::Release);
        }
    }
}

thread_local! {
    static RECORDS: ThreadRecords = const { ThreadRecords(RefCell::new(Vec::new())) };
}

struct Retired {
    epoch: u64,
    garbage: Box<dyn Send>,
}

/// Epoch-based idle tracking for deferred reclamation.
///
/// Readers wrap each access to shared data in [`enter`](Self::enter).
/// Writers unpublish an object, hand it to [`retire`](Self::retire), and
/// call [`collect`](Self::collect) from time to time. An object is freed
/// only once every thread that was reading when it was retired has gone
/// idle, so no reader can observe freed memory.
///
/// Threads register lazily on their first `enter` and deregister when
/// they exit.
pub struct IdleCount {
    id: u64,
    epoch: AtomicU64,
    records: UnfairMutex<Vec<Arc<Record>>>,
    retired: UnfairMutex<Vec<Retired>>,
}

impl IdleCount {
    /// Creates an independent domain.
    pub fn new() -> Self {
        Self {
            id: NEXT_DOMAIN.fetch_add(1, Ordering::Relaxed),
            epoch: AtomicU64::new(1),
            records: UnfairMutex::new(Vec::new()),
            retired: UnfairMutex::new(Vec::new()),
        }
    }

    /// Returns the process-wide domain, starting it on first use.
    ///
    /// After [`crate::shutdown`] the global domain is gone; callers then get
    /// a fresh private domain so late readers stay sound.
    pub fn global() -> Arc<IdleCount> {
        GLOBAL
            .start(
                || Some(IdleCount::new()),
                |domain| {
                    domain.collect();
                },
            )
            .unwrap_or_else(|| {
                tracing::warn!("global idle count used after shutdown");
                Arc::new(IdleCount::new())
            })
    }

    pub(crate) fn global_if_running() -> Option<Arc<IdleCount>> {
        GLOBAL.get()
    }

    pub(crate) fn stop_global() {
        GLOBAL.stop();
    }

    /// Marks the calling thread as reading until the guard is dropped.
    ///
    /// Guards nest; the thread goes idle when the outermost one drops.
    pub fn enter(&self) -> ActiveGuard {
        let record = self.record();

        if record.depth.fetch_add(1, Ordering::Relaxed) == 0 {
            let epoch = self.epoch.load(Ordering::SeqCst);
            record.active.store(epoch, Ordering::SeqCst);
        }

        ActiveGuard {
            record,
            _not_send: PhantomData,
        }
    }

    /// Queues `garbage` to be dropped once current readers are idle.
    ///
    /// The object must already be unreachable for new readers.
    pub fn retire(&self, garbage: Box<dyn Send>) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.retired.lock().push(Retired { epoch, garbage });
    }

    /// Drops every retired object no reader can still see.
    ///
    /// Returns how many objects were freed.
    pub fn collect(&self) -> usize {
        let oldest = {
            let mut records = self.records.lock();
            records.retain(|record| record.alive.load(Ordering::Acquire));
            records
                .iter()
                .map(|record| record.active.load(Ordering::SeqCst))
                .min()
                .unwrap_or(IDLE)
        };

        let freed: Vec<Retired> = {
            let mut retired = self.retired.lock();
            if retired.is_empty() {
                return 0;
            }

            let (freed, kept) = std::mem::take(&mut *retired)
                .into_iter()
                .partition(|entry| entry.epoch <= oldest);
            *retired = kept;
            freed
        };

        // Destructors run outside the lock.
        let count = freed.len();
        drop(freed);

        if count > 0 {
            tracing::debug!(domain = self.id, freed = count, "reclaimed retired objects");
        }
        count
    }

    /// Number of retired objects still waiting for readers.
    pub fn pending(&self) -> usize {
        self.retired.lock().len()
    }

    fn record(&self) -> Arc<Record> {
        RECORDS.with(|records| {
            let mut records = records.0.borrow_mut();

            if let Some((_, record)) = records.iter().find(|(id, _)| *id == self.id) {
                return record.clone();
            }

            // Forget domains that were dropped.
            records.retain(|(_, record)| Arc::strong_count(record) > 1);

            let record = Arc::new(Record {
                active: AtomicU64::new(IDLE),
                depth: AtomicU32::new(0),
                alive: AtomicBool::new(true),
            });
            self.records.lock().push(record.clone());
            records.push((self.id, record.clone()));
            record
        })
    }
}

impl Default for IdleCount {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleCount")
            .field("id", &self.id)
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .field("pending", &self.pending())
            .finish()
    }
}

/// Keeps the thread active in an [`IdleCount`] domain.
pub struct ActiveGuard {
    record: Arc<Record>,
    _not_send: PhantomData<Cell<()>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.record.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.record.active.store(IDLE, Ordering::Release);
        }
    }
}

impl fmt::Debug for ActiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveGuard")
            .field("epoch", &self.record.active.load(Ordering::Relaxed))
            .finish()
    }
}
