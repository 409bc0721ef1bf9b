/// A stable handle into a [`Slab`].
///
/// The generation distinguishes a live entry from a later entry that
/// reused the same slot, so stale keys never alias a new value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// A single storage cell of the slab.
struct Slot<T> {
    /// Bumped every time the slot is vacated.
    generation: u64,
    value: Option<T>,
}

/// A generational slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands
/// out [`Key`]s that stay valid until the value is removed. Freed slots
/// are reused, but their generation is bumped first so an old key
/// resolves to `None` instead of a stranger's value.
///
/// The loop keeps its suspended tasks here: a waker carries a key, and a
/// wake that arrives after the task finished or was aborted simply misses.
pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a slab with room for `size` values before growing.
    pub(crate) fn new(size: usize) -> Self {
        let slots = (0..size)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        let free = (0..size).rev().collect();

        Self {
            slots,
            free,
            len: 0,
        }
    }

    /// Inserts a value and returns its key.
    ///
    /// If a free slot is available it is reused, otherwise the slab grows
    /// exponentially.
    #[cfg(test)]
    pub(crate) fn insert(&mut self, item: T) -> Key {
        self.insert_with(|_| item)
    }

    /// Inserts the value built by `make`, which receives the value's key.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(Key) -> T) -> Key {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let len = self.slots.len();
                let new_len = if len == 0 { 1 } else { 2 * len };

                self.slots.extend((len..new_len).map(|_| Slot {
                    generation: 0,
                    value: None,
                }));
                self.free.extend(((len + 1)..new_len).rev());

                len
            }
        };

        let slot = &mut self.slots[index];
        let key = Key {
            index,
            generation: slot.generation,
        };

        slot.value = Some(make(key));
        self.len += 1;

        key
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// Returns `None` if the key is stale or was never issued.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index)?;

        if slot.generation != key.generation {
            return None;
        }

        let item = slot.value.take()?;
        slot.generation += 1;
        self.free.push(key.index);
        self.len -= 1;

        Some(item)
    }

    /// Returns a mutable reference to the value under `key`, if it is live.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index)?;

        if slot.generation != key.generation {
            return None;
        }

        slot.value.as_mut()
    }

    /// Returns `true` if `key` still refers to a live value.
    #[cfg(test)]
    pub(crate) fn contains(&self, key: Key) -> bool {
        self.slots
            .get(key.index)
            .is_some_and(|slot| slot.generation == key.generation && slot.value.is_some())
    }

    /// Number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Removes every live value, returning them in slot order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation += 1;
                self.free.push(index);
                out.push(value);
            }
        }

        self.len = 0;
        out
    }
}
