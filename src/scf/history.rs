use ndarray::{Array, Dimension};

/// Types whose storage can be reused when a new value is written into a
/// history slot.
pub trait Overwrite: Clone {
    /// Copies `other` into `self` element-wise, keeping the allocation if the shapes agree.
    fn overwrite(&mut self, other: &Self);
}

impl<D: Dimension> Overwrite for Array<f64, D> {
    fn overwrite(&mut self, other: &Self) {
        if self.shape() == other.shape() {
            self.assign(other);
        } else {
            *self = other.clone();
        }
    }
}

impl<T: Overwrite> Overwrite for Vec<T> {
    fn overwrite(&mut self, other: &Self) {
        self.truncate(other.len());
        for (idx, value) in other.iter().enumerate() {
            match self.get_mut(idx) {
                Some(slot) => slot.overwrite(value),
                None => self.push(value.clone()),
            }
        }
    }
}

/// Ring buffer of past iterates and their error vectors with a fixed capacity.
///
/// The n-th call of [advance](HistoryBuffer::advance) (counting from 1) returns
/// the slot `(n - 1) mod capacity`, so that the oldest entry is overwritten once
/// the buffer is full. Slots are allocated on their first use and reused afterwards.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    capacity: usize,
    call_count: usize,
    slots: Vec<T>,
    error_slots: Vec<T>,
}

impl<T: Overwrite> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            call_count: 0,
            slots: Vec::with_capacity(capacity),
            error_slots: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn call_count(&self) -> usize {
        self.call_count
    }

    /// Number of valid slots.
    pub fn active_count(&self) -> usize {
        self.call_count.min(self.capacity)
    }

    /// Returns the slot for the current call and counts the call.
    /// Must not be called on a buffer with zero capacity.
    pub fn advance(&mut self) -> usize {
        debug_assert!(self.capacity > 0, "history buffer without capacity");
        let slot: usize = self.call_count % self.capacity;
        self.call_count += 1;
        slot
    }

    /// Slot that was handed out by the last call of [advance](HistoryBuffer::advance).
    pub fn last_slot(&self) -> Option<usize> {
        match self.call_count {
            0 => None,
            n => Some((n - 1) % self.capacity),
        }
    }

    /// Slot that was handed out by the call before the last one.
    pub fn second_to_last_slot(&self) -> Option<usize> {
        match self.call_count {
            0 | 1 => None,
            n => Some((n - 2) % self.capacity),
        }
    }

    pub fn store(&mut self, slot: usize, value: &T) {
        Self::write(&mut self.slots, slot, value);
    }

    pub fn store_error(&mut self, slot: usize, error: &T) {
        Self::write(&mut self.error_slots, slot, error);
    }

    pub fn slot(&self, slot: usize) -> &T {
        &self.slots[slot]
    }

    pub fn error(&self, slot: usize) -> &T {
        &self.error_slots[slot]
    }

    /// Forgets all entries. The storage of the slots is kept.
    pub fn clear(&mut self) {
        self.call_count = 0;
    }

    fn write(storage: &mut Vec<T>, slot: usize, value: &T) {
        while storage.len() < slot {
            storage.push(value.clone());
        }
        match storage.get_mut(slot) {
            Some(old) => old.overwrite(value),
            None => storage.push(value.clone()),
        }
    }
}
