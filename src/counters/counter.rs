//! Per-slot counter handles.
//!
//! [`AtomicCounter`] is the hot-path view of a single counter: it binds a
//! counter id to the values region and mutates the 64-bit cell directly.
//! The propose-max operations deliberately avoid compare-and-swap: a
//! position is owned by a single producer, so a plain read-compare-store
//! is enough and the handle stays wait-free. Concurrent propose-max calls
//! on one slot are safe but may lose updates; that is the documented
//! single-writer contract, not a bug.
//!
//! [`OwnedCounter`] additionally owns the slot: closing (or dropping) it
//! frees the id back to the manager. Ownership keeps the handle on the
//! manager's thread, matching the registry's single-owner control path,
//! while plain [`AtomicCounter`] handles remain freely sendable.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use crate::buffer::AtomicBuffer;
use crate::error::Result;

use super::manager::CountersManager;
use super::value_offset;

/// Hot-path handle to a single counter in the values region.
pub struct AtomicCounter {
    values: AtomicBuffer,
    counter_id: i32,
    offset: usize,
    closed: bool,
}

impl AtomicCounter {
    /// Bind a handle to `counter_id` within the values region.
    ///
    /// # Panics
    ///
    /// Panics if the id's slot lies outside the region.
    pub fn new(values: AtomicBuffer, counter_id: i32) -> Self {
        let offset = value_offset(counter_id);
        assert!(
            counter_id >= 0 && offset + 8 <= values.capacity(),
            "counter id {} out of range for values capacity {}",
            counter_id,
            values.capacity()
        );

        Self {
            values,
            counter_id,
            offset,
            closed: false,
        }
    }

    /// The bound counter id.
    pub fn id(&self) -> i32 {
        self.counter_id
    }

    /// Plain load of the value.
    #[inline]
    pub fn get(&self) -> i64 {
        self.values.get_i64(self.offset)
    }

    /// Acquire load of the value.
    #[inline]
    pub fn get_volatile(&self) -> i64 {
        self.values.get_i64_volatile(self.offset)
    }

    /// Plain store of the value.
    #[inline]
    pub fn set(&self, value: i64) {
        self.values.put_i64(self.offset, value);
    }

    /// Release store of the value.
    #[inline]
    pub fn set_ordered(&self, value: i64) {
        self.values.put_i64_ordered(self.offset, value);
    }

    /// Store `proposed` with a plain store if it exceeds the current
    /// value. Returns whether an update happened.
    ///
    /// Single-writer contract: correct only when one producer updates
    /// this slot.
    #[inline]
    pub fn propose_max(&self, proposed: i64) -> bool {
        if self.get() < proposed {
            self.set(proposed);
            return true;
        }
        false
    }

    /// As [`propose_max`](Self::propose_max) but the update is a release
    /// store, publishing prior writes alongside the new position.
    #[inline]
    pub fn propose_max_ordered(&self, proposed: i64) -> bool {
        if self.get() < proposed {
            self.set_ordered(proposed);
            return true;
        }
        false
    }

    /// Sequentially consistent increment; returns the value before the
    /// addition.
    #[inline]
    pub fn increment(&self) -> i64 {
        self.values.get_and_add_i64(self.offset, 1)
    }

    /// Sequentially consistent fetch-and-add; returns the value before
    /// the addition.
    #[inline]
    pub fn get_and_add(&self, delta: i64) -> i64 {
        self.values.get_and_add_i64(self.offset, delta)
    }

    /// Mark the handle closed. Idempotent; the slot itself is untouched.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A counter handle that owns its slot.
///
/// Created through [`OwnedCounter::allocate`]; on close (or drop) the
/// slot is freed back to the manager exactly once. Dereferences to
/// [`AtomicCounter`] for all value operations.
pub struct OwnedCounter {
    counter: AtomicCounter,
    manager: Rc<RefCell<CountersManager>>,
}

impl OwnedCounter {
    /// Allocate a counter and return a handle that owns the slot.
    ///
    /// # Errors
    ///
    /// Propagates the manager's allocation errors.
    pub fn allocate(
        manager: &Rc<RefCell<CountersManager>>,
        label: &str,
        type_id: i32,
    ) -> Result<Self> {
        let counter_id = manager.borrow_mut().allocate(label, type_id)?;
        let values = manager.borrow().reader().values_buffer();

        Ok(Self {
            counter: AtomicCounter::new(values, counter_id),
            manager: Rc::clone(manager),
        })
    }

    /// Free the slot. Idempotent: only the first close reclaims.
    pub fn close(&mut self) {
        if !self.counter.is_closed() {
            self.counter.close();
            self.manager.borrow_mut().free(self.counter.id());
        }
    }
}

impl Deref for OwnedCounter {
    type Target = AtomicCounter;

    fn deref(&self) -> &AtomicCounter {
        &self.counter
    }
}

impl Drop for OwnedCounter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AlignedBuffer;
    use crate::counters::{COUNTER_LENGTH, METADATA_LENGTH, RECORD_RECLAIMED};

    fn values_region(slots: usize) -> AlignedBuffer {
        AlignedBuffer::zeroed(slots * COUNTER_LENGTH)
    }

    #[test]
    fn plain_and_ordered_stores_round_trip() {
        let region = values_region(4);
        let counter = AtomicCounter::new(AtomicBuffer::wrap(&region), 2);

        counter.set(5);
        assert_eq!(counter.get(), 5);

        counter.set_ordered(9);
        assert_eq!(counter.get_volatile(), 9);
        assert_eq!(counter.id(), 2);
    }

    #[test]
    fn propose_max_is_monotonic() {
        let region = values_region(1);
        let counter = AtomicCounter::new(AtomicBuffer::wrap(&region), 0);

        assert!(counter.propose_max(10));
        assert!(!counter.propose_max(5));
        assert!(!counter.propose_max(10));
        assert!(counter.propose_max_ordered(11));
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn increment_returns_previous_value() {
        let region = values_region(1);
        let counter = AtomicCounter::new(AtomicBuffer::wrap(&region), 0);

        assert_eq!(counter.increment(), 0);
        assert_eq!(counter.get_and_add(10), 1);
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn close_is_idempotent() {
        let region = values_region(1);
        let mut counter = AtomicCounter::new(AtomicBuffer::wrap(&region), 0);

        assert!(!counter.is_closed());
        counter.close();
        counter.close();
        assert!(counter.is_closed());
    }

    #[test]
    fn owned_counter_frees_its_slot_on_drop() {
        let metadata = AlignedBuffer::zeroed(16 * METADATA_LENGTH);
        let values = AlignedBuffer::zeroed(16 * COUNTER_LENGTH);
        let manager = Rc::new(RefCell::new(CountersManager::new(
            AtomicBuffer::wrap(&metadata),
            AtomicBuffer::wrap(&values),
        )));

        let id = {
            let counter = OwnedCounter::allocate(&manager, "publisher-limit", 4).unwrap();
            counter.set_ordered(77);
            assert_eq!(manager.borrow().counter_value(counter.id()), 77);
            counter.id()
        };

        assert_eq!(manager.borrow().counter_state(id), RECORD_RECLAIMED);
        // The freed id is first in line for reuse.
        assert_eq!(manager.borrow_mut().allocate("next", 0).unwrap(), id);
    }

    #[test]
    fn owned_counter_close_reclaims_once() {
        let metadata = AlignedBuffer::zeroed(16 * METADATA_LENGTH);
        let values = AlignedBuffer::zeroed(16 * COUNTER_LENGTH);
        let manager = Rc::new(RefCell::new(CountersManager::new(
            AtomicBuffer::wrap(&metadata),
            AtomicBuffer::wrap(&values),
        )));

        let mut counter = OwnedCounter::allocate(&manager, "consumer-pos", 4).unwrap();
        let id = counter.id();
        counter.close();
        counter.close();

        assert_eq!(manager.borrow().counter_state(id), RECORD_RECLAIMED);
        // A single free means a single freelist entry.
        assert_eq!(manager.borrow_mut().allocate("a", 0).unwrap(), id);
        assert_eq!(manager.borrow_mut().allocate("b", 0).unwrap(), 1);
    }
}
