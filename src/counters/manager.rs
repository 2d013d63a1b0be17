//! Allocation and reclamation of counter slots.
//!
//! The manager is the control path of the registry and is deliberately
//! not thread-safe: one logical owner performs every allocate and free,
//! which keeps the freelist and high-water mark free of CAS loops.
//! Allocation is rare; the hot path is per-slot mutation through
//! [`AtomicCounter`](super::counter::AtomicCounter), which stays
//! lock-free regardless of what the manager is doing.
//!
//! The reader role is composed rather than inherited: the manager owns a
//! [`CountersReader`] over the same regions and delegates the read API
//! to it.

use std::collections::VecDeque;

use tracing::debug;

use crate::buffer::AtomicBuffer;
use crate::error::{CountersError, Result};

use super::reader::CountersReader;
use super::{
    metadata_offset, value_offset, COUNTER_LENGTH, KEY_OFFSET, LABEL_OFFSET, MAX_KEY_LENGTH,
    MAX_LABEL_LENGTH, METADATA_LENGTH, RECORD_ALLOCATED, RECORD_RECLAIMED, TYPE_ID_OFFSET,
};

/// Fallible writer for the 120-byte key region of a new counter.
///
/// The closure receives the key region directly; whatever it leaves
/// behind becomes the record's key once the record is published. An
/// error abandons the allocation without publishing anything.
pub type KeyWriterResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Allocator and reclaimer for counter slots.
///
/// Single logical owner; wrap in `Rc<RefCell<_>>` to share with
/// [`OwnedCounter`](super::counter::OwnedCounter) handles on the same
/// thread.
pub struct CountersManager {
    reader: CountersReader,
    free_list: VecDeque<i32>,
    id_high_water_mark: i32,
}

impl CountersManager {
    /// Construct a manager over the two registry regions.
    ///
    /// # Panics
    ///
    /// Panics if the values capacity is not a whole number of counter
    /// slots or the metadata region cannot cover the values region
    /// (`metadata_capacity >= 2 * values_capacity`).
    pub fn new(metadata: AtomicBuffer, values: AtomicBuffer) -> Self {
        assert_eq!(
            values.capacity() % COUNTER_LENGTH,
            0,
            "values capacity must be a multiple of {}",
            COUNTER_LENGTH
        );
        assert!(
            metadata.capacity() >= 2 * values.capacity(),
            "metadata capacity {} cannot cover values capacity {}",
            metadata.capacity(),
            values.capacity()
        );

        Self {
            reader: CountersReader::new(metadata, values),
            free_list: VecDeque::new(),
            id_high_water_mark: -1,
        }
    }

    /// The composed read-only view over the same regions.
    pub fn reader(&self) -> &CountersReader {
        &self.reader
    }

    /// Highest counter id the registry can hold.
    pub fn max_counter_id(&self) -> i32 {
        self.reader.max_counter_id()
    }

    /// Acquire-load the record state for a counter id.
    pub fn counter_state(&self, counter_id: i32) -> i32 {
        self.reader.counter_state(counter_id)
    }

    /// Label of an allocated counter.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::NotFound`] if the record is not
    /// allocated.
    pub fn counter_label(&self, counter_id: i32) -> Result<String> {
        self.reader.counter_label(counter_id)
    }

    /// Acquire-load the 64-bit value of a counter.
    pub fn counter_value(&self, counter_id: i32) -> i64 {
        self.reader.counter_value(counter_id)
    }

    /// Iterate allocated records; see [`CountersReader::for_each`].
    pub fn for_each<F>(&self, callback: F)
    where
        F: FnMut(i32, i32, &str),
    {
        self.reader.for_each(callback)
    }

    /// Allocate a counter with a label and type id and no key.
    ///
    /// The new record is published with release ordering as the final
    /// step; a reader that observes the allocated state is guaranteed to
    /// observe the type id, key, and label written before it.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::OutOfCapacity`] when neither region can
    /// hold another record.
    pub fn allocate(&mut self, label: &str, type_id: i32) -> Result<i32> {
        let counter_id = self.next_counter_id()?;
        let metadata = self.reader.metadata_buffer();
        let offset = metadata_offset(counter_id);

        metadata.put_i32(offset + TYPE_ID_OFFSET, type_id);
        metadata.set_memory(offset + KEY_OFFSET, MAX_KEY_LENGTH, 0);
        write_label(&metadata, offset, label);
        metadata.put_i32_ordered(offset, RECORD_ALLOCATED);

        debug!(counter_id, type_id, label, "allocated counter");
        Ok(counter_id)
    }

    /// Allocate a counter, filling the key region through a callback.
    ///
    /// The callback receives the record's key region as a mutable view of
    /// exactly [`MAX_KEY_LENGTH`] bytes, pre-zeroed. If it fails, the
    /// reserved id goes back on the freelist and the error is
    /// propagated; the state field is never touched, so the
    /// partially-written record cannot become visible.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::OutOfCapacity`] when the registry is
    /// full, or [`CountersError::KeyWriter`] wrapping the callback's
    /// error.
    pub fn allocate_with_key_writer<F>(
        &mut self,
        label: &str,
        type_id: i32,
        key_writer: F,
    ) -> Result<i32>
    where
        F: FnOnce(&mut [u8]) -> KeyWriterResult,
    {
        let counter_id = self.next_counter_id()?;
        let metadata = self.reader.metadata_buffer();
        let offset = metadata_offset(counter_id);

        metadata.put_i32(offset + TYPE_ID_OFFSET, type_id);
        metadata.set_memory(offset + KEY_OFFSET, MAX_KEY_LENGTH, 0);

        // SAFETY: the record is unpublished, so this manager is the only
        // writer of its key region.
        let key_region = unsafe { metadata.as_mut_slice(offset + KEY_OFFSET, MAX_KEY_LENGTH) };
        if let Err(source) = key_writer(key_region) {
            self.free_list.push_back(counter_id);
            return Err(CountersError::KeyWriter(source));
        }

        write_label(&metadata, offset, label);
        metadata.put_i32_ordered(offset, RECORD_ALLOCATED);

        debug!(counter_id, type_id, label, "allocated counter");
        Ok(counter_id)
    }

    /// Allocate a counter from pre-encoded key and label bytes.
    ///
    /// Both are truncated to their field limits ([`MAX_KEY_LENGTH`] and
    /// [`MAX_LABEL_LENGTH`]) when longer.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::OutOfCapacity`] when the registry is
    /// full.
    pub fn allocate_with_key(&mut self, type_id: i32, key: &[u8], label: &str) -> Result<i32> {
        let counter_id = self.next_counter_id()?;
        let metadata = self.reader.metadata_buffer();
        let offset = metadata_offset(counter_id);

        metadata.put_i32(offset + TYPE_ID_OFFSET, type_id);
        metadata.set_memory(offset + KEY_OFFSET, MAX_KEY_LENGTH, 0);
        let key_length = key.len().min(MAX_KEY_LENGTH);
        metadata.put_bytes(offset + KEY_OFFSET, &key[..key_length]);
        write_label(&metadata, offset, label);
        metadata.put_i32_ordered(offset, RECORD_ALLOCATED);

        debug!(counter_id, type_id, label, "allocated counter");
        Ok(counter_id)
    }

    /// Free a counter slot.
    ///
    /// Publishes the reclaimed state with release ordering and queues the
    /// id for FIFO reuse. The counter value is left as-is; it is zeroed
    /// when the id is next handed out.
    pub fn free(&mut self, counter_id: i32) {
        assert!(
            counter_id >= 0 && counter_id <= self.max_counter_id(),
            "counter id {} out of range [0, {}]",
            counter_id,
            self.max_counter_id()
        );

        self.reader
            .metadata_buffer()
            .put_i32_ordered(metadata_offset(counter_id), RECORD_RECLAIMED);
        self.free_list.push_back(counter_id);

        debug!(counter_id, "freed counter");
    }

    /// Administrative release-store of a counter value, bypassing any
    /// per-slot handle.
    pub fn set_counter_value(&mut self, counter_id: i32, value: i64) {
        self.reader
            .values_buffer()
            .put_i64_ordered(value_offset(counter_id), value);
    }

    /// Next id to hand out: FIFO freelist first, then the high-water
    /// mark. A reused slot has its value zeroed (release-ordered) before
    /// it is returned, so readers never see a stale value under a new
    /// record. The high-water mark only advances when the new id fits,
    /// which keeps a failed allocation from burning ids.
    fn next_counter_id(&mut self) -> Result<i32> {
        if let Some(counter_id) = self.free_list.pop_front() {
            self.reader
                .values_buffer()
                .put_i64_ordered(value_offset(counter_id), 0);
            return Ok(counter_id);
        }

        let counter_id = self.id_high_water_mark + 1;
        self.check_capacity(counter_id)?;
        self.id_high_water_mark = counter_id;
        Ok(counter_id)
    }

    fn check_capacity(&self, counter_id: i32) -> Result<()> {
        let values_capacity = self.reader.values_buffer().capacity();
        let metadata_capacity = self.reader.metadata_buffer().capacity();
        let slot = counter_id as usize + 1;

        if slot * COUNTER_LENGTH > values_capacity || slot * METADATA_LENGTH > metadata_capacity {
            return Err(CountersError::OutOfCapacity {
                counter_id,
                values_capacity,
                metadata_capacity,
            });
        }

        Ok(())
    }
}

/// Write a label as 4-byte length plus bytes, truncated to the field
/// limit.
fn write_label(metadata: &AtomicBuffer, record_offset: usize, label: &str) {
    let bytes = label.as_bytes();
    let length = bytes.len().min(MAX_LABEL_LENGTH);
    metadata.put_i32(record_offset + LABEL_OFFSET, length as i32);
    metadata.put_bytes(record_offset + LABEL_OFFSET + 4, &bytes[..length]);
}
