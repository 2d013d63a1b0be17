//! Read-only view over the counters registry.
//!
//! Readers are wait-free and never mutate either region. They are built
//! for out-of-process observers: a reader constructed over an independent
//! mapping of the same file sees every record a manager publishes, with
//! the record state as the synchronization point. A reader may observe a
//! slot change state between a state read and a subsequent field read;
//! callers needing strict consistency re-check the state afterwards.

use crate::buffer::AtomicBuffer;
use crate::error::{CountersError, Result};

use super::{
    metadata_offset, value_offset, COUNTER_LENGTH, KEY_OFFSET, LABEL_OFFSET, MAX_KEY_LENGTH,
    NULL_COUNTER_ID, RECORD_ALLOCATED, RECORD_UNUSED, TYPE_ID_OFFSET,
};

/// Read-only view over the metadata and values regions of a counters
/// registry.
pub struct CountersReader {
    metadata: AtomicBuffer,
    values: AtomicBuffer,
}

impl CountersReader {
    /// Construct a reader over the two registry regions.
    pub fn new(metadata: AtomicBuffer, values: AtomicBuffer) -> Self {
        Self { metadata, values }
    }

    /// The metadata region.
    pub fn metadata_buffer(&self) -> AtomicBuffer {
        self.metadata
    }

    /// The values region.
    pub fn values_buffer(&self) -> AtomicBuffer {
        self.values
    }

    /// Highest counter id the values region can hold.
    pub fn max_counter_id(&self) -> i32 {
        (self.values.capacity() / COUNTER_LENGTH) as i32 - 1
    }

    #[inline]
    fn validate_counter_id(&self, counter_id: i32) {
        assert!(
            counter_id >= 0 && counter_id <= self.max_counter_id(),
            "counter id {} out of range [0, {}]",
            counter_id,
            self.max_counter_id()
        );
    }

    /// Acquire-load the record state for a counter id.
    pub fn counter_state(&self, counter_id: i32) -> i32 {
        self.validate_counter_id(counter_id);
        self.metadata.get_i32_volatile(metadata_offset(counter_id))
    }

    /// Type id of an allocated counter.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::NotFound`] if the record is not in the
    /// allocated state.
    pub fn counter_type_id(&self, counter_id: i32) -> Result<i32> {
        self.check_allocated(counter_id)?;
        Ok(self
            .metadata
            .get_i32(metadata_offset(counter_id) + TYPE_ID_OFFSET))
    }

    /// Key bytes of an allocated counter, copied out of the region.
    ///
    /// Always [`MAX_KEY_LENGTH`] bytes; the registry does not record how
    /// much of the key region the allocator filled.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::NotFound`] if the record is not in the
    /// allocated state.
    pub fn counter_key(&self, counter_id: i32) -> Result<Vec<u8>> {
        self.check_allocated(counter_id)?;
        let mut key = vec![0u8; MAX_KEY_LENGTH];
        self.metadata
            .get_bytes(metadata_offset(counter_id) + KEY_OFFSET, &mut key);
        Ok(key)
    }

    /// Label of an allocated counter.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::NotFound`] if the record is not in the
    /// allocated state.
    pub fn counter_label(&self, counter_id: i32) -> Result<String> {
        self.check_allocated(counter_id)?;
        Ok(self
            .metadata
            .get_string_ascii(metadata_offset(counter_id) + LABEL_OFFSET))
    }

    /// Acquire-load the 64-bit value of a counter.
    pub fn counter_value(&self, counter_id: i32) -> i64 {
        self.validate_counter_id(counter_id);
        self.values.get_i64_volatile(value_offset(counter_id))
    }

    /// Iterate allocated records in id order, invoking the callback with
    /// `(counter_id, type_id, label)`.
    ///
    /// Iteration stops at the first unused record: allocation is dense
    /// through the high-water mark, so an unused slot marks the end of
    /// the table. Reclaimed slots are skipped.
    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(i32, i32, &str),
    {
        for counter_id in 0..=self.max_counter_id() {
            let offset = metadata_offset(counter_id);
            let state = self.metadata.get_i32_volatile(offset);

            if state == RECORD_UNUSED {
                break;
            }

            if state == RECORD_ALLOCATED {
                let type_id = self.metadata.get_i32(offset + TYPE_ID_OFFSET);
                let label = self.metadata.get_string_ascii(offset + LABEL_OFFSET);
                callback(counter_id, type_id, &label);
            }
        }
    }

    /// Find the first allocated counter with the given type id.
    ///
    /// Returns [`NULL_COUNTER_ID`] when no allocated record matches.
    pub fn find_by_type_id(&self, type_id: i32) -> i32 {
        for counter_id in 0..=self.max_counter_id() {
            let offset = metadata_offset(counter_id);
            let state = self.metadata.get_i32_volatile(offset);

            if state == RECORD_UNUSED {
                break;
            }

            if state == RECORD_ALLOCATED && self.metadata.get_i32(offset + TYPE_ID_OFFSET) == type_id
            {
                return counter_id;
            }
        }

        NULL_COUNTER_ID
    }

    #[inline]
    fn check_allocated(&self, counter_id: i32) -> Result<()> {
        self.validate_counter_id(counter_id);
        if self.metadata.get_i32_volatile(metadata_offset(counter_id)) != RECORD_ALLOCATED {
            return Err(CountersError::NotFound { counter_id });
        }
        Ok(())
    }
}
