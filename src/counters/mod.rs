//! Shared-memory counters registry.
//!
//! A fixed-capacity table of named 64-bit counters used to publish
//! liveness, positions, and statistics to observers in other processes.
//! The registry spans two parallel byte regions:
//!
//! - *values region*: one 128-byte slot per counter, holding the 8-byte
//!   counter value at offset 0 with the remainder as padding. The padding
//!   keeps each counter on its own pair of cache lines so unrelated
//!   counters never contend.
//! - *metadata region*: one 512-byte record per counter, holding the
//!   record state, a type id, 120 bytes of caller-defined key, and a
//!   length-prefixed label.
//!
//! Slot `i` maps to values offset `i * 128` and metadata offset
//! `i * 512`; there is no index structure. A record becomes visible when
//! its state is published as [`RECORD_ALLOCATED`] with release ordering,
//! which is the commit point for everything written before it.
//!
//! Roles are split deliberately: [`manager::CountersManager`] is the
//! single-owner control path for allocate/free, [`reader::CountersReader`]
//! is a wait-free read-only view for any number of observers, and
//! [`counter::AtomicCounter`] is the per-slot hot-path handle.

pub mod counter;
pub mod manager;
pub mod reader;

use crate::buffer::CACHE_LINE_LENGTH;

/// Length of a values-region slot: the 8-byte counter value plus padding
/// to a cache-line-pair boundary.
pub const COUNTER_LENGTH: usize = 2 * CACHE_LINE_LENGTH;

/// Length of a metadata record.
pub const METADATA_LENGTH: usize = 4 * COUNTER_LENGTH;

/// Offset of the 32-bit type id within a metadata record.
pub const TYPE_ID_OFFSET: usize = 4;

/// Offset of the key bytes within a metadata record.
pub const KEY_OFFSET: usize = 8;

/// Maximum length of the caller-defined key in bytes.
pub const MAX_KEY_LENGTH: usize = 120;

/// Offset of the length-prefixed label within a metadata record.
pub const LABEL_OFFSET: usize = 128;

/// Maximum length of a label in bytes, excluding the 4-byte length
/// prefix.
pub const MAX_LABEL_LENGTH: usize = METADATA_LENGTH - LABEL_OFFSET - 4;

/// Record state: the slot has never been allocated.
pub const RECORD_UNUSED: i32 = 0;

/// Record state: the slot is allocated and its fields are valid.
pub const RECORD_ALLOCATED: i32 = 1;

/// Record state: the slot was freed and awaits reuse.
pub const RECORD_RECLAIMED: i32 = -1;

/// Sentinel counter id returned by searches that find nothing.
pub const NULL_COUNTER_ID: i32 = -1;

/// Default counter type id for counters with no domain-specific type.
pub const DEFAULT_TYPE_ID: i32 = 0;

/// Byte offset of a counter's value within the values region.
#[inline]
pub const fn value_offset(counter_id: i32) -> usize {
    counter_id as usize * COUNTER_LENGTH
}

/// Byte offset of a counter's record within the metadata region.
#[inline]
pub const fn metadata_offset(counter_id: i32) -> usize {
    counter_id as usize * METADATA_LENGTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_constants_are_consistent() {
        assert_eq!(COUNTER_LENGTH, 128);
        assert_eq!(METADATA_LENGTH, 512);
        assert_eq!(LABEL_OFFSET, KEY_OFFSET + MAX_KEY_LENGTH);
        assert_eq!(MAX_LABEL_LENGTH, 380);
    }

    #[test]
    fn slot_offsets_are_pure_arithmetic() {
        assert_eq!(value_offset(0), 0);
        assert_eq!(value_offset(3), 384);
        assert_eq!(metadata_offset(0), 0);
        assert_eq!(metadata_offset(3), 1536);
    }
}
