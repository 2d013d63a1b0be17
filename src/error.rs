//! Error types for the counters registry.
//!
//! The registry surfaces two runtime error conditions: running out of
//! counter slots and querying a counter id that is not allocated. Bounds
//! and alignment violations are programming errors and are handled with
//! assertions in the buffer layer rather than error values. End-of-term
//! conditions in the appender are control flow, signalled through packed
//! sentinels, and never appear here.

use thiserror::Error;

/// Error type for counter allocation and lookup operations.
#[derive(Debug, Error)]
pub enum CountersError {
    /// No counter slot is available for the requested allocation.
    ///
    /// Neither the values region nor the metadata region can hold another
    /// record. No state was published; the reserved id was returned to
    /// the freelist.
    #[error(
        "counter id {counter_id} exceeds capacity (values: {values_capacity} bytes, metadata: {metadata_capacity} bytes)"
    )]
    OutOfCapacity {
        /// The id that could not be placed.
        counter_id: i32,
        /// Capacity of the values region in bytes.
        values_capacity: usize,
        /// Capacity of the metadata region in bytes.
        metadata_capacity: usize,
    },

    /// The queried counter id is not in the allocated state.
    #[error("counter id {counter_id} is not allocated")]
    NotFound {
        /// The id that was queried.
        counter_id: i32,
    },

    /// A caller-supplied key writer failed while filling the key region.
    ///
    /// The reserved id was returned to the freelist and the slot was
    /// never published.
    #[error("key writer failed: {0}")]
    KeyWriter(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, CountersError>;
