//! Spindle Core - shared-memory coordination primitives for the Spindle
//! messaging transport.
//!
//! # Overview
//!
//! This crate is the low-level core two kinds of collaborators build on:
//!
//! 1. A **counters registry**: a fixed-capacity table of named 64-bit
//!    counters in shared memory, publishing liveness, positions, and
//!    statistics to observers in other processes
//! 2. A **term appender**: a multi-producer, lock-free writer framing
//!    messages into a fixed-size term buffer, with padding records at
//!    end-of-term wrap-around
//!
//! Both work over caller-supplied byte regions - typically slices of a
//! memory-mapped file - and rely on atomic operations with explicit
//! ordering so that readers mapped over the same region in another
//! process observe consistent state.
//!
//! # Key Features
//!
//! - Lock-free concurrent appends arbitrated by a single fetch-and-add
//! - Wait-free counter reads and single-writer position updates
//! - Release/acquire publication discipline: a record or frame becomes
//!   visible atomically with everything written before it
//! - Cache-line isolation of counter values to prevent false sharing
//! - No I/O and no allocation on any hot path
//!
//! # Usage
//!
//! An operational process typically:
//! 1. Wraps its mapped regions with [`AtomicBuffer`]
//! 2. Builds a [`CountersManager`] and allocates counters for its state
//! 3. Publishes positions through [`AtomicCounter`] handles
//! 4. Appends messages through a [`TermAppender`] per active term
//!
//! Observer processes construct a [`CountersReader`] over independent
//! mappings of the same regions and never mutate.

#![deny(missing_docs)]

pub mod buffer;
pub mod counters;
pub mod error;
pub mod term;

pub use buffer::{align_up, AlignedBuffer, AtomicBuffer, CACHE_LINE_LENGTH};
pub use counters::counter::{AtomicCounter, OwnedCounter};
pub use counters::manager::CountersManager;
pub use counters::reader::CountersReader;
pub use error::{CountersError, Result};
pub use term::appender::TermAppender;
pub use term::claim::BufferClaim;
pub use term::{DefaultHeaderWriter, HeaderWriter, ReservedValueSupplier};
