//! Term buffer framing and tail arithmetic.
//!
//! The log is a sequence of fixed-size *terms*. Producers append *frames*
//! to the active term: a 32-byte header, the payload, and alignment
//! padding up to the 32-byte frame boundary. A single packed 64-bit tail
//! counter per partition arbitrates all producers: the high 32 bits hold
//! the term id, the low 32 bits the term offset, so one fetch-and-add
//! both reserves a range and records which term it belongs to.
//!
//! Frame header layout (little-endian):
//!
//! ```text
//! 0       4     5     6       8            12           16
//! ┌───────┬─────┬─────┬───────┬────────────┬────────────┬
//! │ frame │ ver │flags│ type  │ term       │ session id │
//! │ length│     │     │       │ offset     │            │
//! ├───────┴─────┴─────┴───────┼────────────┼────────────┤
//! │ stream id  │ term id      │ reserved value (8B)     │
//! └────────────┴──────────────┴─────────────────────────┘
//! 16           20             24                       32
//! ```
//!
//! The frame length field is always published last with release
//! ordering: a consumer that acquire-loads a nonzero length observes a
//! fully initialized frame. A zero length means "not yet committed";
//! a padding-type frame means "skip to the end of the term".

pub mod appender;
pub mod claim;

use crate::buffer::AtomicBuffer;

/// Length of the frame header in bytes.
pub const HEADER_LENGTH: usize = 32;

/// Frames begin on multiples of this alignment.
pub const FRAME_ALIGNMENT: usize = 32;

/// Offset of the 32-bit frame length field within a frame.
pub const FRAME_LENGTH_OFFSET: usize = 0;

/// Offset of the version byte within a frame.
pub const VERSION_OFFSET: usize = 4;

/// Offset of the flags byte within a frame.
pub const FLAGS_OFFSET: usize = 5;

/// Offset of the 16-bit frame type within a frame.
pub const TYPE_OFFSET: usize = 6;

/// Offset of the 32-bit term offset field within a frame.
pub const TERM_OFFSET_OFFSET: usize = 8;

/// Offset of the 32-bit session id within a frame.
pub const SESSION_ID_OFFSET: usize = 12;

/// Offset of the 32-bit stream id within a frame.
pub const STREAM_ID_OFFSET: usize = 16;

/// Offset of the 32-bit term id within a frame.
pub const TERM_ID_OFFSET: usize = 20;

/// Offset of the 64-bit reserved value within a frame.
pub const RESERVED_VALUE_OFFSET: usize = 24;

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0;

/// Flag marking the first frame of a fragmented message.
pub const BEGIN_FRAGMENT_FLAG: u8 = 0x80;

/// Flag marking the last frame of a fragmented message.
pub const END_FRAGMENT_FLAG: u8 = 0x40;

/// Flags for a message carried whole in one frame.
pub const UNFRAGMENTED_FLAGS: u8 = BEGIN_FRAGMENT_FLAG | END_FRAGMENT_FLAG;

/// Frame type for padding at the end of a term. Consumers skip padding
/// frames and rotate to the next term.
pub const PADDING_FRAME_TYPE: u16 = 0x00;

/// Frame type for data frames.
pub const DATA_FRAME_TYPE: u16 = 0x01;

/// Appender result sentinel: the term has been tripped; rotate to the
/// next partition.
pub const TERM_TRIPPED: i32 = -1;

/// Appender result sentinel: the reservation landed past the end of an
/// already-tripped term; retry on the new term.
pub const TERM_FAILED: i32 = -2;

/// Number of term partitions rotated through by the log.
pub const PARTITION_COUNT: usize = 3;

/// Byte offset of a partition's tail counter within the metadata buffer.
#[inline]
pub const fn tail_counter_offset(partition_index: usize) -> usize {
    partition_index * std::mem::size_of::<i64>()
}

/// Pack a term id and term offset into a raw tail value.
#[inline]
pub const fn pack_tail(term_id: i32, term_offset: i32) -> i64 {
    ((term_id as i64) << 32) | (term_offset as u32 as i64)
}

/// Term id from a raw tail value (high 32 bits).
#[inline]
pub const fn tail_term_id(raw_tail: i64) -> i32 {
    (raw_tail >> 32) as i32
}

/// Term offset from a raw tail value (low 32 bits, unsigned).
///
/// Returned widened to `i64`: after producers race past the end of a
/// term the accumulated offset can exceed the term length, and end-of-log
/// handling needs the unclamped value.
#[inline]
pub const fn tail_term_offset(raw_tail: i64) -> i64 {
    raw_tail & 0xFFFF_FFFF
}

/// Pack an appender result: term id high, offset or sentinel low.
///
/// The low 32 bits double as a success offset and a negative sentinel
/// ([`TERM_TRIPPED`], [`TERM_FAILED`]); callers check the sign of
/// [`result_term_offset`].
#[inline]
pub const fn pack_result(term_id: i32, term_offset: i32) -> i64 {
    pack_tail(term_id, term_offset)
}

/// Term id carried in an end-of-term appender result.
#[inline]
pub const fn result_term_id(result: i64) -> i32 {
    (result >> 32) as i32
}

/// Offset-or-sentinel carried in the low 32 bits of an appender result.
/// Negative values are [`TERM_TRIPPED`] or [`TERM_FAILED`].
#[inline]
pub const fn result_term_offset(result: i64) -> i32 {
    result as i32
}

/// Acquire-load a frame's length field. Zero means the frame at this
/// offset has not been committed yet.
#[inline]
pub fn frame_length_volatile(buffer: &AtomicBuffer, frame_offset: usize) -> i32 {
    buffer.get_i32_volatile(frame_offset + FRAME_LENGTH_OFFSET)
}

/// Release-store a frame's length field; the frame's commit point.
#[inline]
pub fn frame_length_ordered(buffer: &AtomicBuffer, frame_offset: usize, frame_length: i32) {
    buffer.put_i32_ordered(frame_offset + FRAME_LENGTH_OFFSET, frame_length);
}

/// Frame type at an offset.
#[inline]
pub fn frame_type(buffer: &AtomicBuffer, frame_offset: usize) -> u16 {
    buffer.get_u16(frame_offset + TYPE_OFFSET)
}

/// Set the frame type at an offset.
#[inline]
pub fn set_frame_type(buffer: &AtomicBuffer, frame_offset: usize, frame_type: u16) {
    buffer.put_u16(frame_offset + TYPE_OFFSET, frame_type);
}

/// Frame flags at an offset.
#[inline]
pub fn frame_flags(buffer: &AtomicBuffer, frame_offset: usize) -> u8 {
    buffer.get_u8(frame_offset + FLAGS_OFFSET)
}

/// Set the frame flags at an offset.
#[inline]
pub fn set_frame_flags(buffer: &AtomicBuffer, frame_offset: usize, flags: u8) {
    buffer.put_u8(frame_offset + FLAGS_OFFSET, flags);
}

/// Whether the frame at an offset is a padding frame.
#[inline]
pub fn is_padding_frame(buffer: &AtomicBuffer, frame_offset: usize) -> bool {
    frame_type(buffer, frame_offset) == PADDING_FRAME_TYPE
}

/// Writes frame headers on behalf of the appender.
///
/// Implementations fill every header field except the frame length and
/// flags: the appender owns the flags byte (fragmentation is its
/// concern) and publishes the length itself as the commit step, so the
/// length field must never be written eagerly.
pub trait HeaderWriter {
    /// Write the header for a frame of `frame_length` bytes at
    /// `frame_offset` within `term_buffer`.
    fn write(
        &self,
        term_buffer: &AtomicBuffer,
        frame_offset: usize,
        frame_length: usize,
        term_id: i32,
    );
}

/// Standard header writer carrying the stream identity of a publication.
pub struct DefaultHeaderWriter {
    session_id: i32,
    stream_id: i32,
}

impl DefaultHeaderWriter {
    /// Construct a header writer for a `(session, stream)` pair.
    pub fn new(session_id: i32, stream_id: i32) -> Self {
        Self {
            session_id,
            stream_id,
        }
    }
}

impl HeaderWriter for DefaultHeaderWriter {
    fn write(
        &self,
        term_buffer: &AtomicBuffer,
        frame_offset: usize,
        _frame_length: usize,
        term_id: i32,
    ) {
        term_buffer.put_u8(frame_offset + VERSION_OFFSET, FRAME_VERSION);
        term_buffer.put_u16(frame_offset + TYPE_OFFSET, DATA_FRAME_TYPE);
        term_buffer.put_i32(frame_offset + TERM_OFFSET_OFFSET, frame_offset as i32);
        term_buffer.put_i32(frame_offset + SESSION_ID_OFFSET, self.session_id);
        term_buffer.put_i32(frame_offset + STREAM_ID_OFFSET, self.stream_id);
        term_buffer.put_i32(frame_offset + TERM_ID_OFFSET, term_id);
    }
}

/// Computes the reserved value for a frame after its payload is in
/// place; the result is stored at [`RESERVED_VALUE_OFFSET`].
pub type ReservedValueSupplier = fn(&AtomicBuffer, usize, usize) -> i64;
