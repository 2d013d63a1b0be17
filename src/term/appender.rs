//! Multi-producer appender over a term buffer.
//!
//! One sequentially consistent fetch-and-add on the packed tail counter
//! is the sole arbitration between producers: each arrival is granted a
//! disjoint, ordered range of the term, and everything after the grant is
//! local work over that range. A producer whose grant does not fit the
//! term either writes a padding frame (first past the post) or backs off
//! (already past), signalled to the caller through the packed result.
//!
//! Commit discipline: header and payload are written first; the frame
//! length is published last with release ordering. Consumers scan frames
//! from offset zero, acquire-loading each length, and stop at a zero
//! length or rotate at a padding frame; they never touch the tail.

use crate::buffer::{align_up, AtomicBuffer};

use super::claim::BufferClaim;
use super::{
    frame_length_ordered, pack_result, set_frame_flags, set_frame_type, tail_counter_offset,
    tail_term_id, tail_term_offset, HeaderWriter, ReservedValueSupplier, BEGIN_FRAGMENT_FLAG,
    END_FRAGMENT_FLAG, FRAME_ALIGNMENT, HEADER_LENGTH, PADDING_FRAME_TYPE, PARTITION_COUNT,
    RESERVED_VALUE_OFFSET, TERM_FAILED, TERM_TRIPPED, UNFRAGMENTED_FLAGS,
};

/// Lock-free appender over one partition's term buffer.
///
/// Any number of producers may share one appender by copy; the tail
/// counter in the metadata buffer carries all coordination.
pub struct TermAppender {
    term_buffer: AtomicBuffer,
    metadata_buffer: AtomicBuffer,
    tail_offset: usize,
}

impl TermAppender {
    /// Construct an appender over a term buffer and the metadata buffer
    /// holding its tail counter.
    ///
    /// # Panics
    ///
    /// Panics if the term capacity is not a power of two of at least one
    /// frame, if `partition_index` is out of range, or if the metadata
    /// buffer does not cover the partition's tail slot.
    pub fn new(
        term_buffer: AtomicBuffer,
        metadata_buffer: AtomicBuffer,
        partition_index: usize,
    ) -> Self {
        let term_length = term_buffer.capacity();
        assert!(
            term_length.is_power_of_two() && term_length >= FRAME_ALIGNMENT,
            "term length {} must be a power of two and at least {}",
            term_length,
            FRAME_ALIGNMENT
        );
        assert!(
            partition_index < PARTITION_COUNT,
            "partition index {} out of range [0, {})",
            partition_index,
            PARTITION_COUNT
        );

        let tail_offset = tail_counter_offset(partition_index);
        assert!(
            tail_offset + std::mem::size_of::<i64>() <= metadata_buffer.capacity(),
            "metadata capacity {} does not cover partition {}",
            metadata_buffer.capacity(),
            partition_index
        );

        Self {
            term_buffer,
            metadata_buffer,
            tail_offset,
        }
    }

    /// The term buffer this appender writes into.
    pub fn term_buffer(&self) -> AtomicBuffer {
        self.term_buffer
    }

    /// Acquire-load the raw packed tail.
    pub fn raw_tail_volatile(&self) -> i64 {
        self.metadata_buffer.get_i64_volatile(self.tail_offset)
    }

    /// Reserve a frame for the caller to fill through `buffer_claim`.
    ///
    /// On success the header is written, the claim wraps the reserved
    /// frame, and the returned value is the post-append term offset. The
    /// caller commits (or aborts) the claim to publish the frame. On
    /// end-of-term the result packs the term id with [`TERM_TRIPPED`] or
    /// [`TERM_FAILED`] in the low 32 bits; callers check the sign of
    /// [`result_term_offset`](super::result_term_offset).
    pub fn claim<H: HeaderWriter>(
        &self,
        header: &H,
        length: usize,
        buffer_claim: &mut BufferClaim,
    ) -> i64 {
        let frame_length = length + HEADER_LENGTH;
        let aligned_length = align_up(frame_length, FRAME_ALIGNMENT);

        let raw_tail = self.get_and_add_raw_tail(aligned_length);
        let term_offset = tail_term_offset(raw_tail);
        let term_id = tail_term_id(raw_tail);

        let term_length = self.term_buffer.capacity();
        let resulting_offset = term_offset + aligned_length as i64;
        if resulting_offset > term_length as i64 {
            return handle_end_of_log(&self.term_buffer, term_offset, term_length, term_id, header);
        }

        let frame_offset = term_offset as usize;
        header.write(&self.term_buffer, frame_offset, frame_length, term_id);
        set_frame_flags(&self.term_buffer, frame_offset, UNFRAGMENTED_FLAGS);
        buffer_claim.wrap(&self.term_buffer, frame_offset, frame_length);

        resulting_offset
    }

    /// Append a message carried whole in a single frame.
    ///
    /// Header, payload, and optional reserved value are written before
    /// the frame length is published with release ordering. Returns the
    /// post-append term offset, or a packed end-of-term result.
    pub fn append_unfragmented<H: HeaderWriter>(
        &self,
        header: &H,
        payload: &[u8],
        reserved_value_supplier: Option<ReservedValueSupplier>,
    ) -> i64 {
        let frame_length = payload.len() + HEADER_LENGTH;
        let aligned_length = align_up(frame_length, FRAME_ALIGNMENT);

        let raw_tail = self.get_and_add_raw_tail(aligned_length);
        let term_offset = tail_term_offset(raw_tail);
        let term_id = tail_term_id(raw_tail);

        let term_length = self.term_buffer.capacity();
        let resulting_offset = term_offset + aligned_length as i64;
        if resulting_offset > term_length as i64 {
            return handle_end_of_log(&self.term_buffer, term_offset, term_length, term_id, header);
        }

        let frame_offset = term_offset as usize;
        header.write(&self.term_buffer, frame_offset, frame_length, term_id);
        self.term_buffer
            .put_bytes(frame_offset + HEADER_LENGTH, payload);
        set_frame_flags(&self.term_buffer, frame_offset, UNFRAGMENTED_FLAGS);

        if let Some(supplier) = reserved_value_supplier {
            let reserved_value = supplier(&self.term_buffer, frame_offset, frame_length);
            self.term_buffer
                .put_i64(frame_offset + RESERVED_VALUE_OFFSET, reserved_value);
        }

        frame_length_ordered(&self.term_buffer, frame_offset, frame_length as i32);

        resulting_offset
    }

    /// Append a message split across sequential frames of at most
    /// `max_payload_length` payload bytes each.
    ///
    /// The whole message is reserved with one fetch-and-add; the first
    /// frame carries the begin-fragment flag, the last the end-fragment
    /// flag, and each frame's length is published individually so
    /// consumers can make progress fragment by fragment.
    /// `max_payload_length + HEADER_LENGTH` must be frame-aligned so
    /// full fragments tile the reservation exactly.
    pub fn append_fragmented<H: HeaderWriter>(
        &self,
        header: &H,
        payload: &[u8],
        max_payload_length: usize,
        reserved_value_supplier: Option<ReservedValueSupplier>,
    ) -> i64 {
        debug_assert!(max_payload_length > 0);
        debug_assert_eq!(
            (max_payload_length + HEADER_LENGTH) % FRAME_ALIGNMENT,
            0,
            "max payload {} does not produce frame-aligned fragments",
            max_payload_length
        );

        let length = payload.len();
        let num_max_payloads = length / max_payload_length;
        let remaining_payload = length % max_payload_length;
        let last_frame_length = if remaining_payload > 0 {
            align_up(remaining_payload + HEADER_LENGTH, FRAME_ALIGNMENT)
        } else {
            0
        };
        let required_length =
            num_max_payloads * (max_payload_length + HEADER_LENGTH) + last_frame_length;

        let raw_tail = self.get_and_add_raw_tail(required_length);
        let term_offset = tail_term_offset(raw_tail);
        let term_id = tail_term_id(raw_tail);

        let term_length = self.term_buffer.capacity();
        let resulting_offset = term_offset + required_length as i64;
        if resulting_offset > term_length as i64 {
            return handle_end_of_log(&self.term_buffer, term_offset, term_length, term_id, header);
        }

        let mut flags = BEGIN_FRAGMENT_FLAG;
        let mut frame_offset = term_offset as usize;
        let mut remaining = length;
        loop {
            let bytes_to_write = remaining.min(max_payload_length);
            let frame_length = bytes_to_write + HEADER_LENGTH;
            let aligned_frame_length = align_up(frame_length, FRAME_ALIGNMENT);
            let written = length - remaining;

            header.write(&self.term_buffer, frame_offset, frame_length, term_id);
            self.term_buffer.put_bytes(
                frame_offset + HEADER_LENGTH,
                &payload[written..written + bytes_to_write],
            );

            if remaining <= max_payload_length {
                flags |= END_FRAGMENT_FLAG;
            }
            set_frame_flags(&self.term_buffer, frame_offset, flags);

            if let Some(supplier) = reserved_value_supplier {
                let reserved_value = supplier(&self.term_buffer, frame_offset, frame_length);
                self.term_buffer
                    .put_i64(frame_offset + RESERVED_VALUE_OFFSET, reserved_value);
            }

            frame_length_ordered(&self.term_buffer, frame_offset, frame_length as i32);

            flags = 0;
            frame_offset += aligned_frame_length;
            remaining -= bytes_to_write;
            if remaining == 0 {
                break;
            }
        }

        resulting_offset
    }

    #[inline]
    fn get_and_add_raw_tail(&self, aligned_length: usize) -> i64 {
        self.metadata_buffer
            .get_and_add_i64(self.tail_offset, aligned_length as i64)
    }
}

/// Resolve a reservation that did not fit the term.
///
/// The first producer past the post (`term_offset < term_length`) pads
/// the remainder so consumers march through the term without special
/// tail handling; an exact fit trips without writing; anything past the
/// end means another producer already tripped the term.
fn handle_end_of_log<H: HeaderWriter>(
    term_buffer: &AtomicBuffer,
    term_offset: i64,
    term_length: usize,
    term_id: i32,
    header: &H,
) -> i64 {
    if term_offset > term_length as i64 {
        return pack_result(term_id, TERM_FAILED);
    }

    if term_offset < term_length as i64 {
        let frame_offset = term_offset as usize;
        let padding_length = term_length - frame_offset;
        header.write(term_buffer, frame_offset, padding_length, term_id);
        set_frame_type(term_buffer, frame_offset, PADDING_FRAME_TYPE);
        set_frame_flags(term_buffer, frame_offset, UNFRAGMENTED_FLAGS);
        frame_length_ordered(term_buffer, frame_offset, padding_length as i32);
    }

    pack_result(term_id, TERM_TRIPPED)
}
