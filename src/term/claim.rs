//! Zero-copy claims over reserved frames.
//!
//! A claim wraps the frame range a producer reserved through
//! [`TermAppender::claim`](super::appender::TermAppender::claim). The
//! producer writes its payload directly into the term buffer and then
//! commits, which publishes the frame length with release ordering and
//! makes the frame visible to consumers in one step. An aborted claim is
//! converted to padding so consumers skip the reserved range instead of
//! stalling on a zero length forever.

use crate::buffer::AtomicBuffer;

use super::{frame_length_ordered, set_frame_type, HEADER_LENGTH, PADDING_FRAME_TYPE};

/// A reserved frame awaiting payload and commit.
///
/// Default-constructed claims are unpopulated; using one before a
/// successful [`TermAppender::claim`](super::appender::TermAppender::claim)
/// is a contract violation caught by the debug bounds checks. Each
/// populated claim must be resolved exactly once, by `commit` or
/// `abort`.
#[derive(Default)]
pub struct BufferClaim {
    frame: AtomicBuffer,
}

impl BufferClaim {
    /// Bind the claim to `[frame_offset, frame_offset + frame_length)`
    /// of a term buffer.
    pub(crate) fn wrap(&mut self, term_buffer: &AtomicBuffer, frame_offset: usize, frame_length: usize) {
        self.frame = term_buffer.view(frame_offset, frame_length);
    }

    /// Offset of the payload within the claimed frame.
    pub fn offset(&self) -> usize {
        HEADER_LENGTH
    }

    /// Length of the payload the claim can carry.
    pub fn length(&self) -> usize {
        self.frame.capacity() - HEADER_LENGTH
    }

    /// Copy `payload` into the claimed frame.
    pub fn put_bytes(&mut self, payload: &[u8]) {
        self.frame.put_bytes(HEADER_LENGTH, payload);
    }

    /// Mutable view of the payload range for in-place encoding.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // SAFETY: the producer holds the only claim over this reserved
        // range until the length is published.
        unsafe { self.frame.as_mut_slice(HEADER_LENGTH, self.length()) }
    }

    /// Publish the frame length with release ordering, committing the
    /// frame. The claim is unpopulated afterwards.
    pub fn commit(&mut self) {
        let frame_length = self.frame.capacity();
        frame_length_ordered(&self.frame, 0, frame_length as i32);
        self.frame = AtomicBuffer::default();
    }

    /// Abandon the claim: rewrite the frame type to padding, then
    /// publish the length so consumers skip the range. The claim is
    /// unpopulated afterwards.
    pub fn abort(&mut self) {
        let frame_length = self.frame.capacity();
        set_frame_type(&self.frame, 0, PADDING_FRAME_TYPE);
        frame_length_ordered(&self.frame, 0, frame_length as i32);
        self.frame = AtomicBuffer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AlignedBuffer;
    use crate::term::{frame_length_volatile, frame_type, DATA_FRAME_TYPE, TYPE_OFFSET};

    #[test]
    fn commit_publishes_the_frame_length() {
        let region = AlignedBuffer::zeroed(256);
        let term = AtomicBuffer::wrap(&region);
        term.put_u16(64 + TYPE_OFFSET, DATA_FRAME_TYPE);

        let mut claim = BufferClaim::default();
        claim.wrap(&term, 64, 96);

        assert_eq!(claim.offset(), HEADER_LENGTH);
        assert_eq!(claim.length(), 64);
        claim.put_bytes(b"order-fill");
        claim.commit();

        assert_eq!(frame_length_volatile(&term, 64), 96);
        let mut payload = [0u8; 10];
        term.get_bytes(64 + HEADER_LENGTH, &mut payload);
        assert_eq!(&payload, b"order-fill");
    }

    #[test]
    fn abort_converts_the_frame_to_padding() {
        let region = AlignedBuffer::zeroed(256);
        let term = AtomicBuffer::wrap(&region);
        term.put_u16(TYPE_OFFSET, DATA_FRAME_TYPE);

        let mut claim = BufferClaim::default();
        claim.wrap(&term, 0, 128);
        claim.abort();

        assert_eq!(frame_type(&term, 0), PADDING_FRAME_TYPE);
        assert_eq!(frame_length_volatile(&term, 0), 128);
    }

    #[test]
    fn payload_mut_exposes_the_payload_range() {
        let region = AlignedBuffer::zeroed(256);
        let term = AtomicBuffer::wrap(&region);

        let mut claim = BufferClaim::default();
        claim.wrap(&term, 0, 64);
        claim.payload_mut().fill(0x5A);
        claim.commit();

        let mut bytes = [0u8; 32];
        term.get_bytes(HEADER_LENGTH, &mut bytes);
        assert_eq!(bytes, [0x5A; 32]);
    }
}
