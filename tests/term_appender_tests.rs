//! Concurrency tests for the term appender
//!
//! The fetch-add on the packed tail is the only coordination between
//! producers, so these tests drive many producers at one term and then
//! verify the resulting frame sequence from a consumer's point of view:
//! disjoint reservations, gapless coverage, and frames that are fully
//! initialized by the time their length is visible.

use spindle_core::term::{
    frame_length_volatile, is_padding_frame, result_term_offset, tail_counter_offset,
    tail_term_offset, FRAME_ALIGNMENT, HEADER_LENGTH, PARTITION_COUNT, TERM_ID_OFFSET,
};
use spindle_core::{
    align_up, AlignedBuffer, AtomicBuffer, DefaultHeaderWriter, TermAppender,
};
use std::sync::{Arc, Barrier};
use std::thread;

const SESSION_ID: i32 = 5;
const STREAM_ID: i32 = 1001;

fn log_regions(term_length: usize) -> (AlignedBuffer, AlignedBuffer) {
    (
        AlignedBuffer::zeroed(term_length),
        AlignedBuffer::zeroed(PARTITION_COUNT * 8),
    )
}

/// Concurrent producers receive pairwise disjoint reservations that
/// cover the head of the term without gaps.
#[test]
fn concurrent_appends_partition_the_term() {
    const PRODUCERS: usize = 4;
    const APPENDS_PER_PRODUCER: usize = 100;
    const TERM_LENGTH: usize = 64 * 1024;

    let (term, metadata) = log_regions(TERM_LENGTH);
    let term_buffer = AtomicBuffer::wrap(&term);
    let metadata_buffer = AtomicBuffer::wrap(&metadata);

    let barrier = Arc::new(Barrier::new(PRODUCERS));
    let mut handles = Vec::new();

    for producer in 0..PRODUCERS {
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let appender = TermAppender::new(term_buffer, metadata_buffer, 0);
            let header = DefaultHeaderWriter::new(SESSION_ID, STREAM_ID);
            barrier.wait();

            for i in 0..APPENDS_PER_PRODUCER {
                // Distinct lengths across producers and iterations; the
                // first payload byte tags the producer.
                let length = 1 + (producer * 13 + i * 7) % 64;
                let mut payload = vec![0u8; length];
                payload[0] = producer as u8 + 1;

                let result = appender.append_unfragmented(&header, &payload, None);
                assert!(
                    result_term_offset(result) >= 0,
                    "append must not hit end of term in this sizing"
                );
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Consumer-style scan: march frame to frame from offset zero.
    let raw_tail = metadata_buffer.get_i64_volatile(tail_counter_offset(0));
    let tail_offset = tail_term_offset(raw_tail) as usize;

    let mut offset = 0usize;
    let mut frames = 0usize;
    let mut per_producer = [0usize; PRODUCERS];
    while offset < tail_offset {
        let frame_length = frame_length_volatile(&term_buffer, offset) as usize;
        assert!(frame_length >= HEADER_LENGTH, "gap in the frame sequence");

        let tag = {
            let mut byte = [0u8; 1];
            term_buffer.get_bytes(offset + HEADER_LENGTH, &mut byte);
            byte[0]
        };
        assert!((1..=PRODUCERS as u8).contains(&tag));
        per_producer[tag as usize - 1] += 1;

        frames += 1;
        offset += align_up(frame_length, FRAME_ALIGNMENT);
    }

    assert_eq!(offset, tail_offset, "frames must cover the reserved range");
    assert_eq!(frames, PRODUCERS * APPENDS_PER_PRODUCER);
    assert_eq!(per_producer, [APPENDS_PER_PRODUCER; PRODUCERS]);
}

/// A consumer that acquire-loads a nonzero frame length observes the
/// term id and payload written by the same producer.
#[test]
fn committed_frames_are_fully_visible_to_a_scanning_consumer() {
    const MESSAGES: usize = 500;
    const TERM_LENGTH: usize = 64 * 1024;

    let (term, metadata) = log_regions(TERM_LENGTH);
    let term_buffer = AtomicBuffer::wrap(&term);
    let metadata_buffer = AtomicBuffer::wrap(&metadata);

    let consumer = thread::spawn(move || {
        let mut offset = 0usize;
        let mut consumed = 0usize;
        while consumed < MESSAGES {
            let frame_length = frame_length_volatile(&term_buffer, offset);
            if frame_length == 0 {
                thread::yield_now();
                continue;
            }

            assert_eq!(term_buffer.get_i32(offset + TERM_ID_OFFSET), 0);
            let payload_length = frame_length as usize - HEADER_LENGTH;
            let mut payload = vec![0u8; payload_length];
            term_buffer.get_bytes(offset + HEADER_LENGTH, &mut payload);
            let expected = (consumed % 251) as u8;
            assert!(
                payload.iter().all(|&b| b == expected),
                "payload of message {} must be fully visible",
                consumed
            );

            consumed += 1;
            offset += align_up(frame_length as usize, FRAME_ALIGNMENT);
        }
    });

    let appender = TermAppender::new(term_buffer, metadata_buffer, 0);
    let header = DefaultHeaderWriter::new(SESSION_ID, STREAM_ID);
    for i in 0..MESSAGES {
        let length = 1 + i % 48;
        let payload = vec![(i % 251) as u8; length];
        let result = appender.append_unfragmented(&header, &payload, None);
        assert!(result_term_offset(result) >= 0);
    }

    consumer.join().unwrap();
}

/// Racing producers over a small term: exactly one of them pads the
/// remainder, every earlier frame stays intact, and the stragglers fail
/// without writing.
#[test]
fn only_the_tripping_producer_pads_the_term() {
    const PRODUCERS: usize = 4;
    const TERM_LENGTH: usize = 1024;
    const PAYLOAD_LENGTH: usize = 64; // 96-byte aligned frames

    let (term, metadata) = log_regions(TERM_LENGTH);
    let term_buffer = AtomicBuffer::wrap(&term);
    let metadata_buffer = AtomicBuffer::wrap(&metadata);

    let barrier = Arc::new(Barrier::new(PRODUCERS));
    let mut handles = Vec::new();
    for producer in 0..PRODUCERS {
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let appender = TermAppender::new(term_buffer, metadata_buffer, 0);
            let header = DefaultHeaderWriter::new(SESSION_ID, STREAM_ID);
            let payload = [producer as u8 + 1; PAYLOAD_LENGTH];
            barrier.wait();

            let mut appended = 0usize;
            loop {
                let result = appender.append_unfragmented(&header, &payload, None);
                if result_term_offset(result) < 0 {
                    return appended;
                }
                appended += 1;
            }
        }));
    }

    let appended_total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Every producer ran until end-of-term, so the term head holds the
    // appended frames and, unless the last frame fit exactly, a single
    // padding frame reaching the end.
    let mut offset = 0usize;
    let mut data_frames = 0usize;
    let mut padding_frames = 0usize;
    while offset < TERM_LENGTH {
        let frame_length = frame_length_volatile(&term_buffer, offset) as usize;
        assert!(frame_length >= HEADER_LENGTH);

        if is_padding_frame(&term_buffer, offset) {
            padding_frames += 1;
            assert_eq!(
                offset + frame_length,
                TERM_LENGTH,
                "padding must reach the end of the term"
            );
        } else {
            data_frames += 1;
        }
        offset += align_up(frame_length, FRAME_ALIGNMENT);
    }

    assert_eq!(offset, TERM_LENGTH, "the term must be walkable end to end");
    assert_eq!(data_frames, appended_total);
    assert!(padding_frames <= 1, "at most one producer pads the term");
}
