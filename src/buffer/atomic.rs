//! Bounds-checked atomic access to a raw byte region.
//!
//! [`AtomicBuffer`] is a copyable view over a caller-supplied span of
//! memory, typically a slice of a memory-mapped file shared with other
//! processes. It exposes four access modes for 32/64-bit integers:
//!
//! - *plain*: relaxed atomic load/store, no ordering guarantees
//! - *volatile*: acquire load, pairing with a release store elsewhere
//! - *ordered*: release store, making prior writes visible to acquirers
//! - *get-and-add*: sequentially consistent read-modify-write
//!
//! Byte spans are copied with plain memory operations; callers use them
//! only on ranges they own exclusively (for example a reserved frame
//! before its length is published).
//!
//! Every accessor bounds-checks in debug builds. Base alignment is
//! verified once at construction and is fatal on violation.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

use super::AlignedBuffer;

/// A view over a raw byte region with atomic access to its cells.
///
/// The view is `Copy`: readers, writers, and per-slot handles all hold
/// independent copies over the same underlying bytes. The region itself
/// must stay alive (and, for shared mappings, mapped) for as long as any
/// view is in use.
#[derive(Clone, Copy, Debug)]
pub struct AtomicBuffer {
    ptr: *mut u8,
    capacity: usize,
}

// SAFETY: all concurrent access to the region goes through atomic
// operations or producer-exclusive byte ranges; the pointer itself is
// freely shareable.
unsafe impl Send for AtomicBuffer {}
unsafe impl Sync for AtomicBuffer {}

impl Default for AtomicBuffer {
    /// An empty view. Any access is a bounds violation.
    fn default() -> Self {
        Self {
            ptr: NonNull::<u64>::dangling().as_ptr().cast(),
            capacity: 0,
        }
    }
}

impl AtomicBuffer {
    /// Wrap an owned region.
    ///
    /// The returned view borrows nothing: dropping the region while views
    /// are still in use leaves them dangling. Callers keep the region
    /// alive for the lifetime of all views, exactly as they would keep a
    /// file mapping alive.
    pub fn wrap(region: &AlignedBuffer) -> Self {
        // SAFETY: the region is a valid allocation of `capacity` bytes
        // with 64-byte base alignment.
        unsafe { Self::from_raw_parts(region.as_ptr(), region.capacity()) }
    }

    /// Wrap a raw byte region.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `capacity` readable and writable bytes that
    /// remain valid for the lifetime of the view and all copies of it.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null or not 8-byte aligned. Atomic cells
    /// require natural alignment, so a misaligned base is a fatal
    /// construction error rather than a per-access check.
    pub unsafe fn from_raw_parts(ptr: *mut u8, capacity: usize) -> Self {
        assert!(!ptr.is_null(), "region pointer must be non-null");
        assert_eq!(
            ptr as usize % 8,
            0,
            "region base address must be 8-byte aligned"
        );

        Self { ptr, capacity }
    }

    /// A view over the sub-range `[offset, offset + length)`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the capacity or if `offset` is not
    /// 8-byte aligned.
    pub fn view(&self, offset: usize, length: usize) -> AtomicBuffer {
        assert!(
            offset + length <= self.capacity,
            "view [{}, {}) out of bounds for capacity {}",
            offset,
            offset + length,
            self.capacity
        );

        // SAFETY: the sub-range lies within this view's valid region.
        unsafe { Self::from_raw_parts(self.ptr.add(offset), length) }
    }

    /// Capacity of the view in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn bounds_check(&self, offset: usize, length: usize) {
        debug_assert!(
            offset + length <= self.capacity,
            "access [{}, {}) out of bounds for capacity {}",
            offset,
            offset + length,
            self.capacity
        );
    }

    #[inline]
    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        self.bounds_check(offset, 8);
        debug_assert_eq!(offset % 8, 0, "i64 access at {} is misaligned", offset);
        // SAFETY: in bounds, naturally aligned, and AtomicI64 has the
        // same layout as i64.
        unsafe { &*(self.ptr.add(offset) as *const AtomicI64) }
    }

    #[inline]
    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.bounds_check(offset, 4);
        debug_assert_eq!(offset % 4, 0, "i32 access at {} is misaligned", offset);
        // SAFETY: as above.
        unsafe { &*(self.ptr.add(offset) as *const AtomicI32) }
    }

    /// Plain load of a 64-bit value.
    #[inline]
    pub fn get_i64(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Ordering::Relaxed)
    }

    /// Plain store of a 64-bit value.
    #[inline]
    pub fn put_i64(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value, Ordering::Relaxed);
    }

    /// Acquire load of a 64-bit value; sees all writes that
    /// happened-before the matching release store.
    #[inline]
    pub fn get_i64_volatile(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Ordering::Acquire)
    }

    /// Release store of a 64-bit value; prior writes cannot be reordered
    /// past it.
    #[inline]
    pub fn put_i64_ordered(&self, offset: usize, value: i64) {
        self.atomic_i64(offset).store(value, Ordering::Release);
    }

    /// Sequentially consistent fetch-and-add on a 64-bit cell; returns
    /// the value before the addition.
    #[inline]
    pub fn get_and_add_i64(&self, offset: usize, delta: i64) -> i64 {
        self.atomic_i64(offset).fetch_add(delta, Ordering::SeqCst)
    }

    /// Plain load of a 32-bit value.
    #[inline]
    pub fn get_i32(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Ordering::Relaxed)
    }

    /// Plain store of a 32-bit value.
    #[inline]
    pub fn put_i32(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value, Ordering::Relaxed);
    }

    /// Acquire load of a 32-bit value.
    #[inline]
    pub fn get_i32_volatile(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Ordering::Acquire)
    }

    /// Release store of a 32-bit value.
    #[inline]
    pub fn put_i32_ordered(&self, offset: usize, value: i32) {
        self.atomic_i32(offset).store(value, Ordering::Release);
    }

    /// Sequentially consistent fetch-and-add on a 32-bit cell; returns
    /// the value before the addition.
    #[inline]
    pub fn get_and_add_i32(&self, offset: usize, delta: i32) -> i32 {
        self.atomic_i32(offset).fetch_add(delta, Ordering::SeqCst)
    }

    /// Plain load of a single byte.
    #[inline]
    pub fn get_u8(&self, offset: usize) -> u8 {
        self.bounds_check(offset, 1);
        // SAFETY: in bounds.
        unsafe { self.ptr.add(offset).read() }
    }

    /// Plain store of a single byte.
    #[inline]
    pub fn put_u8(&self, offset: usize, value: u8) {
        self.bounds_check(offset, 1);
        // SAFETY: in bounds.
        unsafe { self.ptr.add(offset).write(value) }
    }

    /// Plain load of a 16-bit value.
    #[inline]
    pub fn get_u16(&self, offset: usize) -> u16 {
        self.bounds_check(offset, 2);
        debug_assert_eq!(offset % 2, 0, "u16 access at {} is misaligned", offset);
        // SAFETY: in bounds and aligned.
        unsafe { (self.ptr.add(offset) as *const u16).read() }
    }

    /// Plain store of a 16-bit value.
    #[inline]
    pub fn put_u16(&self, offset: usize, value: u16) {
        self.bounds_check(offset, 2);
        debug_assert_eq!(offset % 2, 0, "u16 access at {} is misaligned", offset);
        // SAFETY: in bounds and aligned.
        unsafe { (self.ptr.add(offset) as *mut u16).write(value) }
    }

    /// Copy bytes out of the region into `dest`.
    #[inline]
    pub fn get_bytes(&self, offset: usize, dest: &mut [u8]) {
        self.bounds_check(offset, dest.len());
        // SAFETY: source range is in bounds; dest is a distinct slice.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(offset), dest.as_mut_ptr(), dest.len());
        }
    }

    /// Copy `src` into the region at `offset`.
    #[inline]
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.bounds_check(offset, src.len());
        // SAFETY: destination range is in bounds; src is a distinct slice.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
        }
    }

    /// Fill `[offset, offset + length)` with `value`.
    #[inline]
    pub fn set_memory(&self, offset: usize, length: usize, value: u8) {
        self.bounds_check(offset, length);
        // SAFETY: range is in bounds.
        unsafe { std::ptr::write_bytes(self.ptr.add(offset), value, length) }
    }

    /// Write a length-prefixed ASCII string: a 4-byte length followed by
    /// the bytes.
    pub fn put_string_ascii(&self, offset: usize, value: &str) {
        let bytes = value.as_bytes();
        self.put_i32(offset, bytes.len() as i32);
        self.put_bytes(offset + 4, bytes);
    }

    /// Read a length-prefixed ASCII string written by
    /// [`put_string_ascii`](Self::put_string_ascii). Non-ASCII bytes are
    /// replaced rather than rejected.
    pub fn get_string_ascii(&self, offset: usize) -> String {
        let length = self.get_i32(offset) as usize;
        let mut bytes = vec![0u8; length];
        self.get_bytes(offset + 4, &mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Mutable slice over `[offset, offset + length)`.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the range for the
    /// lifetime of the slice: no other thread or process may read or
    /// write it. The registry uses this for the key region of a slot
    /// that has not been published; the appender uses it for a reserved
    /// frame before its length is committed.
    #[inline]
    pub unsafe fn as_mut_slice(&self, offset: usize, length: usize) -> &mut [u8] {
        self.bounds_check(offset, length);
        std::slice::from_raw_parts_mut(self.ptr.add(offset), length)
    }
}
