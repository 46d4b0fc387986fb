//! Raw memory backing the heap spaces.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::{GcError, GcResult};
use crate::object::OBJECT_ALIGN;

/// A contiguous, aligned chunk of memory with a bump pointer.
///
/// The young generation bump-allocates inside its semi-space arenas; the old
/// generation uses arenas only as region memory and manages blocks itself.
///
/// Each arena also keeps a bitmap with one bit per aligned word, set for
/// every address where a live object starts. Field access checks it before
/// trusting a header.
#[derive(Debug)]
pub(crate) struct Arena {
    /// Base pointer of the arena
    base: NonNull<u8>,
    /// Bytes handed out so far
    used: usize,
    /// Total capacity in bytes
    capacity: usize,
    /// Object start bits
    starts: Vec<u64>,
}

// SAFETY: the arena exclusively owns its allocation; every access to the
// memory goes through the heap, which coordinates with the marker thread.
unsafe impl Send for Arena {}

impl Arena {
    /// Creates a new zero-filled arena with the specified capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Size of the arena in bytes, a multiple of the object alignment
    pub(crate) fn new(capacity: usize) -> GcResult<Self> {
        let layout = Self::layout(capacity)?;
        // SAFETY: layout has a non-zero size (checked in `layout`)
        let base = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(base).ok_or(GcError::OutOfMemory {
            requested: capacity,
        })?;
        let granules = capacity / OBJECT_ALIGN;
        Ok(Arena {
            base,
            used: 0,
            capacity,
            starts: vec![0; (granules + 63) / 64],
        })
    }

    fn layout(capacity: usize) -> GcResult<Layout> {
        if capacity == 0 {
            return Err(GcError::InvalidConfig("arena capacity is zero".into()));
        }
        Layout::from_size_align(capacity, OBJECT_ALIGN)
            .map_err(|e| GcError::InvalidConfig(format!("arena of {} bytes: {}", capacity, e)))
    }

    /// Bump-allocates `size` bytes, returning the block address.
    ///
    /// `size` must already be aligned. The block is recorded as an object
    /// start.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<usize> {
        if size > self.capacity - self.used {
            return None;
        }
        let addr = self.start() + self.used;
        self.used += size;
        self.record_start(addr);
        Some(addr)
    }

    fn granule(&self, addr: usize) -> Option<usize> {
        if !self.contains(addr) || addr % OBJECT_ALIGN != 0 {
            return None;
        }
        Some((addr - self.start()) / OBJECT_ALIGN)
    }

    /// Marks `addr` as the start of an object.
    pub(crate) fn record_start(&mut self, addr: usize) {
        if let Some(index) = self.granule(addr) {
            self.starts[index / 64] |= 1u64 << (index % 64);
        }
    }

    /// Forgets the object starting at `addr`.
    pub(crate) fn clear_start(&mut self, addr: usize) {
        if let Some(index) = self.granule(addr) {
            self.starts[index / 64] &= !(1u64 << (index % 64));
        }
    }

    /// Returns true if an object starts at `addr`.
    pub(crate) fn is_start(&self, addr: usize) -> bool {
        match self.granule(addr) {
            Some(index) => self.starts[index / 64] & (1u64 << (index % 64)) != 0,
            None => false,
        }
    }

    /// Returns the number of bytes currently allocated.
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// Returns the total capacity of the arena.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resets the bump pointer, abandoning every allocation.
    pub(crate) fn reset(&mut self) {
        let words = (self.used / OBJECT_ALIGN + 63) / 64;
        self.starts[..words].fill(0);
        self.used = 0;
    }

    /// Address of the first byte.
    pub(crate) fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Address one past the last byte.
    pub(crate) fn end(&self) -> usize {
        self.start() + self.capacity
    }

    /// Address one past the last allocated byte.
    pub(crate) fn top(&self) -> usize {
        self.start() + self.used
    }

    /// Returns true if `addr` lies inside the arena.
    pub(crate) fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.end()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Ok(layout) = Self::layout(self.capacity) {
            // SAFETY: we're deallocating memory we allocated in new() with
            // the same layout
            unsafe { dealloc(self.base.as_ptr(), layout) };
        }
    }
}
