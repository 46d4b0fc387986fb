//! Semi-space young generation.
//!
//! Two equal-sized spaces:
//! - Allocation bump-allocates in from_space
//! - A scavenge copies survivors into to_space (see [`crate::scavenger`])
//! - Spaces are swapped after collection
//!
//! Both arenas keep their addresses for the lifetime of the heap, so the
//! union of their ranges identifies young objects without reading headers.

use gc_types::GcRef;

use crate::error::GcResult;
use crate::object::ObjectWalker;
use crate::space::Arena;

/// Address ranges of both semi-spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YoungBounds {
    a: (usize, usize),
    b: (usize, usize),
}

impl YoungBounds {
    /// Returns true if `addr` lies in either semi-space.
    pub(crate) fn contains(&self, addr: usize) -> bool {
        (addr >= self.a.0 && addr < self.a.1) || (addr >= self.b.0 && addr < self.b.1)
    }

    pub(crate) fn contains_ref(&self, obj: GcRef) -> bool {
        self.contains(obj.addr())
    }
}

/// Young generation with semi-space copying.
pub(crate) struct YoungGeneration {
    /// The space where objects are allocated
    from_space: Arena,
    /// The space where objects are copied during a scavenge
    to_space: Arena,
    /// Size of each space in bytes
    space_size: usize,
}

impl YoungGeneration {
    /// Creates a new young generation; each semi-space has `size` bytes.
    pub(crate) fn new(size: usize) -> GcResult<Self> {
        Ok(YoungGeneration {
            from_space: Arena::new(size)?,
            to_space: Arena::new(size)?,
            space_size: size,
        })
    }

    /// Bump-allocates `size` aligned bytes in from_space.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<usize> {
        self.from_space.allocate(size)
    }

    /// Bump-allocates `size` aligned bytes in to_space during a scavenge.
    pub(crate) fn allocate_in_to_space(&mut self, size: usize) -> Option<usize> {
        self.to_space.allocate(size)
    }

    /// Swaps the spaces after a scavenge and empties the new to_space.
    pub(crate) fn flip(&mut self) {
        std::mem::swap(&mut self.from_space, &mut self.to_space);
        self.to_space.reset();
    }

    pub(crate) fn bounds(&self) -> YoungBounds {
        YoungBounds {
            a: (self.from_space.start(), self.from_space.end()),
            b: (self.to_space.start(), self.to_space.end()),
        }
    }

    /// Returns true if `addr` is inside the allocated part of from_space.
    pub(crate) fn in_from_space(&self, addr: usize) -> bool {
        addr >= self.from_space.start() && addr < self.from_space.top()
    }

    /// Returns true if an object allocated since the last flip starts at
    /// `addr` in from_space.
    pub(crate) fn is_object_start(&self, addr: usize) -> bool {
        self.in_from_space(addr) && self.from_space.is_start(addr)
    }

    /// Returns true if `addr` is inside the allocated part of to_space.
    pub(crate) fn in_to_space(&self, addr: usize) -> bool {
        addr >= self.to_space.start() && addr < self.to_space.top()
    }

    /// Start of to_space, where a scavenge's scan cursor begins.
    pub(crate) fn to_space_start(&self) -> usize {
        self.to_space.start()
    }

    /// Current allocation cursor of to_space.
    pub(crate) fn to_space_top(&self) -> usize {
        self.to_space.top()
    }

    /// Bytes used in to_space.
    pub(crate) fn to_space_used(&self) -> usize {
        self.to_space.used()
    }

    /// Returns the number of bytes currently used in from_space.
    pub(crate) fn used(&self) -> usize {
        self.from_space.used()
    }

    /// Returns the number of bytes available for allocation.
    pub(crate) fn free(&self) -> usize {
        self.space_size - self.from_space.used()
    }

    /// Returns the size of each semi-space.
    pub(crate) fn space_size(&self) -> usize {
        self.space_size
    }

    /// Iterates over the objects in from_space.
    pub(crate) fn objects(&self) -> ObjectWalker {
        // SAFETY: from_space is tiled by objects up to its bump pointer, and
        // the shared borrow of `self` prevents allocation while walking
        unsafe { ObjectWalker::new(self.from_space.start(), self.from_space.top()) }
    }
}
