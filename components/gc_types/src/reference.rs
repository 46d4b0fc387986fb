//! Word-sized references into a collected heap.
//!
//! References are plain addresses of an object header. A reference field
//! inside an object payload holds one machine word: `0` for null, otherwise
//! the header address of the referenced object.

use std::fmt;
use std::num::NonZeroUsize;

/// A non-null reference to a heap object, identified by its header address.
///
/// A `GcRef` is only meaningful until the next collection point: a scavenge
/// may move the object it names. Code that must hold on to an object across
/// allocations stores it in a root (see [`crate::HandleTable`]) and reads it
/// back afterwards.
///
/// # Examples
///
/// ```
/// use gc_types::GcRef;
///
/// let r = GcRef::from_addr(0x1000).unwrap();
/// assert_eq!(r.addr(), 0x1000);
/// assert_eq!(GcRef::encode(Some(r)), 0x1000);
/// assert_eq!(GcRef::decode(0), None);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct GcRef(NonZeroUsize);

impl GcRef {
    /// Creates a reference from a raw header address, or `None` for null.
    pub fn from_addr(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(GcRef)
    }

    /// Returns the header address.
    pub fn addr(self) -> usize {
        self.0.get()
    }

    /// Encodes an optional reference as a slot word.
    pub fn encode(value: Option<GcRef>) -> usize {
        value.map_or(0, GcRef::addr)
    }

    /// Decodes a slot word into an optional reference.
    pub fn decode(word: usize) -> Option<GcRef> {
        GcRef::from_addr(word)
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({:#x})", self.addr())
    }
}

impl fmt::Display for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}

/// Address of a word-sized reference field inside an object payload.
///
/// Slots are produced by an [`crate::ObjectVisitor`] and consumed by the
/// collector, which reads and rewrites the word they point at.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Slot(NonZeroUsize);

impl Slot {
    /// Creates a slot from a field address, or `None` for address zero.
    pub fn from_addr(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Slot)
    }

    /// Returns the field address.
    pub fn addr(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({:#x})", self.addr())
    }
}
