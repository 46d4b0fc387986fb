//! The object visitor contract between the collector and its host.
//!
//! The collector never hardcodes object layout. For every object it needs to
//! trace, it builds an [`ObjectView`] from the object header and asks the
//! host's [`ObjectVisitor`] to report the reference fields.

use crate::{GcRef, Slot};

/// Size of a reference field in bytes.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Index of a host-defined type layout.
///
/// The collector stores the tag in each object header and hands it back
/// through [`ObjectView::type_tag`]. Tag 0 is reserved for opaque objects
/// that carry no references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeTag(pub u32);

impl TypeTag {
    /// Objects with no reference fields.
    pub const OPAQUE: TypeTag = TypeTag(0);

    /// Largest tag a host may use; values above are reserved by the collector.
    pub const MAX: TypeTag = TypeTag(u32::MAX - 1);
}

/// Everything a visitor needs to know about one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectView {
    /// The object being visited
    pub object: GcRef,
    /// Layout tag recorded at allocation
    pub type_tag: TypeTag,
    /// Address of the first payload byte
    pub payload: usize,
    /// Payload length in bytes
    pub payload_size: usize,
}

impl ObjectView {
    /// Returns the slot at `offset` bytes into the payload.
    ///
    /// Returns `None` if the offset is not word aligned or the word does not
    /// fit inside the payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use gc_types::{GcRef, ObjectView, TypeTag};
    ///
    /// let view = ObjectView {
    ///     object: GcRef::from_addr(0x1000).unwrap(),
    ///     type_tag: TypeTag::OPAQUE,
    ///     payload: 0x1018,
    ///     payload_size: 16,
    /// };
    /// assert_eq!(view.slot_at(8).unwrap().addr(), 0x1020);
    /// assert!(view.slot_at(16).is_none());
    /// assert!(view.slot_at(3).is_none());
    /// ```
    pub fn slot_at(&self, offset: usize) -> Option<Slot> {
        if offset % WORD_SIZE != 0 {
            return None;
        }
        let end = offset.checked_add(WORD_SIZE)?;
        if end > self.payload_size {
            return None;
        }
        Slot::from_addr(self.payload + offset)
    }

    /// Number of whole words in the payload.
    pub fn word_count(&self) -> usize {
        self.payload_size / WORD_SIZE
    }
}

/// Enumerates the outgoing reference fields of an object.
///
/// Implementations must report every field that can hold a reference, and
/// only such fields: the collector rewrites each reported slot when the
/// referent moves. Visitors run on the collector's marking thread as well as
/// the mutator thread, so they must be `Send + Sync`.
pub trait ObjectVisitor: Send + Sync {
    /// Invokes `visit` once per reference field of `object`.
    fn for_each_reference(&self, object: &ObjectView, visit: &mut dyn FnMut(Slot));

    /// Returns true if objects may be allocated with `tag`.
    ///
    /// The default accepts every tag.
    fn knows_type(&self, tag: TypeTag) -> bool {
        let _ = tag;
        true
    }

    /// Returns true if the payload word at `offset` of `object` is one of
    /// the slots reported by [`ObjectVisitor::for_each_reference`].
    ///
    /// The default enumerates the object's references; table-driven
    /// visitors should answer directly.
    fn is_reference(&self, object: &ObjectView, offset: usize) -> bool {
        let Some(target) = object.slot_at(offset) else {
            return false;
        };
        let mut found = false;
        self.for_each_reference(object, &mut |slot| found |= slot == target);
        found
    }
}

impl<F> ObjectVisitor for F
where
    F: Fn(&ObjectView, &mut dyn FnMut(Slot)) + Send + Sync,
{
    fn for_each_reference(&self, object: &ObjectView, visit: &mut dyn FnMut(Slot)) {
        self(object, visit)
    }
}
