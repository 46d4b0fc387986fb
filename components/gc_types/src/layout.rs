//! A table-driven object visitor.
//!
//! Hosts that describe their objects as "reference fields at these offsets"
//! register one [`TypeDescriptor`] per type and store the returned
//! [`TypeTag`] in each allocation. The registry then serves as the
//! collector's [`ObjectVisitor`].

use crate::visitor::WORD_SIZE;
use crate::{ObjectView, ObjectVisitor, Slot, TypeTag};

/// Where the reference fields of a type live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLayout {
    /// No reference fields
    Opaque,
    /// References at fixed byte offsets into the payload
    Fixed(Vec<usize>),
    /// Every whole payload word is a reference
    AllWords,
}

/// Layout description of one host type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Human-readable type name, used in diagnostics
    pub name: String,
    /// Reference field placement
    pub layout: ReferenceLayout,
}

impl TypeDescriptor {
    /// A type without reference fields.
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: ReferenceLayout::Opaque,
        }
    }

    /// A type with references at the given payload offsets.
    ///
    /// Offsets must be multiples of the word size; misaligned offsets are
    /// ignored when visiting.
    pub fn with_offsets(name: impl Into<String>, offsets: &[usize]) -> Self {
        let mut offsets = offsets.to_vec();
        offsets.sort_unstable();
        offsets.dedup();
        Self {
            name: name.into(),
            layout: ReferenceLayout::Fixed(offsets),
        }
    }

    /// A type whose payload is an array of references.
    pub fn reference_array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: ReferenceLayout::AllWords,
        }
    }
}

/// Registry of host type layouts.
///
/// Tag 0 is pre-registered as the opaque type. Objects carrying a tag that was
/// never registered are treated as opaque.
///
/// # Examples
///
/// ```
/// use gc_types::{LayoutRegistry, TypeDescriptor, TypeTag};
///
/// let mut registry = LayoutRegistry::new();
/// let pair = registry.register(TypeDescriptor::with_offsets("pair", &[0, 8]));
/// assert_eq!(pair, TypeTag(1));
/// assert_eq!(registry.descriptor(pair).unwrap().name, "pair");
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    descriptors: Vec<TypeDescriptor>,
}

impl LayoutRegistry {
    /// Creates a registry containing only the opaque type.
    pub fn new() -> Self {
        Self {
            descriptors: vec![TypeDescriptor::opaque("opaque")],
        }
    }

    /// Registers a type and returns its tag, or `None` once every tag up to
    /// [`TypeTag::MAX`] is taken.
    pub fn try_register(&mut self, descriptor: TypeDescriptor) -> Option<TypeTag> {
        let index = u32::try_from(self.descriptors.len()).ok()?;
        if index > TypeTag::MAX.0 {
            return None;
        }
        self.descriptors.push(descriptor);
        Some(TypeTag(index))
    }

    /// Registers a type and returns its tag.
    ///
    /// # Panics
    ///
    /// Panics if more than [`TypeTag::MAX`] types are registered; use
    /// [`LayoutRegistry::try_register`] to handle exhaustion.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> TypeTag {
        match self.try_register(descriptor) {
            Some(tag) => tag,
            None => panic!("layout registry exhausted"),
        }
    }

    /// Looks up the descriptor for a tag.
    pub fn descriptor(&self, tag: TypeTag) -> Option<&TypeDescriptor> {
        self.descriptors.get(tag.0 as usize)
    }

    /// Number of registered types, including the opaque type.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Always false: the opaque type is always present.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectVisitor for LayoutRegistry {
    fn for_each_reference(&self, object: &ObjectView, visit: &mut dyn FnMut(Slot)) {
        let Some(descriptor) = self.descriptor(object.type_tag) else {
            return;
        };
        match &descriptor.layout {
            ReferenceLayout::Opaque => {}
            ReferenceLayout::Fixed(offsets) => {
                for &offset in offsets {
                    if let Some(slot) = object.slot_at(offset) {
                        visit(slot);
                    }
                }
            }
            ReferenceLayout::AllWords => {
                for index in 0..object.word_count() {
                    if let Some(slot) = object.slot_at(index * WORD_SIZE) {
                        visit(slot);
                    }
                }
            }
        }
    }

    fn knows_type(&self, tag: TypeTag) -> bool {
        self.descriptor(tag).is_some()
    }

    fn is_reference(&self, object: &ObjectView, offset: usize) -> bool {
        if object.slot_at(offset).is_none() {
            return false;
        }
        match self.descriptor(object.type_tag).map(|d| &d.layout) {
            Some(ReferenceLayout::Fixed(offsets)) => offsets.binary_search(&offset).is_ok(),
            Some(ReferenceLayout::AllWords) => true,
            Some(ReferenceLayout::Opaque) | None => false,
        }
    }
}
