//! Host-facing types shared between a managed runtime and its collector.
//!
//! The collector knows nothing about the object model of the language it
//! serves. This crate defines the seams through which the host describes it:
//!
//! - [`GcRef`] / [`Slot`] - word-sized references and reference fields
//! - [`ObjectView`] / [`ObjectVisitor`] - enumerating an object's outgoing references
//! - [`LayoutRegistry`] / [`TypeDescriptor`] - a table-driven visitor
//! - [`RootSetProvider`] / [`HandleTable`] - the mutator's root slots
//!
//! # Examples
//!
//! ```
//! use gc_types::{LayoutRegistry, ObjectView, ObjectVisitor, GcRef, TypeDescriptor};
//!
//! let mut registry = LayoutRegistry::new();
//! let node = registry.register(TypeDescriptor::with_offsets("node", &[8]));
//!
//! let view = ObjectView {
//!     object: GcRef::from_addr(0x1000).unwrap(),
//!     type_tag: node,
//!     payload: 0x1018,
//!     payload_size: 16,
//! };
//! let mut slots = Vec::new();
//! registry.for_each_reference(&view, &mut |slot| slots.push(slot.addr()));
//! assert_eq!(slots, vec![0x1020]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod layout;
mod reference;
mod roots;
mod visitor;

pub use layout::{LayoutRegistry, ReferenceLayout, TypeDescriptor};
pub use reference::{GcRef, Slot};
pub use roots::{Handle, HandleTable, RootSetProvider};
pub use visitor::{ObjectView, ObjectVisitor, TypeTag, WORD_SIZE};
