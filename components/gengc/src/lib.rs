//! Generational garbage collector.
//!
//! This component provides:
//! - A semi-space young generation collected by a Cheney copying scavenger
//! - A region-based old generation collected by mark-sweep
//! - Incremental marking in bounded steps, or concurrent marking on a
//!   background thread with a stop-the-world fallback
//! - A write barrier maintaining the old-to-young remembered set and the
//!   tri-color invariant
//! - An allocator with age-based promotion and large-object pretenuring
//!
//! The host describes its objects through [`gc_types`]: a visitor reports
//! the reference slots of each object, and roots are held in handles or
//! supplied by a [`RootSetProvider`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use gengc::{GcConfig, Heap, LayoutRegistry, TypeDescriptor};
//!
//! let mut registry = LayoutRegistry::new();
//! let cons = registry.register(TypeDescriptor::with_offsets("cons", &[0, 8]));
//! let mut heap = Heap::new(GcConfig::with_young_space_size(64 * 1024), Arc::new(registry)).unwrap();
//!
//! let head = heap.allocate_typed(cons, 16).unwrap();
//! let tail = heap.allocate_typed(cons, 16).unwrap();
//! heap.write_field(head, 8, Some(tail)).unwrap();
//! let root = heap.new_handle(Some(head));
//!
//! heap.scavenge();
//! let head = heap.get_handle(root).unwrap().unwrap();
//! assert!(heap.read_field(head, 8).unwrap().is_some());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod allocator;
mod concurrent_gc;
mod config;
mod env;
mod error;
mod heap;
mod incremental;
mod mark_sweep;
mod marking;
mod object;
mod old_gen;
mod scavenger;
mod space;
mod telemetry;
mod write_barrier;
mod young_gen;

pub use config::{GcConfig, MIN_REGION_SIZE, MIN_YOUNG_SPACE_SIZE};
pub use error::{GcError, GcResult};
pub use heap::Heap;
pub use incremental::GcPhase;
pub use object::{Generation, MarkColor, HEADER_SIZE, MIN_BLOCK_SIZE, OBJECT_ALIGN};
pub use telemetry::{CollectionKind, GcEvent, GcStats, LogSink, RecordingSink, TelemetrySink};
pub use write_barrier::RememberedSet;

// Re-export the host-facing types
pub use gc_types::{
    GcRef, Handle, HandleTable, LayoutRegistry, ObjectView, ObjectVisitor, ReferenceLayout,
    RootSetProvider, Slot, TypeDescriptor, TypeTag, WORD_SIZE,
};
