//! The generational heap.
//!
//! [`Heap`] owns both generations, the remembered set and the marking state,
//! and is the single entry point for the mutator: allocation, field access
//! through the write barrier, root handles and collection requests.
//!
//! The collectors themselves are implemented as further `impl Heap` blocks:
//! - [`crate::allocator`]: allocation paths and the cycle trigger
//! - [`crate::scavenger`]: young-generation copying
//! - [`crate::incremental`]: old-generation cycle state machine
//! - [`crate::concurrent_gc`]: background marker and completion pauses
//! - [`crate::mark_sweep`]: full collections and heap verification

use std::sync::Arc;

use gc_types::{GcRef, Handle, HandleTable, ObjectView, ObjectVisitor, RootSetProvider, Slot, TypeTag};

use crate::concurrent_gc::ConcurrentMarker;
use crate::config::GcConfig;
use crate::error::{GcError, GcResult};
use crate::incremental::{CycleState, GcPhase};
use crate::marking::MarkingContext;
use crate::object::{load_slot, load_word, store_slot, store_word, view_of, Generation, MarkColor, ObjectHeader};
use crate::old_gen::OldGeneration;
use crate::telemetry::{GcEvent, GcStats, LogSink, TelemetrySink};
use crate::write_barrier::{write_barrier, RememberedSet};
use crate::young_gen::YoungGeneration;

/// Every root the collectors start from.
pub(crate) struct RootSet {
    pub(crate) handles: HandleTable,
    providers: Vec<Box<dyn RootSetProvider>>,
}

impl RootSet {
    fn new() -> Self {
        RootSet {
            handles: HandleTable::new(),
            providers: Vec::new(),
        }
    }

    /// Visits every root slot, handles first.
    pub(crate) fn enumerate(&mut self, visit: &mut dyn FnMut(&mut Option<GcRef>)) {
        self.handles.enumerate_roots(visit);
        for provider in &mut self.providers {
            provider.enumerate_roots(visit);
        }
    }
}

/// Generational garbage-collected heap.
///
/// All methods take the heap by reference from a single mutator thread. The
/// only other thread that ever touches heap memory is the concurrent marker,
/// which reads old-generation objects and is paused whenever objects move or
/// old blocks are rewritten.
pub struct Heap {
    pub(crate) config: GcConfig,
    pub(crate) young: YoungGeneration,
    pub(crate) old: OldGeneration,
    pub(crate) remembered_set: RememberedSet,
    pub(crate) marking: Arc<MarkingContext>,
    pub(crate) roots: RootSet,
    pub(crate) cycle: CycleState,
    pub(crate) marker: Option<ConcurrentMarker>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) stats: GcStats,
    last_gc_id: u64,
}

impl Heap {
    /// Creates a heap.
    ///
    /// `visitor` reports the reference slots of every object; it is shared
    /// with the marker thread.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::InvalidConfig`] if `config` does not validate and
    /// [`GcError::OutOfMemory`] if the initial spaces cannot be reserved.
    pub fn new(config: GcConfig, visitor: Arc<dyn ObjectVisitor>) -> GcResult<Heap> {
        config.validate()?;
        let young = YoungGeneration::new(config.young_space_size)?;
        let old = OldGeneration::new(config.old_region_size, config.old_gen_max_size)?;
        let marking = Arc::new(MarkingContext::new(visitor, young.bounds()));

        log::info!(
            target: "gc",
            "heap initialized: young 2x{}K, old region {}K, old max {}K, {} marking",
            config.young_space_size / 1024,
            config.old_region_size / 1024,
            config.old_gen_max_size / 1024,
            if config.concurrent_marking_enabled { "concurrent" } else { "incremental" }
        );

        Ok(Heap {
            config,
            young,
            old,
            remembered_set: RememberedSet::new(),
            marking,
            roots: RootSet::new(),
            cycle: CycleState::new(),
            marker: None,
            telemetry: Arc::new(LogSink),
            stats: GcStats::default(),
            last_gc_id: 0,
        })
    }

    /// Replaces the telemetry sink. The default sink logs every event.
    pub fn set_telemetry(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.telemetry = sink;
    }

    /// Registers an additional source of roots, enumerated after handles.
    pub fn add_root_provider(&mut self, provider: Box<dyn RootSetProvider>) {
        self.roots.providers.push(provider);
    }

    // Handles

    /// Creates a root handle holding `value`.
    pub fn new_handle(&mut self, value: Option<GcRef>) -> Handle {
        self.roots.handles.new_handle(value)
    }

    /// Current referent of `handle`. Collections rewrite it when the object moves.
    pub fn get_handle(&self, handle: Handle) -> GcResult<Option<GcRef>> {
        self.roots
            .handles
            .get(handle)
            .ok_or(GcError::UnknownHandle(handle))
    }

    /// Points `handle` at `value`.
    pub fn set_handle(&mut self, handle: Handle, value: Option<GcRef>) -> GcResult<()> {
        if self.roots.handles.set(handle, value) {
            Ok(())
        } else {
            Err(GcError::UnknownHandle(handle))
        }
    }

    /// Releases `handle`; its referent is no longer rooted by it.
    pub fn release_handle(&mut self, handle: Handle) -> GcResult<()> {
        if self.roots.handles.release(handle) {
            Ok(())
        } else {
            Err(GcError::UnknownHandle(handle))
        }
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.roots.handles.len()
    }

    // Field access

    /// Returns true if `obj` is the start of a live object of this heap.
    ///
    /// Interior addresses, free blocks and references left stale by a
    /// collection are rejected.
    pub fn contains(&self, obj: GcRef) -> bool {
        self.young.is_object_start(obj.addr()) || self.old.is_object_start(obj.addr())
    }

    fn checked_view(&self, obj: GcRef, offset: usize) -> GcResult<ObjectView> {
        if !self.contains(obj) {
            return Err(GcError::InvalidSlot {
                object: obj,
                offset,
            });
        }
        // SAFETY: an object of this heap starts at obj
        Ok(unsafe { view_of(obj) })
    }

    /// Address of the payload word at `offset` of `obj`.
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidSlot`] if no object of this heap starts at `obj`,
    /// or `offset` is unaligned or outside the payload.
    pub fn field_slot(&self, obj: GcRef, offset: usize) -> GcResult<Slot> {
        self.checked_view(obj, offset)?
            .slot_at(offset)
            .ok_or(GcError::InvalidSlot {
                object: obj,
                offset,
            })
    }

    /// Slot of a reference field, as reported by the object visitor.
    fn reference_slot(&self, obj: GcRef, offset: usize) -> GcResult<Slot> {
        let view = self.checked_view(obj, offset)?;
        let slot = view.slot_at(offset).ok_or(GcError::InvalidSlot {
            object: obj,
            offset,
        })?;
        if !self.marking.visitor.is_reference(&view, offset) {
            return Err(GcError::NotAReference {
                object: obj,
                offset,
            });
        }
        Ok(slot)
    }

    /// Reads the reference field at `offset` of `obj`.
    ///
    /// # Errors
    ///
    /// As [`Heap::field_slot`], and [`GcError::NotAReference`] if the
    /// visitor does not report the field.
    pub fn read_field(&self, obj: GcRef, offset: usize) -> GcResult<Option<GcRef>> {
        let slot = self.reference_slot(obj, offset)?;
        // SAFETY: slot was validated against the object's payload
        Ok(unsafe { load_slot(slot) })
    }

    /// Stores `value` into the reference field at `offset` of `obj`.
    ///
    /// The write barrier runs after the store.
    ///
    /// # Errors
    ///
    /// As [`Heap::read_field`], and [`GcError::ForeignReference`] if `value`
    /// is not an object of this heap.
    pub fn write_field(&mut self, obj: GcRef, offset: usize, value: Option<GcRef>) -> GcResult<()> {
        let slot = self.reference_slot(obj, offset)?;
        if let Some(v) = value {
            if !self.contains(v) {
                return Err(GcError::ForeignReference(v));
            }
        }
        // SAFETY: slot is a reference field of obj and value belongs to this heap
        unsafe {
            store_slot(slot, value);
            write_barrier(&self.marking, &self.remembered_set, obj, slot, value);
        }
        Ok(())
    }

    /// Reads a raw data word at `offset` of `obj`.
    pub fn read_word(&self, obj: GcRef, offset: usize) -> GcResult<usize> {
        let slot = self.field_slot(obj, offset)?;
        // SAFETY: slot was validated against the object's payload
        Ok(unsafe { load_word(slot) })
    }

    /// Writes a raw data word at `offset` of `obj`. No barrier runs.
    pub fn write_word(&mut self, obj: GcRef, offset: usize, value: usize) -> GcResult<()> {
        let slot = self.field_slot(obj, offset)?;
        // SAFETY: slot was validated against the object's payload
        unsafe { store_word(slot, value) };
        Ok(())
    }

    // Inspection

    fn header(&self, obj: GcRef) -> Option<&ObjectHeader> {
        if !self.contains(obj) {
            return None;
        }
        // SAFETY: obj is an object of this heap
        let header = unsafe { ObjectHeader::of(obj) };
        (!header.is_free()).then_some(header)
    }

    /// Mark color of `obj`.
    pub fn color_of(&self, obj: GcRef) -> Option<MarkColor> {
        self.header(obj).map(ObjectHeader::color)
    }

    /// Generation `obj` lives in.
    pub fn generation_of(&self, obj: GcRef) -> Option<Generation> {
        self.header(obj).map(ObjectHeader::generation)
    }

    /// Total size of `obj` including its header.
    pub fn size_of(&self, obj: GcRef) -> Option<usize> {
        self.header(obj).map(ObjectHeader::size)
    }

    /// Type tag `obj` was allocated with.
    pub fn type_tag_of(&self, obj: GcRef) -> Option<TypeTag> {
        self.header(obj).map(ObjectHeader::type_tag)
    }

    /// Returns true if `obj` is in the young generation's allocation space.
    pub fn is_young(&self, obj: GcRef) -> bool {
        self.young.in_from_space(obj.addr())
    }

    /// Bytes allocated in the young generation since the last scavenge.
    pub fn young_used(&self) -> usize {
        self.young.used()
    }

    /// Capacity of one young semi-space.
    pub fn young_capacity(&self) -> usize {
        self.young.space_size()
    }

    /// Bytes held by old-generation objects.
    pub fn old_used(&self) -> usize {
        self.old.used()
    }

    /// Bytes of committed old-generation regions.
    pub fn old_committed(&self) -> usize {
        self.old.committed()
    }

    /// Number of committed old-generation regions.
    pub fn old_region_count(&self) -> usize {
        self.old.region_count()
    }

    /// Bytes on the old generation's free lists.
    pub fn old_free_bytes(&self) -> usize {
        self.old.free_bytes()
    }

    /// Number of free blocks in the old generation, a measure of fragmentation.
    pub fn old_free_block_count(&self) -> usize {
        self.old.free_block_count()
    }

    /// Bytes in use across both generations.
    pub fn heap_used(&self) -> usize {
        self.young.used() + self.old.used()
    }

    /// Current phase of the old-generation cycle.
    pub fn phase(&self) -> GcPhase {
        self.cycle.phase()
    }

    /// Returns true while an old-generation cycle is in progress.
    pub fn is_cycle_active(&self) -> bool {
        self.cycle.is_active()
    }

    /// Gray objects waiting to be scanned.
    pub fn worklist_len(&self) -> usize {
        self.marking.worklist.len()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> GcStats {
        self.stats.clone()
    }

    /// Configuration the heap was built with.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// The old-to-young remembered set.
    pub fn remembered_set(&self) -> &RememberedSet {
        &self.remembered_set
    }

    /// Number of old-generation objects.
    pub fn old_object_count(&self) -> usize {
        self.old.objects().count()
    }

    /// Number of young-generation objects, garbage included.
    pub fn young_object_count(&self) -> usize {
        self.young.objects().count()
    }

    // Internals shared by the collectors

    pub(crate) fn next_gc_id(&mut self) -> u64 {
        self.last_gc_id += 1;
        self.last_gc_id
    }

    pub(crate) fn emit(&self, event: &GcEvent) {
        self.telemetry.record(event);
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // The marker must be joined before the spaces are released
        if let Some(mut marker) = self.marker.take() {
            marker.shutdown();
        }
    }
}
