//! Allocation paths.
//!
//! Objects are bump-allocated in the young generation. Objects larger than
//! `large_object_threshold` are pretenured into the old generation. When the
//! young generation is full the slow path advances any running cycle,
//! scavenges, and as a last resort runs a full collection before reporting
//! [`GcError::OutOfMemory`].
//!
//! Objects allocated while a cycle is marking are born black, so marking
//! never has to trace them and they survive the cycle. Outside marking they
//! are born white.

use gc_types::{GcRef, ObjectVisitor, TypeTag};

use crate::error::{GcError, GcResult};
use crate::heap::Heap;
use crate::object::{fatal, object_size, Generation, MarkColor, ObjectHeader, FREE_TAG};

impl Heap {
    /// Allocates an opaque object with `size_bytes` of zeroed payload.
    ///
    /// # Errors
    ///
    /// [`GcError::OutOfMemory`] if the object does not fit even after a full
    /// collection.
    pub fn allocate(&mut self, size_bytes: usize) -> GcResult<GcRef> {
        self.allocate_typed(TypeTag::OPAQUE, size_bytes)
    }

    /// Allocates an object of type `type_tag` with `payload_bytes` of zeroed
    /// payload. The visitor decides which payload words are references.
    ///
    /// May run a scavenge or a full collection; every [`GcRef`] not held in
    /// a root or a heap field may be invalidated by this call.
    ///
    /// # Errors
    ///
    /// [`GcError::UnknownType`] if the visitor does not know `type_tag`, and
    /// [`GcError::OutOfMemory`] as for [`Heap::allocate`].
    pub fn allocate_typed(&mut self, type_tag: TypeTag, payload_bytes: usize) -> GcResult<GcRef> {
        if type_tag.0 == FREE_TAG || !self.marking.visitor.knows_type(type_tag) {
            return Err(GcError::UnknownType(type_tag));
        }
        let size = object_size(payload_bytes).ok_or(GcError::OutOfMemory {
            requested: payload_bytes,
        })?;

        if size > self.config.large_object_threshold {
            return self.allocate_old(type_tag, size);
        }
        if let Some(obj) = self.try_allocate_young(type_tag, size) {
            return Ok(obj);
        }
        self.allocate_young_slow(type_tag, size)
    }

    fn allocation_color(&self) -> MarkColor {
        if self.cycle.is_marking() {
            MarkColor::Black
        } else {
            MarkColor::White
        }
    }

    fn try_allocate_young(&mut self, type_tag: TypeTag, size: usize) -> Option<GcRef> {
        let addr = self.young.allocate(size)?;
        let color = self.allocation_color();
        // SAFETY: addr..addr + size was just reserved in from_space
        unsafe { ObjectHeader::init_object(addr, size, type_tag, Generation::Young, color, 0) };
        Some(to_ref(addr))
    }

    fn try_allocate_old(&mut self, type_tag: TypeTag, size: usize) -> Option<GcRef> {
        let block = self.old.allocate(size)?;
        let color = self.allocation_color();
        // SAFETY: the block was just taken off a free list and is unreachable
        unsafe {
            ObjectHeader::init_object(block.addr, size, type_tag, Generation::Old, color, block.slack)
        };
        Some(to_ref(block.addr))
    }

    fn allocate_young_slow(&mut self, type_tag: TypeTag, size: usize) -> GcResult<GcRef> {
        if self.cycle.is_active() {
            self.safepoint();
        }
        self.scavenge();
        if let Some(obj) = self.try_allocate_young(type_tag, size) {
            return Ok(obj);
        }

        log::debug!(
            target: "gc",
            "young allocation of {} bytes failed after scavenge ({} bytes free), collecting full heap",
            size,
            self.young.free()
        );
        self.collect_full();
        self.try_allocate_young(type_tag, size)
            .ok_or(GcError::OutOfMemory { requested: size })
    }

    fn allocate_old(&mut self, type_tag: TypeTag, size: usize) -> GcResult<GcRef> {
        if let Some(obj) = self.try_allocate_old(type_tag, size) {
            self.maybe_start_cycle();
            return Ok(obj);
        }
        if self.old.is_sweeping() {
            // Unswept regions hold free space the allocator cannot see yet
            self.finish_cycle();
            if let Some(obj) = self.try_allocate_old(type_tag, size) {
                return Ok(obj);
            }
        }

        log::debug!(
            target: "gc",
            "old allocation of {} bytes failed, collecting full heap",
            size
        );
        self.collect_full();
        self.try_allocate_old(type_tag, size)
            .ok_or(GcError::OutOfMemory { requested: size })
    }

    /// Starts an old-generation cycle once occupancy reaches the trigger.
    pub(crate) fn maybe_start_cycle(&mut self) {
        if self.cycle.is_active() {
            return;
        }
        let used = self.old.used();
        let trigger = self.config.trigger_bytes();
        if used >= trigger {
            log::debug!(
                target: "gc",
                "old generation at {}K reached trigger {}K, starting cycle",
                used / 1024,
                trigger / 1024
            );
            self.begin_cycle();
        }
    }
}

fn to_ref(addr: usize) -> GcRef {
    match GcRef::from_addr(addr) {
        Some(obj) => obj,
        None => fatal(format_args!("allocator returned a null address")),
    }
}
