//! Young-generation scavenger.
//!
//! Cheney's algorithm:
//! 1. Copy objects referenced by roots and remembered-set slots out of
//!    from_space, leaving a forwarding address behind
//! 2. Scan to_space breadth-first between the scan and allocation cursors,
//!    copying every from_space object a scanned slot references
//! 3. Swap the spaces; whatever was not copied is garbage
//!
//! Survivors that reach the promotion age are copied into the old generation
//! instead. Promoted objects are queued and scanned like to_space objects,
//! and any of their slots still referencing young memory afterwards is
//! recorded in the remembered set. The copy-or-promote decision is made once
//! per object, on first visit; later visits follow the forwarding address.

use std::time::Instant;

use gc_types::{GcRef, ObjectVisitor, Slot};

use crate::heap::Heap;
use crate::incremental::GcPhase;
use crate::object::{copy_object, fatal, load_slot, store_slot, view_of, Generation, MarkColor, ObjectHeader};
use crate::old_gen::OldGeneration;
use crate::telemetry::{CollectionKind, GcEvent, PausePhase};
use crate::write_barrier::RememberedSet;
use crate::young_gen::YoungGeneration;

/// What a scavenge did.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScavengeOutcome {
    /// Bytes of from_space in use before the scavenge
    pub used_before: usize,
    /// Bytes copied into to_space
    pub survived_bytes: usize,
    /// Objects copied into the old generation
    pub promoted_objects: usize,
    /// Object bytes copied into the old generation
    pub promoted_bytes: usize,
    /// Promoted objects that were gray and must join the mark worklist
    pub promoted_gray: Vec<GcRef>,
}

impl ScavengeOutcome {
    /// Young bytes that were not copied anywhere.
    pub(crate) fn reclaimed(&self) -> usize {
        self.used_before - self.survived_bytes - self.promoted_bytes
    }
}

/// One scavenge in progress, borrowing the spaces it works on.
pub(crate) struct Scavenger<'a> {
    young: &'a mut YoungGeneration,
    old: &'a mut OldGeneration,
    remembered_set: &'a RememberedSet,
    visitor: &'a dyn ObjectVisitor,
    promotion_age: u8,
    force_promotion: bool,
    /// Cheney scan cursor in to_space
    scan: usize,
    /// Promoted objects not yet scanned
    promoted: Vec<GcRef>,
    outcome: ScavengeOutcome,
}

impl<'a> Scavenger<'a> {
    pub(crate) fn new(
        young: &'a mut YoungGeneration,
        old: &'a mut OldGeneration,
        remembered_set: &'a RememberedSet,
        visitor: &'a dyn ObjectVisitor,
        promotion_age: u8,
        force_promotion: bool,
    ) -> Self {
        let scan = young.to_space_start();
        let outcome = ScavengeOutcome {
            used_before: young.used(),
            ..ScavengeOutcome::default()
        };
        Scavenger {
            young,
            old,
            remembered_set,
            visitor,
            promotion_age,
            force_promotion,
            scan,
            promoted: Vec::new(),
            outcome,
        }
    }

    /// Evacuates the referent of a root slot and rewrites the slot.
    pub(crate) fn evacuate_root(&mut self, slot: &mut Option<GcRef>) {
        if let Some(obj) = *slot {
            *slot = Some(self.evacuate(obj));
        }
    }

    /// Treats every remembered old-to-young slot as a root.
    ///
    /// Entries whose slot still references young memory afterwards are kept;
    /// stale ones are dropped.
    pub(crate) fn process_remembered_set(&mut self) {
        for (holder, slots) in self.remembered_set.take() {
            for slot in slots {
                // SAFETY: recorded slots belong to old objects, which are
                // address-stable and not freed while their entries exist
                let Some(child) = (unsafe { load_slot(slot) }) else {
                    continue;
                };
                let moved = self.evacuate(child);
                if moved != child {
                    // SAFETY: see above
                    unsafe { store_slot(slot, Some(moved)) };
                }
                if self.young.in_to_space(moved.addr()) {
                    self.remembered_set.record(holder, slot);
                }
            }
        }
    }

    /// Scans copied and promoted objects until no unscanned object remains.
    pub(crate) fn scan_to_completion(&mut self) {
        loop {
            while self.scan < self.young.to_space_top() {
                let obj = match GcRef::from_addr(self.scan) {
                    Some(obj) => obj,
                    None => fatal(format_args!("to-space scan cursor is null")),
                };
                // SAFETY: to_space is tiled by copied objects up to its top
                let size = unsafe { ObjectHeader::of(obj).size() };
                self.scan_object(obj, false);
                self.scan += size;
            }
            match self.promoted.pop() {
                Some(obj) => self.scan_object(obj, true),
                None => break,
            }
        }
    }

    /// Swaps the semi-spaces and reports what happened.
    pub(crate) fn finish(self) -> ScavengeOutcome {
        let mut outcome = self.outcome;
        outcome.survived_bytes = self.young.to_space_used();
        self.young.flip();
        outcome
    }

    fn scan_object(&mut self, obj: GcRef, holder_is_old: bool) {
        let visitor = self.visitor;
        // SAFETY: obj is a fully copied object in to_space or the old generation
        let view = unsafe { view_of(obj) };
        visitor.for_each_reference(&view, &mut |slot: Slot| {
            self.scan_slot(obj, slot, holder_is_old);
        });
    }

    fn scan_slot(&mut self, holder: GcRef, slot: Slot, holder_is_old: bool) {
        // SAFETY: slot was reported by the visitor for a live object
        let Some(child) = (unsafe { load_slot(slot) }) else {
            return;
        };
        let moved = self.evacuate(child);
        if moved != child {
            // SAFETY: see above
            unsafe { store_slot(slot, Some(moved)) };
        }
        if holder_is_old && self.young.in_to_space(moved.addr()) {
            self.remembered_set.record(holder, slot);
        }
    }

    /// Copies or promotes `obj` if it lives in from_space, returning its
    /// current address.
    fn evacuate(&mut self, obj: GcRef) -> GcRef {
        if !self.young.in_from_space(obj.addr()) {
            return obj;
        }

        // SAFETY: obj is an object in from_space; the mutator is stopped and
        // the marker thread is paused for the whole scavenge
        let header = unsafe { ObjectHeader::at_mut(obj.addr()) };
        let forwarded = header.forwarding();
        if forwarded != 0 {
            if !self.young.in_to_space(forwarded) && !self.old.contains(forwarded) {
                fatal(format_args!(
                    "object {} forwarded to {:#x}, outside to-space and the old generation",
                    obj, forwarded
                ));
            }
            return match GcRef::from_addr(forwarded) {
                Some(new) => new,
                None => fatal(format_args!("null forwarding address")),
            };
        }

        let size = header.size();
        let age = header.age().saturating_add(1);
        let promote = self.force_promotion || age >= self.promotion_age;

        let target = if promote {
            self.old
                .allocate(size)
                .map(|a| (a.addr, a.slack, Generation::Old))
        } else {
            None
        };
        let (addr, slack, generation) = match target {
            Some(target) => target,
            None => match self.young.allocate_in_to_space(size) {
                Some(addr) => (addr, 0, Generation::Young),
                None => fatal(format_args!(
                    "to-space overflow copying {} bytes of {}",
                    size, obj
                )),
            },
        };

        // SAFETY: addr is a freshly reserved block of at least `size` bytes
        // in a different space than obj
        let copy = unsafe {
            copy_object(obj.addr(), addr, size);
            ObjectHeader::at_mut(addr)
        };
        copy.set_forwarding(0);
        copy.set_age(age);
        copy.set_generation(generation);
        copy.set_slack(slack);
        header.set_forwarding(addr);

        let new = match GcRef::from_addr(addr) {
            Some(new) => new,
            None => fatal(format_args!("null copy address")),
        };
        if generation == Generation::Old {
            self.outcome.promoted_objects += 1;
            self.outcome.promoted_bytes += size;
            if copy.color() == MarkColor::Gray {
                self.outcome.promoted_gray.push(new);
            }
            self.promoted.push(new);
        }
        new
    }
}

impl Heap {
    /// Collects the young generation.
    ///
    /// Stop-the-world: runs to completion before returning. Survivors are
    /// copied to the other semi-space or promoted, and every root and
    /// remembered slot is rewritten to the new addresses. Afterwards an
    /// old-generation cycle starts if promotion pushed occupancy past the
    /// trigger.
    pub fn scavenge(&mut self) {
        self.scavenge_with(false);
        self.maybe_start_cycle();
    }

    /// Runs one scavenge and returns the number of promoted objects.
    pub(crate) fn scavenge_with(&mut self, force_promotion: bool) -> usize {
        let id = self.next_gc_id();
        let start = Instant::now();
        let heap_used = self.heap_used();
        self.emit(&GcEvent::CycleStart {
            id,
            kind: CollectionKind::Scavenge,
            heap_used,
        });

        let marker_was_running = self.pause_marker();
        let outcome = {
            let _phase = PausePhase::new(id, "Scavenge");
            let mut scavenger = Scavenger::new(
                &mut self.young,
                &mut self.old,
                &self.remembered_set,
                &*self.marking.visitor,
                self.config.promotion_age_threshold,
                force_promotion,
            );
            self.roots
                .enumerate(&mut |slot| scavenger.evacuate_root(slot));
            scavenger.process_remembered_set();
            scavenger.scan_to_completion();
            scavenger.finish()
        };

        if matches!(self.cycle.phase(), GcPhase::Marking | GcPhase::Remark) {
            for obj in &outcome.promoted_gray {
                self.marking.worklist.push(*obj);
            }
        }
        if marker_was_running {
            self.resume_marker();
        }

        let pause = start.elapsed();
        let reclaimed = outcome.reclaimed();
        self.stats.scavenges += 1;
        self.stats.objects_promoted += outcome.promoted_objects;
        self.stats.bytes_promoted += outcome.promoted_bytes;
        self.stats.bytes_reclaimed += reclaimed;
        self.stats.record_pause(pause);
        if self.cycle.is_active() {
            self.cycle.promoted_objects += outcome.promoted_objects;
        }
        log::trace!(
            target: "gc",
            "GC({}) scavenge: {} bytes survived, {} objects promoted, {} bytes reclaimed",
            id,
            outcome.survived_bytes,
            outcome.promoted_objects,
            reclaimed
        );
        self.emit(&GcEvent::CycleEnd {
            id,
            kind: CollectionKind::Scavenge,
            bytes_reclaimed: reclaimed,
            pause_duration: pause,
            objects_promoted: outcome.promoted_objects,
        });
        outcome.promoted_objects
    }
}
