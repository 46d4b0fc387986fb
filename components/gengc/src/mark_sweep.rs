//! Stop-the-world mark-sweep of the whole heap, and heap verification.
//!
//! A full collection first finishes any running cycle, then scavenges with
//! forced promotion so the young generation is empty, and finally marks the
//! old generation from the roots and sweeps it in one pause. Survivors that
//! did not fit into the old generation before the sweep are promoted by a
//! second scavenge afterwards. It is the collector of last resort for
//! allocation failures.

use std::time::Instant;

use crate::error::{GcError, GcResult};
use crate::heap::Heap;
use crate::marking::{TriColor, WorkBudget};
use crate::object::{MarkColor, ObjectHeader};
use crate::telemetry::{CollectionKind, GcEvent, PausePhase};

impl Heap {
    /// Collects both generations in a single pause.
    pub fn collect_full(&mut self) {
        if self.cycle.is_active() {
            log::debug!(target: "gc", "GC({}) finishing active cycle before full collection", self.cycle.id);
            self.finish_cycle();
        }
        let promoted = self.scavenge_with(true);

        let id = self.next_gc_id();
        let heap_used = self.heap_used();
        self.emit(&GcEvent::CycleStart {
            id,
            kind: CollectionKind::Full,
            heap_used,
        });

        let start = Instant::now();
        let progress = {
            let _phase = PausePhase::new(id, "Full Mark-Sweep");
            self.mark_stop_the_world();
            self.old.begin_sweep();
            let remembered_set = &self.remembered_set;
            self.old
                .finish_sweep(&mut |obj| remembered_set.remove_holder(obj))
        };
        let released = self.old.release_empty_regions();
        let pause = start.elapsed();

        self.stats.full_collections += 1;
        self.stats.bytes_reclaimed += progress.freed_bytes;
        self.stats.record_pause(pause);
        log::debug!(
            target: "gc",
            "GC({}) full collection: {} objects freed, {} bytes reclaimed, {} bytes released",
            id,
            progress.freed_objects,
            progress.freed_bytes,
            released
        );
        self.emit(&GcEvent::CycleEnd {
            id,
            kind: CollectionKind::Full,
            bytes_reclaimed: progress.freed_bytes,
            pause_duration: pause,
            objects_promoted: promoted,
        });

        if self.young.used() > 0 {
            // Promotion ran out of old space before the sweep freed it
            log::debug!(
                target: "gc",
                "GC({}) {} bytes of survivors left in young space, promoting after sweep",
                id,
                self.young.used()
            );
            self.scavenge_with(true);
        }
    }

    /// Marks every old object reachable from the roots or from any young
    /// object, without interruption.
    ///
    /// Old objects must all be white beforehand. Young objects are not
    /// colored; unreachable young objects may keep old objects alive until
    /// the next cycle.
    pub(crate) fn mark_stop_the_world(&mut self) {
        let marking = &self.marking;
        self.roots.enumerate(&mut |slot| {
            if let Some(obj) = *slot {
                // SAFETY: roots reference live objects
                unsafe { marking.shade(obj) };
            }
        });
        for obj in self.young.objects() {
            // SAFETY: the walker yields live young objects
            unsafe { marking.shade_children(obj) };
        }
        // SAFETY: the worklist only holds live old objects; nothing else runs
        unsafe { marking.drain(&mut WorkBudget::unlimited()) };
    }

    /// Checks that no black object references a white old object.
    ///
    /// Only meaningful while marking; returns `Ok` in any other phase. The
    /// marker thread is paused for the duration of the check.
    ///
    /// # Errors
    ///
    /// [`GcError::BarrierInvariantViolation`] naming the first offending edge.
    pub fn verify_tri_color_invariant(&self) -> GcResult<()> {
        if !self.cycle.is_marking() {
            return Ok(());
        }
        let paused = self.pause_marker();
        let visitor = &*self.marking.visitor;
        let young = self.marking.young();
        let result = self
            .old
            .objects()
            .chain(self.young.objects())
            .try_for_each(|holder| {
                // SAFETY: both walkers yield live objects and the marker is paused
                unsafe {
                    if ObjectHeader::of(holder).color() != MarkColor::Black {
                        return Ok(());
                    }
                    match TriColor::white_child(visitor, young, holder) {
                        Some(child) => Err(GcError::BarrierInvariantViolation { holder, child }),
                        None => Ok(()),
                    }
                }
            });
        if paused {
            self.resume_marker();
        }
        result
    }

    pub(crate) fn verify_or_panic(&self) {
        if let Err(err) = self.verify_tri_color_invariant() {
            log::error!(target: "gc", "GC({}) heap verification failed: {}", self.cycle.id, err);
            panic!("heap verification failed: {}", err);
        }
    }
}
