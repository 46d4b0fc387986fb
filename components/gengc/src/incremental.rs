//! Old-generation collection cycle.
//!
//! A cycle moves through `Idle -> Marking -> Remark -> Sweeping -> Idle`.
//!
//! - **Marking**: the write barrier is active, new objects are allocated
//!   black and gray objects are drained in bounded steps (or by the marker
//!   thread in concurrent mode).
//! - **Remark**: inside one pause, roots and young objects are rescanned.
//!   If the drain that follows empties the worklist before the mutator runs
//!   again, marking is complete.
//! - **Sweeping**: the old generation is swept region by region in bounded
//!   steps. The barrier is off and new objects are white again.
//!
//! Young objects are roots of the cycle. They are all shaded gray when the
//! cycle starts, objects allocated during marking are black, and young
//! survivors keep their color when copied or promoted, so no young object is
//! white while marking is in progress. They return to white when marking
//! completes.

use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;

use crate::error::{GcError, GcResult};
use crate::heap::Heap;
use crate::marking::WorkBudget;
use crate::object::{MarkColor, ObjectHeader};
use crate::telemetry::{CollectionKind, GcEvent, PausePhase};

/// Phase of the old-generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPhase {
    /// No cycle in progress
    #[default]
    Idle,
    /// Tracing old objects; the barrier is active
    Marking,
    /// Final rescan of roots and young objects inside a pause
    Remark,
    /// Reclaiming white old objects
    Sweeping,
}

/// Bookkeeping of the current (or last) cycle.
pub(crate) struct CycleState {
    phase: AtomicCell<GcPhase>,
    pub(crate) id: u64,
    pub(crate) kind: CollectionKind,
    /// Sum of this cycle's pauses
    pub(crate) pause: Duration,
    pub(crate) promoted_objects: usize,
    pub(crate) bytes_reclaimed: usize,
    /// Failed concurrent completion attempts
    pub(crate) completion_retries: usize,
}

impl CycleState {
    pub(crate) fn new() -> Self {
        CycleState {
            phase: AtomicCell::new(GcPhase::Idle),
            id: 0,
            kind: CollectionKind::Incremental,
            pause: Duration::ZERO,
            promoted_objects: 0,
            bytes_reclaimed: 0,
            completion_retries: 0,
        }
    }

    pub(crate) fn phase(&self) -> GcPhase {
        self.phase.load()
    }

    pub(crate) fn set_phase(&self, phase: GcPhase) {
        self.phase.store(phase);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.phase() != GcPhase::Idle
    }

    pub(crate) fn is_marking(&self) -> bool {
        matches!(self.phase(), GcPhase::Marking | GcPhase::Remark)
    }

    fn reset(&mut self, id: u64, kind: CollectionKind) {
        self.id = id;
        self.kind = kind;
        self.pause = Duration::ZERO;
        self.promoted_objects = 0;
        self.bytes_reclaimed = 0;
        self.completion_retries = 0;
    }
}

impl Heap {
    /// Starts an old-generation cycle.
    ///
    /// The cycle is concurrent if `concurrent_marking_enabled` is set and
    /// incremental otherwise. It advances through [`Heap::step`],
    /// [`Heap::safepoint`], allocation slow paths, or [`Heap::finish_cycle`].
    ///
    /// # Errors
    ///
    /// [`GcError::CycleInProgress`] if a cycle is already running.
    pub fn start_cycle(&mut self) -> GcResult<()> {
        if self.cycle.is_active() {
            return Err(GcError::CycleInProgress);
        }
        self.begin_cycle();
        Ok(())
    }

    pub(crate) fn begin_cycle(&mut self) {
        let kind = if self.config.concurrent_marking_enabled {
            CollectionKind::Concurrent
        } else {
            CollectionKind::Incremental
        };
        let id = self.next_gc_id();
        let heap_used = self.heap_used();
        self.emit(&GcEvent::CycleStart {
            id,
            kind,
            heap_used,
        });
        self.cycle.reset(id, kind);

        let start = Instant::now();
        {
            let _phase = PausePhase::new(id, "Init Mark");
            self.marking.reset_marked();
            self.cycle.set_phase(GcPhase::Marking);
            self.marking.set_barrier_active(true);
            for obj in self.young.objects() {
                // SAFETY: the walker yields live young objects; the marker
                // never touches young headers
                unsafe { ObjectHeader::of(obj).set_color(MarkColor::Gray) };
            }
            self.rescan_roots_and_young();
        }
        self.account_pause(start.elapsed());

        if kind == CollectionKind::Concurrent {
            self.start_marker();
        }
    }

    /// Shades every root and every old child of a young object that is not
    /// black.
    ///
    /// Black young objects were allocated during marking; the barrier
    /// shades whatever is stored into them.
    pub(crate) fn rescan_roots_and_young(&mut self) {
        let marking = &self.marking;
        self.roots.enumerate(&mut |slot| {
            if let Some(obj) = *slot {
                // SAFETY: roots reference live objects
                unsafe { marking.shade(obj) };
            }
        });
        for obj in self.young.objects() {
            // SAFETY: the walker yields live young objects
            unsafe {
                if ObjectHeader::of(obj).color() != MarkColor::Black {
                    marking.shade_children(obj);
                }
            }
        }
    }

    /// Advances the current cycle by one bounded slice.
    ///
    /// Returns the phase after the slice. Does nothing while idle.
    pub fn step(&mut self, budget: Duration) -> GcPhase {
        match self.cycle.phase() {
            GcPhase::Idle => {}
            GcPhase::Marking | GcPhase::Remark => {
                if self.cycle.kind == CollectionKind::Concurrent {
                    self.concurrent_step();
                } else {
                    self.incremental_mark_step(budget);
                }
            }
            GcPhase::Sweeping => self.sweep_slice(budget),
        }
        self.cycle.phase()
    }

    /// Mutator safepoint: advances the current cycle by one configured step.
    pub fn safepoint(&mut self) -> GcPhase {
        self.step(self.config.incremental_step_budget)
    }

    fn incremental_mark_step(&mut self, budget: Duration) {
        let start = Instant::now();
        {
            let _phase = PausePhase::new(self.cycle.id, "Mark Step");
            let mut work = WorkBudget::timed(budget, self.config.min_objects_per_step);
            // SAFETY: the worklist only holds live old objects
            let drained = unsafe { self.marking.drain(&mut work) };
            if drained {
                self.cycle.set_phase(GcPhase::Remark);
                self.rescan_roots_and_young();
                // SAFETY: see above
                if unsafe { self.marking.drain(&mut work) } {
                    self.complete_marking();
                } else {
                    self.cycle.set_phase(GcPhase::Marking);
                }
            }
            log::trace!(
                target: "gc",
                "GC({}) mark step: {} objects, {} queued",
                self.cycle.id,
                work.done(),
                self.marking.worklist.len()
            );
        }
        self.account_pause(start.elapsed());
        if self.config.verify_heap {
            self.verify_or_panic();
        }
    }

    /// Ends marking: the barrier goes off, young objects are whitened and
    /// the sweep begins.
    pub(crate) fn complete_marking(&mut self) {
        self.marking.set_barrier_active(false);
        self.stop_marker();
        for obj in self.young.objects() {
            // SAFETY: the walker yields live young objects
            unsafe { ObjectHeader::of(obj).set_color(MarkColor::White) };
        }
        self.old.begin_sweep();
        self.cycle.set_phase(GcPhase::Sweeping);
        log::debug!(
            target: "gc",
            "GC({}) marking complete: {} objects marked",
            self.cycle.id,
            self.marking.marked()
        );
    }

    fn sweep_slice(&mut self, budget: Duration) {
        let start = Instant::now();
        let progress = {
            let _phase = PausePhase::new(self.cycle.id, "Sweep Step");
            let mut work = WorkBudget::timed(budget, self.config.min_objects_per_step);
            let remembered_set = &self.remembered_set;
            self.old
                .sweep_step(&mut work, &mut |obj| remembered_set.remove_holder(obj))
        };
        self.cycle.bytes_reclaimed += progress.freed_bytes;
        self.account_pause(start.elapsed());
        if progress.done {
            self.end_cycle();
        }
    }

    /// Runs the current cycle to completion in one pause.
    pub fn finish_cycle(&mut self) {
        loop {
            match self.cycle.phase() {
                GcPhase::Idle => return,
                GcPhase::Marking | GcPhase::Remark => {
                    self.pause_marker();
                    let start = Instant::now();
                    {
                        let _phase = PausePhase::new(self.cycle.id, "Final Mark");
                        let mut work = WorkBudget::unlimited();
                        // SAFETY: the worklist only holds live old objects
                        unsafe { self.marking.drain(&mut work) };
                        self.cycle.set_phase(GcPhase::Remark);
                        self.rescan_roots_and_young();
                        // SAFETY: see above
                        unsafe { self.marking.drain(&mut work) };
                        self.complete_marking();
                    }
                    self.account_pause(start.elapsed());
                }
                GcPhase::Sweeping => {
                    let start = Instant::now();
                    let progress = {
                        let _phase = PausePhase::new(self.cycle.id, "Sweep");
                        let remembered_set = &self.remembered_set;
                        self.old
                            .finish_sweep(&mut |obj| remembered_set.remove_holder(obj))
                    };
                    self.cycle.bytes_reclaimed += progress.freed_bytes;
                    self.account_pause(start.elapsed());
                    self.end_cycle();
                }
            }
        }
    }

    pub(crate) fn end_cycle(&mut self) {
        let released = self.old.release_empty_regions();
        let id = self.cycle.id;
        let kind = self.cycle.kind;
        match kind {
            CollectionKind::Concurrent => self.stats.concurrent_cycles += 1,
            _ => self.stats.incremental_cycles += 1,
        }
        self.stats.bytes_reclaimed += self.cycle.bytes_reclaimed;
        self.cycle.set_phase(GcPhase::Idle);

        log::debug!(
            target: "gc",
            "GC({}) {} cycle done: {} bytes reclaimed, {} released, old {}K",
            id,
            kind,
            self.cycle.bytes_reclaimed,
            released,
            self.old.used() / 1024
        );
        self.emit(&GcEvent::CycleEnd {
            id,
            kind,
            bytes_reclaimed: self.cycle.bytes_reclaimed,
            pause_duration: self.cycle.pause,
            objects_promoted: self.cycle.promoted_objects,
        });
    }

    pub(crate) fn account_pause(&mut self, pause: Duration) {
        self.cycle.pause += pause;
        self.stats.record_pause(pause);
    }
}
