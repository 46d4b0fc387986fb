//! Tri-color marking machinery shared by every old-generation collector.
//!
//! # Tri-Color Marking
//!
//! Objects are classified into three colors:
//! - **White**: Not yet visited (potentially garbage)
//! - **Gray**: Visited but children not yet scanned (on the worklist)
//! - **Black**: Fully processed (definitely reachable)
//!
//! The tri-color invariant states that no black object points directly to a
//! white object. The insertion barrier in [`crate::write_barrier`] maintains
//! it while the mutator runs between or alongside marking work.
//!
//! Young objects are never traced here. During a cycle they act as roots and
//! are rescanned by the heap (see [`crate::incremental`]); the marker skips
//! them by address, without touching their headers, so it can run while the
//! mutator allocates.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_deque::{Injector, Steal};
use gc_types::{GcRef, ObjectVisitor, Slot};

use crate::object::{load_slot, view_of, MarkColor, ObjectHeader};
use crate::young_gen::YoungBounds;

/// Thread-safe queue of gray old-generation objects.
///
/// Pushes and pops may come from the mutator (write barrier, pauses) and the
/// marker thread at the same time.
pub(crate) struct MarkWorklist {
    injector: Injector<GcRef>,
    /// Number of items currently queued (approximate under contention)
    len: AtomicUsize,
}

impl MarkWorklist {
    pub(crate) fn new() -> Self {
        MarkWorklist {
            injector: Injector::new(),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, obj: GcRef) {
        self.len.fetch_add(1, Ordering::SeqCst);
        self.injector.push(obj);
    }

    pub(crate) fn pop(&self) -> Option<GcRef> {
        loop {
            match self.injector.steal() {
                Steal::Success(obj) => {
                    self.len.fetch_sub(1, Ordering::SeqCst);
                    return Some(obj);
                }
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.injector.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        while self.pop().is_some() {}
    }
}

/// Bounds the work done by one marking or sweeping slice.
///
/// At least `min_work` units are always performed; after that the slice
/// ends at the deadline or at `max_work` units, whichever comes first.
#[derive(Debug, Clone)]
pub(crate) struct WorkBudget {
    deadline: Option<Instant>,
    min_work: usize,
    max_work: Option<usize>,
    done: usize,
}

impl WorkBudget {
    pub(crate) fn unlimited() -> Self {
        WorkBudget {
            deadline: None,
            min_work: 0,
            max_work: None,
            done: 0,
        }
    }

    pub(crate) fn timed(budget: Duration, min_work: usize) -> Self {
        WorkBudget {
            deadline: Some(Instant::now() + budget),
            min_work,
            max_work: None,
            done: 0,
        }
    }

    pub(crate) fn objects(limit: usize) -> Self {
        WorkBudget {
            deadline: None,
            min_work: 0,
            max_work: Some(limit),
            done: 0,
        }
    }

    pub(crate) fn charge(&mut self, units: usize) {
        self.done += units;
    }

    pub(crate) fn done(&self) -> usize {
        self.done
    }

    pub(crate) fn exhausted(&self) -> bool {
        if let Some(max) = self.max_work {
            if self.done >= max {
                return true;
            }
        }
        if self.done < self.min_work {
            return false;
        }
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// Marking state shared between the heap and the marker thread.
pub(crate) struct MarkingContext {
    pub(crate) worklist: MarkWorklist,
    pub(crate) visitor: Arc<dyn ObjectVisitor>,
    young: YoungBounds,
    /// Whether the marking half of the write barrier is active
    barrier_active: AtomicBool,
    /// Objects blackened in the current cycle
    marked: AtomicUsize,
}

impl MarkingContext {
    pub(crate) fn new(visitor: Arc<dyn ObjectVisitor>, young: YoungBounds) -> Self {
        MarkingContext {
            worklist: MarkWorklist::new(),
            visitor,
            young,
            barrier_active: AtomicBool::new(false),
            marked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn young(&self) -> &YoungBounds {
        &self.young
    }

    pub(crate) fn is_barrier_active(&self) -> bool {
        self.barrier_active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_barrier_active(&self, active: bool) {
        self.barrier_active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn marked(&self) -> usize {
        self.marked.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_marked(&self) {
        self.marked.store(0, Ordering::Relaxed);
    }

    /// Shades an old-generation object gray and queues it.
    ///
    /// Young objects are ignored. Returns true if the object was white.
    ///
    /// # Safety
    ///
    /// `obj` must be a live object of this heap.
    pub(crate) unsafe fn shade(&self, obj: GcRef) -> bool {
        if self.young.contains_ref(obj) {
            return false;
        }
        let shaded = ObjectHeader::of(obj)
            .mark()
            .compare_exchange(
                MarkColor::White,
                MarkColor::Gray,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if shaded {
            self.worklist.push(obj);
        }
        shaded
    }

    /// Shades every old child of `obj`.
    ///
    /// # Safety
    ///
    /// `obj` must be a live object of this heap.
    pub(crate) unsafe fn shade_children(&self, obj: GcRef) {
        let view = view_of(obj);
        self.visitor.for_each_reference(&view, &mut |slot: Slot| {
            if let Some(child) = load_slot(slot) {
                self.shade(child);
            }
        });
    }

    /// Blackens a gray object and shades its children.
    ///
    /// The object turns black before its slots are read, so a mutator store
    /// racing the scan is either seen here or caught by the barrier.
    ///
    /// # Safety
    ///
    /// `obj` must be a live old-generation object taken from the worklist.
    pub(crate) unsafe fn process(&self, obj: GcRef) {
        ObjectHeader::of(obj).set_color(MarkColor::Black);
        self.shade_children(obj);
        self.marked.fetch_add(1, Ordering::Relaxed);
    }

    /// Processes gray objects until the worklist is empty or the budget is
    /// exhausted. Returns true if the worklist was found empty.
    ///
    /// # Safety
    ///
    /// Every queued object must be live; see [`MarkingContext::process`].
    pub(crate) unsafe fn drain(&self, budget: &mut WorkBudget) -> bool {
        while !budget.exhausted() {
            match self.worklist.pop() {
                Some(obj) => {
                    self.process(obj);
                    budget.charge(1);
                }
                None => return true,
            }
        }
        self.worklist.is_empty()
    }
}

/// Helpers for inspecting colors during verification.
pub(crate) struct TriColor;

impl TriColor {
    /// Finds a white child of a black object, if any.
    ///
    /// # Safety
    ///
    /// `obj` must be a live object of this heap.
    pub(crate) unsafe fn white_child(
        visitor: &dyn ObjectVisitor,
        young: &YoungBounds,
        obj: GcRef,
    ) -> Option<GcRef> {
        let mut found = None;
        visitor.for_each_reference(&view_of(obj), &mut |slot| {
            if found.is_some() {
                return;
            }
            if let Some(child) = load_slot(slot) {
                if young.contains_ref(child) {
                    return;
                }
                if ObjectHeader::of(child).color() == MarkColor::White {
                    found = Some(child);
                }
            }
        });
        found
    }
}
