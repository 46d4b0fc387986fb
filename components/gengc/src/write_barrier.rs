//! Write barrier and remembered set.
//!
//! Every reference store made through [`crate::Heap::write_field`] runs
//! [`write_barrier`], which has two independent duties:
//!
//! 1. **Generational**: an old object that comes to reference a young object
//!    has the written slot recorded in the [`RememberedSet`]. A scavenge uses
//!    those slots as extra roots instead of scanning the old generation.
//! 2. **Marking** (only while an old-generation cycle is marking): a black
//!    object that comes to reference a white object shades the new value
//!    gray (Dijkstra insertion barrier).

use std::collections::{HashMap, HashSet};

use gc_types::{GcRef, Slot};
use parking_lot::Mutex;

use crate::marking::MarkingContext;
use crate::object::{MarkColor, ObjectHeader};

/// Old-generation slots known to reference young objects.
///
/// Keyed by holder so the entries of a freed object can be dropped when the
/// sweeper reclaims it. Stale entries (slots that were later overwritten
/// with an old reference or null) are harmless and are dropped by the next
/// scavenge.
#[derive(Debug, Default)]
pub struct RememberedSet {
    entries: Mutex<HashMap<GcRef, HashSet<Slot>>>,
}

impl RememberedSet {
    /// Creates an empty remembered set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `slot` of the old object `holder` references young memory.
    pub fn record(&self, holder: GcRef, slot: Slot) {
        self.entries.lock().entry(holder).or_default().insert(slot);
    }

    /// Drops every entry of `holder`.
    pub fn remove_holder(&self, holder: GcRef) {
        self.entries.lock().remove(&holder);
    }

    /// Returns true if `slot` of `holder` is recorded.
    pub fn contains(&self, holder: GcRef, slot: Slot) -> bool {
        self.entries
            .lock()
            .get(&holder)
            .map_or(false, |slots| slots.contains(&slot))
    }

    /// Returns true if any slot of `holder` is recorded.
    pub fn contains_holder(&self, holder: GcRef) -> bool {
        self.entries.lock().contains_key(&holder)
    }

    /// Removes and returns every entry.
    pub(crate) fn take(&self) -> HashMap<GcRef, HashSet<Slot>> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of recorded slots.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashSet::len).sum()
    }

    /// Number of holders with at least one recorded slot.
    pub fn holder_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Runs both barrier duties for a store of `value` into `slot` of `holder`.
///
/// Must be called after the store itself: the marker may blacken `holder`
/// concurrently, and either it reads the new value or this barrier sees the
/// holder black.
///
/// # Safety
///
/// `holder` must be a live object of the heap that owns `marking`, and
/// `value`, if any, must be a live object of the same heap.
pub(crate) unsafe fn write_barrier(
    marking: &MarkingContext,
    remembered_set: &RememberedSet,
    holder: GcRef,
    slot: Slot,
    value: Option<GcRef>,
) {
    let Some(value) = value else {
        return;
    };
    let young = marking.young();
    let holder_young = young.contains_ref(holder);

    if !holder_young && young.contains_ref(value) {
        remembered_set.record(holder, slot);
    }

    if marking.is_barrier_active() && ObjectHeader::of(holder).color() == MarkColor::Black {
        marking.shade(value);
    }
}
