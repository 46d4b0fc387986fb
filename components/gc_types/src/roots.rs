//! Root enumeration and the built-in handle table.

use std::fmt;

use crate::GcRef;

/// Supplies the mutable root slots of the mutator.
///
/// The collector calls [`enumerate_roots`](RootSetProvider::enumerate_roots)
/// at the start of every collection and again whenever it needs a rescan
/// (incremental remark, concurrent completion pause). Each call must report
/// every live root at that moment. The collector may overwrite a slot with
/// the new address of a moved object.
pub trait RootSetProvider: Send {
    /// Invokes `visit` once per root slot.
    fn enumerate_roots(&mut self, visit: &mut dyn FnMut(&mut Option<GcRef>));
}

/// Index of an entry in a [`HandleTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Returns the table index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Live(Option<GcRef>),
    Vacant,
}

/// Indirect references that survive object movement.
///
/// Every live entry is a root. Released entries are recycled through a free
/// list, so a stale handle may alias a newer one; callers own handle lifetime.
///
/// # Examples
///
/// ```
/// use gc_types::{GcRef, HandleTable};
///
/// let mut table = HandleTable::new();
/// let h = table.new_handle(GcRef::from_addr(0x40));
/// assert_eq!(table.get(h), Some(GcRef::from_addr(0x40)));
///
/// assert!(table.set(h, None));
/// assert_eq!(table.get(h), Some(None));
///
/// assert!(table.release(h));
/// assert_eq!(table.get(h), None);
/// assert!(table.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl HandleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` in a fresh entry and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if the table already holds `u32::MAX` entries.
    pub fn new_handle(&mut self, value: Option<GcRef>) -> Handle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            self.entries[index as usize] = Entry::Live(value);
            return Handle(index);
        }
        let index = self.entries.len();
        assert!(index < u32::MAX as usize, "handle table exhausted");
        self.entries.push(Entry::Live(value));
        Handle(index as u32)
    }

    /// Reads a handle. Returns `None` for released or unknown handles.
    pub fn get(&self, handle: Handle) -> Option<Option<GcRef>> {
        match self.entries.get(handle.0 as usize) {
            Some(Entry::Live(value)) => Some(*value),
            _ => None,
        }
    }

    /// Overwrites a handle. Returns false for released or unknown handles.
    pub fn set(&mut self, handle: Handle, value: Option<GcRef>) -> bool {
        match self.entries.get_mut(handle.0 as usize) {
            Some(Entry::Live(slot)) => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Releases a handle so its referent is no longer rooted by it.
    pub fn release(&mut self, handle: Handle) -> bool {
        match self.entries.get_mut(handle.0 as usize) {
            Some(entry @ Entry::Live(_)) => {
                *entry = Entry::Vacant;
                self.free.push(handle.0);
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl RootSetProvider for HandleTable {
    fn enumerate_roots(&mut self, visit: &mut dyn FnMut(&mut Option<GcRef>)) {
        for entry in &mut self.entries {
            if let Entry::Live(slot) = entry {
                visit(slot);
            }
        }
    }
}

/// A plain vector of roots, convenient for tests and simple hosts.
impl RootSetProvider for Vec<Option<GcRef>> {
    fn enumerate_roots(&mut self, visit: &mut dyn FnMut(&mut Option<GcRef>)) {
        for slot in self.iter_mut() {
            visit(slot);
        }
    }
}
