//! Object header layout and raw heap accessors.
//!
//! Every object starts with an [`ObjectHeader`]. Old-generation free blocks
//! reuse the same layout with a reserved type tag so both generations can be
//! walked linearly, block by block.
//!
//! Reference slots are read and written with atomic word operations so the
//! concurrent marker never races a mutator store.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use gc_types::{GcRef, ObjectView, Slot, TypeTag};

/// Mark colors for tri-color marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MarkColor {
    /// Unmarked (not yet visited)
    White = 0,
    /// In process (reachable, needs scanning)
    Gray = 1,
    /// Fully processed (reachable, all references scanned)
    Black = 2,
}

impl MarkColor {
    fn from_u8(v: u8) -> MarkColor {
        match v {
            1 => MarkColor::Gray,
            2 => MarkColor::Black,
            _ => MarkColor::White,
        }
    }
}

/// Generation an object currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Generation {
    /// Semi-space nursery
    Young = 0,
    /// Mark-sweep old generation
    Old = 1,
}

/// Atomic mark color for thread-safe marking operations.
#[repr(transparent)]
pub struct AtomicMarkColor(AtomicU8);

impl AtomicMarkColor {
    /// Creates a new atomic mark color with the given initial value.
    pub fn new(color: MarkColor) -> Self {
        AtomicMarkColor(AtomicU8::new(color as u8))
    }

    /// Loads the current mark color with the specified memory ordering.
    pub fn load(&self, ordering: Ordering) -> MarkColor {
        MarkColor::from_u8(self.0.load(ordering))
    }

    /// Stores a mark color with the specified memory ordering.
    pub fn store(&self, color: MarkColor, ordering: Ordering) {
        self.0.store(color as u8, ordering);
    }

    /// Atomically compares and exchanges the mark color.
    ///
    /// Returns Ok(old) if the exchange succeeded, Err(actual) if it failed.
    pub fn compare_exchange(
        &self,
        current: MarkColor,
        new: MarkColor,
        success: Ordering,
        failure: Ordering,
    ) -> Result<MarkColor, MarkColor> {
        self.0
            .compare_exchange(current as u8, new as u8, success, failure)
            .map(MarkColor::from_u8)
            .map_err(MarkColor::from_u8)
    }
}

impl fmt::Debug for AtomicMarkColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.load(Ordering::Relaxed))
    }
}

/// GC object header placed at the beginning of every object and free block.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct ObjectHeader {
    /// Tri-color mark state
    mark: AtomicMarkColor,
    /// `Generation` as a byte
    generation: u8,
    /// Scavenges survived
    age: u8,
    /// Unsplittable tail bytes owned by this old-generation block
    slack: u8,
    /// Host layout index, or `FREE_TAG`
    type_tag: u32,
    /// Object size in bytes including the header
    size: usize,
    /// New address during a scavenge, otherwise zero
    forwarding: usize,
}

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<ObjectHeader>();

/// Smallest block the old generation keeps on its free lists.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE;

/// Alignment of every object and block.
pub const OBJECT_ALIGN: usize = 8;

/// Type tag reserved for old-generation free blocks.
pub(crate) const FREE_TAG: u32 = u32::MAX;

/// Rounds `size` up to the object alignment.
pub(crate) fn align_up(size: usize) -> usize {
    (size + OBJECT_ALIGN - 1) & !(OBJECT_ALIGN - 1)
}

/// Total aligned block size of an object with the given payload.
pub(crate) fn object_size(payload_bytes: usize) -> Option<usize> {
    let total = payload_bytes.checked_add(HEADER_SIZE + OBJECT_ALIGN - 1)?;
    Some(total & !(OBJECT_ALIGN - 1))
}

impl ObjectHeader {
    /// Returns the header at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be the start of an initialized object or free block, and
    /// no `&mut` to the same header may be live.
    pub(crate) unsafe fn at<'a>(addr: usize) -> &'a ObjectHeader {
        &*(addr as *const ObjectHeader)
    }

    /// Returns the header of `obj`.
    ///
    /// # Safety
    ///
    /// See [`ObjectHeader::at`].
    pub(crate) unsafe fn of<'a>(obj: GcRef) -> &'a ObjectHeader {
        Self::at(obj.addr())
    }

    /// Returns the header at `addr` for mutation.
    ///
    /// # Safety
    ///
    /// `addr` must be the start of an initialized block, and no other thread
    /// may access this header for the lifetime of the reference. The marker
    /// thread is paused whenever objects are moved or blocks are rewritten.
    pub(crate) unsafe fn at_mut<'a>(addr: usize) -> &'a mut ObjectHeader {
        &mut *(addr as *mut ObjectHeader)
    }

    /// Writes a fresh object header at `addr` and zeroes the payload.
    ///
    /// # Safety
    ///
    /// `addr..addr + size + slack` must be memory owned by the caller and not
    /// reachable by any other thread.
    pub(crate) unsafe fn init_object(
        addr: usize,
        size: usize,
        type_tag: TypeTag,
        generation: Generation,
        color: MarkColor,
        slack: u8,
    ) {
        ptr::write(
            addr as *mut ObjectHeader,
            ObjectHeader {
                mark: AtomicMarkColor::new(color),
                generation: generation as u8,
                age: 0,
                slack,
                type_tag: type_tag.0,
                size,
                forwarding: 0,
            },
        );
        ptr::write_bytes((addr + HEADER_SIZE) as *mut u8, 0, size - HEADER_SIZE);
    }

    /// Writes a free-block header covering `size` bytes at `addr`.
    ///
    /// # Safety
    ///
    /// `addr..addr + size` must be unreachable old-generation memory.
    pub(crate) unsafe fn init_free(addr: usize, size: usize) {
        ptr::write(
            addr as *mut ObjectHeader,
            ObjectHeader {
                mark: AtomicMarkColor::new(MarkColor::White),
                generation: Generation::Old as u8,
                age: 0,
                slack: 0,
                type_tag: FREE_TAG,
                size,
                forwarding: 0,
            },
        );
    }

    pub(crate) fn mark(&self) -> &AtomicMarkColor {
        &self.mark
    }

    pub(crate) fn color(&self) -> MarkColor {
        self.mark.load(Ordering::SeqCst)
    }

    pub(crate) fn set_color(&self, color: MarkColor) {
        self.mark.store(color, Ordering::SeqCst);
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Bytes occupied in the heap, slack included.
    pub(crate) fn block_size(&self) -> usize {
        self.size + self.slack as usize
    }

    pub(crate) fn slack(&self) -> u8 {
        self.slack
    }

    pub(crate) fn set_slack(&mut self, slack: u8) {
        self.slack = slack;
    }

    pub(crate) fn type_tag(&self) -> TypeTag {
        TypeTag(self.type_tag)
    }

    pub(crate) fn is_free(&self) -> bool {
        self.type_tag == FREE_TAG
    }

    pub(crate) fn generation(&self) -> Generation {
        if self.generation == Generation::Old as u8 {
            Generation::Old
        } else {
            Generation::Young
        }
    }

    pub(crate) fn set_generation(&mut self, generation: Generation) {
        self.generation = generation as u8;
    }

    pub(crate) fn age(&self) -> u8 {
        self.age
    }

    pub(crate) fn set_age(&mut self, age: u8) {
        self.age = age;
    }

    pub(crate) fn forwarding(&self) -> usize {
        self.forwarding
    }

    pub(crate) fn set_forwarding(&mut self, addr: usize) {
        self.forwarding = addr;
    }
}

/// Builds the visitor view of `obj`.
///
/// # Safety
///
/// `obj` must be a live, initialized object.
pub(crate) unsafe fn view_of(obj: GcRef) -> ObjectView {
    let header = ObjectHeader::of(obj);
    ObjectView {
        object: obj,
        type_tag: header.type_tag(),
        payload: obj.addr() + HEADER_SIZE,
        payload_size: header.size() - HEADER_SIZE,
    }
}

/// Reads a payload word.
///
/// # Safety
///
/// `slot` must be a word-aligned field inside the payload of a live object.
pub(crate) unsafe fn load_word(slot: Slot) -> usize {
    let word = &*(slot.addr() as *const AtomicUsize);
    word.load(Ordering::SeqCst)
}

/// Writes a payload word.
///
/// # Safety
///
/// See [`load_word`].
pub(crate) unsafe fn store_word(slot: Slot, value: usize) {
    let word = &*(slot.addr() as *const AtomicUsize);
    word.store(value, Ordering::SeqCst);
}

/// Reads a reference slot.
///
/// # Safety
///
/// `slot` must be a reference field of a live object.
pub(crate) unsafe fn load_slot(slot: Slot) -> Option<GcRef> {
    GcRef::decode(load_word(slot))
}

/// Writes a reference slot.
///
/// # Safety
///
/// See [`load_slot`].
pub(crate) unsafe fn store_slot(slot: Slot, value: Option<GcRef>) {
    store_word(slot, GcRef::encode(value));
}

/// Copies `size` bytes of an object to a new location.
///
/// # Safety
///
/// Both ranges must be valid and must not overlap.
pub(crate) unsafe fn copy_object(from: usize, to: usize, size: usize) {
    ptr::copy_nonoverlapping(from as *const u8, to as *mut u8, size);
}

/// Walks the blocks of a contiguous heap range, yielding objects and
/// skipping free blocks.
pub(crate) struct ObjectWalker {
    cursor: usize,
    end: usize,
}

impl ObjectWalker {
    /// # Safety
    ///
    /// `start..end` must be tiled exactly by initialized blocks and must not
    /// be mutated while the walker is alive.
    pub(crate) unsafe fn new(start: usize, end: usize) -> Self {
        ObjectWalker { cursor: start, end }
    }
}

impl Iterator for ObjectWalker {
    type Item = GcRef;

    fn next(&mut self) -> Option<GcRef> {
        while self.cursor < self.end {
            let addr = self.cursor;
            // SAFETY: the range is tiled by blocks (see `ObjectWalker::new`)
            let header = unsafe { ObjectHeader::at(addr) };
            let step = header.block_size();
            if step < HEADER_SIZE || addr + step > self.end {
                fatal(format_args!(
                    "block at {:#x} has size {} outside walked range ending at {:#x}",
                    addr, step, self.end
                ));
            }
            self.cursor += step;
            if !header.is_free() {
                return GcRef::from_addr(addr);
            }
        }
        None
    }
}

/// Reports heap corruption and aborts the process.
///
/// Memory safety cannot be guaranteed once collector metadata is
/// inconsistent, so there is no recovery path.
#[cold]
pub(crate) fn fatal(message: fmt::Arguments<'_>) -> ! {
    log::error!(target: "gc", "heap corruption: {}", message);
    eprintln!("gengc: heap corruption: {}", message);
    std::process::abort()
}
