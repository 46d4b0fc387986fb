//! Old generation: free-list managed regions.
//!
//! The old generation is a growable set of regions. Each region is tiled by
//! blocks that are either objects or free blocks, and keeps a segregated
//! free list (power-of-two size classes) of its free blocks.
//!
//! Sweeping walks regions linearly, coalesces runs of free blocks and white
//! objects, and rebuilds each region's free list. A region that has not been
//! swept yet in the current cycle is skipped by the allocator.

use gc_types::GcRef;

use crate::error::GcResult;
use crate::marking::WorkBudget;
use crate::object::{
    align_up, fatal, MarkColor, ObjectHeader, ObjectWalker, HEADER_SIZE, MIN_BLOCK_SIZE,
};
use crate::space::Arena;

const SIZE_CLASSES: usize = usize::BITS as usize;

fn size_class(size: usize) -> usize {
    (usize::BITS - 1 - size.leading_zeros()) as usize
}

/// Segregated free list. Class `k` holds blocks of `2^k..2^(k+1)` bytes.
#[derive(Debug)]
pub(crate) struct FreeList {
    buckets: Vec<Vec<(usize, usize)>>,
    free_bytes: usize,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        FreeList {
            buckets: vec![Vec::new(); SIZE_CLASSES],
            free_bytes: 0,
        }
    }

    pub(crate) fn push(&mut self, addr: usize, size: usize) {
        self.buckets[size_class(size)].push((addr, size));
        self.free_bytes += size;
    }

    /// Removes a block of at least `size` bytes.
    ///
    /// The block's own class is searched first-fit; any block of a larger
    /// class fits.
    pub(crate) fn take(&mut self, size: usize) -> Option<(usize, usize)> {
        let class = size_class(size);
        let exact = &mut self.buckets[class];
        if let Some(pos) = exact.iter().rposition(|&(_, block)| block >= size) {
            let found = exact.swap_remove(pos);
            self.free_bytes -= found.1;
            return Some(found);
        }
        for bucket in &mut self.buckets[class + 1..] {
            if let Some(found) = bucket.pop() {
                self.free_bytes -= found.1;
                return Some(found);
            }
        }
        None
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
        self.free_bytes = 0;
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub(crate) fn block_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// A block handed out by the old generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    /// Block address
    pub addr: usize,
    /// Tail bytes too small to split off, owned by the object
    pub slack: u8,
}

struct Region {
    memory: Arena,
    free: FreeList,
    live_bytes: usize,
    swept: bool,
}

impl Region {
    fn new(capacity: usize) -> GcResult<Self> {
        let memory = Arena::new(capacity)?;
        let mut free = FreeList::new();
        // SAFETY: the arena was just allocated and is owned by this region
        unsafe { ObjectHeader::init_free(memory.start(), capacity) };
        free.push(memory.start(), capacity);
        Ok(Region {
            memory,
            free,
            live_bytes: 0,
            swept: true,
        })
    }

    fn allocate(&mut self, size: usize) -> Option<Allocation> {
        let (addr, block) = self.free.take(size)?;
        self.memory.record_start(addr);
        let remainder = block - size;
        let slack = if remainder >= MIN_BLOCK_SIZE {
            // SAFETY: the tail is part of a free block owned by this region
            unsafe { ObjectHeader::init_free(addr + size, remainder) };
            self.free.push(addr + size, remainder);
            0
        } else {
            remainder as u8
        };
        self.live_bytes += size + slack as usize;
        Some(Allocation { addr, slack })
    }

    fn objects(&self) -> ObjectWalker {
        // SAFETY: regions are always tiled by blocks
        unsafe { ObjectWalker::new(self.memory.start(), self.memory.end()) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SweepCursor {
    region: usize,
    offset: usize,
    run_start: Option<usize>,
    region_live: usize,
}

/// Result of one sweep slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SweepProgress {
    /// Bytes of white objects returned to the free lists
    pub freed_bytes: usize,
    /// White objects freed
    pub freed_objects: usize,
    /// True once every region has been swept
    pub done: bool,
}

/// Old generation with mark-sweep reclamation.
pub(crate) struct OldGeneration {
    regions: Vec<Region>,
    region_size: usize,
    max_size: usize,
    committed: usize,
    live_bytes: usize,
    sweep: Option<SweepCursor>,
}

impl OldGeneration {
    /// Creates an old generation with one committed region.
    pub(crate) fn new(region_size: usize, max_size: usize) -> GcResult<Self> {
        let first = Region::new(region_size)?;
        Ok(OldGeneration {
            regions: vec![first],
            region_size,
            max_size,
            committed: region_size,
            live_bytes: 0,
            sweep: None,
        })
    }

    /// Allocates a block of `size` aligned bytes.
    ///
    /// Only swept regions are used. A new region is committed when no
    /// existing region fits and the size limit allows it.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<Allocation> {
        debug_assert!(size >= HEADER_SIZE && size == align_up(size));
        for region in self.regions.iter_mut().filter(|r| r.swept) {
            if let Some(allocation) = region.allocate(size) {
                self.live_bytes += size + allocation.slack as usize;
                return Some(allocation);
            }
        }

        let region = self.grow(size)?;
        let allocation = region.allocate(size)?;
        self.live_bytes += size + allocation.slack as usize;
        Some(allocation)
    }

    fn grow(&mut self, size: usize) -> Option<&mut Region> {
        let capacity = if size > self.region_size {
            align_up(size)
        } else {
            self.region_size
        };
        if self.committed + capacity > self.max_size {
            return None;
        }
        match Region::new(capacity) {
            Ok(region) => {
                self.committed += capacity;
                log::debug!(target: "gc", "old generation grew by {}K to {}K", capacity / 1024, self.committed / 1024);
                self.regions.push(region);
                self.regions.last_mut()
            }
            Err(e) => {
                log::warn!(target: "gc", "failed to commit old-generation region: {}", e);
                None
            }
        }
    }

    /// Returns true if `addr` lies in a committed region.
    pub(crate) fn contains(&self, addr: usize) -> bool {
        self.regions.iter().any(|r| r.memory.contains(addr))
    }

    /// Returns true if a live object starts at `addr`.
    pub(crate) fn is_object_start(&self, addr: usize) -> bool {
        self.regions
            .iter()
            .find(|r| r.memory.contains(addr))
            .map_or(false, |r| r.memory.is_start(addr))
    }

    /// Iterates over every object in every region.
    pub(crate) fn objects(&self) -> impl Iterator<Item = GcRef> + '_ {
        self.regions.iter().flat_map(Region::objects)
    }

    /// Bytes occupied by objects, slack included.
    pub(crate) fn used(&self) -> usize {
        self.live_bytes
    }

    /// Bytes of committed region memory.
    pub(crate) fn committed(&self) -> usize {
        self.committed
    }

    /// Bytes on the free lists of swept regions.
    pub(crate) fn free_bytes(&self) -> usize {
        self.regions.iter().map(|r| r.free.free_bytes()).sum()
    }

    /// Number of blocks on the free lists of swept regions.
    pub(crate) fn free_block_count(&self) -> usize {
        self.regions.iter().map(|r| r.free.block_count()).sum()
    }

    pub(crate) fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub(crate) fn is_sweeping(&self) -> bool {
        self.sweep.is_some()
    }

    /// Starts a sweep of every committed region.
    ///
    /// Free lists are dropped and rebuilt region by region; until a region
    /// is swept the allocator ignores it.
    pub(crate) fn begin_sweep(&mut self) {
        for region in &mut self.regions {
            region.swept = false;
            region.free.clear();
        }
        self.sweep = Some(SweepCursor::default());
    }

    /// Sweeps blocks until `budget` runs out or every region is swept.
    ///
    /// White objects are freed (`on_free` is called for each before its
    /// memory is reused), black objects are whitened for the next cycle.
    pub(crate) fn sweep_step(
        &mut self,
        budget: &mut WorkBudget,
        on_free: &mut dyn FnMut(GcRef),
    ) -> SweepProgress {
        let mut progress = SweepProgress::default();
        let Some(mut cursor) = self.sweep else {
            progress.done = true;
            return progress;
        };

        while cursor.region < self.regions.len() {
            let region = &mut self.regions[cursor.region];
            if region.swept {
                // Committed after the sweep started
                cursor.region += 1;
                continue;
            }

            let start = region.memory.start();
            let end = region.memory.end();
            while start + cursor.offset < end {
                if budget.exhausted() {
                    self.live_bytes -= progress.freed_bytes;
                    self.sweep = Some(cursor);
                    return progress;
                }
                let addr = start + cursor.offset;
                // SAFETY: regions are tiled by blocks and the marker is idle
                // while sweeping
                let header = unsafe { ObjectHeader::at(addr) };
                let step = header.block_size();
                if step < HEADER_SIZE || addr + step > end {
                    fatal(format_args!(
                        "sweep found block at {:#x} with size {} in region ending at {:#x}",
                        addr, step, end
                    ));
                }

                if header.is_free() {
                    cursor.run_start.get_or_insert(addr);
                } else {
                    match header.color() {
                        MarkColor::White => {
                            if let Some(obj) = GcRef::from_addr(addr) {
                                on_free(obj);
                            }
                            region.memory.clear_start(addr);
                            progress.freed_bytes += step;
                            progress.freed_objects += 1;
                            cursor.run_start.get_or_insert(addr);
                        }
                        MarkColor::Gray => fatal(format_args!(
                            "gray object {:#x} reached the sweeper",
                            addr
                        )),
                        MarkColor::Black => {
                            header.set_color(MarkColor::White);
                            cursor.region_live += step;
                            Self::flush_run(&mut region.free, &mut cursor.run_start, addr);
                        }
                    }
                }
                cursor.offset += step;
                budget.charge(1);
            }

            Self::flush_run(&mut region.free, &mut cursor.run_start, end);
            region.live_bytes = cursor.region_live;
            region.swept = true;
            cursor = SweepCursor {
                region: cursor.region + 1,
                ..SweepCursor::default()
            };
        }

        self.live_bytes -= progress.freed_bytes;
        self.sweep = None;
        progress.done = true;
        progress
    }

    fn flush_run(free: &mut FreeList, run_start: &mut Option<usize>, until: usize) {
        if let Some(start) = run_start.take() {
            // SAFETY: the run consists of free blocks and unreachable objects
            unsafe { ObjectHeader::init_free(start, until - start) };
            free.push(start, until - start);
        }
    }

    /// Sweeps whatever remains of the current sweep.
    pub(crate) fn finish_sweep(&mut self, on_free: &mut dyn FnMut(GcRef)) -> SweepProgress {
        self.sweep_step(&mut WorkBudget::unlimited(), on_free)
    }

    /// Releases fully empty regions, keeping at least one.
    ///
    /// Returns the number of bytes released.
    pub(crate) fn release_empty_regions(&mut self) -> usize {
        if self.sweep.is_some() {
            return 0;
        }
        let mut released = 0;
        let mut index = 0;
        self.regions.retain(|region| {
            let keep = index == 0 || region.live_bytes > 0;
            index += 1;
            if !keep {
                released += region.memory.capacity();
            }
            keep
        });
        self.committed -= released;
        if released > 0 {
            log::debug!(target: "gc", "released {}K of empty old-generation regions", released / 1024);
        }
        released
    }
}
