//! Synthetic allocation workloads
//!
//! Every workload only keeps references across allocations through handles,
//! since any allocation may move young objects. Each returns a checksum
//! computed by walking its surviving objects, so a collector bug that loses
//! or corrupts an object changes the result.

use clap::ValueEnum;
use gc_types::{GcRef, Handle, LayoutRegistry, TypeDescriptor, TypeTag, WORD_SIZE};
use gengc::{GcResult, Heap};
use serde::{Deserialize, Serialize};

/// Payload of a node: two references and a data word.
pub const NODE_PAYLOAD: usize = 3 * WORD_SIZE;
/// Offset of the `next` (or `left`) reference.
pub const NEXT: usize = 0;
/// Offset of the `other` (or `right`) reference.
pub const OTHER: usize = WORD_SIZE;
/// Offset of the data word.
pub const DATA: usize = 2 * WORD_SIZE;

/// Reference slots in the `churn` table.
pub const TABLE_SLOTS: usize = 1024;

const GARBAGE_PER_NODE: usize = 9;
const SAFEPOINT_INTERVAL: usize = 64;
const MIN_TREE_DEPTH: usize = 4;

/// Object types used by the workloads.
#[derive(Debug, Clone, Copy)]
pub struct BenchTypes {
    /// Two references and a data word
    pub node: TypeTag,
    /// Every payload word is a reference
    pub table: TypeTag,
}

/// Layout registry with the workload types.
pub fn registry() -> (LayoutRegistry, BenchTypes) {
    let mut registry = LayoutRegistry::new();
    let node = registry.register(TypeDescriptor::with_offsets("node", &[NEXT, OTHER]));
    let table = registry.register(TypeDescriptor::reference_array("table"));
    (registry, BenchTypes { node, table })
}

/// A synthetic workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    /// Long list built between bursts of garbage
    LinkedList,
    /// Short-lived trees next to a long-lived tree
    BinaryTrees,
    /// Old table overwritten with young objects
    Churn,
}

impl Workload {
    /// Name as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Workload::LinkedList => "linked-list",
            Workload::BinaryTrees => "binary-trees",
            Workload::Churn => "churn",
        }
    }

    /// Default size: list length, maximum tree depth, or table rounds.
    pub fn default_size(self) -> usize {
        match self {
            Workload::LinkedList => 100_000,
            Workload::BinaryTrees => 12,
            Workload::Churn => 50,
        }
    }

    /// Runs one iteration and returns its checksum.
    pub fn run_once(self, heap: &mut Heap, types: BenchTypes, size: usize) -> GcResult<usize> {
        match self {
            Workload::LinkedList => linked_list(heap, types, size),
            Workload::BinaryTrees => binary_trees(heap, types, size),
            Workload::Churn => churn(heap, types, size),
        }
    }

    /// Checksum a correct run of [`Workload::run_once`] returns.
    pub fn expected_checksum(self, size: usize) -> usize {
        match self {
            Workload::LinkedList => size * size.saturating_sub(1) / 2,
            Workload::BinaryTrees => {
                let max_depth = size.max(MIN_TREE_DEPTH + 2);
                let tree_nodes = |depth: usize| (1 << (depth + 1)) - 1;
                let temporary: usize = (MIN_TREE_DEPTH..=max_depth)
                    .step_by(2)
                    .map(|depth| (1 << (max_depth - depth + MIN_TREE_DEPTH)) * tree_nodes(depth))
                    .sum();
                temporary + tree_nodes(max_depth)
            }
            Workload::Churn => {
                let last_round = size.saturating_sub(1) * TABLE_SLOTS;
                (0..TABLE_SLOTS).map(|slot| last_round + slot).sum()
            }
        }
    }
}

fn new_node(heap: &mut Heap, types: BenchTypes, data: usize) -> GcResult<GcRef> {
    let node = heap.allocate_typed(types.node, NODE_PAYLOAD)?;
    heap.write_word(node, DATA, data)?;
    Ok(node)
}

/// Builds a list of `len` nodes with data `0..len`, allocating nine garbage
/// nodes before each list node. Returns the sum of the list data.
pub fn linked_list(heap: &mut Heap, types: BenchTypes, len: usize) -> GcResult<usize> {
    if len == 0 {
        return Ok(0);
    }
    let head = new_node(heap, types, 0)?;
    let root = heap.new_handle(Some(head));
    let tail = heap.new_handle(Some(head));
    for data in 1..len {
        for _ in 0..GARBAGE_PER_NODE {
            new_node(heap, types, usize::MAX)?;
        }
        let node = new_node(heap, types, data)?;
        if let Some(last) = heap.get_handle(tail)? {
            heap.write_field(last, NEXT, Some(node))?;
        }
        heap.set_handle(tail, Some(node))?;
        if data % SAFEPOINT_INTERVAL == 0 {
            heap.safepoint();
        }
    }
    heap.release_handle(tail)?;

    let mut sum = 0;
    let mut current = heap.get_handle(root)?;
    while let Some(node) = current {
        sum += heap.read_word(node, DATA)?;
        current = heap.read_field(node, NEXT)?;
    }
    heap.release_handle(root)?;
    Ok(sum)
}

fn bottom_up_tree(heap: &mut Heap, types: BenchTypes, depth: usize) -> GcResult<Handle> {
    let node = new_node(heap, types, depth)?;
    let handle = heap.new_handle(Some(node));
    if depth > 0 {
        for offset in [NEXT, OTHER] {
            let child = bottom_up_tree(heap, types, depth - 1)?;
            let child_ref = heap.get_handle(child)?;
            if let Some(node) = heap.get_handle(handle)? {
                heap.write_field(node, offset, child_ref)?;
            }
            heap.release_handle(child)?;
        }
    }
    Ok(handle)
}

fn item_check(heap: &Heap, node: GcRef) -> GcResult<usize> {
    let mut count = 1;
    for offset in [NEXT, OTHER] {
        if let Some(child) = heap.read_field(node, offset)? {
            count += item_check(heap, child)?;
        }
    }
    Ok(count)
}

fn check_tree(heap: &mut Heap, tree: Handle) -> GcResult<usize> {
    let count = match heap.get_handle(tree)? {
        Some(root) => item_check(heap, root)?,
        None => 0,
    };
    heap.release_handle(tree)?;
    Ok(count)
}

/// Allocates short-lived trees of increasing depth while one tree of
/// `max_depth` stays alive. Returns the number of tree nodes visited.
pub fn binary_trees(heap: &mut Heap, types: BenchTypes, max_depth: usize) -> GcResult<usize> {
    let max_depth = max_depth.max(MIN_TREE_DEPTH + 2);
    let long_lived = bottom_up_tree(heap, types, max_depth)?;

    let mut checks = 0;
    for depth in (MIN_TREE_DEPTH..=max_depth).step_by(2) {
        let iterations = 1 << (max_depth - depth + MIN_TREE_DEPTH);
        for _ in 0..iterations {
            let tree = bottom_up_tree(heap, types, depth)?;
            checks += check_tree(heap, tree)?;
            heap.safepoint();
        }
        log::debug!(target: "gc_bench", "{} trees of depth {} checked", iterations, depth);
    }
    checks += check_tree(heap, long_lived)?;
    Ok(checks)
}

/// Promotes a table of [`TABLE_SLOTS`] references to the old generation and
/// overwrites every slot with a fresh node `rounds` times. Returns the sum
/// of the data left in the table.
pub fn churn(heap: &mut Heap, types: BenchTypes, rounds: usize) -> GcResult<usize> {
    let table = heap.allocate_typed(types.table, TABLE_SLOTS * WORD_SIZE)?;
    let root = heap.new_handle(Some(table));
    heap.collect_full();

    for round in 0..rounds {
        for slot in 0..TABLE_SLOTS {
            let node = new_node(heap, types, round * TABLE_SLOTS + slot)?;
            if let Some(table) = heap.get_handle(root)? {
                heap.write_field(table, slot * WORD_SIZE, Some(node))?;
            }
            if slot % SAFEPOINT_INTERVAL == 0 {
                heap.safepoint();
            }
        }
    }

    let mut sum = 0;
    if let Some(table) = heap.get_handle(root)? {
        for slot in 0..TABLE_SLOTS {
            if let Some(node) = heap.read_field(table, slot * WORD_SIZE)? {
                sum += heap.read_word(node, DATA)?;
            }
        }
    }
    heap.release_handle(root)?;
    Ok(sum)
}
