//! Integration test suite for the generational collector
//!
//! This crate provides shared fixtures for tests that drive `gengc` through
//! its public API only: a typed heap, list builders, and a shadow model of an
//! object graph that collections must preserve.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use gengc::{GcConfig, GcRef, Handle, Heap, LayoutRegistry, ObjectVisitor, TypeDescriptor, TypeTag};
use rand::rngs::StdRng;
use rand::Rng;

/// Re-export components for test convenience
pub mod components {
    pub use gc_types;
    pub use gengc;
}

/// Payload of a node: `next` reference, `other` reference, data word.
pub const NODE_PAYLOAD: usize = 24;
/// Offset of the `next` reference.
pub const NEXT: usize = 0;
/// Offset of the `other` reference.
pub const OTHER: usize = 8;
/// Offset of the data word.
pub const DATA: usize = 16;
/// Total size of a node, header included.
pub const NODE_SIZE: usize = gengc::HEADER_SIZE + NODE_PAYLOAD;

/// Initializes logging once per test binary. `RUST_LOG=gc=debug` shows
/// collector output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Type tags registered by [`registry`].
#[derive(Debug, Clone, Copy)]
pub struct Types {
    /// Two references and a data word
    pub node: TypeTag,
    /// Every payload word is a reference
    pub array: TypeTag,
}

/// Layout registry with the test object types.
pub fn registry() -> (LayoutRegistry, Types) {
    let mut registry = LayoutRegistry::new();
    let node = registry.register(TypeDescriptor::with_offsets("node", &[NEXT, OTHER]));
    let array = registry.register(TypeDescriptor::reference_array("array"));
    (registry, Types { node, array })
}

/// Builds a heap over the test types.
pub fn heap_with(config: GcConfig) -> (Heap, Types) {
    init_logging();
    let (registry, types) = registry();
    let heap = Heap::new(config, Arc::new(registry) as Arc<dyn ObjectVisitor>)
        .unwrap_or_else(|err| panic!("heap construction failed: {}", err));
    (heap, types)
}

/// Allocates a node carrying `data`.
pub fn new_node(heap: &mut Heap, types: Types, data: usize) -> GcRef {
    let node = heap.allocate_typed(types.node, NODE_PAYLOAD).unwrap();
    heap.write_word(node, DATA, data).unwrap();
    node
}

/// Builds a list of `len` nodes linked through `next`, with data `0..len`.
///
/// Only the head is rooted while building; returns the head handle.
pub fn build_list(heap: &mut Heap, types: Types, len: usize) -> Handle {
    let head = new_node(heap, types, 0);
    let root = heap.new_handle(Some(head));
    let tail_root = heap.new_handle(Some(head));
    for data in 1..len {
        let node = new_node(heap, types, data);
        let tail = heap.get_handle(tail_root).unwrap().unwrap();
        heap.write_field(tail, NEXT, Some(node)).unwrap();
        heap.set_handle(tail_root, Some(node)).unwrap();
    }
    heap.release_handle(tail_root).unwrap();
    root
}

/// Data words of a `next`-linked list, in order.
pub fn list_data(heap: &Heap, head: Option<GcRef>) -> Vec<usize> {
    let mut data = Vec::new();
    let mut current = head;
    while let Some(node) = current {
        data.push(heap.read_word(node, DATA).unwrap());
        current = heap.read_field(node, NEXT).unwrap();
    }
    data
}

/// Shadow model of a rooted graph of nodes, identified by their data word.
///
/// Mutations are applied to the heap and the model together; the heap must
/// agree with the model after any sequence of collections.
#[derive(Debug, Default)]
pub struct GraphModel {
    /// `[next, other]` of every node ever created
    pub edges: HashMap<usize, [Option<usize>; 2]>,
    /// Rooted node of each handle
    pub roots: Vec<(Handle, Option<usize>)>,
    next_id: usize,
}

impl GraphModel {
    /// Creates a random graph of `nodes` nodes with `roots` root handles.
    pub fn random(heap: &mut Heap, types: Types, rng: &mut StdRng, nodes: usize, roots: usize) -> Self {
        let mut model = GraphModel::default();
        for _ in 0..roots {
            let handle = heap.new_handle(None);
            model.roots.push((handle, None));
        }
        for _ in 0..nodes {
            model.add_node(heap, types, rng);
        }
        for _ in 0..nodes {
            model.mutate(heap, rng);
        }
        model
    }

    /// Allocates a node and links it from a random root or reachable node.
    pub fn add_node(&mut self, heap: &mut Heap, types: Types, rng: &mut StdRng) {
        let id = self.next_id;
        self.next_id += 1;
        let node = new_node(heap, types, id);
        self.edges.insert(id, [None, None]);

        let reachable: Vec<usize> = self.reachable().into_iter().collect();
        if reachable.is_empty() || rng.gen_bool(0.2) {
            let index = rng.gen_range(0..self.roots.len());
            heap.set_handle(self.roots[index].0, Some(node)).unwrap();
            self.roots[index].1 = Some(id);
        } else {
            let holder_id = reachable[rng.gen_range(0..reachable.len())];
            let field = rng.gen_range(0..2);
            let refs = self.locate(heap);
            heap.write_field(refs[&holder_id], field * 8, Some(node)).unwrap();
            self.set_edge(holder_id, field, Some(id));
        }
    }

    /// Rewrites one field of a random reachable node to another reachable
    /// node or null.
    pub fn mutate(&mut self, heap: &mut Heap, rng: &mut StdRng) {
        let refs = self.locate(heap);
        if refs.is_empty() {
            return;
        }
        let ids: Vec<usize> = refs.keys().copied().collect();
        let holder = ids[rng.gen_range(0..ids.len())];
        let field = rng.gen_range(0..2);
        let target = if rng.gen_bool(0.25) {
            None
        } else {
            Some(ids[rng.gen_range(0..ids.len())])
        };
        heap.write_field(refs[&holder], field * 8, target.map(|id| refs[&id]))
            .unwrap();
        self.set_edge(holder, field, target);
    }

    /// Drops or retargets a random root.
    pub fn mutate_root(&mut self, heap: &mut Heap, rng: &mut StdRng) {
        let refs = self.locate(heap);
        let index = rng.gen_range(0..self.roots.len());
        let target = if refs.is_empty() || rng.gen_bool(0.5) {
            None
        } else {
            let ids: Vec<usize> = refs.keys().copied().collect();
            Some(ids[rng.gen_range(0..ids.len())])
        };
        heap.set_handle(self.roots[index].0, target.map(|id| refs[&id]))
            .unwrap();
        self.roots[index].1 = target;
    }

    fn set_edge(&mut self, holder: usize, field: usize, target: Option<usize>) {
        if let Some(edges) = self.edges.get_mut(&holder) {
            edges[field] = target;
        }
    }

    /// Ids reachable from the roots according to the model.
    pub fn reachable(&self) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.roots.iter().filter_map(|(_, id)| *id).collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            for child in self.edges[&id].iter().flatten() {
                queue.push_back(*child);
            }
        }
        seen
    }

    /// Current address of every node reachable in the heap, by id.
    ///
    /// Valid until the next allocation or collection.
    pub fn locate(&self, heap: &Heap) -> HashMap<usize, GcRef> {
        let mut found = HashMap::new();
        let mut queue: VecDeque<GcRef> = self
            .roots
            .iter()
            .filter_map(|(handle, _)| heap.get_handle(*handle).unwrap())
            .collect();
        while let Some(obj) = queue.pop_front() {
            let id = heap.read_word(obj, DATA).unwrap();
            if found.insert(id, obj).is_some() {
                continue;
            }
            for offset in [NEXT, OTHER] {
                if let Some(child) = heap.read_field(obj, offset).unwrap() {
                    queue.push_back(child);
                }
            }
        }
        found
    }

    /// Asserts that the heap graph reachable from the roots matches the model.
    pub fn check(&self, heap: &Heap) {
        let refs = self.locate(heap);
        let expected = self.reachable();
        let actual: HashSet<usize> = refs.keys().copied().collect();
        assert_eq!(actual, expected, "reachable sets differ");

        for (handle, id) in &self.roots {
            let obj = heap.get_handle(*handle).unwrap();
            let actual = obj.map(|obj| heap.read_word(obj, DATA).unwrap());
            assert_eq!(actual, *id, "root {:?} differs", handle);
        }
        for (id, obj) in &refs {
            for (field, offset) in [NEXT, OTHER].into_iter().enumerate() {
                let child = heap.read_field(*obj, offset).unwrap();
                let actual = child.map(|child| heap.read_word(child, DATA).unwrap());
                assert_eq!(actual, self.edges[id][field], "field {} of node {} differs", offset, id);
            }
        }
    }
}
