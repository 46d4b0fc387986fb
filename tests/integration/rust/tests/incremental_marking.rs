//! Incremental Marking Integration Tests
//!
//! Old-generation cycles advanced in bounded steps while the mutator keeps
//! allocating and storing references.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gengc::{
    CollectionKind, GcConfig, GcPhase, GcRef, LayoutRegistry, MarkColor, ObjectView,
    ObjectVisitor, RecordingSink, Slot, TypeTag,
};
use integration_tests::{build_list, heap_with, list_data, new_node, registry, Types, DATA, NEXT, NODE_PAYLOAD};

/// Visitor that remembers every object it was asked to trace.
struct RecordingVisitor {
    inner: LayoutRegistry,
    visited: Mutex<HashSet<GcRef>>,
}

impl ObjectVisitor for RecordingVisitor {
    fn for_each_reference(&self, object: &ObjectView, visit: &mut dyn FnMut(Slot)) {
        self.visited.lock().unwrap().insert(object.object);
        self.inner.for_each_reference(object, visit);
    }

    fn knows_type(&self, tag: TypeTag) -> bool {
        self.inner.knows_type(tag)
    }

    // Field checks are not traces
    fn is_reference(&self, object: &ObjectView, offset: usize) -> bool {
        self.inner.is_reference(object, offset)
    }
}

fn recording_heap(config: GcConfig) -> (gengc::Heap, Types, Arc<RecordingVisitor>) {
    integration_tests::init_logging();
    let (inner, types) = registry();
    let visitor = Arc::new(RecordingVisitor {
        inner,
        visited: Mutex::new(HashSet::new()),
    });
    let heap = gengc::Heap::new(config, visitor.clone()).unwrap();
    (heap, types, visitor)
}

/// Test: an object allocated mid-cycle is black, never traced, and survives
#[test]
fn test_object_allocated_during_marking_is_black() {
    let config = GcConfig {
        min_objects_per_step: 1,
        ..GcConfig::with_young_space_size(256 * 1024)
    };
    let (mut heap, types, visitor) = recording_heap(config);
    let root = build_list(&mut heap, types, 50);
    heap.collect_full();

    heap.start_cycle().unwrap();
    heap.step(Duration::ZERO);
    assert_eq!(heap.phase(), GcPhase::Marking);

    let x = heap.allocate_typed(types.node, NODE_PAYLOAD).unwrap();
    heap.write_word(x, DATA, 4242).unwrap();
    let x_root = heap.new_handle(Some(x));
    assert_eq!(heap.color_of(x), Some(MarkColor::Black));
    visitor.visited.lock().unwrap().clear();

    while heap.step(Duration::ZERO) != GcPhase::Idle {}

    assert!(!visitor.visited.lock().unwrap().contains(&x));
    let x = heap.get_handle(x_root).unwrap().unwrap();
    assert_eq!(heap.read_word(x, DATA).unwrap(), 4242);
    let head = heap.get_handle(root).unwrap();
    assert_eq!(list_data(&heap, head).len(), 50);
}

/// Test: bounded steps make progress and the cycle ends in one CycleEnd event
#[test]
fn test_stepwise_cycle_completes() {
    let config = GcConfig {
        min_objects_per_step: 10,
        verify_heap: true,
        ..GcConfig::with_young_space_size(256 * 1024)
    };
    let (mut heap, types) = heap_with(config);
    let sink = Arc::new(RecordingSink::new());
    heap.set_telemetry(sink.clone());
    let root = build_list(&mut heap, types, 1000);
    for data in 0..1000 {
        new_node(&mut heap, types, data);
    }
    heap.collect_full();
    let old_before = heap.old_used();

    heap.start_cycle().unwrap();
    let mut steps = 0;
    while heap.step(Duration::ZERO) != GcPhase::Idle {
        steps += 1;
        assert!(steps < 100_000);
    }
    assert!(steps >= 1000 / 10);
    assert_eq!(heap.old_used(), old_before);
    assert_eq!(sink.cycle_ends(CollectionKind::Incremental).len(), 1);
    let head = heap.get_handle(root).unwrap();
    assert_eq!(list_data(&heap, head), (0..1000).collect::<Vec<_>>());
}

/// Test: the mutator rearranges a list while it is being marked
#[test]
fn test_mutation_during_marking_preserves_list() {
    let config = GcConfig {
        min_objects_per_step: 5,
        verify_heap: true,
        ..GcConfig::with_young_space_size(64 * 1024)
    };
    let (mut heap, types) = heap_with(config);
    let root = build_list(&mut heap, types, 300);
    heap.collect_full();

    heap.start_cycle().unwrap();
    let mut phase = heap.step(Duration::ZERO);
    let mut reversed = 0;
    while phase == GcPhase::Marking || phase == GcPhase::Remark {
        // Move the node after the head to the front
        let head = heap.get_handle(root).unwrap().unwrap();
        if let Some(second) = heap.read_field(head, NEXT).unwrap() {
            let third = heap.read_field(second, NEXT).unwrap();
            heap.write_field(head, NEXT, third).unwrap();
            heap.write_field(second, NEXT, Some(head)).unwrap();
            heap.set_handle(root, Some(second)).unwrap();
            reversed += 1;
        }
        // Fresh young nodes hang off the head as well
        let extra = new_node(&mut heap, types, 10_000 + reversed);
        let head = heap.get_handle(root).unwrap().unwrap();
        heap.write_field(head, integration_tests::OTHER, Some(extra)).unwrap();
        phase = heap.step(Duration::ZERO);
    }
    heap.finish_cycle();
    heap.collect_full();

    assert!(reversed > 0);
    let head = heap.get_handle(root).unwrap();
    let mut data = list_data(&heap, head);
    data.sort_unstable();
    assert_eq!(data, (0..300).collect::<Vec<_>>());
    let head = head.unwrap();
    let extra = heap.read_field(head, integration_tests::OTHER).unwrap().unwrap();
    assert_eq!(heap.read_word(extra, DATA).unwrap(), 10_000 + reversed);
}

/// Test: promotion past the trigger starts a cycle that safepoints finish
#[test]
fn test_occupancy_trigger_and_safepoints() {
    let config = GcConfig {
        old_region_size: 16 * 1024,
        old_gen_max_size: 256 * 1024,
        old_gen_trigger_occupancy: 0.25,
        ..GcConfig::with_young_space_size(16 * 1024)
    };
    let (mut heap, types) = heap_with(config);
    let sink = Arc::new(RecordingSink::new());
    heap.set_telemetry(sink.clone());

    // Survivors are promoted on their first scavenge; keep a rolling window
    // of 200 live nodes so old garbage accumulates
    let window: Vec<_> = (0..200).map(|_| heap.new_handle(None)).collect();
    let mut data = 0;
    while heap.stats().incremental_cycles == 0 {
        let node = new_node(&mut heap, types, data);
        heap.set_handle(window[data % window.len()], Some(node)).unwrap();
        data += 1;
        heap.safepoint();
        assert!(data < 1_000_000, "no cycle completed");
    }
    assert!(heap.old_used() <= heap.config().old_gen_max_size);
    for handle in &window {
        let node = heap.get_handle(*handle).unwrap().unwrap();
        let value = heap.read_word(node, DATA).unwrap();
        assert_eq!(value % window.len(), window.iter().position(|h| h == handle).unwrap());
    }
    let ends = sink.cycle_ends(CollectionKind::Incremental);
    assert_eq!(ends.len(), 1);
}
