//! Mark-Sweep Integration Tests
//!
//! Full stop-the-world collections of both generations: cycle collection,
//! region release and out-of-memory reporting.

use std::sync::Arc;

use gengc::{CollectionKind, GcConfig, GcError, GcEvent, Generation, RecordingSink};
use integration_tests::{build_list, heap_with, list_data, new_node, DATA, NEXT, NODE_SIZE, OTHER};

/// Test: a two-node cycle in the old generation is reclaimed once unrooted
#[test]
fn test_old_cycle_is_reclaimed() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(64 * 1024));
    let a = new_node(&mut heap, types, 1);
    let b = new_node(&mut heap, types, 2);
    heap.write_field(a, NEXT, Some(b)).unwrap();
    heap.write_field(b, NEXT, Some(a)).unwrap();
    let root = heap.new_handle(Some(a));
    heap.scavenge();

    let a = heap.get_handle(root).unwrap().unwrap();
    let b = heap.read_field(a, NEXT).unwrap().unwrap();
    assert_eq!(heap.generation_of(a), Some(Generation::Old));
    assert_eq!(heap.generation_of(b), Some(Generation::Old));
    assert_eq!(heap.read_field(b, NEXT).unwrap(), Some(a));

    let sink = Arc::new(RecordingSink::new());
    heap.set_telemetry(sink.clone());
    heap.set_handle(root, None).unwrap();
    heap.collect_full();

    assert_eq!(heap.old_object_count(), 0);
    assert_eq!(heap.old_used(), 0);
    match &sink.cycle_ends(CollectionKind::Full)[..] {
        [GcEvent::CycleEnd { bytes_reclaimed, .. }] => assert_eq!(*bytes_reclaimed, 2 * NODE_SIZE),
        other => panic!("expected one full collection, got {:?}", other),
    }
}

/// Test: a full collection keeps everything reachable and promotes all survivors
#[test]
fn test_full_collection_preserves_reachable_graph() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(64 * 1024));
    let root = build_list(&mut heap, types, 100);
    // Cross links from every node to the head
    let head = heap.get_handle(root).unwrap();
    let mut current = head;
    while let Some(node) = current {
        heap.write_field(node, OTHER, head).unwrap();
        current = heap.read_field(node, NEXT).unwrap();
    }
    for data in 0..500 {
        new_node(&mut heap, types, 1000 + data);
    }

    heap.collect_full();

    assert_eq!(heap.young_used(), 0);
    assert_eq!(heap.old_object_count(), 100);
    let head = heap.get_handle(root).unwrap();
    assert_eq!(list_data(&heap, head), (0..100).collect::<Vec<_>>());
    let tail_other = {
        let mut current = head;
        let mut last = None;
        while let Some(node) = current {
            last = Some(node);
            current = heap.read_field(node, NEXT).unwrap();
        }
        heap.read_field(last.unwrap(), OTHER).unwrap()
    };
    assert_eq!(tail_other, head);
}

/// Test: garbage in extra regions is released back after a full collection
#[test]
fn test_empty_regions_released() {
    let config = GcConfig {
        old_region_size: 4096,
        old_gen_max_size: 1024 * 1024,
        old_gen_trigger_occupancy: 1.0,
        ..GcConfig::with_young_space_size(8 * 1024)
    };
    let (mut heap, _) = heap_with(config);
    // Above the 2 KiB large-object threshold: one object per region
    let keep = heap.allocate(3000).unwrap();
    let root = heap.new_handle(Some(keep));
    for _ in 0..20 {
        heap.allocate(3000).unwrap();
    }
    assert!(heap.old_region_count() > 10);

    heap.collect_full();
    assert!(heap.old_region_count() <= 2);
    assert!(heap.get_handle(root).unwrap().is_some());
}

/// Test: out-of-memory is reported only when live data exceeds the old generation
#[test]
fn test_out_of_memory_after_full_collection() {
    let config = GcConfig {
        old_region_size: 4096,
        old_gen_max_size: 16 * 1024,
        ..GcConfig::with_young_space_size(4096)
    };
    let (mut heap, types) = heap_with(config);
    let mut live = Vec::new();
    let error = loop {
        match heap.allocate_typed(types.node, 24) {
            Ok(obj) => live.push(heap.new_handle(Some(obj))),
            Err(err) => break err,
        }
        assert!(live.len() < 10_000, "old generation limit never reached");
    };
    assert!(matches!(error, GcError::OutOfMemory { .. }));

    // Dropping the roots makes the heap usable again
    for handle in live.drain(..) {
        heap.release_handle(handle).unwrap();
    }
    let obj = heap.allocate_typed(types.node, 24).unwrap();
    heap.write_word(obj, DATA, 5).unwrap();
    assert_eq!(heap.read_word(obj, DATA).unwrap(), 5);
}

/// Test: unreachable old objects referencing young objects do not keep them alive
#[test]
fn test_dead_old_holder_releases_young_child() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(64 * 1024));
    let holder = new_node(&mut heap, types, 1);
    let root = heap.new_handle(Some(holder));
    heap.scavenge();
    let holder = heap.get_handle(root).unwrap().unwrap();
    let child = new_node(&mut heap, types, 2);
    heap.write_field(holder, NEXT, Some(child)).unwrap();
    assert!(heap.remembered_set().contains_holder(holder));

    heap.release_handle(root).unwrap();
    heap.collect_full();
    assert!(heap.remembered_set().is_empty());
    assert_eq!(heap.old_object_count(), 0);
}

/// Old generation of one 4 KiB region with three 1128-byte objects pretenured
/// into it, leaving a 712-byte tail.
fn nearly_full_old_generation() -> (gengc::Heap, integration_tests::Types, Vec<gengc::Handle>) {
    let config = GcConfig {
        old_region_size: 4096,
        old_gen_max_size: 4096,
        old_gen_trigger_occupancy: 1.0,
        ..GcConfig::with_young_space_size(4096)
    };
    let (mut heap, types) = heap_with(config);
    let mut handles = Vec::new();
    for _ in 0..3 {
        let obj = heap.allocate(1104).unwrap();
        assert_eq!(heap.generation_of(obj), Some(Generation::Old));
        handles.push(heap.new_handle(Some(obj)));
    }
    assert_eq!(heap.old_used(), 3 * 1128);
    (heap, types, handles)
}

/// Test: survivors that cannot be promoted stay young and stay linked
#[test]
fn test_promotion_failure_keeps_survivors_in_young_space() {
    let (mut heap, types, _pretenured) = nearly_full_old_generation();
    let root = build_list(&mut heap, types, 20);

    heap.scavenge();
    let promoted = heap.old_object_count() - 3;
    assert!(promoted > 0 && promoted < 20, "promoted {} of 20", promoted);
    assert_eq!(heap.young_object_count(), 20 - promoted);
    assert_eq!(heap.young_used(), (20 - promoted) * NODE_SIZE);
    assert_eq!(list_data(&heap, heap.get_handle(root).unwrap()), (0..20).collect::<Vec<_>>());
    // Promoted nodes point at the ones left behind
    assert!(!heap.remembered_set().is_empty());

    heap.scavenge();
    assert_eq!(list_data(&heap, heap.get_handle(root).unwrap()), (0..20).collect::<Vec<_>>());
}

/// Test: when a full collection's promotion fails for lack of old space, the
/// sweep's reclaimed memory still takes the survivors
#[test]
fn test_allocation_after_full_collection_with_failed_promotion() {
    let (mut heap, _, pretenured) = nearly_full_old_generation();
    for handle in pretenured {
        heap.release_handle(handle).unwrap();
    }
    // Four rooted objects fill the young semi-space; none fits in the 712-byte tail
    let mut roots = Vec::new();
    for data in 0..4 {
        let obj = heap.allocate(976).unwrap();
        assert!(heap.is_young(obj));
        heap.write_word(obj, 0, data).unwrap();
        roots.push(heap.new_handle(Some(obj)));
    }
    assert_eq!(heap.young_used(), 4000);

    let sink = Arc::new(RecordingSink::new());
    heap.set_telemetry(sink.clone());
    let fifth = heap.allocate(976).unwrap();

    assert!(heap.is_young(fifth));
    assert_eq!(heap.stats().full_collections, 1);
    match &sink.cycle_ends(CollectionKind::Full)[..] {
        [GcEvent::CycleEnd { bytes_reclaimed, .. }] => assert_eq!(*bytes_reclaimed, 3 * 1128),
        other => panic!("expected one full collection, got {:?}", other),
    }
    assert_eq!(heap.old_object_count(), 4);
    for (data, handle) in roots.iter().enumerate() {
        let obj = heap.get_handle(*handle).unwrap().unwrap();
        assert_eq!(heap.generation_of(obj), Some(Generation::Old));
        assert_eq!(heap.read_word(obj, 0).unwrap(), data);
    }
}
