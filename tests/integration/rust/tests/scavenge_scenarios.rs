//! Scavenger Integration Tests
//!
//! Young-generation collections driven through the public heap API: what
//! survives, what is reclaimed, promotion, and old-to-young references.

use std::sync::Arc;

use gengc::{CollectionKind, GcConfig, GcEvent, Generation, RecordingSink};
use integration_tests::{build_list, heap_with, list_data, new_node, DATA, NEXT, NODE_SIZE};

/// Test: a list whose only rooted node is the tail reclaims everything else
#[test]
fn test_scavenge_reclaims_unrooted_list_prefix() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(64 * 1024));
    let sink = Arc::new(RecordingSink::new());
    heap.set_telemetry(sink.clone());

    let mut tail = None;
    let mut prev = None;
    let tail_root = heap.new_handle(None);
    for data in 0..1000 {
        let node = new_node(&mut heap, types, data);
        if let Some(prev) = prev {
            heap.write_field(prev, NEXT, Some(node)).unwrap();
        }
        prev = Some(node);
        tail = Some(node);
    }
    heap.set_handle(tail_root, tail).unwrap();
    assert_eq!(heap.young_used(), 1000 * NODE_SIZE);
    assert_eq!(heap.stats().scavenges, 0, "1000 nodes fit in one semi-space");

    heap.scavenge();

    let ends = sink.cycle_ends(CollectionKind::Scavenge);
    match &ends[..] {
        [GcEvent::CycleEnd { bytes_reclaimed, .. }] => {
            assert_eq!(*bytes_reclaimed, 999 * NODE_SIZE);
        }
        other => panic!("expected one scavenge, got {:?}", other),
    }
    let tail = heap.get_handle(tail_root).unwrap().unwrap();
    assert_eq!(heap.read_word(tail, DATA).unwrap(), 999);
    assert_eq!(heap.read_field(tail, NEXT).unwrap(), None);
}

/// Test: a rooted list survives repeated scavenges with its contents intact
#[test]
fn test_rooted_list_survives_scavenges() {
    let config = GcConfig {
        promotion_age_threshold: 4,
        ..GcConfig::with_young_space_size(64 * 1024)
    };
    let (mut heap, types) = heap_with(config);
    let root = build_list(&mut heap, types, 200);

    for round in 1..=5 {
        heap.scavenge();
        let head = heap.get_handle(root).unwrap();
        assert_eq!(list_data(&heap, head), (0..200).collect::<Vec<_>>());
        let expected = if round < 4 { Generation::Young } else { Generation::Old };
        assert_eq!(heap.generation_of(head.unwrap()), Some(expected), "round {}", round);
    }
    assert_eq!(heap.stats().objects_promoted, 200);
    assert_eq!(heap.young_used(), 0);
}

/// Test: an old object's young child is kept alive only through the remembered set
#[test]
fn test_remembered_set_keeps_young_child_alive() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(64 * 1024));
    let parent = new_node(&mut heap, types, 1);
    let root = heap.new_handle(Some(parent));
    heap.scavenge();
    let parent = heap.get_handle(root).unwrap().unwrap();
    assert_eq!(heap.generation_of(parent), Some(Generation::Old));

    let child = new_node(&mut heap, types, 2);
    heap.write_field(parent, NEXT, Some(child)).unwrap();
    assert_eq!(heap.remembered_set().len(), 1);

    heap.scavenge();
    let child = heap.read_field(parent, NEXT).unwrap().unwrap();
    assert_eq!(heap.read_word(child, DATA).unwrap(), 2);
}

/// Test: overwriting the old-to-young field lets the child die
#[test]
fn test_stale_remembered_entry_is_dropped() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(64 * 1024));
    let parent = new_node(&mut heap, types, 1);
    let root = heap.new_handle(Some(parent));
    heap.scavenge();
    let parent = heap.get_handle(root).unwrap().unwrap();

    let child = new_node(&mut heap, types, 2);
    heap.write_field(parent, NEXT, Some(child)).unwrap();
    heap.write_field(parent, NEXT, None).unwrap();
    let promoted_before = heap.stats().objects_promoted;

    heap.scavenge();
    assert!(heap.remembered_set().is_empty());
    assert_eq!(heap.stats().objects_promoted, promoted_before);
    assert_eq!(heap.young_used(), 0);
}

/// Test: objects above the large-object threshold skip the young generation
#[test]
fn test_large_array_is_pretenured_and_traced() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(16 * 1024));
    let array = heap.allocate_typed(types.array, 8 * 1024).unwrap();
    assert_eq!(heap.generation_of(array), Some(Generation::Old));
    let root = heap.new_handle(Some(array));

    let element = new_node(&mut heap, types, 77);
    let array = heap.get_handle(root).unwrap().unwrap();
    heap.write_field(array, 8 * 1023, Some(element)).unwrap();
    heap.scavenge();

    let array = heap.get_handle(root).unwrap().unwrap();
    let element = heap.read_field(array, 8 * 1023).unwrap().unwrap();
    assert_eq!(heap.read_word(element, DATA).unwrap(), 77);
}

/// Test: filling the young generation repeatedly scavenges without losing roots
#[test]
fn test_allocation_pressure_triggers_scavenges() {
    let (mut heap, types) = heap_with(GcConfig::with_young_space_size(8 * 1024));
    let root = build_list(&mut heap, types, 20);
    for data in 0..10_000 {
        new_node(&mut heap, types, data);
    }
    assert!(heap.stats().scavenges >= 10_000 * NODE_SIZE / (8 * 1024) - 1);
    let head = heap.get_handle(root).unwrap();
    assert_eq!(list_data(&heap, head), (0..20).collect::<Vec<_>>());
}
