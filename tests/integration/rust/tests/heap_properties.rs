//! Heap Property Tests
//!
//! Random object graphs are mutated alongside a shadow model while each
//! collector runs; afterwards the heap graph reachable from the roots must
//! match the model exactly, and nothing unreachable may survive a full
//! collection.

use std::time::{Duration, Instant};

use gengc::{GcConfig, GcPhase, Heap};
use integration_tests::{heap_with, GraphModel, Types};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEEDS: [u64; 4] = [1, 7, 42, 2024];

/// Applies one random mutator action.
fn mutate(model: &mut GraphModel, heap: &mut Heap, types: Types, rng: &mut StdRng) {
    match rng.gen_range(0..10) {
        0..=3 => model.add_node(heap, types, rng),
        4..=8 => model.mutate(heap, rng),
        _ => model.mutate_root(heap, rng),
    }
}

fn assert_no_floating_garbage(model: &GraphModel, heap: &mut Heap) {
    heap.collect_full();
    model.check(heap);
    assert_eq!(heap.young_object_count(), 0);
    assert_eq!(heap.old_object_count(), model.reachable().len());
}

/// Property: scavenges and full collections preserve the reachable graph
#[test]
fn test_stop_the_world_preserves_graph() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = GcConfig {
            promotion_age_threshold: 2,
            ..GcConfig::with_young_space_size(16 * 1024)
        };
        let (mut heap, types) = heap_with(config);
        let mut model = GraphModel::random(&mut heap, types, &mut rng, 200, 4);

        for round in 0..20 {
            for _ in 0..50 {
                mutate(&mut model, &mut heap, types, &mut rng);
            }
            if round % 5 == 4 {
                heap.collect_full();
            } else {
                heap.scavenge();
            }
            model.check(&heap);
        }
        assert_no_floating_garbage(&model, &mut heap);
    }
}

/// Property: incremental cycles interleaved with mutation preserve the graph
#[test]
fn test_incremental_cycles_preserve_graph() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = GcConfig {
            min_objects_per_step: 3,
            verify_heap: true,
            ..GcConfig::with_young_space_size(16 * 1024)
        };
        let (mut heap, types) = heap_with(config);
        let mut model = GraphModel::random(&mut heap, types, &mut rng, 300, 4);
        heap.collect_full();

        for _ in 0..3 {
            heap.start_cycle().unwrap();
            while heap.phase() != GcPhase::Idle {
                for _ in 0..rng.gen_range(1..5) {
                    mutate(&mut model, &mut heap, types, &mut rng);
                }
                if rng.gen_bool(0.05) {
                    heap.scavenge();
                }
                heap.step(Duration::ZERO);
            }
            model.check(&heap);
        }
        assert_no_floating_garbage(&model, &mut heap);
    }
}

/// Property: concurrent cycles with a live marker thread preserve the graph
#[test]
fn test_concurrent_cycles_preserve_graph() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = GcConfig {
            concurrent_marking_enabled: true,
            verify_heap: true,
            ..GcConfig::with_young_space_size(16 * 1024)
        };
        let (mut heap, types) = heap_with(config);
        let mut model = GraphModel::random(&mut heap, types, &mut rng, 300, 4);
        heap.collect_full();

        for _ in 0..3 {
            heap.start_cycle().unwrap();
            let deadline = Instant::now() + Duration::from_secs(30);
            while heap.phase() != GcPhase::Idle {
                mutate(&mut model, &mut heap, types, &mut rng);
                heap.safepoint();
                assert!(Instant::now() < deadline, "seed {}: cycle did not finish", seed);
            }
            model.check(&heap);
        }
        assert_no_floating_garbage(&model, &mut heap);
    }
}

/// Property: concurrent cycles with a starved completion budget, which may
/// fall back to stop-the-world marking, preserve the graph
#[test]
fn test_fallback_preserves_graph() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = GcConfig {
            concurrent_marking_enabled: true,
            use_marker_thread: false,
            completion_work_limit: 2,
            max_completion_retries: 2,
            ..GcConfig::with_young_space_size(16 * 1024)
        };
        let (mut heap, types) = heap_with(config);
        let mut model = GraphModel::random(&mut heap, types, &mut rng, 300, 4);
        heap.collect_full();

        heap.start_cycle().unwrap();
        while heap.phase() != GcPhase::Idle {
            mutate(&mut model, &mut heap, types, &mut rng);
            heap.safepoint();
        }
        model.check(&heap);
        assert_no_floating_garbage(&model, &mut heap);
    }
}
