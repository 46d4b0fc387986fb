//! Benchmark runner and report types
//!
//! Builds a heap configured for the requested collection mode, runs a
//! workload for a number of iterations, and collects the heap statistics
//! into a [`BenchReport`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use gengc::{GcConfig, GcResult, GcStats, Heap};
use serde::{Deserialize, Serialize};

use crate::workloads::{registry, Workload};

/// How the old generation is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Only scavenges and full collections
    Stw,
    /// Old-generation cycles marked in bounded steps at safepoints
    Incremental,
    /// Old-generation cycles marked by a background thread
    Concurrent,
}

impl Mode {
    /// Collector configuration for this mode.
    pub fn gc_config(self, young_space_size: usize, old_space_size: usize) -> GcConfig {
        let base = GcConfig {
            old_gen_max_size: old_space_size,
            ..GcConfig::with_young_space_size(young_space_size)
        };
        match self {
            // Cycles only start once the old generation is completely full,
            // and allocation failure collects it stop-the-world first
            Mode::Stw => GcConfig {
                old_gen_trigger_occupancy: 1.0,
                ..base
            },
            Mode::Incremental => base,
            Mode::Concurrent => GcConfig {
                concurrent_marking_enabled: true,
                ..base
            },
        }
    }
}

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Workload to run
    pub workload: Workload,
    /// Collection mode
    pub mode: Mode,
    /// Number of workload iterations on the same heap
    pub iterations: usize,
    /// Workload size, see [`Workload::default_size`]
    pub size: usize,
    /// Semi-space size in bytes
    pub young_space_size: usize,
    /// Old-generation limit in bytes
    pub old_space_size: usize,
}

impl BenchConfig {
    /// One iteration of `workload` at its default size.
    pub fn new(workload: Workload, mode: Mode) -> Self {
        Self {
            workload,
            mode,
            iterations: 1,
            size: workload.default_size(),
            young_space_size: 1024 * 1024,
            old_space_size: 64 * 1024 * 1024,
        }
    }
}

/// Result of running a benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    /// Workload that ran
    pub workload: Workload,
    /// Collection mode
    pub mode: Mode,
    /// Iterations run
    pub iterations: usize,
    /// Workload size
    pub size: usize,
    /// Wall-clock time of all iterations in milliseconds
    pub wall_time_ms: f64,
    /// Whether every iteration returned the expected checksum
    pub checksum_ok: bool,
    /// Completed scavenges
    pub scavenges: usize,
    /// Completed full collections
    pub full_collections: usize,
    /// Completed incremental cycles
    pub incremental_cycles: usize,
    /// Completed concurrent cycles
    pub concurrent_cycles: usize,
    /// Concurrent cycles finished stop-the-world
    pub fallbacks: usize,
    /// Objects promoted to the old generation
    pub objects_promoted: usize,
    /// Bytes promoted to the old generation
    pub bytes_promoted: usize,
    /// Bytes reclaimed by all collectors
    pub bytes_reclaimed: usize,
    /// Sum of all pauses in milliseconds
    pub total_pause_ms: f64,
    /// Longest pause in milliseconds
    pub max_pause_ms: f64,
}

impl BenchReport {
    fn new(config: &BenchConfig, wall_time: Duration, checksum_ok: bool, stats: &GcStats) -> Self {
        Self {
            workload: config.workload,
            mode: config.mode,
            iterations: config.iterations,
            size: config.size,
            wall_time_ms: millis(wall_time),
            checksum_ok,
            scavenges: stats.scavenges,
            full_collections: stats.full_collections,
            incremental_cycles: stats.incremental_cycles,
            concurrent_cycles: stats.concurrent_cycles,
            fallbacks: stats.fallbacks,
            objects_promoted: stats.objects_promoted,
            bytes_promoted: stats.bytes_promoted,
            bytes_reclaimed: stats.bytes_reclaimed,
            total_pause_ms: millis(stats.total_pause),
            max_pause_ms: millis(stats.max_pause),
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Runs `config.iterations` iterations of the workload on a fresh heap.
///
/// Any cycle still running after the last iteration is finished before the
/// statistics are taken.
///
/// # Errors
///
/// Configuration errors from heap construction, and any collector error the
/// workload hits (typically [`gengc::GcError::OutOfMemory`]).
pub fn run(config: &BenchConfig) -> GcResult<BenchReport> {
    let gc_config = config
        .mode
        .gc_config(config.young_space_size, config.old_space_size);
    let (registry, types) = registry();
    let mut heap = Heap::new(gc_config, Arc::new(registry))?;

    log::info!(
        target: "gc_bench",
        "running {} x{} (size {}) in {:?} mode",
        config.workload.name(),
        config.iterations,
        config.size,
        config.mode
    );

    let expected = config.workload.expected_checksum(config.size);
    let mut checksum_ok = true;
    let start = Instant::now();
    for iteration in 0..config.iterations {
        let checksum = config.workload.run_once(&mut heap, types, config.size)?;
        if checksum != expected {
            log::error!(
                target: "gc_bench",
                "iteration {}: checksum {} differs from expected {}",
                iteration,
                checksum,
                expected
            );
            checksum_ok = false;
        }
    }
    heap.finish_cycle();
    let wall_time = start.elapsed();

    let report = BenchReport::new(config, wall_time, checksum_ok, &heap.stats());
    log::info!(
        target: "gc_bench",
        "{} finished in {:.2}ms with {} collections",
        config.workload.name(),
        report.wall_time_ms,
        heap.stats().collections()
    );
    Ok(report)
}

/// Format a report as a human-readable table
pub fn format_report(report: &BenchReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n{} ({:?} mode, {} iterations, size {})\n",
        report.workload.name(),
        report.mode,
        report.iterations,
        report.size
    ));
    output.push_str(&format!("{}\n", "=".repeat(50)));

    let rows: [(&str, String); 13] = [
        ("Wall time", format!("{:.2} ms", report.wall_time_ms)),
        ("Checksum", if report.checksum_ok { "ok" } else { "MISMATCH" }.to_string()),
        ("Scavenges", report.scavenges.to_string()),
        ("Full collections", report.full_collections.to_string()),
        ("Incremental cycles", report.incremental_cycles.to_string()),
        ("Concurrent cycles", report.concurrent_cycles.to_string()),
        ("Fallbacks", report.fallbacks.to_string()),
        ("Objects promoted", report.objects_promoted.to_string()),
        ("Bytes promoted", report.bytes_promoted.to_string()),
        ("Bytes reclaimed", report.bytes_reclaimed.to_string()),
        ("Total pause", format!("{:.3} ms", report.total_pause_ms)),
        ("Max pause", format!("{:.3} ms", report.max_pause_ms)),
        (
            "Pause share",
            format!("{:.1} %", pause_share(report.total_pause_ms, report.wall_time_ms)),
        ),
    ];
    for (label, value) in rows {
        output.push_str(&format!("{:<25} {:>20}\n", label, value));
    }

    output
}

fn pause_share(pause_ms: f64, wall_ms: f64) -> f64 {
    if wall_ms > 0.0 {
        pause_ms / wall_ms * 100.0
    } else {
        0.0
    }
}

/// Format reports as JSON
pub fn format_report_json(reports: &[BenchReport]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(reports)
}
