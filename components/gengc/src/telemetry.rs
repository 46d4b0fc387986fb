//! Collection events and statistics.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Which collector produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Young-generation copy
    Scavenge,
    /// Stop-the-world collection of both generations
    Full,
    /// Old-generation cycle driven by incremental steps
    Incremental,
    /// Old-generation cycle marked on the background thread
    Concurrent,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionKind::Scavenge => "Scavenge",
            CollectionKind::Full => "Full",
            CollectionKind::Incremental => "Incremental",
            CollectionKind::Concurrent => "Concurrent",
        };
        f.write_str(name)
    }
}

/// An event emitted to the heap's [`TelemetrySink`].
#[derive(Debug, Clone, PartialEq)]
pub enum GcEvent {
    /// A collection started.
    CycleStart {
        /// Collection id
        id: u64,
        /// Collector
        kind: CollectionKind,
        /// Bytes in use across both generations
        heap_used: usize,
    },
    /// A collection finished.
    CycleEnd {
        /// Collection id
        id: u64,
        /// Collector
        kind: CollectionKind,
        /// Bytes returned to the allocator
        bytes_reclaimed: usize,
        /// Total time the mutator was stopped by this collection
        pause_duration: Duration,
        /// Objects moved into the old generation
        objects_promoted: usize,
    },
    /// Concurrent marking could not finish within its completion pauses and
    /// the cycle was finished stop-the-world.
    FallbackToStopTheWorld {
        /// Collection id of the abandoned concurrent cycle
        id: u64,
        /// Failed completion pauses
        retries: usize,
        /// Gray objects left when the fallback started
        pending_objects: usize,
    },
}

impl GcEvent {
    /// Collection id carried by the event.
    pub fn id(&self) -> u64 {
        match self {
            GcEvent::CycleStart { id, .. }
            | GcEvent::CycleEnd { id, .. }
            | GcEvent::FallbackToStopTheWorld { id, .. } => *id,
        }
    }
}

/// Receives collection events.
///
/// Sinks are called on the mutator thread, inside collection pauses. They
/// should return quickly.
pub trait TelemetrySink: Send + Sync {
    /// Handles one event.
    fn record(&self, event: &GcEvent);
}

/// Forwards events to the `log` facade under the `gc` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: &GcEvent) {
        match event {
            GcEvent::CycleStart {
                id,
                kind,
                heap_used,
            } => {
                log::debug!(target: "gc", "GC({}) {} start, heap used {}K", id, kind, heap_used / 1024);
            }
            GcEvent::CycleEnd {
                id,
                kind,
                bytes_reclaimed,
                pause_duration,
                objects_promoted,
            } => {
                log::info!(
                    target: "gc",
                    "GC({}) {} reclaimed {}K, promoted {} objects, paused {}ms",
                    id,
                    kind,
                    bytes_reclaimed / 1024,
                    objects_promoted,
                    pause_duration.as_micros() as f64 / 1000.0
                );
            }
            GcEvent::FallbackToStopTheWorld {
                id,
                retries,
                pending_objects,
            } => {
                log::warn!(
                    target: "gc",
                    "GC({}) concurrent marking starved after {} completion pauses ({} objects pending), finishing stop-the-world",
                    id,
                    retries,
                    pending_objects
                );
            }
        }
    }
}

/// Stores every event, for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<GcEvent>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<GcEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<GcEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of fallback events recorded.
    pub fn fallbacks(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, GcEvent::FallbackToStopTheWorld { .. }))
            .count()
    }

    /// `CycleEnd` events of the given kind.
    pub fn cycle_ends(&self, kind: CollectionKind) -> Vec<GcEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, GcEvent::CycleEnd { kind: k, .. } if *k == kind))
            .cloned()
            .collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: &GcEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Cumulative collector statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GcStats {
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
    /// Sum of all pauses
    pub total_pause: Duration,
    /// Longest single pause
    pub max_pause: Duration,
}

impl GcStats {
    /// Accounts one mutator pause.
    pub(crate) fn record_pause(&mut self, pause: Duration) {
        self.total_pause += pause;
        if pause > self.max_pause {
            self.max_pause = pause;
        }
    }

    /// Total number of completed collections of any kind.
    pub fn collections(&self) -> usize {
        self.scavenges + self.full_collections + self.incremental_cycles + self.concurrent_cycles
    }
}

/// Logs the duration of a stop-the-world phase when dropped.
pub(crate) struct PausePhase {
    id: u64,
    name: &'static str,
    start: Instant,
}

impl PausePhase {
    pub(crate) fn new(id: u64, name: &'static str) -> Self {
        Self {
            id,
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for PausePhase {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::debug!(target: "gc", "GC({}) Pause {} {}ms", self.id, self.name, elapsed.as_micros() as f64 / 1000.0);
    }
}
