//! Concurrent marking.
//!
//! In concurrent mode the old generation is traced by a background thread
//! (`gc-marker`) while the mutator runs. The mutator finishes marking in
//! short completion pauses:
//!
//! 1. Pause the marker thread
//! 2. Rescan roots and young objects
//! 3. Drain at most `completion_work_limit` gray objects
//!
//! If the worklist is empty at the end of the pause, marking is complete and
//! the cycle moves on to sweeping. Otherwise the marker resumes and the
//! attempt counts as a retry. Once `max_completion_retries` is exceeded the
//! cycle falls back to a stop-the-world mark and sweep.
//!
//! # Thread coordination
//!
//! The marker thread only ever pops gray old objects, blackens them and
//! shades their children. It is paused (and acknowledges the pause between
//! two objects) whenever the mutator moves objects, rewrites old blocks or
//! inspects colors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::heap::Heap;
use crate::incremental::GcPhase;
use crate::marking::{MarkingContext, WorkBudget};
use crate::object::{MarkColor, ObjectHeader};
use crate::telemetry::{GcEvent, PausePhase};

/// Objects processed between two checks for a pause request.
const MARKER_BATCH: usize = 64;

/// How long an idle marker waits before polling the worklist again.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// How often a pausing mutator checks that the marker is still alive.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Marker thread states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerState {
    /// No cycle; waiting for work
    Idle,
    /// Draining the worklist
    Running,
    /// The mutator asked for a pause
    PauseRequested,
    /// Acknowledged a pause; touches nothing until resumed
    Paused,
    /// Exit
    Shutdown,
}

/// State shared with the marker thread.
struct MarkerControl {
    state: Mutex<MarkerState>,
    cond: Condvar,
    /// Checked between objects so a pause is honored mid-batch
    pause_requested: AtomicBool,
}

/// Handle to the background marker thread.
pub(crate) struct ConcurrentMarker {
    control: Arc<MarkerControl>,
    thread: Option<JoinHandle<()>>,
}

impl ConcurrentMarker {
    /// Spawns an idle marker thread.
    pub(crate) fn spawn(marking: Arc<MarkingContext>) -> std::io::Result<Self> {
        let control = Arc::new(MarkerControl {
            state: Mutex::new(MarkerState::Idle),
            cond: Condvar::new(),
            pause_requested: AtomicBool::new(false),
        });
        let thread_control = Arc::clone(&control);
        let thread = thread::Builder::new()
            .name("gc-marker".into())
            .spawn(move || marker_loop(&thread_control, &marking))?;
        Ok(ConcurrentMarker {
            control,
            thread: Some(thread),
        })
    }

    /// Lets the thread drain the worklist.
    pub(crate) fn start_cycle(&self) {
        let mut state = self.control.state.lock();
        if matches!(*state, MarkerState::Idle | MarkerState::Paused) {
            *state = MarkerState::Running;
            self.control.cond.notify_all();
        }
    }

    /// Stops the thread between two objects and waits for it to acknowledge.
    ///
    /// Returns true if the thread was running and is now paused.
    pub(crate) fn pause(&self) -> bool {
        let mut state = self.control.state.lock();
        if *state != MarkerState::Running {
            return false;
        }
        *state = MarkerState::PauseRequested;
        self.control.pause_requested.store(true, Ordering::SeqCst);
        self.control.cond.notify_all();
        while *state == MarkerState::PauseRequested {
            let timed_out = self.control.cond.wait_for(&mut state, PAUSE_POLL).timed_out();
            if timed_out && self.is_finished() {
                log::error!(target: "gc", "marker thread exited while a pause was pending");
                *state = MarkerState::Shutdown;
                break;
            }
        }
        self.control.pause_requested.store(false, Ordering::SeqCst);
        *state == MarkerState::Paused
    }

    /// Resumes a paused thread.
    pub(crate) fn resume(&self) {
        let mut state = self.control.state.lock();
        if *state == MarkerState::Paused {
            *state = MarkerState::Running;
            self.control.cond.notify_all();
        }
    }

    /// Parks the thread until the next cycle.
    pub(crate) fn stop_cycle(&self) {
        self.pause();
        let mut state = self.control.state.lock();
        if *state != MarkerState::Shutdown {
            *state = MarkerState::Idle;
        }
    }

    fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops and joins the thread.
    pub(crate) fn shutdown(&mut self) {
        {
            let mut state = self.control.state.lock();
            *state = MarkerState::Shutdown;
            self.control.pause_requested.store(true, Ordering::SeqCst);
            self.control.cond.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!(target: "gc", "marker thread panicked");
            }
        }
    }
}

impl Drop for ConcurrentMarker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn marker_loop(control: &MarkerControl, marking: &MarkingContext) {
    log::debug!(target: "gc", "marker thread started");
    loop {
        {
            let mut state = control.state.lock();
            loop {
                match *state {
                    MarkerState::Shutdown => {
                        log::debug!(target: "gc", "marker thread stopped");
                        return;
                    }
                    MarkerState::Running => break,
                    MarkerState::PauseRequested => {
                        *state = MarkerState::Paused;
                        control.cond.notify_all();
                    }
                    MarkerState::Idle | MarkerState::Paused => {}
                }
                control.cond.wait(&mut state);
            }
        }

        let mut processed = 0;
        while processed < MARKER_BATCH && !control.pause_requested.load(Ordering::SeqCst) {
            match marking.worklist.pop() {
                Some(obj) => {
                    // SAFETY: queued objects are live old objects; the
                    // mutator pauses this thread before freeing or moving any
                    unsafe { marking.process(obj) };
                    processed += 1;
                }
                None => break,
            }
        }

        if processed == 0 {
            let mut state = control.state.lock();
            if *state == MarkerState::Running {
                control.cond.wait_for(&mut state, IDLE_WAIT);
            }
        }
    }
}

impl Heap {
    /// Spawns the marker thread on first use and starts it on the current
    /// cycle. Without a thread, marking happens in completion pauses only.
    pub(crate) fn start_marker(&mut self) {
        if !self.config.use_marker_thread {
            return;
        }
        if self.marker.is_none() {
            match ConcurrentMarker::spawn(Arc::clone(&self.marking)) {
                Ok(marker) => self.marker = Some(marker),
                Err(err) => {
                    log::warn!(
                        target: "gc",
                        "failed to spawn marker thread ({}), marking in completion pauses only",
                        err
                    );
                    return;
                }
            }
        }
        if let Some(marker) = &self.marker {
            marker.start_cycle();
        }
    }

    /// Pauses the marker thread if it is running.
    pub(crate) fn pause_marker(&self) -> bool {
        self.marker.as_ref().map_or(false, ConcurrentMarker::pause)
    }

    pub(crate) fn resume_marker(&self) {
        if let Some(marker) = &self.marker {
            marker.resume();
        }
    }

    pub(crate) fn stop_marker(&self) {
        if let Some(marker) = &self.marker {
            marker.stop_cycle();
        }
    }

    /// One safepoint of a concurrent cycle: attempts completion once the
    /// marker has run out of gray objects.
    pub(crate) fn concurrent_step(&mut self) {
        let marker_busy = self.marker.is_some() && !self.marking.worklist.is_empty();
        if !marker_busy {
            self.try_complete_marking();
        }
    }

    /// One completion pause. Returns true if marking completed.
    pub(crate) fn try_complete_marking(&mut self) -> bool {
        let marker_was_running = self.pause_marker();
        let start = Instant::now();
        let completed = {
            let _phase = PausePhase::new(self.cycle.id, "Final Mark");
            self.cycle.set_phase(GcPhase::Remark);
            self.rescan_roots_and_young();
            let mut work = WorkBudget::objects(self.config.completion_work_limit);
            // SAFETY: the worklist only holds live old objects and the
            // marker is paused
            let drained = unsafe { self.marking.drain(&mut work) };
            if drained {
                self.complete_marking();
            } else {
                self.cycle.set_phase(GcPhase::Marking);
            }
            drained
        };
        self.account_pause(start.elapsed());
        if self.config.verify_heap {
            self.verify_or_panic();
        }
        if completed {
            return true;
        }

        self.cycle.completion_retries += 1;
        log::debug!(
            target: "gc",
            "GC({}) completion attempt {} left {} objects queued",
            self.cycle.id,
            self.cycle.completion_retries,
            self.marking.worklist.len()
        );
        if self.cycle.completion_retries > self.config.max_completion_retries {
            self.fallback_to_stop_the_world();
        } else if marker_was_running {
            self.resume_marker();
        }
        false
    }

    /// Finishes the current cycle with a full stop-the-world mark and sweep.
    ///
    /// Marks are discarded and recomputed from the roots, so the result does
    /// not depend on how far concurrent marking got.
    pub(crate) fn fallback_to_stop_the_world(&mut self) {
        let id = self.cycle.id;
        let pending_objects = self.marking.worklist.len();
        self.emit(&GcEvent::FallbackToStopTheWorld {
            id,
            retries: self.cycle.completion_retries,
            pending_objects,
        });
        self.stats.fallbacks += 1;

        let start = Instant::now();
        let progress = {
            let _phase = PausePhase::new(id, "Degenerated Mark-Sweep");
            self.stop_marker();
            self.marking.worklist.clear();
            for obj in self.old.objects() {
                // SAFETY: the marker is stopped and the walker yields live
                // old objects
                unsafe { ObjectHeader::of(obj).set_color(MarkColor::White) };
            }
            self.cycle.set_phase(GcPhase::Remark);
            self.mark_stop_the_world();
            self.complete_marking();
            let remembered_set = &self.remembered_set;
            self.old
                .finish_sweep(&mut |obj| remembered_set.remove_holder(obj))
        };
        self.cycle.bytes_reclaimed += progress.freed_bytes;
        self.account_pause(start.elapsed());
        self.end_cycle();
    }
}
