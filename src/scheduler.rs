//! The worker-pool scheduler.
//!
//! One worker thread per simulated core pulls ready processes from a FIFO
//! queue, admits them into memory, and steps them through their programs in
//! lockstep with the tick clock. FCFS runs a process to completion; RR
//! additionally preempts after `quantum` executed steps and re-enqueues.
//!
//! A watcher thread rides the same tick broadcast to account active ticks
//! (ticks on which at least one core was busy) and, when enabled, to write
//! periodic memory snapshots.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::clock::TickClock;
use crate::config::{SchedPolicy, SimConfig};
use crate::core_state::CoreStateRegistry;
use crate::mem::{AdmitError, MemoryAllocator};
use crate::process::{Process, ProcessState};
use crate::trace::{SimEventKind, Trace};
use crate::types::CoreId;

/// Periodic memory-snapshot output (`memory_stamp_<n>.txt`).
#[derive(Debug, Clone)]
pub struct MemoryStampConfig {
    /// Directory the stamp files are written into.
    pub dir: PathBuf,
    /// Ticks between stamps.
    pub period_ticks: u64,
}

/// How an execution loop ended.
enum Outcome {
    /// The program counter reached the program length.
    Finished,
    /// RR only: the quantum was exhausted with steps remaining.
    QuantumExpired,
    /// The scheduler was stopped mid-run.
    Stopped,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    policy: SchedPolicy,
    num_cpu: u32,
    quantum: u32,
    delay_per_exec: u32,
    running: AtomicBool,
    /// Number of processes currently between dispatch and release; guards
    /// the more-RUNNING-than-cores programming error.
    active: AtomicUsize,
    queue: Mutex<VecDeque<Arc<Process>>>,
    queue_cond: Condvar,
    /// Start barrier: workers check in, `start` waits for all of them.
    ready_workers: Mutex<u32>,
    ready_cond: Condvar,
    clock: Arc<TickClock>,
    registry: Arc<CoreStateRegistry>,
    allocator: Arc<dyn MemoryAllocator>,
    trace: Arc<Trace>,
    stamps: Option<MemoryStampConfig>,
}

impl Scheduler {
    pub fn new(
        config: &SimConfig,
        clock: Arc<TickClock>,
        registry: Arc<CoreStateRegistry>,
        allocator: Arc<dyn MemoryAllocator>,
        trace: Arc<Trace>,
        stamps: Option<MemoryStampConfig>,
    ) -> Scheduler {
        Scheduler {
            shared: Arc::new(Shared {
                policy: config.scheduler,
                num_cpu: config.num_cpu,
                quantum: config.quantum_cycles,
                delay_per_exec: config.delays_per_exec,
                running: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                queue: Mutex::new(VecDeque::new()),
                queue_cond: Condvar::new(),
                ready_workers: Mutex::new(0),
                ready_cond: Condvar::new(),
                clock,
                registry,
                allocator,
                trace,
                stamps,
            }),
            workers: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    /// Spawn the worker pool and watcher, returning once every worker has
    /// checked in. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.workers.lock().unwrap();
        for id in 1..=self.shared.num_cpu {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("core-{id}"))
                .spawn(move || worker_loop(&shared, CoreId(id)))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        let shared = Arc::clone(&self.shared);
        *self.watcher.lock().unwrap() = Some(
            thread::Builder::new()
                .name("sched-watch".into())
                .spawn(move || watcher_loop(&shared))
                .expect("failed to spawn watcher thread"),
        );

        let mut ready = self.shared.ready_workers.lock().unwrap();
        while *ready < self.shared.num_cpu {
            ready = self.shared.ready_cond.wait(ready).unwrap();
        }
        info!(
            cores = self.shared.num_cpu,
            policy = %self.shared.policy,
            "scheduler started"
        );
    }

    /// Stop every worker and the watcher, then wait for them to exit. A
    /// worker that is mid-step finishes that step first; preempted work is
    /// not re-enqueued. Idempotent, callable from any thread.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.queue_cond.notify_all();
        for handle in self.workers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.watcher.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Append a process to the ready queue, unless it is already queued.
    pub fn enqueue(&self, process: Arc<Process>) {
        push_ready(&self.shared, process);
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Append to the ready queue without introducing duplicates.
fn push_ready(shared: &Shared, process: Arc<Process>) {
    {
        let mut queue = shared.queue.lock().unwrap();
        if queue.iter().any(|p| p.pid() == process.pid()) {
            return;
        }
        queue.push_back(process);
    }
    shared.queue_cond.notify_one();
}

/// Block until a process is available or the scheduler stops.
fn pop_ready(shared: &Shared) -> Option<Arc<Process>> {
    let mut queue = shared.queue.lock().unwrap();
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(process) = queue.pop_front() {
            return Some(process);
        }
        queue = shared.queue_cond.wait(queue).unwrap();
    }
}

fn worker_loop(shared: &Shared, core: CoreId) {
    {
        let mut ready = shared.ready_workers.lock().unwrap();
        *ready += 1;
        if *ready == shared.num_cpu {
            shared.ready_cond.notify_all();
        }
    }

    while shared.running.load(Ordering::SeqCst) {
        let Some(process) = pop_ready(shared) else {
            break;
        };
        // Pin the process so the eviction scan cannot take it between here
        // and the RUNNING transition.
        process.set_dispatching(true);

        if shared.active.fetch_add(1, Ordering::SeqCst) + 1 > shared.num_cpu as usize {
            error!(
                core = core.0,
                pid = process.pid().0,
                "more concurrent running processes than cores; refusing dispatch"
            );
            shared.active.fetch_sub(1, Ordering::SeqCst);
            process.set_dispatching(false);
            push_ready(shared, process);
            continue;
        }

        if !process.is_resident() {
            match shared.allocator.admit(&process) {
                Ok(_) => {
                    process.set_admitted_at(Some(shared.clock.ticks()));
                    shared.trace.record(
                        shared.clock.ticks(),
                        Some(core),
                        SimEventKind::Admitted { pid: process.pid() },
                    );
                }
                Err(AdmitError::NoSpace) => {
                    debug!(
                        core = core.0,
                        pid = process.pid().0,
                        "no space and nothing evictable; re-enqueueing"
                    );
                    shared.trace.record(
                        shared.clock.ticks(),
                        Some(core),
                        SimEventKind::AdmitDeferred { pid: process.pid() },
                    );
                    shared.active.fetch_sub(1, Ordering::SeqCst);
                    process.set_dispatching(false);
                    push_ready(shared, process);
                    // Try again next tick rather than spinning on the queue.
                    let now = shared.clock.ticks();
                    shared.clock.wait_for_tick_after(now);
                    continue;
                }
            }
        }

        process.set_state(ProcessState::Running);
        process.set_core(Some(core));
        process.set_dispatching(false);
        shared
            .registry
            .set(core, true, Some(process.name().to_string()));
        shared.trace.record(
            shared.clock.ticks(),
            Some(core),
            SimEventKind::Dispatched { pid: process.pid() },
        );

        let outcome = execute(shared, &process, core);

        match outcome {
            Outcome::Finished => {
                shared.allocator.release(&process);
                process.set_state(ProcessState::Finished);
                process.set_core(None);
                shared.trace.record(
                    shared.clock.ticks(),
                    Some(core),
                    SimEventKind::Finished { pid: process.pid() },
                );
                info!(
                    core = core.0,
                    pid = process.pid().0,
                    name = process.name(),
                    "process finished"
                );
            }
            Outcome::QuantumExpired => {
                process.set_state(ProcessState::Ready);
                process.set_core(None);
                shared.trace.record(
                    shared.clock.ticks(),
                    Some(core),
                    SimEventKind::Preempted { pid: process.pid() },
                );
                push_ready(shared, Arc::clone(&process));
            }
            Outcome::Stopped => {
                // Leave the process READY but unqueued; the run is over.
                process.set_state(ProcessState::Ready);
                process.set_core(None);
            }
        }

        shared.registry.set(core, false, None);
        shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Step the process until it finishes, exhausts its quantum (RR), or the
/// scheduler stops. Every step is gated on a fresh tick; `delay_per_exec`
/// inserts that many idle ticks between consecutive steps, except before
/// the first step of a dispatch.
fn execute(shared: &Shared, process: &Arc<Process>, core: CoreId) -> Outcome {
    let mut last = shared.clock.ticks();
    let mut delay_counter = 0;
    let mut executed: u32 = 0;
    let mut first = true;

    loop {
        if process.is_complete() {
            return Outcome::Finished;
        }
        if shared.policy == SchedPolicy::Rr && executed >= shared.quantum {
            return Outcome::QuantumExpired;
        }
        if !shared.running.load(Ordering::SeqCst) {
            return Outcome::Stopped;
        }

        last = shared.clock.wait_for_tick_after(last);
        if !shared.running.load(Ordering::SeqCst) || !shared.clock.is_running() {
            return Outcome::Stopped;
        }

        let run_step = if shared.delay_per_exec == 0 || first {
            true
        } else {
            delay_counter += 1;
            if delay_counter >= shared.delay_per_exec {
                delay_counter = 0;
                true
            } else {
                false
            }
        };

        if run_step {
            process.execute_step(core);
            first = false;
            executed += 1;
            shared.trace.record(
                last,
                Some(core),
                SimEventKind::StepExecuted {
                    pid: process.pid(),
                    pc: process.pc(),
                },
            );
        }
    }
}

/// Per-tick accounting: bump the active counter whenever any core is busy,
/// and write periodic memory stamps when configured.
fn watcher_loop(shared: &Shared) {
    let mut last = shared.clock.ticks();
    let mut last_stamp = last;
    let mut stamp_index = 0u64;

    while shared.running.load(Ordering::SeqCst) {
        last = shared.clock.wait_for_tick_after(last);
        if !shared.running.load(Ordering::SeqCst) || !shared.clock.is_running() {
            break;
        }

        if shared.registry.busy_count() > 0 {
            shared.clock.note_active_tick();
        }

        if let Some(stamps) = &shared.stamps {
            if last.saturating_sub(last_stamp) >= stamps.period_ticks {
                last_stamp = last;
                let path = stamps.dir.join(format!("memory_stamp_{stamp_index}.txt"));
                stamp_index += 1;
                if let Err(err) = std::fs::write(&path, shared.allocator.snapshot()) {
                    warn!(path = %path.display(), error = %err, "failed to write memory stamp");
                }
            }
        }
    }
}
