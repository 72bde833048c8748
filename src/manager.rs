//! The admission façade.
//!
//! `ProcessManager` owns every subsystem (clock, core registry, allocator,
//! backing store, scheduler, trace) and is the only constructor of
//! processes. It assigns pids, draws each process's program length and
//! memory footprint from a per-process seeded RNG stream, and hands the
//! process to the scheduler. It also runs the batch generator behind the
//! `scheduler-test` command and answers the read-only aggregation queries
//! (`process-smi`, `vmstat`, report dump).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::backing_store::{BackingStore, DEFAULT_BACKING_STORE};
use crate::clock::{TickClock, DEFAULT_TICK_PERIOD};
use crate::config::SimConfig;
use crate::core_state::{CoreState, CoreStateRegistry};
use crate::mem::{build_allocator, MemoryAllocator, MemoryStats};
use crate::process::{Process, ProcessDescriptor};
use crate::report;
use crate::scheduler::{MemoryStampConfig, Scheduler};
use crate::trace::{SimEventKind, Trace};
use crate::types::Pid;

/// Submission failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// A process with this name already exists in the run.
    DuplicateName(String),
    /// The generated footprint exceeds total memory; the process can never
    /// be admitted.
    TooLarge { requested: usize, max: usize },
    /// The manager is shutting down.
    ShuttingDown,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::DuplicateName(name) => write!(f, "process {name:?} already exists"),
            SubmitError::TooLarge { requested, max } => {
                write!(f, "process needs {requested} bytes but memory is {max} bytes")
            }
            SubmitError::ShuttingDown => write!(f, "manager is shutting down"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Run-level options that are not part of the config file.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Path of the backing-store file.
    pub backing_store: PathBuf,
    /// Directory for periodic `memory_stamp_<n>.txt` files; disabled when
    /// `None`.
    pub memory_stamps: Option<PathBuf>,
    /// Wall-clock length of one tick.
    pub tick_period: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            backing_store: PathBuf::from(DEFAULT_BACKING_STORE),
            memory_stamps: None,
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}

pub struct ProcessManager {
    config: SimConfig,
    clock: Arc<TickClock>,
    registry: Arc<CoreStateRegistry>,
    allocator: Arc<dyn MemoryAllocator>,
    store: Arc<BackingStore>,
    scheduler: Scheduler,
    trace: Arc<Trace>,
    processes: Mutex<BTreeMap<String, Arc<Process>>>,
    next_pid: AtomicU32,
    auto_seq: AtomicU32,
    shutting_down: AtomicBool,
    batch_running: Arc<AtomicBool>,
    batch_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessManager {
    /// Construct every subsystem and start the clock and scheduler.
    pub fn new(config: SimConfig, options: SimOptions) -> Result<Arc<ProcessManager>> {
        let clock = Arc::new(TickClock::new(options.tick_period));
        let registry = Arc::new(CoreStateRegistry::new(config.num_cpu));
        let store = Arc::new(
            BackingStore::open(&options.backing_store)
                .context("unable to initialize the backing store")?,
        );
        let allocator = build_allocator(&config, Arc::clone(&store));
        let trace = Arc::new(Trace::new());
        let stamps = options.memory_stamps.map(|dir| MemoryStampConfig {
            dir,
            period_ticks: config.quantum_cycles as u64,
        });
        let scheduler = Scheduler::new(
            &config,
            Arc::clone(&clock),
            Arc::clone(&registry),
            Arc::clone(&allocator),
            Arc::clone(&trace),
            stamps,
        );

        clock.start();
        scheduler.start();

        Ok(Arc::new(ProcessManager {
            config,
            clock,
            registry,
            allocator,
            store,
            scheduler,
            trace,
            processes: Mutex::new(BTreeMap::new()),
            next_pid: AtomicU32::new(1),
            auto_seq: AtomicU32::new(1),
            shutting_down: AtomicBool::new(false),
            batch_running: Arc::new(AtomicBool::new(false)),
            batch_thread: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.allocator.stats()
    }

    /// Render the current memory map.
    pub fn memory_snapshot(&self) -> String {
        self.allocator.snapshot()
    }

    /// Fraction of cores currently busy, as a percentage.
    pub fn cpu_utilisation(&self) -> u32 {
        (self.registry.busy_count() * 100 / self.config.num_cpu as usize) as u32
    }

    /// Create a process named `name` and hand it to the scheduler.
    pub fn submit(&self, name: &str) -> Result<Arc<Process>, SubmitError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }

        let mut processes = self.processes.lock().unwrap();
        if processes.contains_key(name) {
            return Err(SubmitError::DuplicateName(name.to_string()));
        }

        let pid = Pid(self.next_pid.fetch_add(1, Ordering::SeqCst));
        // Independent stream per process: the run seed selects the family,
        // the pid selects the member.
        let mut rng = SmallRng::seed_from_u64(self.config.seed.wrapping_add(pid.0 as u64));
        let program_len = rng.random_range(self.config.min_ins..=self.config.max_ins);
        let mem_bytes = rng
            .random_range(self.config.min_mem_per_proc..=self.config.max_mem_per_proc)
            .next_power_of_two();
        if mem_bytes > self.config.max_overall_mem {
            return Err(SubmitError::TooLarge {
                requested: mem_bytes,
                max: self.config.max_overall_mem,
            });
        }

        let created_at = Local::now().format("%m/%d/%Y, %I:%M:%S %p").to_string();
        let process = Arc::new(Process::new(
            pid,
            name,
            created_at,
            program_len,
            mem_bytes,
            self.config.mem_per_frame,
        ));
        processes.insert(name.to_string(), Arc::clone(&process));
        drop(processes);

        self.trace
            .record(self.clock.ticks(), None, SimEventKind::Submitted { pid });
        self.scheduler.enqueue(Arc::clone(&process));
        info!(
            pid = pid.0,
            name,
            steps = program_len,
            mem_bytes,
            "process submitted"
        );
        Ok(process)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Process>> {
        self.processes.lock().unwrap().get(name).cloned()
    }

    /// Snapshot of every process, in name order.
    pub fn list_all(&self) -> Vec<Arc<Process>> {
        self.processes.lock().unwrap().values().cloned().collect()
    }

    /// Reconstruct a descriptor from the backing store (diagnostic path).
    pub fn restore_from_store(&self, pid: Pid) -> Result<Option<ProcessDescriptor>> {
        self.store.restore(pid)
    }

    /// Start the batch generator: one auto-named submission every
    /// `batch-process-freq` ticks. Returns false if already running.
    pub fn start_batch(self: &Arc<Self>) -> bool {
        if self.batch_running.swap(true, Ordering::SeqCst) {
            return false;
        }

        // The thread holds only a weak handle so an abandoned manager can
        // still be dropped; each iteration borrows a strong one.
        let weak = Arc::downgrade(self);
        let running = Arc::clone(&self.batch_running);
        let handle = std::thread::Builder::new()
            .name("batch-gen".into())
            .spawn(move || {
                let mut elapsed = 0u64;
                while running.load(Ordering::SeqCst) {
                    let Some(manager) = weak.upgrade() else {
                        break;
                    };
                    if !manager.clock.is_running() {
                        break;
                    }
                    let now = manager.clock.ticks();
                    manager.clock.wait_for_tick_after(now);
                    elapsed += 1;
                    if elapsed >= manager.config.batch_process_freq {
                        elapsed = 0;
                        manager.submit_auto();
                    }
                }
            })
            .expect("failed to spawn batch generator");
        *self.batch_thread.lock().unwrap() = Some(handle);
        info!(
            freq = self.config.batch_process_freq,
            "batch generation started"
        );
        true
    }

    /// Stop the batch generator. Returns false if it was not running.
    pub fn stop_batch(&self) -> bool {
        if !self.batch_running.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(handle) = self.batch_thread.lock().unwrap().take() {
            // The generator itself can trigger shutdown by dropping the last
            // strong handle; it must not join itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
        info!("batch generation stopped");
        true
    }

    pub fn batch_is_running(&self) -> bool {
        self.batch_running.load(Ordering::SeqCst)
    }

    fn submit_auto(&self) {
        loop {
            let seq = self.auto_seq.fetch_add(1, Ordering::SeqCst);
            let name = format!("p{seq:02}");
            match self.submit(&name) {
                Ok(_) => return,
                Err(SubmitError::DuplicateName(_)) => continue,
                Err(err) => {
                    warn!(error = %err, "batch submission failed");
                    return;
                }
            }
        }
    }

    /// The `screen -ls` / `report-util` table.
    pub fn process_table(&self) -> String {
        report::render_process_table(
            &self.list_all(),
            &self.core_snapshot(),
            self.config.num_cpu,
        )
    }

    /// The `process-smi` summary.
    pub fn process_smi(&self) -> String {
        report::render_process_smi(
            &self.list_all(),
            &self.core_snapshot(),
            self.config.num_cpu,
            self.memory_stats(),
        )
    }

    /// The `vmstat` counter block.
    pub fn vmstat(&self) -> String {
        report::render_vmstat(
            self.memory_stats(),
            self.clock.ticks(),
            self.clock.active_ticks(),
            self.clock.idle_ticks(),
        )
    }

    /// Write the process table to `path` (the `report-util` command).
    pub fn write_report(&self, path: impl Into<PathBuf>) -> Result<PathBuf> {
        let path = path.into();
        std::fs::write(&path, self.process_table())
            .with_context(|| format!("unable to write report to {}", path.display()))?;
        Ok(path)
    }

    fn core_snapshot(&self) -> Vec<CoreState> {
        self.registry.snapshot()
    }

    /// Stop the batch generator, the scheduler, and the clock, in that
    /// order. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_batch();
        self.scheduler.stop();
        self.clock.stop();
        info!("manager shut down");
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
