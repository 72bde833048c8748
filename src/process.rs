//! The simulated process.
//!
//! A process carries an ordered program of print steps, a program counter,
//! a lifecycle state, its memory footprint, and its current residency. The
//! program counter and state are mutated only by the worker that currently
//! owns the process; residency is mutated only by the allocator between
//! admit and release. Both sides go through atomics / a dedicated lock so
//! the registry, reporters, and the allocator's eviction scan can read them
//! at any time.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Local;

use crate::types::{CoreId, FrameId, Pid, Tick};

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// In the ready queue (or between queue and core).
    Ready,
    /// Executing on a core.
    Running,
    /// Blocked (unused by the current policies; kept for the dump surface).
    Waiting,
    /// All steps executed.
    Finished,
}

impl ProcessState {
    fn from_u8(raw: u8) -> ProcessState {
        match raw {
            0 => ProcessState::Ready,
            1 => ProcessState::Running,
            2 => ProcessState::Waiting,
            _ => ProcessState::Finished,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ProcessState::Ready => 0,
            ProcessState::Running => 1,
            ProcessState::Waiting => 2,
            ProcessState::Finished => 3,
        }
    }
}

/// Where a process's memory currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Residency {
    /// Not in main memory and not on the backing store.
    NotResident,
    /// Resident in a contiguous block `[base, end)` of the flat allocator.
    Flat { base: usize, end: usize },
    /// Resident in the given frames of the paging allocator.
    Paged { frames: Vec<FrameId> },
    /// Evicted; its descriptor has been persisted to the backing store.
    OnBackingStore,
}

impl Residency {
    pub fn is_resident(&self) -> bool {
        matches!(self, Residency::Flat { .. } | Residency::Paged { .. })
    }
}

/// Serial form of a process, as persisted to the backing store.
///
/// The program body carries no persistent content, so the descriptor only
/// records its length; restore regenerates the print steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub pid: Pid,
    pub name: String,
    pub created_at: String,
    pub pc: usize,
    pub program_len: usize,
    pub mem_bytes: usize,
}

/// Sentinel for "not admitted": `admitted_at` when the process is not
/// resident.
const NEVER_ADMITTED: u64 = u64::MAX;

/// A simulated process.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    name: String,
    created_at: String,
    program: Vec<String>,
    mem_bytes: usize,
    pages: usize,

    pc: AtomicUsize,
    state: AtomicU8,
    /// 1-based core id while running, -1 while unassigned.
    core_id: AtomicI32,
    /// Clock tick at which the process last entered memory.
    admitted_at: AtomicU64,
    /// Set by a worker between picking the process and publishing RUNNING.
    /// The eviction scan treats a dispatching process as immovable.
    dispatching: AtomicBool,
    residency: Mutex<Residency>,
    /// Lines produced by executed print steps, shown by `screen -r`.
    output: Mutex<Vec<String>>,
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
    }
}

impl Process {
    /// Build a process with a program of `program_len` print steps and a
    /// footprint of `mem_bytes` (already rounded by the caller).
    pub fn new(
        pid: Pid,
        name: impl Into<String>,
        created_at: impl Into<String>,
        program_len: usize,
        mem_bytes: usize,
        frame_bytes: usize,
    ) -> Self {
        let name = name.into();
        let program = (0..program_len)
            .map(|_| format!("Hello world from {name}!"))
            .collect();
        Process {
            pid,
            created_at: created_at.into(),
            program,
            mem_bytes,
            pages: mem_bytes.div_ceil(frame_bytes),
            name,
            pc: AtomicUsize::new(0),
            state: AtomicU8::new(ProcessState::Ready.as_u8()),
            core_id: AtomicI32::new(-1),
            admitted_at: AtomicU64::new(NEVER_ADMITTED),
            dispatching: AtomicBool::new(false),
            residency: Mutex::new(Residency::NotResident),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild a process from a backing-store descriptor. The program is
    /// regenerated to the recorded length and the program counter restored.
    pub fn from_descriptor(desc: &ProcessDescriptor, frame_bytes: usize) -> Self {
        let process = Process::new(
            desc.pid,
            desc.name.clone(),
            desc.created_at.clone(),
            desc.program_len,
            desc.mem_bytes,
            frame_bytes,
        );
        process.pc.store(desc.pc.min(desc.program_len), Ordering::SeqCst);
        if desc.pc >= desc.program_len {
            process.set_state(ProcessState::Finished);
        }
        process
    }

    pub fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor {
            pid: self.pid,
            name: self.name.clone(),
            created_at: self.created_at.clone(),
            pc: self.pc(),
            program_len: self.program.len(),
            mem_bytes: self.mem_bytes,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Number of print steps in the program.
    pub fn program_len(&self) -> usize {
        self.program.len()
    }

    pub fn mem_bytes(&self) -> usize {
        self.mem_bytes
    }

    /// Frames needed under the paging allocator.
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn pc(&self) -> usize {
        self.pc.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Whether every step has been executed.
    pub fn is_complete(&self) -> bool {
        self.pc() >= self.program.len()
    }

    /// Core the process is running on, if assigned.
    pub fn core(&self) -> Option<CoreId> {
        let raw = self.core_id.load(Ordering::SeqCst);
        (raw > 0).then(|| CoreId(raw as u32))
    }

    pub fn set_core(&self, core: Option<CoreId>) {
        let raw = core.map(|c| c.0 as i32).unwrap_or(-1);
        self.core_id.store(raw, Ordering::SeqCst);
    }

    /// Tick at which the process last entered memory, if resident.
    pub fn admitted_at(&self) -> Option<Tick> {
        let raw = self.admitted_at.load(Ordering::SeqCst);
        (raw != NEVER_ADMITTED).then_some(raw)
    }

    pub fn set_admitted_at(&self, tick: Option<Tick>) {
        self.admitted_at
            .store(tick.unwrap_or(NEVER_ADMITTED), Ordering::SeqCst);
    }

    pub fn set_dispatching(&self, dispatching: bool) {
        self.dispatching.store(dispatching, Ordering::SeqCst);
    }

    /// Whether a worker is between picking this process and publishing
    /// RUNNING for it.
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::SeqCst)
    }

    pub fn residency(&self) -> Residency {
        self.residency.lock().unwrap().clone()
    }

    pub fn set_residency(&self, residency: Residency) {
        *self.residency.lock().unwrap() = residency;
    }

    pub fn is_resident(&self) -> bool {
        self.residency.lock().unwrap().is_resident()
    }

    /// Execute the current print step on `core`: emit its output line and
    /// advance the program counter. No-op once the program is complete.
    pub fn execute_step(&self, core: CoreId) {
        let pc = self.pc.load(Ordering::SeqCst);
        let Some(message) = self.program.get(pc) else {
            return;
        };
        let stamp = Local::now().format("(%m/%d/%Y %I:%M:%S%.3f%p)");
        self.output
            .lock()
            .unwrap()
            .push(format!("{stamp} Core:{core} \"{message}\""));
        self.pc.store(pc + 1, Ordering::SeqCst);
    }

    /// Copy of the output lines produced so far.
    pub fn output(&self) -> Vec<String> {
        self.output.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_process_is_ready_and_not_resident() {
        let p = Process::new(Pid(1), "p01", "01/01/2026, 09:00:00 AM", 3, 512, 256);
        assert_eq!(p.state(), ProcessState::Ready);
        assert_eq!(p.residency(), Residency::NotResident);
        assert_eq!(p.pc(), 0);
        assert_eq!(p.core(), None);
        assert_eq!(p.admitted_at(), None);
        assert_eq!(p.pages(), 2);
    }

    #[test]
    fn test_pages_round_up() {
        let p = Process::new(Pid(1), "p", "t", 1, 257, 256);
        assert_eq!(p.pages(), 2);
        let q = Process::new(Pid(2), "q", "t", 1, 256, 256);
        assert_eq!(q.pages(), 1);
    }

    #[test]
    fn test_execute_step_advances_and_logs() {
        let p = Process::new(Pid(7), "worker", "t", 2, 64, 64);
        p.execute_step(CoreId(3));
        assert_eq!(p.pc(), 1);
        assert!(!p.is_complete());
        p.execute_step(CoreId(3));
        assert_eq!(p.pc(), 2);
        assert!(p.is_complete());
        // A completed program is not advanced further.
        p.execute_step(CoreId(3));
        assert_eq!(p.pc(), 2);

        let output = p.output();
        assert_eq!(output.len(), 2);
        assert!(output[0].contains("Core:3"));
        assert!(output[0].contains("\"Hello world from worker!\""));
    }

    #[test]
    fn test_descriptor_round_trip() {
        let p = Process::new(Pid(9), "p09", "01/02/2026, 10:00:00 PM", 5, 1024, 256);
        p.execute_step(CoreId(1));
        p.execute_step(CoreId(1));

        let desc = p.descriptor();
        assert_eq!(desc.pc, 2);
        assert_eq!(desc.program_len, 5);

        let restored = Process::from_descriptor(&desc, 256);
        assert_eq!(restored.pid(), Pid(9));
        assert_eq!(restored.name(), "p09");
        assert_eq!(restored.pc(), 2);
        assert_eq!(restored.program_len(), 5);
        assert_eq!(restored.mem_bytes(), 1024);
        assert_eq!(restored.state(), ProcessState::Ready);
    }

    #[test]
    fn test_restored_finished_process_stays_finished() {
        let desc = ProcessDescriptor {
            pid: Pid(3),
            name: "done".into(),
            created_at: "t".into(),
            pc: 4,
            program_len: 4,
            mem_bytes: 64,
        };
        let restored = Process::from_descriptor(&desc, 64);
        assert_eq!(restored.state(), ProcessState::Finished);
        assert!(restored.is_complete());
    }
}
