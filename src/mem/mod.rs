//! The memory subsystem.
//!
//! Two allocator implementations behind one trait: a flat contiguous
//! first-fit allocator and a fixed-frame paging allocator. Both admit and
//! release whole processes and share the eviction discipline: when an
//! incoming process does not fit, the oldest resident that is not running
//! is persisted to the backing store and released, repeating until the
//! request fits or nothing evictable remains.

mod flat;
mod paging;

pub use flat::FlatAllocator;
pub use paging::PagingAllocator;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::backing_store::BackingStore;
use crate::config::SimConfig;
use crate::process::{Process, Residency};
use crate::types::Pid;

/// Admission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    /// The process does not fit and no evictable resident remains. The
    /// scheduler re-enqueues and retries later; never fatal.
    NoSpace,
}

impl fmt::Display for AdmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmitError::NoSpace => write!(f, "no space in main memory"),
        }
    }
}

impl std::error::Error for AdmitError {}

/// Point-in-time allocator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total managed bytes.
    pub max_bytes: usize,
    /// Bytes currently accounted to resident processes.
    pub used_bytes: usize,
    /// Frames paged in since start (paging only).
    pub page_in: u64,
    /// Frames paged out since start (paging only).
    pub page_out: u64,
    /// External fragmentation measure, in bytes.
    pub external_frag_bytes: usize,
    /// Number of resident processes.
    pub resident_count: usize,
}

/// Admission interface shared by both allocators.
pub trait MemoryAllocator: Send + Sync {
    /// Bring `process` into main memory, evicting old residents if needed.
    /// On success the process's residency is updated and the new residency
    /// returned.
    fn admit(&self, process: &Arc<Process>) -> Result<Residency, AdmitError>;

    /// Release the process's memory. A no-op if the process is not
    /// resident. Residency is reset to `NotResident`.
    fn release(&self, process: &Process);

    /// Human-readable rendering of the current memory map.
    fn snapshot(&self) -> String;

    fn stats(&self) -> MemoryStats;
}

/// Construct the allocator selected by the configuration: flat when the
/// whole memory is a single frame, paging otherwise.
pub fn build_allocator(
    config: &SimConfig,
    store: Arc<BackingStore>,
) -> Arc<dyn MemoryAllocator> {
    if config.max_overall_mem == config.mem_per_frame {
        info!(bytes = config.max_overall_mem, "using flat memory allocator");
        Arc::new(FlatAllocator::new(config.max_overall_mem, store))
    } else {
        info!(
            frames = config.num_frames(),
            frame_bytes = config.mem_per_frame,
            "using paging memory allocator"
        );
        Arc::new(PagingAllocator::new(
            config.max_overall_mem,
            config.mem_per_frame,
            store,
        ))
    }
}

/// Pick the eviction victim: the oldest resident (FIFO head first) that is
/// neither running nor being dispatched. Returns `None` when nothing can be
/// evicted.
pub(crate) fn pick_evictable(
    fifo: &VecDeque<Pid>,
    residents: &HashMap<Pid, Arc<Process>>,
) -> Option<Pid> {
    fifo.iter()
        .copied()
        .find(|pid| {
            residents
                .get(pid)
                .is_some_and(|p| !p.is_running() && !p.is_dispatching())
        })
}

/// Persist an evictee's descriptor to the backing store. A write failure is
/// a warning, never fatal: the in-memory release still proceeds.
pub(crate) fn persist_evictee(store: &BackingStore, process: &Process) {
    if let Err(err) = store.persist(&process.descriptor()) {
        warn!(
            pid = process.pid().0,
            name = process.name(),
            error = %err,
            "failed to persist evicted process; releasing anyway"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessState;
    use crate::types::Pid;

    fn resident_set(specs: &[(u32, ProcessState)]) -> (VecDeque<Pid>, HashMap<Pid, Arc<Process>>) {
        let mut fifo = VecDeque::new();
        let mut residents = HashMap::new();
        for &(pid, state) in specs {
            let process = Arc::new(Process::new(Pid(pid), format!("p{pid}"), "t", 1, 64, 64));
            process.set_state(state);
            fifo.push_back(Pid(pid));
            residents.insert(Pid(pid), process);
        }
        (fifo, residents)
    }

    #[test]
    fn test_pick_evictable_prefers_fifo_head() {
        let (fifo, residents) =
            resident_set(&[(1, ProcessState::Ready), (2, ProcessState::Ready)]);
        assert_eq!(pick_evictable(&fifo, &residents), Some(Pid(1)));
    }

    #[test]
    fn test_pick_evictable_skips_running() {
        let (fifo, residents) =
            resident_set(&[(1, ProcessState::Running), (2, ProcessState::Ready)]);
        assert_eq!(pick_evictable(&fifo, &residents), Some(Pid(2)));
    }

    #[test]
    fn test_pick_evictable_none_when_all_running() {
        let (fifo, residents) =
            resident_set(&[(1, ProcessState::Running), (2, ProcessState::Running)]);
        assert_eq!(pick_evictable(&fifo, &residents), None);
    }

    #[test]
    fn test_pick_evictable_skips_dispatching() {
        let (fifo, residents) = resident_set(&[(1, ProcessState::Ready)]);
        residents[&Pid(1)].set_dispatching(true);
        assert_eq!(pick_evictable(&fifo, &residents), None);
    }
}
