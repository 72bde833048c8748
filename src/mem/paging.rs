//! Fixed-frame paging allocator.
//!
//! Memory is divided into `max_bytes / frame_bytes` frames. Free frames
//! live on a LIFO stack; admitting a process pops `⌈mem/frame⌉` frames and
//! maps each to the owning pid. Page-in/page-out counters tally frames
//! crossing the memory boundary in either direction.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::backing_store::BackingStore;
use crate::mem::{persist_evictee, pick_evictable, AdmitError, MemoryAllocator, MemoryStats};
use crate::process::{Process, Residency};
use crate::types::{FrameId, Pid};

pub struct PagingAllocator {
    max_bytes: usize,
    frame_bytes: usize,
    num_frames: usize,
    store: Arc<BackingStore>,
    state: Mutex<PagingState>,
}

struct PagingState {
    /// LIFO stack of free frame indices.
    free_frames: Vec<FrameId>,
    frame_owner: HashMap<FrameId, Pid>,
    residents: HashMap<Pid, Arc<Process>>,
    /// Residents in admission order; eviction pops from the front.
    fifo: VecDeque<Pid>,
    page_in: u64,
    page_out: u64,
}

impl PagingAllocator {
    pub fn new(max_bytes: usize, frame_bytes: usize, store: Arc<BackingStore>) -> Self {
        let num_frames = max_bytes / frame_bytes;
        PagingAllocator {
            max_bytes,
            frame_bytes,
            num_frames,
            store,
            state: Mutex::new(PagingState {
                free_frames: (0..num_frames).map(FrameId).collect(),
                frame_owner: HashMap::new(),
                residents: HashMap::new(),
                fifo: VecDeque::new(),
                page_in: 0,
                page_out: 0,
            }),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn release_locked(&self, state: &mut PagingState, process: &Process, to: Residency) {
        let pid = process.pid();
        if state.residents.remove(&pid).is_none() {
            return;
        }
        state.fifo.retain(|p| *p != pid);
        if let Residency::Paged { frames } = process.residency() {
            for frame in frames {
                state.frame_owner.remove(&frame);
                state.free_frames.push(frame);
                state.page_out += 1;
            }
        }
        process.set_residency(to);
        process.set_admitted_at(None);
    }
}

impl MemoryAllocator for PagingAllocator {
    fn admit(&self, process: &Arc<Process>) -> Result<Residency, AdmitError> {
        let pages = process.pages();
        if pages == 0 || pages > self.num_frames {
            return Err(AdmitError::NoSpace);
        }

        let mut state = self.state.lock().unwrap();
        loop {
            if state.free_frames.len() >= pages {
                let split = state.free_frames.len() - pages;
                let frames: Vec<FrameId> = state.free_frames.split_off(split);
                for frame in &frames {
                    state.frame_owner.insert(*frame, process.pid());
                }
                state.page_in += pages as u64;
                state.residents.insert(process.pid(), Arc::clone(process));
                state.fifo.push_back(process.pid());

                let residency = Residency::Paged { frames };
                process.set_residency(residency.clone());
                debug!(
                    pid = process.pid().0,
                    name = process.name(),
                    pages,
                    "admitted into paged memory"
                );
                return Ok(residency);
            }

            let Some(victim_pid) = pick_evictable(&state.fifo, &state.residents) else {
                return Err(AdmitError::NoSpace);
            };
            let victim = Arc::clone(&state.residents[&victim_pid]);
            persist_evictee(&self.store, &victim);
            self.release_locked(&mut state, &victim, Residency::OnBackingStore);
            info!(
                pid = victim_pid.0,
                name = victim.name(),
                "evicted oldest resident to backing store"
            );
        }
    }

    fn release(&self, process: &Process) {
        let mut state = self.state.lock().unwrap();
        self.release_locked(&mut state, process, Residency::NotResident);
        debug!(pid = process.pid().0, "released paged memory");
    }

    fn snapshot(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut out = String::new();
        writeln!(out, "Memory visualization ({} frames):", self.num_frames).unwrap();
        for index in 0..self.num_frames {
            match state.frame_owner.get(&FrameId(index)) {
                Some(pid) => {
                    let name = state
                        .residents
                        .get(pid)
                        .map(|p| p.name().to_string())
                        .unwrap_or_else(|| pid.to_string());
                    writeln!(out, "Frame {index} -> {name}").unwrap();
                }
                None => writeln!(out, "Frame {index} -> free").unwrap(),
            }
        }
        writeln!(out, "---- end of memory visualization ----").unwrap();
        out
    }

    fn stats(&self) -> MemoryStats {
        let state = self.state.lock().unwrap();
        let free = state.free_frames.len();
        MemoryStats {
            max_bytes: self.max_bytes,
            used_bytes: (self.num_frames - free) * self.frame_bytes,
            page_in: state.page_in,
            page_out: state.page_out,
            external_frag_bytes: free * self.frame_bytes,
            resident_count: state.residents.len(),
        }
    }
}
