//! Flat contiguous allocator.
//!
//! First-fit over a byte map: the lowest offset whose next `mem_bytes`
//! bytes are all free wins. Residents are tracked as an address-sorted
//! block list (for the snapshot and the fragmentation measure) plus a FIFO
//! of pids (for eviction order).

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::{debug, info};

use crate::backing_store::BackingStore;
use crate::mem::{persist_evictee, pick_evictable, AdmitError, MemoryAllocator, MemoryStats};
use crate::process::{Process, Residency};
use crate::types::Pid;

pub struct FlatAllocator {
    max_bytes: usize,
    store: Arc<BackingStore>,
    state: Mutex<FlatState>,
}

struct FlatState {
    /// One entry per byte; true = allocated.
    bitmap: Vec<bool>,
    /// Resident blocks sorted by base address.
    blocks: Vec<Block>,
    residents: HashMap<Pid, Arc<Process>>,
    /// Residents in admission order; eviction pops from the front.
    fifo: VecDeque<Pid>,
    used_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    pid: Pid,
    base: usize,
    end: usize,
}

impl FlatAllocator {
    pub fn new(max_bytes: usize, store: Arc<BackingStore>) -> Self {
        FlatAllocator {
            max_bytes,
            store,
            state: Mutex::new(FlatState {
                bitmap: vec![false; max_bytes],
                blocks: Vec::new(),
                residents: HashMap::new(),
                fifo: VecDeque::new(),
                used_bytes: 0,
            }),
        }
    }

    fn release_locked(&self, state: &mut FlatState, process: &Process, to: Residency) {
        let pid = process.pid();
        let Some(idx) = state.blocks.iter().position(|b| b.pid == pid) else {
            return;
        };
        let block = state.blocks.remove(idx);
        for byte in &mut state.bitmap[block.base..block.end] {
            *byte = false;
        }
        state.residents.remove(&pid);
        state.fifo.retain(|p| *p != pid);
        state.used_bytes -= block.end - block.base;
        process.set_residency(to);
        process.set_admitted_at(None);
    }
}

impl MemoryAllocator for FlatAllocator {
    fn admit(&self, process: &Arc<Process>) -> Result<Residency, AdmitError> {
        let size = process.mem_bytes();
        if size == 0 || size > self.max_bytes {
            return Err(AdmitError::NoSpace);
        }

        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(base) = first_fit(&state.bitmap, size) {
                let end = base + size;
                for byte in &mut state.bitmap[base..end] {
                    *byte = true;
                }
                let block = Block {
                    pid: process.pid(),
                    base,
                    end,
                };
                let at = state
                    .blocks
                    .partition_point(|b| b.base < base);
                state.blocks.insert(at, block);
                state.residents.insert(process.pid(), Arc::clone(process));
                state.fifo.push_back(process.pid());
                state.used_bytes += size;

                let residency = Residency::Flat { base, end };
                process.set_residency(residency.clone());
                debug!(
                    pid = process.pid().0,
                    name = process.name(),
                    base,
                    end,
                    "admitted into flat memory"
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
        debug!(pid = process.pid().0, "released flat memory");
    }

    fn snapshot(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut out = String::new();
        let stamp = Local::now().format("%m/%d/%Y %I:%M:%S%p");
        writeln!(out, "Timestamp: ({stamp})").unwrap();
        writeln!(out, "Number of processes in memory: {}", state.blocks.len()).unwrap();
        writeln!(
            out,
            "Total external fragmentation in bytes: {}",
            external_frag(&state.blocks)
        )
        .unwrap();
        writeln!(out, "----end---- = {}", self.max_bytes).unwrap();
        for block in state.blocks.iter().rev() {
            let name = state
                .residents
                .get(&block.pid)
                .map(|p| p.name().to_string())
                .unwrap_or_else(|| block.pid.to_string());
            writeln!(out, "\n{}\n{}\n{}", block.end, name, block.base).unwrap();
        }
        writeln!(out, "\n----start---- = 0").unwrap();
        out
    }

    fn stats(&self) -> MemoryStats {
        let state = self.state.lock().unwrap();
        MemoryStats {
            max_bytes: self.max_bytes,
            used_bytes: state.used_bytes,
            page_in: 0,
            page_out: 0,
            external_frag_bytes: external_frag(&state.blocks),
            resident_count: state.blocks.len(),
        }
    }
}

/// Lowest base at which `size` contiguous free bytes exist.
fn first_fit(bitmap: &[bool], size: usize) -> Option<usize> {
    let mut base = 0;
    while base + size <= bitmap.len() {
        match bitmap[base..base + size].iter().position(|used| *used) {
            None => return Some(base),
            Some(used_at) => base += used_at + 1,
        }
    }
    None
}

/// Free bytes below or between resident blocks. The tail region above the
/// highest block is deliberately excluded.
fn external_frag(blocks: &[Block]) -> usize {
    let mut frag = 0;
    let mut prev_end = 0;
    for block in blocks {
        frag += block.base - prev_end;
        prev_end = block.end;
    }
    frag
}
