//! Simulation event recording.
//!
//! Every scheduling action (process dispatched, step executed, preempted,
//! finished, admission deferred) is recorded with the tick at which it
//! happened and the core it happened on. Reports and tests read the trace
//! to reconstruct execution order without perturbing the scheduler.

use std::sync::Mutex;

use crate::types::{CoreId, Pid, Tick};

/// A single event recorded by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEvent {
    /// Clock tick at which the event was recorded.
    pub tick: Tick,
    /// Core involved, if any.
    pub core: Option<CoreId>,
    pub kind: SimEventKind,
}

/// The kind of scheduling event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEventKind {
    /// A process was submitted to the ready queue.
    Submitted { pid: Pid },
    /// A worker picked the process and admitted it into memory.
    Admitted { pid: Pid },
    /// Admission failed with no evictable resident; process re-enqueued.
    AdmitDeferred { pid: Pid },
    /// A process started executing on a core.
    Dispatched { pid: Pid },
    /// One print step was executed; `pc` is the counter after the step.
    StepExecuted { pid: Pid, pc: usize },
    /// A running process exhausted its quantum and went back to the queue.
    Preempted { pid: Pid },
    /// A process executed its last step.
    Finished { pid: Pid },
}

impl SimEventKind {
    /// The process the event concerns.
    pub fn pid(&self) -> Pid {
        match *self {
            SimEventKind::Submitted { pid }
            | SimEventKind::Admitted { pid }
            | SimEventKind::AdmitDeferred { pid }
            | SimEventKind::Dispatched { pid }
            | SimEventKind::StepExecuted { pid, .. }
            | SimEventKind::Preempted { pid }
            | SimEventKind::Finished { pid } => pid,
        }
    }
}

/// Chronological record of simulation events.
///
/// Recording is a mutex-guarded push; multiple worker threads record
/// concurrently and the lock preserves a single global order.
#[derive(Default)]
pub struct Trace {
    events: Mutex<Vec<SimEvent>>,
}

impl Trace {
    pub fn new() -> Self {
        Trace::default()
    }

    pub fn record(&self, tick: Tick, core: Option<CoreId>, kind: SimEventKind) {
        self.events.lock().unwrap().push(SimEvent { tick, core, kind });
    }

    /// All events in the order they were recorded.
    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Pids in the order their steps executed, one entry per step.
    pub fn step_sequence(&self) -> Vec<Pid> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e.kind {
                SimEventKind::StepExecuted { pid, .. } => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Pids in completion order.
    pub fn completion_order(&self) -> Vec<Pid> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e.kind {
                SimEventKind::Finished { pid } => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Number of times `pid` was bounced back to the queue by `NoSpace`.
    pub fn defer_count(&self, pid: Pid) -> usize {
        self.count(|kind| matches!(kind, SimEventKind::AdmitDeferred { pid: p } if *p == pid))
    }

    /// Number of times `pid` was preempted on quantum expiry.
    pub fn preempt_count(&self, pid: Pid) -> usize {
        self.count(|kind| matches!(kind, SimEventKind::Preempted { pid: p } if *p == pid))
    }

    /// Number of dispatches of `pid`.
    pub fn dispatch_count(&self, pid: Pid) -> usize {
        self.count(|kind| matches!(kind, SimEventKind::Dispatched { pid: p } if *p == pid))
    }

    fn count(&self, matches: impl Fn(&SimEventKind) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches(&e.kind))
            .count()
    }

    /// Pretty-print the trace to stderr for debugging.
    pub fn dump(&self) {
        for event in self.events.lock().unwrap().iter() {
            let core = event
                .core
                .map(|c| c.0.to_string())
                .unwrap_or_else(|| "-".into());
            let desc = match &event.kind {
                SimEventKind::Submitted { pid } => format!("SUBMIT   pid={pid}"),
                SimEventKind::Admitted { pid } => format!("ADMIT    pid={pid}"),
                SimEventKind::AdmitDeferred { pid } => format!("DEFER    pid={pid}"),
                SimEventKind::Dispatched { pid } => format!("DISPATCH pid={pid}"),
                SimEventKind::StepExecuted { pid, pc } => format!("STEP     pid={pid} pc={pc}"),
                SimEventKind::Preempted { pid } => format!("PREEMPT  pid={pid}"),
                SimEventKind::Finished { pid } => format!("FINISH   pid={pid}"),
            };
            eprintln!("[{:>8}] core={:<3} {}", event.tick, core, desc);
        }
    }
}
