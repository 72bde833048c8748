//! ossim - Tick-driven operating system simulator.
//!
//! Models a small batch of synthetic CPU-bound processes dispatched across
//! a fixed number of simulated cores under FCFS or Round-Robin scheduling,
//! with bounded memory managed by a flat contiguous or fixed-frame paging
//! allocator and an on-disk backing store for evicted processes.
//!
//! # Architecture
//!
//! - **Clock**: ticker thread advancing a monotonic counter, broadcast per
//!   tick; everything else paces itself on the broadcast
//! - **Scheduler**: one worker thread per simulated core pulling from a
//!   FIFO ready queue, with quantum enforcement under RR
//! - **Memory**: pluggable allocator admitting/evicting whole processes;
//!   evictees are persisted to the backing store
//! - **Manager**: admission façade owning all of the above
//!
//! # Usage
//!
//! ```rust,no_run
//! use ossim::{ProcessManager, SimConfig, SimOptions};
//!
//! let config = SimConfig::load("config.txt")?;
//! let manager = ProcessManager::new(config, SimOptions::default())?;
//! manager.submit("p01")?;
//! println!("{}", manager.vmstat());
//! manager.shutdown();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backing_store;
pub mod clock;
pub mod config;
pub mod core_state;
pub mod manager;
pub mod mem;
pub mod process;
pub mod report;
pub mod scheduler;
pub mod trace;
pub mod types;

// Re-export the main public types for convenience.
pub use backing_store::{BackingStore, DEFAULT_BACKING_STORE};
pub use clock::{TickClock, DEFAULT_TICK_PERIOD};
pub use config::{SchedPolicy, SimConfig, DEFAULT_SEED};
pub use core_state::{CoreState, CoreStateRegistry};
pub use manager::{ProcessManager, SimOptions, SubmitError};
pub use mem::{
    build_allocator, AdmitError, FlatAllocator, MemoryAllocator, MemoryStats, PagingAllocator,
};
pub use process::{Process, ProcessDescriptor, ProcessState, Residency};
pub use scheduler::{MemoryStampConfig, Scheduler};
pub use trace::{SimEvent, SimEventKind, Trace};
pub use types::{CoreId, FrameId, Pid, Tick};
