#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ossim::{ProcessManager, SchedPolicy, SimConfig, SimOptions};

/// Initialize tracing from `RUST_LOG`. `try_init` is idempotent: the first
/// call in the process succeeds, later calls are silently ignored.
pub fn setup_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A small, fast baseline configuration; tests override what they pin.
pub fn base_config(policy: SchedPolicy) -> SimConfig {
    SimConfig {
        num_cpu: 1,
        scheduler: policy,
        quantum_cycles: 2,
        batch_process_freq: 1,
        min_ins: 3,
        max_ins: 3,
        delays_per_exec: 0,
        max_overall_mem: 1024,
        mem_per_frame: 256,
        min_mem_per_proc: 256,
        max_mem_per_proc: 256,
        seed: 42,
    }
}

/// Build a manager whose backing store lives under `dir`, ticking fast so
/// scenarios finish in milliseconds.
pub fn manager_in(config: SimConfig, dir: &Path) -> Arc<ProcessManager> {
    let options = SimOptions {
        backing_store: dir.join("backing-store.txt"),
        memory_stamps: None,
        tick_period: Duration::from_micros(200),
    };
    ProcessManager::new(config, options).expect("manager construction failed")
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Wait until every submitted process reports FINISHED.
pub fn wait_all_finished(manager: &ProcessManager, timeout: Duration) -> bool {
    wait_until(timeout, || {
        manager
            .list_all()
            .iter()
            .all(|p| p.state() == ossim::ProcessState::Finished)
    })
}
