//! The simulated CPU clock.
//!
//! A dedicated ticker thread increments a monotonic counter once per tick
//! period (~1 ms by default) and broadcasts each increment on a condition
//! variable. Worker cores, the stats watcher, and the batch generator all
//! pace themselves by blocking on that broadcast.
//!
//! Two counters are exposed: `ticks`, the total since start, and
//! `active_ticks`, bumped once per tick on which at least one core was busy
//! (the scheduler's watcher thread performs that accounting).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::info;

use crate::types::Tick;

/// Default tick period: one simulated tick per millisecond of wall clock.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Monotonic tick counter driven by a ticker thread.
///
/// Cheap reads (`ticks()`, `active_ticks()`) go through atomics; the
/// mutex/condvar pair exists solely for the per-tick broadcast that
/// `wait_for_tick_after` blocks on. The counter increment happens under the
/// mutex, so a waiter that observes tick `T` also observes every write made
/// before `T` was broadcast.
pub struct TickClock {
    shared: Arc<ClockShared>,
    period: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

struct ClockShared {
    ticks: AtomicU64,
    active_ticks: AtomicU64,
    running: AtomicBool,
    lock: Mutex<()>,
    tick_cond: Condvar,
}

impl TickClock {
    pub fn new(period: Duration) -> Self {
        TickClock {
            shared: Arc::new(ClockShared {
                ticks: AtomicU64::new(0),
                active_ticks: AtomicU64::new(0),
                running: AtomicBool::new(false),
                lock: Mutex::new(()),
                tick_cond: Condvar::new(),
            }),
            period,
            ticker: Mutex::new(None),
        }
    }

    /// Total ticks since `start`.
    pub fn ticks(&self) -> Tick {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Ticks on which at least one core was busy.
    pub fn active_ticks(&self) -> Tick {
        self.shared.active_ticks.load(Ordering::SeqCst)
    }

    /// Ticks on which every core was idle.
    pub fn idle_ticks(&self) -> Tick {
        self.ticks().saturating_sub(self.active_ticks())
    }

    /// Whether the ticker thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Record the current tick as active. Called at most once per tick by
    /// the scheduler's watcher thread.
    pub fn note_active_tick(&self) {
        self.shared.active_ticks.fetch_add(1, Ordering::SeqCst);
    }

    /// Start the ticker thread. Idempotent: a second call on a running
    /// clock is a no-op.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let period = self.period;
        let handle = thread::Builder::new()
            .name("tick-clock".into())
            .spawn(move || {
                while shared.running.load(Ordering::SeqCst) {
                    {
                        let _guard = shared.lock.lock().unwrap();
                        shared.ticks.fetch_add(1, Ordering::SeqCst);
                    }
                    shared.tick_cond.notify_all();
                    thread::sleep(period);
                }
                // Final broadcast so waiters observe the stop.
                shared.tick_cond.notify_all();
            })
            .expect("failed to spawn tick-clock thread");

        *self.ticker.lock().unwrap() = Some(handle);
        info!("tick clock started");
    }

    /// Stop the ticker thread and wait for it to exit. Safe to call from
    /// any thread and safe to call more than once.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.tick_cond.notify_all();
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!(ticks = self.ticks(), "tick clock stopped");
    }

    /// Block until the clock has advanced past `after`, returning the
    /// observed tick count.
    ///
    /// While the clock is running the returned value is strictly greater
    /// than `after`; the wait never returns early on a spurious wakeup. If
    /// the clock is stopped (or stops mid-wait) the current tick count is
    /// returned as-is so blocked threads can observe shutdown.
    pub fn wait_for_tick_after(&self, after: Tick) -> Tick {
        let mut guard = self.shared.lock.lock().unwrap();
        loop {
            let now = self.shared.ticks.load(Ordering::SeqCst);
            if now > after || !self.shared.running.load(Ordering::SeqCst) {
                return now;
            }
            guard = self.shared.tick_cond.wait(guard).unwrap();
        }
    }
}

impl Drop for TickClock {
    fn drop(&mut self) {
        self.stop();
    }
}
