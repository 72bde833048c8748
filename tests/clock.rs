//! Tick clock contract under concurrency, plus the watcher's periodic
//! memory stamps.

use std::sync::Arc;
use std::time::Duration;

use ossim::{SchedPolicy, SimConfig, SimOptions, TickClock};

mod common;

/// Waiters on different threads all observe strictly increasing ticks.
#[test]
fn test_waiters_observe_monotonic_ticks() {
    common::setup_test();
    let clock = Arc::new(TickClock::new(Duration::from_micros(200)));
    clock.start();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let clock = Arc::clone(&clock);
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..20 {
                    let seen = clock.wait_for_tick_after(last);
                    assert!(seen > last);
                    last = seen;
                }
                last
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap() >= 20);
    }
    clock.stop();
}

/// Stop unblocks every waiter instead of leaving threads parked.
#[test]
fn test_stop_releases_all_waiters() {
    common::setup_test();
    let clock = Arc::new(TickClock::new(Duration::from_micros(200)));
    clock.start();
    clock.wait_for_tick_after(0);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let clock = Arc::clone(&clock);
            std::thread::spawn(move || {
                // Far beyond anything the clock will reach in this test.
                clock.wait_for_tick_after(u64::MAX - 1)
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(2));
    clock.stop();
    for waiter in waiters {
        waiter.join().unwrap();
    }
}

/// With stamps enabled, the watcher writes a memory snapshot every
/// `quantum-cycles` ticks.
#[test]
fn test_memory_stamps_are_written() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let stamp_dir = dir.path().join("stamps");
    std::fs::create_dir(&stamp_dir).unwrap();

    let config = SimConfig {
        quantum_cycles: 5,
        min_ins: 20,
        max_ins: 20,
        ..common::base_config(SchedPolicy::Rr)
    };
    let options = SimOptions {
        backing_store: dir.path().join("backing-store.txt"),
        memory_stamps: Some(stamp_dir.clone()),
        tick_period: Duration::from_micros(200),
    };
    let manager = ossim::ProcessManager::new(config, options).unwrap();

    manager.submit("stamped").unwrap();
    assert!(common::wait_until(Duration::from_secs(5), || {
        stamp_dir.join("memory_stamp_2.txt").exists()
    }));
    manager.shutdown();

    let first = std::fs::read_to_string(stamp_dir.join("memory_stamp_0.txt")).unwrap();
    assert!(first.contains("Frame"), "{first}");
}
