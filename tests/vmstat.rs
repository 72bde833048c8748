//! Tick accounting and the reporting surfaces.

use std::time::Duration;

use ossim::SchedPolicy;

mod common;

/// With no processes submitted, every tick is idle and no page moves.
#[test]
fn test_all_ticks_idle_without_processes() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let config = common::base_config(SchedPolicy::Fcfs);
    let manager = common::manager_in(config, dir.path());

    assert!(common::wait_until(Duration::from_secs(5), || {
        manager.clock().ticks() >= 30
    }));
    manager.shutdown();

    let clock = manager.clock();
    assert!(clock.ticks() >= 30);
    assert_eq!(clock.active_ticks(), 0);
    assert_eq!(clock.idle_ticks(), clock.ticks());

    let stats = manager.memory_stats();
    assert_eq!(stats.page_in, 0);
    assert_eq!(stats.page_out, 0);

    let vmstat = manager.vmstat();
    assert!(vmstat.contains("0 active cpu ticks"), "{vmstat}");
    assert!(vmstat.contains("0 pages paged in"), "{vmstat}");
    assert!(vmstat.contains("0 pages paged out"), "{vmstat}");
}

/// A busy run accrues active ticks, and active + idle always equals total.
#[test]
fn test_active_ticks_accrue_under_load() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.min_ins = 30;
    config.max_ins = 30;
    let manager = common::manager_in(config, dir.path());

    manager.submit("busy").unwrap();
    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));
    manager.shutdown();

    let clock = manager.clock();
    assert!(clock.active_ticks() >= 1);
    assert!(clock.active_ticks() <= clock.ticks());
    assert_eq!(clock.idle_ticks() + clock.active_ticks(), clock.ticks());
}

/// The reporting surfaces name the processes they summarise.
#[test]
fn test_reports_mention_processes() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.min_ins = 200;
    config.max_ins = 200;
    let manager = common::manager_in(config, dir.path());

    let a = manager.submit("reported").unwrap();
    assert!(common::wait_until(Duration::from_secs(5), || a.pc() > 0));

    let table = manager.process_table();
    assert!(table.contains("reported"), "{table}");
    assert!(table.contains("CPU utilization"), "{table}");

    let smi = manager.process_smi();
    assert!(smi.contains("reported"), "{smi}");

    let report_path = dir.path().join("report.txt");
    manager.write_report(&report_path).unwrap();
    let written = std::fs::read_to_string(&report_path).unwrap();
    assert!(written.contains("reported"));

    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));
    let table = manager.process_table();
    assert!(table.contains("Finished"), "{table}");
    manager.shutdown();
}

/// The batch generator submits on the configured cadence and stops cleanly.
#[test]
fn test_batch_generator_submits_processes() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.batch_process_freq = 5;
    config.min_ins = 2;
    config.max_ins = 2;
    let manager = common::manager_in(config, dir.path());

    assert!(manager.start_batch());
    // A second start is refused while the first is running.
    assert!(!manager.start_batch());

    assert!(common::wait_until(Duration::from_secs(5), || {
        manager.list_all().len() >= 3
    }));
    assert!(manager.stop_batch());
    assert!(!manager.stop_batch());

    let count = manager.list_all().len();
    assert!(count >= 3);
    // No further submissions after stop.
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(manager.list_all().len(), count);
    manager.shutdown();
}

/// The memory map snapshot reflects the live allocator.
#[test]
fn test_memory_snapshot_renders() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.min_ins = 200;
    config.max_ins = 200;
    let manager = common::manager_in(config, dir.path());

    let a = manager.submit("mapped").unwrap();
    assert!(common::wait_until(Duration::from_secs(5), || a.pc() > 0));
    let snapshot = manager.memory_snapshot();
    assert!(snapshot.contains("mapped"), "{snapshot}");
    manager.shutdown();
}
