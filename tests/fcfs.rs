//! FCFS scheduling scenarios.

use std::time::Duration;

use ossim::{ProcessState, Residency, SchedPolicy, SimEventKind};

mod common;

/// A single three-step process on one CPU completes, taking at least one
/// tick per step, and its pages round-trip through memory.
#[test]
fn test_single_process_runs_to_completion() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.min_ins = 3;
    config.max_ins = 3;
    config.min_mem_per_proc = 512;
    config.max_mem_per_proc = 512;
    let manager = common::manager_in(config, dir.path());

    let process = manager.submit("solo").unwrap();
    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));

    assert_eq!(process.state(), ProcessState::Finished);
    assert!(process.is_complete());
    assert_eq!(process.pc(), 3);
    assert_eq!(process.residency(), Residency::NotResident);
    assert_eq!(process.core(), None);

    // One tick minimum per step: at least 3 ticks from submission to finish.
    let events = manager.trace().events();
    let submitted = events
        .iter()
        .find(|e| matches!(e.kind, SimEventKind::Submitted { .. }))
        .unwrap()
        .tick;
    let finished = events
        .iter()
        .find(|e| matches!(e.kind, SimEventKind::Finished { .. }))
        .unwrap()
        .tick;
    assert!(
        finished >= submitted + 3,
        "finished at {finished}, submitted at {submitted}"
    );

    // 512 bytes over 256-byte frames: two pages in, two pages back out.
    let stats = manager.memory_stats();
    assert_eq!(stats.page_in, 2);
    assert_eq!(stats.page_out, 2);
    assert_eq!(stats.used_bytes, 0);

    assert!(manager.clock().active_ticks() >= 1);
    manager.shutdown();
}

/// FCFS ordering law: with one CPU and no admission failures, completion
/// order equals submission order.
#[test]
fn test_completion_order_matches_submission_order() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let config = common::base_config(SchedPolicy::Fcfs);
    let manager = common::manager_in(config, dir.path());

    let a = manager.submit("first").unwrap();
    let b = manager.submit("second").unwrap();
    let c = manager.submit("third").unwrap();
    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));

    assert_eq!(
        manager.trace().completion_order(),
        vec![a.pid(), b.pid(), c.pid()]
    );
    manager.shutdown();
}

/// Three processes sized so only two fit, two CPUs: the third waits in the
/// queue until a completion frees memory. Nothing is ever evicted.
#[test]
fn test_memory_pressure_resolves_by_completion() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.num_cpu = 2;
    config.min_ins = 10;
    config.max_ins = 10;
    config.min_mem_per_proc = 512;
    config.max_mem_per_proc = 512;
    let manager = common::manager_in(config, dir.path());

    manager.submit("a").unwrap();
    manager.submit("b").unwrap();
    manager.submit("c").unwrap();
    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));

    // All three ran and released: 2 frames each way per process.
    let stats = manager.memory_stats();
    assert_eq!(stats.page_in, 6);
    assert_eq!(stats.page_out, 6);
    assert_eq!(stats.resident_count, 0);

    // Completion freed the space; the backing store was never touched.
    let store = std::fs::read_to_string(dir.path().join("backing-store.txt")).unwrap();
    assert!(store.is_empty(), "unexpected evictions:\n{store}");
    manager.shutdown();
}

/// Same sizing with three CPUs: the third worker pulls the process, gets
/// `NoSpace` (both residents are running and cannot be evicted), and
/// re-enqueues it until a completion makes room.
#[test]
fn test_unadmittable_process_is_deferred_not_evicted() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.num_cpu = 3;
    config.min_ins = 30;
    config.max_ins = 30;
    config.min_mem_per_proc = 512;
    config.max_mem_per_proc = 512;
    let manager = common::manager_in(config, dir.path());

    manager.submit("a").unwrap();
    manager.submit("b").unwrap();
    let c = manager.submit("c").unwrap();
    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));

    assert!(
        manager.trace().defer_count(c.pid()) >= 1,
        "third process should have been bounced at least once"
    );
    let store = std::fs::read_to_string(dir.path().join("backing-store.txt")).unwrap();
    assert!(store.is_empty(), "a running process must never be evicted");
    manager.shutdown();
}

/// `delays-per-exec` spreads steps out: a process with delay k takes at
/// least k ticks between consecutive steps (first step exempt).
#[test]
fn test_delay_per_exec_paces_steps() {
    common::setup_test();
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::base_config(SchedPolicy::Fcfs);
    config.min_ins = 4;
    config.max_ins = 4;
    config.delays_per_exec = 3;
    let manager = common::manager_in(config, dir.path());

    let process = manager.submit("slow").unwrap();
    assert!(common::wait_all_finished(&manager, Duration::from_secs(10)));

    let step_ticks: Vec<u64> = manager
        .trace()
        .events()
        .iter()
        .filter(|e| {
            matches!(e.kind, SimEventKind::StepExecuted { pid, .. } if pid == process.pid())
        })
        .map(|e| e.tick)
        .collect();
    assert_eq!(step_ticks.len(), 4);
    for pair in step_ticks.windows(2) {
        assert!(
            pair[1] >= pair[0] + 3,
            "steps too close together: {step_ticks:?}"
        );
    }
    manager.shutdown();
}
