//! Read-only renderers for the reporting commands.
//!
//! These build the human-readable blocks behind `screen -ls`,
//! `report-util`, `process-smi`, and `vmstat` from snapshots handed over by
//! the manager. Formats are a view concern; nothing parses them back.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::core_state::CoreState;
use crate::mem::MemoryStats;
use crate::process::{Process, ProcessState};
use crate::types::Tick;

/// The per-process table shown by `screen -ls` and written by
/// `report-util`.
pub fn render_process_table(
    processes: &[Arc<Process>],
    cores: &[CoreState],
    num_cpu: u32,
) -> String {
    let mut out = String::new();
    if processes.is_empty() {
        out.push_str("There are no active screens.\n");
        return out;
    }

    let busy = cores.iter().filter(|c| c.busy).count() as u32;
    writeln!(out, "CPU utilization: {}%", busy * 100 / num_cpu).unwrap();
    writeln!(out, "Cores used: {busy}").unwrap();
    writeln!(out, "Cores available: {}", num_cpu - busy).unwrap();
    out.push_str("------------------------------------------------\n");

    let mut running = String::new();
    let mut finished = String::new();
    for process in processes {
        let mut line = format!("{:<30} ({}) ", process.name(), process.created_at());
        match process.state() {
            ProcessState::Running => {
                let core = process.core().map(|c| c.0).unwrap_or(0);
                write!(
                    line,
                    "  Core: {core}   {} / {}",
                    process.pc(),
                    process.program_len()
                )
                .unwrap();
                running.push_str(&line);
                running.push('\n');
            }
            ProcessState::Ready | ProcessState::Waiting => {
                write!(line, "  {:?}   {} / {}", process.state(), process.pc(), process.program_len())
                    .unwrap();
                running.push_str(&line);
                running.push('\n');
            }
            ProcessState::Finished => {
                write!(
                    line,
                    "  Finished   {} / {}",
                    process.pc(),
                    process.program_len()
                )
                .unwrap();
                finished.push_str(&line);
                finished.push('\n');
            }
        }
    }

    out.push_str("Running processes:\n");
    out.push_str(&running);
    out.push_str("\nFinished processes:\n");
    out.push_str(&finished);
    out.push_str("------------------------------------------------\n");
    out
}

/// The `process-smi` summary block.
pub fn render_process_smi(
    processes: &[Arc<Process>],
    cores: &[CoreState],
    num_cpu: u32,
    stats: MemoryStats,
) -> String {
    let busy = cores.iter().filter(|c| c.busy).count() as u32;
    let mem_util = if stats.max_bytes == 0 {
        0
    } else {
        stats.used_bytes * 100 / stats.max_bytes
    };

    let mut out = String::new();
    out.push_str("------------------------------------------\n");
    out.push_str("| PROCESS-SMI V01.00       Driver: 01.00 |\n");
    out.push_str("------------------------------------------\n");
    writeln!(out, "CPU-Util: {}%", busy * 100 / num_cpu).unwrap();
    writeln!(
        out,
        "Memory Usage: {} / {} bytes",
        stats.used_bytes, stats.max_bytes
    )
    .unwrap();
    writeln!(out, "Memory Util: {mem_util}%").unwrap();
    out.push_str("==========================================\n");
    out.push_str("Running processes and memory usage:\n");
    out.push_str("------------------------------------------\n");

    let mut any = false;
    for process in processes {
        if process.is_resident() {
            writeln!(out, "{} {} bytes", process.name(), process.mem_bytes()).unwrap();
            any = true;
        }
    }
    if !any {
        out.push_str("There are no processes in memory.\n");
    }
    out.push_str("------------------------------------------\n");
    out
}

/// The `vmstat` counter block.
pub fn render_vmstat(stats: MemoryStats, total: Tick, active: Tick, idle: Tick) -> String {
    let mut out = String::new();
    writeln!(out, "{:>10} total memory", stats.max_bytes).unwrap();
    writeln!(out, "{:>10} used memory", stats.used_bytes).unwrap();
    writeln!(
        out,
        "{:>10} free memory",
        stats.max_bytes.saturating_sub(stats.used_bytes)
    )
    .unwrap();
    writeln!(out, "{idle:>10} idle cpu ticks").unwrap();
    writeln!(out, "{active:>10} active cpu ticks").unwrap();
    writeln!(out, "{total:>10} total cpu ticks").unwrap();
    writeln!(out, "{:>10} pages paged in", stats.page_in).unwrap();
    writeln!(out, "{:>10} pages paged out", stats.page_out).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoreId, Pid};

    fn process(pid: u32, name: &str, len: usize) -> Arc<Process> {
        Arc::new(Process::new(Pid(pid), name, "01/01/2026, 09:00:00 AM", len, 256, 256))
    }

    fn cores(busy: &[bool]) -> Vec<CoreState> {
        busy.iter()
            .map(|&b| CoreState {
                busy: b,
                occupant: b.then(|| "x".to_string()),
            })
            .collect()
    }

    #[test]
    fn test_empty_table() {
        let table = render_process_table(&[], &cores(&[false, false]), 2);
        assert!(table.contains("no active screens"));
    }

    #[test]
    fn test_table_groups_by_state() {
        let running = process(1, "runner", 5);
        running.set_state(ProcessState::Running);
        running.set_core(Some(CoreId(2)));
        let done = process(2, "done", 3);
        done.set_state(ProcessState::Finished);

        let table =
            render_process_table(&[running, done], &cores(&[false, true]), 2);
        assert!(table.contains("CPU utilization: 50%"));
        assert!(table.contains("Cores used: 1"));
        assert!(table.contains("Cores available: 1"));
        assert!(table.contains("Core: 2"));
        let running_at = table.find("runner").unwrap();
        let finished_at = table.find("done").unwrap();
        assert!(running_at < finished_at);
    }

    #[test]
    fn test_smi_lists_residents_only() {
        let resident = process(1, "inmem", 5);
        resident.set_residency(crate::process::Residency::Flat { base: 0, end: 256 });
        let outside = process(2, "gone", 5);

        let stats = MemoryStats {
            max_bytes: 1024,
            used_bytes: 256,
            ..Default::default()
        };
        let smi = render_process_smi(&[resident, outside], &cores(&[true]), 1, stats);
        assert!(smi.contains("CPU-Util: 100%"));
        assert!(smi.contains("Memory Usage: 256 / 1024 bytes"));
        assert!(smi.contains("Memory Util: 25%"));
        assert!(smi.contains("inmem 256 bytes"));
        assert!(!smi.contains("gone"));
    }

    #[test]
    fn test_vmstat_lines() {
        let stats = MemoryStats {
            max_bytes: 16384,
            used_bytes: 512,
            page_in: 4,
            page_out: 2,
            ..Default::default()
        };
        let vmstat = render_vmstat(stats, 120, 20, 100);
        assert!(vmstat.contains("16384 total memory"));
        assert!(vmstat.contains("512 used memory"));
        assert!(vmstat.contains("15872 free memory"));
        assert!(vmstat.contains("100 idle cpu ticks"));
        assert!(vmstat.contains("20 active cpu ticks"));
        assert!(vmstat.contains("120 total cpu ticks"));
        assert!(vmstat.contains("4 pages paged in"));
        assert!(vmstat.contains("2 pages paged out"));
    }
}
