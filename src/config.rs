//! Simulator configuration.
//!
//! Loaded once at `initialize` from a whitespace-separated key–value file:
//!
//! ```text
//! num-cpu 4
//! scheduler "rr"
//! quantum-cycles 5
//! batch-process-freq 1
//! min-ins 1000
//! max-ins 2000
//! delays-per-exec 0
//! max-overall-mem 16384
//! mem-per-frame 16
//! min-mem-per-proc 4096
//! max-mem-per-proc 4096
//! ```
//!
//! Every constraint is validated here; a violation aborts `initialize`
//! without constructing the manager.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::info;

/// Default PRNG seed used when `OSSIM_SEED` is not set.
pub const DEFAULT_SEED: u64 = 42;

/// Scheduling policy selected by the `scheduler` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    Fcfs,
    Rr,
}

impl FromStr for SchedPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fcfs" => Ok(SchedPolicy::Fcfs),
            "rr" => Ok(SchedPolicy::Rr),
            other => bail!("scheduler must be \"fcfs\" or \"rr\", got {other:?}"),
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedPolicy::Fcfs => write!(f, "fcfs"),
            SchedPolicy::Rr => write!(f, "rr"),
        }
    }
}

/// Validated simulator configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of worker cores.
    pub num_cpu: u32,
    pub scheduler: SchedPolicy,
    /// RR quantum, in executed steps.
    pub quantum_cycles: u32,
    /// Ticks between automatic submissions while `scheduler-test` runs.
    pub batch_process_freq: u64,
    /// Program-length bounds (steps).
    pub min_ins: usize,
    pub max_ins: usize,
    /// Ticks to wait between steps of the same process.
    pub delays_per_exec: u32,
    /// Total simulated memory in bytes.
    pub max_overall_mem: usize,
    /// Frame size for the paging allocator.
    pub mem_per_frame: usize,
    /// Per-process footprint bounds; powers of two.
    pub min_mem_per_proc: usize,
    pub max_mem_per_proc: usize,
    /// PRNG seed for process generation streams.
    pub seed: u64,
}

impl SimConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<SimConfig> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to open config file {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        info!(config = ?config, "configuration loaded");
        Ok(config)
    }

    /// Parse configuration text. Keys may appear in any order; each key
    /// must appear exactly once.
    pub fn parse(text: &str) -> Result<SimConfig> {
        let mut num_cpu = None;
        let mut scheduler = None;
        let mut quantum_cycles = None;
        let mut batch_process_freq = None;
        let mut min_ins = None;
        let mut max_ins = None;
        let mut delays_per_exec = None;
        let mut max_overall_mem = None;
        let mut mem_per_frame = None;
        let mut min_mem_per_proc = None;
        let mut max_mem_per_proc = None;

        let mut tokens = text.split_whitespace();
        while let Some(key) = tokens.next() {
            let value = tokens
                .next()
                .with_context(|| format!("missing value for key {key:?}"))?;
            match key {
                "num-cpu" => set_once(&mut num_cpu, key, parse_num::<u32>(key, value)?)?,
                "scheduler" => {
                    set_once(&mut scheduler, key, unquote(value).parse::<SchedPolicy>()?)?
                }
                "quantum-cycles" => {
                    set_once(&mut quantum_cycles, key, parse_num::<u32>(key, value)?)?
                }
                "batch-process-freq" => {
                    set_once(&mut batch_process_freq, key, parse_num::<u64>(key, value)?)?
                }
                "min-ins" => set_once(&mut min_ins, key, parse_num::<usize>(key, value)?)?,
                "max-ins" => set_once(&mut max_ins, key, parse_num::<usize>(key, value)?)?,
                "delays-per-exec" => {
                    set_once(&mut delays_per_exec, key, parse_num::<u32>(key, value)?)?
                }
                "max-overall-mem" => {
                    set_once(&mut max_overall_mem, key, parse_num::<usize>(key, value)?)?
                }
                "mem-per-frame" => {
                    set_once(&mut mem_per_frame, key, parse_num::<usize>(key, value)?)?
                }
                "min-mem-per-proc" => {
                    set_once(&mut min_mem_per_proc, key, parse_num::<usize>(key, value)?)?
                }
                "max-mem-per-proc" => {
                    set_once(&mut max_mem_per_proc, key, parse_num::<usize>(key, value)?)?
                }
                other => bail!("unknown config key {other:?}"),
            }
        }

        let config = SimConfig {
            num_cpu: require(num_cpu, "num-cpu")?,
            scheduler: require(scheduler, "scheduler")?,
            quantum_cycles: require(quantum_cycles, "quantum-cycles")?,
            batch_process_freq: require(batch_process_freq, "batch-process-freq")?,
            min_ins: require(min_ins, "min-ins")?,
            max_ins: require(max_ins, "max-ins")?,
            delays_per_exec: require(delays_per_exec, "delays-per-exec")?,
            max_overall_mem: require(max_overall_mem, "max-overall-mem")?,
            mem_per_frame: require(mem_per_frame, "mem-per-frame")?,
            min_mem_per_proc: require(min_mem_per_proc, "min-mem-per-proc")?,
            max_mem_per_proc: require(max_mem_per_proc, "max-mem-per-proc")?,
            seed: seed_from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.num_cpu < 1 {
            bail!("num-cpu must be at least 1");
        }
        if self.quantum_cycles < 1 {
            bail!("quantum-cycles must be at least 1");
        }
        if self.batch_process_freq < 1 {
            bail!("batch-process-freq must be at least 1");
        }
        if self.min_ins < 1 {
            bail!("min-ins must be at least 1");
        }
        if self.min_ins > self.max_ins {
            bail!(
                "min-ins ({}) must not exceed max-ins ({})",
                self.min_ins,
                self.max_ins
            );
        }
        if self.max_overall_mem == 0 {
            bail!("max-overall-mem must be positive");
        }
        if self.mem_per_frame == 0 {
            bail!("mem-per-frame must be positive");
        }
        if self.max_overall_mem % self.mem_per_frame != 0 {
            bail!(
                "mem-per-frame ({}) must divide max-overall-mem ({})",
                self.mem_per_frame,
                self.max_overall_mem
            );
        }
        if !self.min_mem_per_proc.is_power_of_two() || !self.max_mem_per_proc.is_power_of_two() {
            bail!("min-mem-per-proc and max-mem-per-proc must be powers of two");
        }
        if self.min_mem_per_proc > self.max_mem_per_proc {
            bail!(
                "min-mem-per-proc ({}) must not exceed max-mem-per-proc ({})",
                self.min_mem_per_proc,
                self.max_mem_per_proc
            );
        }
        Ok(())
    }

    /// Number of frames available to the paging allocator.
    pub fn num_frames(&self) -> usize {
        self.max_overall_mem / self.mem_per_frame
    }
}

/// Resolve the PRNG seed from the `OSSIM_SEED` environment variable.
///
/// Unset or unparsable values fall back to [`DEFAULT_SEED`]; a non-default
/// seed is logged so the run can be reproduced.
pub fn seed_from_env() -> u64 {
    match std::env::var("OSSIM_SEED").ok().and_then(|s| s.parse::<u64>().ok()) {
        Some(seed) => {
            if seed != DEFAULT_SEED {
                info!(seed, "seeding process generation from OSSIM_SEED");
            }
            seed
        }
        None => DEFAULT_SEED,
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .ok()
        .with_context(|| format!("key {key:?}: unparsable value {value:?}"))
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<()> {
    if slot.replace(value).is_some() {
        bail!("duplicate config key {key:?}");
    }
    Ok(())
}

fn require<T>(slot: Option<T>, key: &str) -> Result<T> {
    slot.with_context(|| format!("missing config key {key:?}"))
}
