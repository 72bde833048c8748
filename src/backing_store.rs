//! On-disk backing store for evicted processes.
//!
//! An append-only text file of pipe-delimited descriptor records:
//!
//! ```text
//! pid|name|created_at|pc|program_len|mem_bytes
//! ```
//!
//! Writers (allocator eviction paths on any worker thread) serialise on a
//! single mutex. Reads are only performed by the diagnostic dump path,
//! never by the scheduler.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};

use crate::process::ProcessDescriptor;
use crate::types::Pid;

/// Default backing-store file name.
pub const DEFAULT_BACKING_STORE: &str = "backing-store.txt";

pub struct BackingStore {
    path: PathBuf,
    writer: Mutex<File>,
}

impl BackingStore {
    /// Open (creating if needed) the store file in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<BackingStore> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("unable to open backing store {}", path.display()))?;
        Ok(BackingStore {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one descriptor record.
    pub fn persist(&self, desc: &ProcessDescriptor) -> Result<()> {
        let mut file = self.writer.lock().unwrap();
        writeln!(file, "{}", encode(desc))
            .with_context(|| format!("unable to append to {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("unable to flush {}", self.path.display()))?;
        Ok(())
    }

    /// Reconstruct the most recently persisted descriptor for `pid`, if
    /// any. Scans the whole file; this is a diagnostic path.
    pub fn restore(&self, pid: Pid) -> Result<Option<ProcessDescriptor>> {
        let _guard = self.writer.lock().unwrap();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("unable to read {}", self.path.display()))
            }
        };

        let mut found = None;
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| format!("unable to read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let desc = decode(&line)
                .with_context(|| format!("corrupt record in {}", self.path.display()))?;
            if desc.pid == pid {
                found = Some(desc);
            }
        }
        Ok(found)
    }
}

fn encode(desc: &ProcessDescriptor) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        desc.pid, desc.name, desc.created_at, desc.pc, desc.program_len, desc.mem_bytes
    )
}

fn decode(line: &str) -> Result<ProcessDescriptor> {
    let fields: Vec<&str> = line.splitn(6, '|').collect();
    if fields.len() != 6 {
        bail!("expected 6 pipe-delimited fields, got {}", fields.len());
    }
    Ok(ProcessDescriptor {
        pid: Pid(fields[0].parse().context("unparsable pid")?),
        name: fields[1].to_string(),
        created_at: fields[2].to_string(),
        pc: fields[3].parse().context("unparsable pc")?,
        program_len: fields[4].parse().context("unparsable program length")?,
        mem_bytes: fields[5].parse().context("unparsable memory size")?,
    })
}
