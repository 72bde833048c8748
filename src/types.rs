//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers (process ids, core ids, frame ids) prevent
//! silent type confusion. Quantities (tick counts, byte sizes) stay as
//! aliases for self-documenting code without arithmetic-trait boilerplate.

use std::fmt;

/// Process identifier. Assigned monotonically from 1 by the process manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

/// Simulated CPU core identifier, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(pub u32);

/// Physical frame index under the paging allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

/// A point on the simulated CPU clock (number of elapsed ticks).
pub type Tick = u64;

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
