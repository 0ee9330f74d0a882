//! Host-level error taxonomy.
//!
//! These errors are never visible to the guest. Architecturally defined
//! guest faults (illegal instruction, environment call, breakpoint) are
//! [`Cause`](crate::trap::Cause) codes routed through the trap controller
//! instead; the variants here describe conditions the machine itself cannot
//! recover from: broken host configuration, firmware walking off the mapped
//! address space, or a lock-step comparison split.

use std::io;

use thiserror::Error;

use crate::difftest::DivergenceReport;
use crate::word::{PAddr, Word};

/// Fatal conditions surfaced to the embedding monitor.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An access resolved to no mapped region and no main memory.
    ///
    /// Not a guest exception: the emulator enters the aborted state.
    #[error("address {addr:#x} is out of bound at pc = {pc:#x}")]
    OutOfBound {
        /// The unresolvable physical address.
        addr: PAddr,
        /// Program counter of the instruction performing the access.
        pc: Word,
    },
    /// A region was registered with a zero-length range.
    #[error("region {name} registered with zero length")]
    EmptyRegion {
        /// Name of the rejected region.
        name: &'static str,
    },
    /// A region's range intersects a previously registered range or main memory.
    #[error("region {name} [{low:#x}, {high:#x}] overlaps an existing mapping")]
    RegionOverlap {
        /// Name of the rejected region.
        name: &'static str,
        /// Inclusive low bound of the rejected range.
        low: PAddr,
        /// Inclusive high bound of the rejected range.
        high: PAddr,
    },
    /// Device registration was attempted after the engine started executing.
    #[error("region {name} registered after execution started")]
    LateRegistration {
        /// Name of the rejected region.
        name: &'static str,
    },
    /// The lock-step comparison found a state mismatch.
    ///
    /// Fatal to the differential session only; both engines halt but the
    /// process survives.
    #[error("lock-step divergence: {0}")]
    Divergence(DivergenceReport),
    /// Snapshot save/load failed at the I/O layer.
    #[error("snapshot i/o failed: {0}")]
    Snapshot(#[from] io::Error),
}
