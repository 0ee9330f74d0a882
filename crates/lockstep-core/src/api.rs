//! Host-facing configuration, outcomes, and trace contracts.

use crate::trap::Cause;
use crate::word::{PAddr, Word};

/// Default physical memory base address.
pub const DEFAULT_MEM_BASE: PAddr = 0x8000_0000;
/// Default physical memory size (128 MiB).
pub const DEFAULT_MEM_SIZE: usize = 0x0800_0000;

/// Immutable configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CoreConfig {
    /// Physical base address of main memory.
    pub mem_base: PAddr,
    /// Size of main memory in bytes.
    pub mem_size: usize,
    /// Program counter value after reset.
    pub reset_vector: PAddr,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mem_base: DEFAULT_MEM_BASE,
            mem_size: DEFAULT_MEM_SIZE,
            reset_vector: DEFAULT_MEM_BASE,
        }
    }
}

/// Status of one instruction retirement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Instruction retired normally.
    Retired,
    /// Instruction raised a guest-visible trap; execution resumes at the
    /// vector.
    Trapped {
        /// Cause code written to the cause register.
        cause: Word,
    },
    /// The guest terminated itself.
    Ended {
        /// Guest exit code.
        code: Word,
    },
    /// A fatal bus condition aborted the machine.
    Aborted,
}

/// Aggregated outcome from a batched run call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Number of instructions retired during this call.
    pub retired: u64,
    /// Run state observed when the call returned.
    pub state: crate::state::RunState,
}

/// Classification of a control-transfer instruction for the call-trace hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// A call-like transfer.
    Call,
    /// A return-like transfer.
    Return,
}

/// Deterministic trace events emitted at instruction boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// An instruction retired.
    InstructionRetired {
        /// Program counter of the retired instruction.
        pc: Word,
        /// Raw instruction word.
        raw: u32,
    },
    /// A control-transfer instruction executed.
    ControlTransfer {
        /// Call or return classification.
        kind: TransferKind,
        /// Program counter of the transfer instruction.
        from: Word,
        /// Transfer target.
        to: Word,
    },
    /// A trap entry sequence completed.
    TrapRaised {
        /// Architectural cause.
        cause: Cause,
        /// Faulting program counter.
        pc: Word,
    },
}

/// Sink trait for trace hooks; events arrive in execution order.
pub trait TraceSink {
    /// Records one event.
    fn on_event(&mut self, event: TraceEvent);
}

#[cfg(test)]
mod tests {
    use super::{CoreConfig, DEFAULT_MEM_BASE, DEFAULT_MEM_SIZE};

    #[test]
    fn default_config_places_memory_at_the_canonical_base() {
        let config = CoreConfig::default();
        assert_eq!(config.mem_base, DEFAULT_MEM_BASE);
        assert_eq!(config.mem_size, DEFAULT_MEM_SIZE);
        assert_eq!(config.reset_vector, DEFAULT_MEM_BASE);
    }
}
