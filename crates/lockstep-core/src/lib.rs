//! Single-hart RISC-V emulator core with lock-step differential testing.
//!
//! The crate is built from five cooperating parts: the instruction
//! decode/execute engine, the physical address router, the trap controller,
//! the architectural state model, and the differential harness that keeps a
//! primary and a reference engine synchronized and reports the first state
//! divergence. The interactive monitor, expression evaluator, and loader
//! live outside this crate and drive it through [`Core`] and [`Harness`].

/// Machine word aliases and bit-manipulation primitives.
pub mod word;
pub use word::{bits, sext, DWord, PAddr, SDWord, SWord, Word, INST_BYTES, SHAMT_MASK, XLEN};

/// Host-level error taxonomy.
pub mod fault;
pub use fault::CoreError;

/// Architectural CPU state model.
pub mod state;
pub use state::{
    gpr_index_by_name, CpuState, Csr, RunState, Status, CSR_MCAUSE, CSR_MEPC, CSR_MSTATUS,
    CSR_MTVEC, GPR_COUNT, GPR_NAMES, PRIV_MACHINE,
};

/// Ordered bit-pattern decode table.
pub mod encoding;
pub use encoding::{match_word, InstFormat, InstPattern, Op, DECODE_TABLE};

/// Instruction decode: template match plus operand extraction.
pub mod decoder;
pub use decoder::{decode, DecodedInst};

/// Trap controller.
pub mod trap;
pub use trap::{query_pending, raise, raise_code, Cause, INTERRUPT_FLAG};

/// Physical address router.
pub mod bus;
pub use bus::{AccessDirection, Bus, BusFault, IoCallback, MappedRegion, RegionKind, PAGE_SIZE};

/// Host-facing configuration, outcomes, and trace contracts.
pub mod api;
pub use api::{
    CoreConfig, RunOutcome, StepOutcome, TraceEvent, TraceSink, TransferKind, DEFAULT_MEM_BASE,
    DEFAULT_MEM_SIZE,
};

/// Fetch-decode-execute engine.
pub mod execute;
pub use execute::arith;

/// Engine façade: one self-contained emulator instance.
pub mod core;
pub use crate::core::Core;

/// Flat state dump persistence.
pub mod snapshot;
pub use snapshot::{load, save, STATE_BYTES};

/// Lock-step differential testing harness.
pub mod difftest;
pub use difftest::{compare_states, Direction, DivergenceReport, Harness, LocalRef, RefModel};

/// Built-in device models.
pub mod devices;
pub use devices::{Rtc, Serial, RTC_BASE, SERIAL_BASE};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tracing_subscriber as _;
