//! Architectural CPU state model.

/// Control and status register block.
pub mod csr;
/// General-purpose register file and program counter.
pub mod registers;
/// Host-observable execution-state machine.
pub mod run_state;

pub use csr::{
    Csr, Status, CSR_MCAUSE, CSR_MEPC, CSR_MSTATUS, CSR_MTVEC, PRIV_MACHINE, STATUS_MIE,
    STATUS_MPIE, STATUS_MPP_MASK, STATUS_MPP_SHIFT,
};
pub use registers::{gpr_index_by_name, CpuState, GPR_COUNT, GPR_NAMES, REG_A0, REG_RA, REG_ZERO};
pub use run_state::RunState;
