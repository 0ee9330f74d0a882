//! Trap controller: privileged-state transitions on exceptions.

use crate::state::{CpuState, PRIV_MACHINE};
use crate::word::{Word, XLEN};

/// High bit distinguishing asynchronous interrupts from synchronous
/// exceptions in the cause register.
pub const INTERRUPT_FLAG: Word = 1 << (XLEN - 1);

/// Architectural cause codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cause {
    /// Instruction address not aligned to the instruction width.
    InstructionAddressMisaligned,
    /// Instruction fetch permission failure.
    InstructionAccessFault,
    /// No decode template matched except the catch-all.
    IllegalInstruction,
    /// Breakpoint request.
    Breakpoint,
    /// Misaligned data load.
    LoadAddressMisaligned,
    /// Data load permission failure.
    LoadAccessFault,
    /// Misaligned data store.
    StoreAddressMisaligned,
    /// Data store permission failure.
    StoreAccessFault,
    /// Environment call from user mode.
    EnvironmentCallFromUMode,
    /// Environment call from supervisor mode.
    EnvironmentCallFromSMode,
    /// Environment call from machine mode.
    EnvironmentCallFromMMode,
    /// Machine timer interrupt.
    MachineTimerInterrupt,
    /// Machine external interrupt.
    MachineExternalInterrupt,
}

impl Cause {
    /// Returns the value written to the cause register.
    #[must_use]
    pub const fn code(self) -> Word {
        match self {
            Self::InstructionAddressMisaligned => 0,
            Self::InstructionAccessFault => 1,
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned => 4,
            Self::LoadAccessFault => 5,
            Self::StoreAddressMisaligned => 6,
            Self::StoreAccessFault => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => 11,
            Self::MachineTimerInterrupt => INTERRUPT_FLAG | 7,
            Self::MachineExternalInterrupt => INTERRUPT_FLAG | 11,
        }
    }

    /// Returns `true` for asynchronous interrupt causes.
    #[must_use]
    pub const fn is_interrupt(self) -> bool {
        self.code() & INTERRUPT_FLAG != 0
    }
}

/// Performs the architectural trap entry sequence and returns the vector
/// address execution must resume from.
///
/// Writes `cause` into the cause register and `epc` into the saved-PC
/// register, copies the global interrupt enable into the previous enable,
/// clears the global enable, and forces the saved privilege level to
/// machine mode.
pub fn raise(state: &mut CpuState, cause: Cause, epc: Word) -> Word {
    raise_code(state, cause.code(), epc)
}

/// Trap entry sequence for a raw cause value.
///
/// Used by [`raise`] and by external interrupt injection, where the cause
/// arrives as a number rather than an architectural enum value.
pub fn raise_code(state: &mut CpuState, code: Word, epc: Word) -> Word {
    state.csr.mcause = code;
    state.csr.mepc = epc;

    let mie = state.csr.mstatus.mie();
    state.csr.mstatus.set_mpie(mie);
    state.csr.mstatus.set_mie(false);
    state.csr.mstatus.set_mpp(PRIV_MACHINE);

    tracing::debug!(
        cause = code,
        epc = format_args!("{epc:#x}"),
        vector = format_args!("{:#x}", state.csr.mtvec),
        "trap raised"
    );

    state.csr.mtvec
}

/// Reports a pending asynchronous interrupt, if any.
///
/// No internal interrupt source exists in this machine; external injection
/// is reserved for the differential-test ABI.
#[must_use]
pub const fn query_pending() -> Option<Cause> {
    None
}

#[cfg(test)]
mod tests {
    use super::{query_pending, raise, Cause, INTERRUPT_FLAG};
    use crate::state::{CpuState, PRIV_MACHINE};

    #[test]
    fn raise_performs_the_full_entry_sequence() {
        let mut state = CpuState::default();
        state.csr.mtvec = 0x8000_0100;
        state.csr.mstatus.set_mie(true);

        let vector = raise(&mut state, Cause::IllegalInstruction, 0x8000_0040);

        assert_eq!(vector, 0x8000_0100);
        assert_eq!(state.csr.mcause, 2);
        assert_eq!(state.csr.mepc, 0x8000_0040);
        assert!(state.csr.mstatus.mpie());
        assert!(!state.csr.mstatus.mie());
        assert_eq!(state.csr.mstatus.mpp(), PRIV_MACHINE);
    }

    #[test]
    fn previous_enable_copies_a_disabled_global_enable_too() {
        let mut state = CpuState::default();
        state.csr.mstatus.set_mie(false);
        state.csr.mstatus.set_mpie(true);

        let _ = raise(&mut state, Cause::EnvironmentCallFromMMode, 0x4);

        assert!(!state.csr.mstatus.mpie());
        assert!(!state.csr.mstatus.mie());
        assert_eq!(state.csr.mcause, 11);
    }

    #[test]
    fn interrupt_causes_carry_the_reserved_high_bit() {
        assert!(Cause::MachineTimerInterrupt.is_interrupt());
        assert!(Cause::MachineExternalInterrupt.is_interrupt());
        assert_eq!(Cause::MachineTimerInterrupt.code(), INTERRUPT_FLAG | 7);
        assert!(!Cause::IllegalInstruction.is_interrupt());
        assert!(!Cause::Breakpoint.is_interrupt());
    }

    #[test]
    fn no_interrupt_is_ever_pending_internally() {
        assert_eq!(query_pending(), None);
    }
}
