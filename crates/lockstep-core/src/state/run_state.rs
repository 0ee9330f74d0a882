//! Host-observable execution-state machine.

use crate::word::Word;

/// Execution state of one engine instance.
///
/// The engine only ever observes a state change at an instruction boundary:
/// an instruction that has begun always completes, including its device side
/// effects, before any of these transitions take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Not currently executing; ready to accept a step or run command.
    #[default]
    Stopped,
    /// Inside the fetch-decode-execute loop.
    Running,
    /// The guest terminated itself via `ebreak`; carries the exit code
    /// read from `a0`.
    Ended {
        /// Program counter of the terminating instruction.
        pc: Word,
        /// Guest exit code.
        code: Word,
    },
    /// A fatal machine condition (unresolvable bus access) stopped the
    /// emulator; not recoverable.
    Aborted {
        /// Program counter of the faulting instruction.
        pc: Word,
    },
    /// The monitor asked the emulator to shut down.
    Quit,
}

impl RunState {
    /// Returns `true` when no further instruction may execute.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Ended { .. } | Self::Aborted { .. } | Self::Quit)
    }

    /// Returns `true` while the engine is inside its execution loop.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::RunState;

    #[test]
    fn default_state_is_stopped() {
        assert_eq!(RunState::default(), RunState::Stopped);
    }

    #[test]
    fn terminal_states_match_the_recovery_contract() {
        assert!(!RunState::Stopped.is_terminated());
        assert!(!RunState::Running.is_terminated());
        assert!(RunState::Ended { pc: 0, code: 0 }.is_terminated());
        assert!(RunState::Aborted { pc: 4 }.is_terminated());
        assert!(RunState::Quit.is_terminated());
    }
}
