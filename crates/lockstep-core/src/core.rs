//! Engine façade: one self-contained emulator instance.

use std::fmt;

use tracing::{error, info, warn};

use crate::api::{CoreConfig, RunOutcome, StepOutcome, TraceEvent, TraceSink};
use crate::bus::{Bus, IoCallback};
use crate::execute::step_one;
use crate::fault::CoreError;
use crate::state::{CpuState, RunState};
use crate::word::{PAddr, Word};

/// Capacity of the recent-instruction ring dumped on abort.
const INST_RING_CAPACITY: usize = 16;

/// Bounded ring of recently executed instructions.
#[derive(Debug, Clone, Default)]
pub(crate) struct InstRing {
    entries: Vec<(Word, u32)>,
    head: usize,
}

impl InstRing {
    pub(crate) fn push(&mut self, pc: Word, raw: u32) {
        if self.entries.len() < INST_RING_CAPACITY {
            self.entries.push((pc, raw));
        } else {
            self.entries[self.head] = (pc, raw);
        }
        self.head = (self.head + 1) % INST_RING_CAPACITY;
    }

    pub(crate) fn dump(&self) {
        let start = if self.entries.len() < INST_RING_CAPACITY {
            0
        } else {
            self.head
        };
        for index in 0..self.entries.len() {
            let (pc, raw) = self.entries[(start + index) % self.entries.len()];
            error!(
                pc = format_args!("{pc:#x}"),
                raw = format_args!("{raw:#010x}"),
                "recent instruction"
            );
        }
    }
}

/// A single-hart emulator instance.
///
/// Bundles the register file, CSR block, program counter, address router,
/// and run state into one owned value. Two instances (primary and
/// reference) are fully isolated; nothing is shared or ambient.
pub struct Core {
    pub(crate) state: CpuState,
    pub(crate) bus: Bus,
    pub(crate) run_state: RunState,
    pub(crate) ring: InstRing,
    pub(crate) trace: Option<Box<dyn TraceSink>>,
    config: CoreConfig,
    started: bool,
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("state", &self.state)
            .field("run_state", &self.run_state)
            .field("bus", &self.bus)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Core {
    /// Creates a stopped engine with zeroed memory and the PC at the
    /// configured reset vector.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        let bus = Bus::new(&config);
        let mut state = CpuState::default();
        state.set_pc(config.reset_vector);
        Self {
            state,
            bus,
            run_state: RunState::Stopped,
            ring: InstRing::default(),
            trace: None,
            config,
            started: false,
        }
    }

    /// Resets architectural state and stops the engine; memory and device
    /// registrations are preserved.
    pub fn reset(&mut self) {
        self.state = CpuState::default();
        self.state.set_pc(self.config.reset_vector);
        self.run_state = RunState::Stopped;
        self.ring = InstRing::default();
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Read-only view of the architectural state.
    #[must_use]
    pub const fn state(&self) -> &CpuState {
        &self.state
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Installs a trace sink receiving instruction, control-transfer, and
    /// trap events.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace = Some(sink);
    }

    pub(crate) fn emit(&mut self, event: TraceEvent) {
        if let Some(sink) = self.trace.as_mut() {
            sink.on_event(event);
        }
    }

    /// Registers a memory-mapped device region.
    ///
    /// Only callable during device initialization, before the first
    /// instruction executes.
    ///
    /// # Errors
    ///
    /// [`CoreError::LateRegistration`] once execution has started, or the
    /// registration errors from the address router.
    pub fn add_mmio(
        &mut self,
        name: &'static str,
        base: PAddr,
        len: usize,
        callback: Option<IoCallback>,
    ) -> Result<(), CoreError> {
        if self.started {
            return Err(CoreError::LateRegistration { name });
        }
        self.bus.add_mmio(name, base, len, callback)
    }

    /// Registers a port-mapped device region; same contract as
    /// [`Self::add_mmio`].
    ///
    /// # Errors
    ///
    /// [`CoreError::LateRegistration`] once execution has started, or the
    /// registration errors from the address router.
    pub fn add_pio(
        &mut self,
        name: &'static str,
        port: PAddr,
        len: usize,
        callback: Option<IoCallback>,
    ) -> Result<(), CoreError> {
        if self.started {
            return Err(CoreError::LateRegistration { name });
        }
        self.bus.add_pio(name, port, len, callback)
    }

    /// Copies a guest image into physical memory at `addr`.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfBound`] when the image does not fit inside main
    /// memory.
    pub fn load_image(&mut self, addr: PAddr, image: &[u8]) -> Result<(), CoreError> {
        let offset = self
            .bus
            .pmem_offset(addr, image.len())
            .ok_or(CoreError::OutOfBound {
                addr,
                pc: self.state.pc(),
            })?;
        self.bus.mem_bytes_mut()[offset..offset + image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Executes up to `n` instructions, stopping early when the run state
    /// leaves `Running`.
    pub fn step(&mut self, n: u64) -> RunOutcome {
        if self.run_state.is_terminated() {
            warn!(state = ?self.run_state, "program execution has ended; reset to continue");
            return RunOutcome {
                retired: 0,
                state: self.run_state,
            };
        }
        self.started = true;
        self.run_state = RunState::Running;

        let mut retired = 0;
        for _ in 0..n {
            let outcome = step_one(self);
            if matches!(outcome, StepOutcome::Aborted) {
                break;
            }
            retired += 1;
            if !self.run_state.is_running() {
                break;
            }
        }

        if self.run_state.is_running() {
            self.run_state = RunState::Stopped;
        }
        if let RunState::Ended { pc, code } = self.run_state {
            info!(
                pc = format_args!("{pc:#x}"),
                code, "guest finished execution"
            );
        }
        RunOutcome {
            retired,
            state: self.run_state,
        }
    }

    /// Runs until an external halt, abort, or quit state is reached.
    pub fn run_forever(&mut self) -> RunOutcome {
        self.step(u64::MAX)
    }

    /// Asks the engine to shut down after the current instruction.
    pub fn quit(&mut self) {
        self.run_state = RunState::Quit;
    }

    /// Reads a register or CSR by name (debugger surface).
    #[must_use]
    pub fn reg_by_name(&self, name: &str) -> Option<Word> {
        self.state.read_by_name(name)
    }

    /// Reads `len` bytes of physical memory, subject to the same bounds
    /// rules as guest accesses (debugger surface).
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfBound`] when the range resolves nowhere.
    pub fn read_mem(&mut self, addr: PAddr, len: usize) -> Result<u64, CoreError> {
        let pc = self.state.pc();
        self.bus
            .read(addr, len)
            .map_err(|_| CoreError::OutOfBound { addr, pc })
    }

    /// Reads an arbitrary-length physical-memory range byte by byte, with
    /// the same bounds rules as guest accesses (debugger surface).
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfBound`] at the first unresolvable byte.
    pub fn read_mem_range(&mut self, addr: PAddr, len: usize) -> Result<Vec<u8>, CoreError> {
        let mut bytes = Vec::with_capacity(len);
        for offset in 0..len {
            let byte = self.read_mem(addr + offset as PAddr, 1)?;
            bytes.push(byte as u8);
        }
        Ok(bytes)
    }

    /// Drains the device-touch hint; used by the differential harness.
    pub const fn take_device_touched(&mut self) -> bool {
        self.bus.take_device_touched()
    }
}
