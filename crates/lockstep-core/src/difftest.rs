//! Lock-step differential testing harness.
//!
//! Drives the primary engine instruction by instruction and a structurally
//! identical reference model in batches, comparing architectural state
//! after each batch. The first mismatch is fatal to the comparison session:
//! both engines halt and the divergence is reported with enough detail to
//! diagnose the splitting instruction.

use std::fmt;

use tracing::{error, info};

use crate::api::RunOutcome;
use crate::core::Core;
use crate::fault::CoreError;
use crate::state::{CpuState, RunState};
use crate::trap::{raise_code, INTERRUPT_FLAG};
use crate::word::{PAddr, Word};

/// Copy direction for the register and memory transfer verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Transfer reference state into the host-visible buffer.
    ToDut,
    /// Push the host-visible buffer into the reference, forcing
    /// synchronization.
    ToRef,
}

/// The reference-model ABI: the five entry points a reference
/// implementation must provide.
pub trait RefModel {
    /// Constructs and resets the reference engine.
    fn init(&mut self, port: u32);

    /// Advances the reference engine exactly `n` instructions.
    fn exec(&mut self, n: u64);

    /// Copies the full register/CSR state between `buf` and the reference.
    fn regcpy(&mut self, buf: &mut CpuState, direction: Direction);

    /// Copies a physical-memory range between `buf` and the reference.
    fn memcpy(&mut self, addr: PAddr, buf: &mut [u8], direction: Direction);

    /// Injects an asynchronous interrupt with the given number.
    fn raise_intr(&mut self, no: Word);
}

/// First detected state mismatch between primary and reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivergenceReport {
    /// Program counter of the instruction that caused the split.
    pub pc: Word,
    /// Name of the first differing field.
    pub field: &'static str,
    /// Reference value of the field.
    pub expected: Word,
    /// Primary value of the field.
    pub actual: Word,
}

impl fmt::Display for DivergenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} differs at pc = {:#x}: expected {:#x}, got {:#x}",
            self.field, self.pc, self.expected, self.actual
        )
    }
}

/// Compares two state values field by field in the canonical field order.
#[must_use]
pub fn compare_states(dut: &CpuState, reference: &CpuState, pc: Word) -> Option<DivergenceReport> {
    let dut_fields = dut.named_fields();
    let ref_fields = reference.named_fields();
    dut_fields
        .iter()
        .zip(ref_fields.iter())
        .find(|((_, actual), (_, expected))| actual != expected)
        .map(|(&(field, actual), &(_, expected))| DivergenceReport {
            pc,
            field,
            expected,
            actual,
        })
}

/// Built-in reference model: an independent engine of the same type.
#[derive(Debug)]
pub struct LocalRef {
    core: Core,
}

impl LocalRef {
    /// Creates the reference engine from its own configuration.
    #[must_use]
    pub fn new(config: crate::api::CoreConfig) -> Self {
        Self {
            core: Core::new(config),
        }
    }

    /// Read-only view of the reference engine, for test assertions.
    #[must_use]
    pub const fn core(&self) -> &Core {
        &self.core
    }
}

impl RefModel for LocalRef {
    fn init(&mut self, port: u32) {
        let _ = port;
        self.core.reset();
    }

    fn exec(&mut self, n: u64) {
        let _ = self.core.step(n);
    }

    fn regcpy(&mut self, buf: &mut CpuState, direction: Direction) {
        match direction {
            Direction::ToDut => *buf = self.core.state.clone(),
            Direction::ToRef => self.core.state = buf.clone(),
        }
    }

    fn memcpy(&mut self, addr: PAddr, buf: &mut [u8], direction: Direction) {
        let Some(offset) = self.core.bus.pmem_offset(addr, buf.len()) else {
            tracing::warn!(
                addr = format_args!("{addr:#x}"),
                len = buf.len(),
                "reference memcpy outside main memory ignored"
            );
            return;
        };
        match direction {
            Direction::ToDut => {
                buf.copy_from_slice(&self.core.bus.mem_bytes()[offset..offset + buf.len()]);
            }
            Direction::ToRef => {
                self.core.bus.mem_bytes_mut()[offset..offset + buf.len()].copy_from_slice(buf);
            }
        }
    }

    fn raise_intr(&mut self, no: Word) {
        let epc = self.core.state.pc();
        let vector = raise_code(&mut self.core.state, INTERRUPT_FLAG | no, epc);
        self.core.state.set_pc(vector);
    }
}

/// Differential session coordinating one primary engine and one reference
/// model.
pub struct Harness {
    ref_model: Box<dyn RefModel>,
    attached: bool,
    batch: u64,
    pending: u64,
    skip_next: bool,
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("attached", &self.attached)
            .field("batch", &self.batch)
            .field("pending", &self.pending)
            .field("skip_next", &self.skip_next)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Creates a session: initializes the reference model and synchronizes
    /// it with the primary's full memory image and register state.
    #[must_use]
    pub fn new(mut ref_model: Box<dyn RefModel>, port: u32, dut: &mut Core) -> Self {
        ref_model.init(port);
        Self::sync_to_ref(ref_model.as_mut(), dut);
        Self {
            ref_model,
            attached: true,
            batch: 1,
            pending: 0,
            skip_next: false,
        }
    }

    /// Sets the number of primary instructions between comparisons.
    #[must_use]
    pub fn with_batch(mut self, batch: u64) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// Returns `true` while comparisons are being performed.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Re-enables comparison without discarding either engine's state; the
    /// reference is resynchronized from the primary first.
    pub fn attach(&mut self, dut: &mut Core) {
        Self::sync_to_ref(self.ref_model.as_mut(), dut);
        self.pending = 0;
        self.skip_next = false;
        self.attached = true;
        info!("differential testing attached");
    }

    /// Disables comparison without discarding either engine's state.
    pub fn detach(&mut self) {
        self.attached = false;
        info!("differential testing detached");
    }

    /// Suppresses the next comparison window and resynchronizes the
    /// reference from the primary instead.
    ///
    /// Invoked when the primary touched a device whose emulated behavior is
    /// allowed to differ from the reference's standard device model.
    pub const fn skip_ref(&mut self) {
        self.skip_next = true;
    }

    /// Advances the primary `n` instructions in lock-step with the
    /// reference.
    ///
    /// # Errors
    ///
    /// [`CoreError::Divergence`] on the first state mismatch; both engines
    /// are halted and the session detaches.
    pub fn step(&mut self, dut: &mut Core, n: u64) -> Result<RunOutcome, CoreError> {
        let mut retired = 0;
        for _ in 0..n {
            let pc_before = dut.state().pc();
            let outcome = dut.step(1);
            retired += outcome.retired;
            if outcome.retired == 0 {
                break;
            }

            if self.attached {
                self.observe(dut, pc_before)?;
            }

            if dut.run_state().is_terminated() {
                break;
            }
        }
        Ok(RunOutcome {
            retired,
            state: dut.run_state(),
        })
    }

    /// Runs the primary until it leaves the running state, comparing along
    /// the way.
    ///
    /// # Errors
    ///
    /// [`CoreError::Divergence`] on the first state mismatch.
    pub fn run(&mut self, dut: &mut Core) -> Result<RunOutcome, CoreError> {
        self.step(dut, u64::MAX)
    }

    fn observe(&mut self, dut: &mut Core, pc_before: Word) -> Result<(), CoreError> {
        if dut.take_device_touched() {
            self.skip_next = true;
        }

        if self.skip_next {
            let mut buf = dut.state().clone();
            self.ref_model.regcpy(&mut buf, Direction::ToRef);
            self.skip_next = false;
            self.pending = 0;
            return Ok(());
        }

        self.pending += 1;
        if self.pending < self.batch {
            return Ok(());
        }

        self.ref_model.exec(self.pending);
        self.pending = 0;

        let mut reference = CpuState::default();
        self.ref_model.regcpy(&mut reference, Direction::ToDut);
        if let Some(report) = compare_states(dut.state(), &reference, pc_before) {
            error!("{report}");
            dut.run_state = RunState::Aborted { pc: report.pc };
            self.attached = false;
            return Err(CoreError::Divergence(report));
        }
        Ok(())
    }

    fn sync_to_ref(ref_model: &mut dyn RefModel, dut: &mut Core) {
        let mem_base = dut.config().mem_base;
        let mut image = dut.bus.mem_bytes().to_vec();
        ref_model.memcpy(mem_base, &mut image, Direction::ToRef);
        let mut regs = dut.state().clone();
        ref_model.regcpy(&mut regs, Direction::ToRef);
        // Stale touch hints from before the synchronization point would
        // suppress the first comparison for no reason.
        let _ = dut.take_device_touched();
    }
}

#[cfg(test)]
mod tests {
    use super::{compare_states, Direction, Harness, LocalRef, RefModel};
    use crate::api::CoreConfig;
    use crate::core::Core;
    use crate::state::{CpuState, RunState};
    use crate::trap::INTERRUPT_FLAG;

    fn config() -> CoreConfig {
        CoreConfig {
            mem_size: 0x1000,
            ..CoreConfig::default()
        }
    }

    #[test]
    fn identical_states_produce_no_report() {
        let a = CpuState::default();
        let b = CpuState::default();
        assert_eq!(compare_states(&a, &b, 0), None);
    }

    #[test]
    fn first_differing_field_is_reported_by_name() {
        let mut a = CpuState::default();
        let b = CpuState::default();
        a.set_gpr(10, 13);
        let report = compare_states(&a, &b, 0x8000_0004).unwrap();
        assert_eq!(report.field, "a0");
        assert_eq!(report.actual, 13);
        assert_eq!(report.expected, 0);
        assert_eq!(report.pc, 0x8000_0004);
    }

    #[test]
    fn csr_fields_participate_in_the_comparison() {
        let mut a = CpuState::default();
        let b = CpuState::default();
        a.csr.mcause = 2;
        let report = compare_states(&a, &b, 0).unwrap();
        assert_eq!(report.field, "mcause");
    }

    #[test]
    fn local_ref_regcpy_round_trips() {
        let mut reference = LocalRef::new(config());
        let mut buf = CpuState::default();
        buf.set_gpr(5, 99);
        reference.regcpy(&mut buf, Direction::ToRef);

        let mut pulled = CpuState::default();
        reference.regcpy(&mut pulled, Direction::ToDut);
        assert_eq!(pulled.gpr(5), 99);
    }

    #[test]
    fn local_ref_memcpy_round_trips() {
        let mut reference = LocalRef::new(config());
        let base = config().mem_base;
        let mut out = [0xAAu8, 0xBB, 0xCC, 0xDD];
        reference.memcpy(base + 0x10, &mut out, Direction::ToRef);

        let mut back = [0u8; 4];
        reference.memcpy(base + 0x10, &mut back, Direction::ToDut);
        assert_eq!(back, [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn local_ref_interrupt_injection_vectors_the_reference() {
        let mut reference = LocalRef::new(config());
        let mut regs = CpuState::default();
        regs.csr.mtvec = 0x8000_0200;
        regs.set_pc(0x8000_0010);
        reference.regcpy(&mut regs, Direction::ToRef);

        reference.raise_intr(7);

        let mut after = CpuState::default();
        reference.regcpy(&mut after, Direction::ToDut);
        assert_eq!(after.csr.mcause, INTERRUPT_FLAG | 7);
        assert_eq!(after.csr.mepc, 0x8000_0010);
        assert_eq!(after.pc(), 0x8000_0200);
    }

    #[test]
    fn detach_and_attach_toggle_participation_without_state_loss() {
        let mut dut = Core::new(config());
        let mut harness = Harness::new(Box::new(LocalRef::new(config())), 1234, &mut dut);
        assert!(harness.is_attached());
        harness.detach();
        assert!(!harness.is_attached());
        harness.attach(&mut dut);
        assert!(harness.is_attached());
    }

    #[test]
    fn harness_halts_the_primary_on_divergence() {
        // A reference that claims a0 is always zero diverges as soon as the
        // primary writes it.
        struct StuckRef(LocalRef);
        impl RefModel for StuckRef {
            fn init(&mut self, port: u32) {
                self.0.init(port);
            }
            fn exec(&mut self, _n: u64) {}
            fn regcpy(&mut self, buf: &mut CpuState, direction: Direction) {
                self.0.regcpy(buf, direction);
            }
            fn memcpy(&mut self, addr: crate::word::PAddr, buf: &mut [u8], direction: Direction) {
                self.0.memcpy(addr, buf, direction);
            }
            fn raise_intr(&mut self, no: crate::word::Word) {
                self.0.raise_intr(no);
            }
        }

        let mut dut = Core::new(config());
        let base = config().mem_base;
        // addi a0, zero, 7
        dut.load_image(base, &0x0070_0513u32.to_le_bytes()).unwrap();

        let mut harness = Harness::new(Box::new(StuckRef(LocalRef::new(config()))), 0, &mut dut);
        let err = harness.step(&mut dut, 1).unwrap_err();
        let crate::fault::CoreError::Divergence(report) = err else {
            panic!("expected a divergence error");
        };
        assert_eq!(report.field, "a0");
        assert_eq!(report.actual, 7);
        assert!(matches!(dut.run_state(), RunState::Aborted { .. }));
        assert!(!harness.is_attached());
    }
}
