//! Fetch-decode-execute engine.
//!
//! One step: fetch the instruction word at the current PC through the
//! address router, decode it against the ordered template table, run the
//! semantic action, force register 0 back to zero, and commit the decoded
//! next PC. Two PC-like quantities exist during a step: `snpc` (sequential
//! next) and `dnpc` (decoded next, mutated by control flow).

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::too_many_lines)]

/// Width-exact arithmetic helpers.
pub mod arith;

use tracing::{error, warn};

use crate::api::{StepOutcome, TraceEvent, TransferKind};
use crate::bus::BusFault;
use crate::core::Core;
use crate::decoder::{decode, DecodedInst};
use crate::encoding::Op;
use crate::state::{RunState, REG_A0};
use crate::trap::{raise, Cause};
use crate::word::{sext, Word, INST_BYTES};

/// Raw encoding of `jalr zero, 0(ra)`; a `jalr` matching it is a return for
/// the call-trace hook, any other `jalr`/`jal` is a call.
const RET_ENCODING: u32 = 0x0000_8067;

/// Executes one instruction on `core`.
///
/// Only called while the run state is `Running`; any state transition
/// (guest exit, abort, trap) is visible in the returned outcome after the
/// instruction has fully completed.
pub(crate) fn step_one(core: &mut Core) -> StepOutcome {
    let pc = core.state.pc();
    let raw = match core.bus.read(pc, INST_BYTES as usize) {
        Ok(value) => value as u32,
        Err(fault) => return abort(core, pc, fault),
    };
    core.ring.push(pc, raw);

    let inst = decode(raw, &core.state);
    let snpc = pc.wrapping_add(INST_BYTES);
    let (dnpc, outcome) = match exec(core, &inst, pc, snpc) {
        Ok(committed) => committed,
        Err(fault) => return abort(core, pc, fault),
    };

    core.state.clamp_zero();
    core.state.set_pc(dnpc);
    core.emit(TraceEvent::InstructionRetired { pc, raw });
    outcome
}

fn exec(
    core: &mut Core,
    inst: &DecodedInst,
    pc: Word,
    snpc: Word,
) -> Result<(Word, StepOutcome), BusFault> {
    let &DecodedInst {
        raw,
        rd,
        src1,
        src2,
        imm,
        ..
    } = inst;
    let mut dnpc = snpc;
    let mut outcome = StepOutcome::Retired;

    match inst.op {
        Op::Add => core.state.set_gpr(rd, src1.wrapping_add(src2)),
        Op::Sub => core.state.set_gpr(rd, src1.wrapping_sub(src2)),
        Op::Slt => core.state.set_gpr(rd, arith::slt(src1, src2)),
        Op::Sltu => core.state.set_gpr(rd, arith::sltu(src1, src2)),
        Op::And => core.state.set_gpr(rd, src1 & src2),
        Op::Or => core.state.set_gpr(rd, src1 | src2),
        Op::Xor => core.state.set_gpr(rd, src1 ^ src2),
        Op::Sll => core.state.set_gpr(rd, arith::shl(src1, src2)),
        Op::Srl => core.state.set_gpr(rd, arith::shr(src1, src2)),
        Op::Sra => core.state.set_gpr(rd, arith::sar(src1, src2)),

        Op::Mul => core.state.set_gpr(rd, src1.wrapping_mul(src2)),
        Op::Mulh => core.state.set_gpr(rd, arith::mulh(src1, src2)),
        Op::Mulhsu => core.state.set_gpr(rd, arith::mulhsu(src1, src2)),
        Op::Mulhu => core.state.set_gpr(rd, arith::mulhu(src1, src2)),
        Op::Div => core.state.set_gpr(rd, arith::div(src1, src2)),
        Op::Divu => core.state.set_gpr(rd, arith::divu(src1, src2)),
        Op::Rem => core.state.set_gpr(rd, arith::rem(src1, src2)),
        Op::Remu => core.state.set_gpr(rd, arith::remu(src1, src2)),

        Op::Addi => core.state.set_gpr(rd, src1.wrapping_add(imm)),
        Op::Slti => core.state.set_gpr(rd, arith::slt(src1, imm)),
        Op::Sltiu => core.state.set_gpr(rd, arith::sltu(src1, imm)),
        Op::Andi => core.state.set_gpr(rd, src1 & imm),
        Op::Ori => core.state.set_gpr(rd, src1 | imm),
        Op::Xori => core.state.set_gpr(rd, src1 ^ imm),
        Op::Slli => core.state.set_gpr(rd, arith::shl(src1, imm)),
        Op::Srli => core.state.set_gpr(rd, arith::shr(src1, imm)),
        Op::Srai => core.state.set_gpr(rd, arith::sar(src1, imm)),

        Op::Lbu => {
            let value = core.bus.read(src1.wrapping_add(imm), 1)?;
            core.state.set_gpr(rd, value as Word);
        }
        Op::Lhu => {
            let value = core.bus.read(src1.wrapping_add(imm), 2)?;
            core.state.set_gpr(rd, value as Word);
        }
        Op::Lb => {
            let value = core.bus.read(src1.wrapping_add(imm), 1)?;
            core.state.set_gpr(rd, sext(value as Word, 8));
        }
        Op::Lh => {
            let value = core.bus.read(src1.wrapping_add(imm), 2)?;
            core.state.set_gpr(rd, sext(value as Word, 16));
        }
        Op::Lw => {
            let value = core.bus.read(src1.wrapping_add(imm), 4)?;
            core.state.set_gpr(rd, sext(value as Word, 32));
        }
        Op::Sb => core.bus.write(src1.wrapping_add(imm), 1, u64::from(src2))?,
        Op::Sh => core.bus.write(src1.wrapping_add(imm), 2, u64::from(src2))?,
        Op::Sw => core.bus.write(src1.wrapping_add(imm), 4, u64::from(src2))?,

        Op::Lui => core.state.set_gpr(rd, imm),
        Op::Auipc => core.state.set_gpr(rd, pc.wrapping_add(imm)),

        Op::Jal => {
            dnpc = pc.wrapping_add(imm);
            core.state.set_gpr(rd, snpc);
            emit_transfer(core, raw, pc, dnpc);
        }
        Op::Jalr => {
            dnpc = src1.wrapping_add(imm) & !1;
            core.state.set_gpr(rd, snpc);
            emit_transfer(core, raw, pc, dnpc);
        }

        Op::Beq => {
            if src1 == src2 {
                dnpc = pc.wrapping_add(imm);
            }
        }
        Op::Bne => {
            if src1 != src2 {
                dnpc = pc.wrapping_add(imm);
            }
        }
        Op::Blt => {
            if arith::slt(src1, src2) != 0 {
                dnpc = pc.wrapping_add(imm);
            }
        }
        Op::Bge => {
            if arith::slt(src1, src2) == 0 {
                dnpc = pc.wrapping_add(imm);
            }
        }
        Op::Bltu => {
            if src1 < src2 {
                dnpc = pc.wrapping_add(imm);
            }
        }
        Op::Bgeu => {
            if src1 >= src2 {
                dnpc = pc.wrapping_add(imm);
            }
        }

        Op::Ecall => {
            let cause = Cause::EnvironmentCallFromMMode;
            dnpc = raise(&mut core.state, cause, pc);
            core.emit(TraceEvent::TrapRaised { cause, pc });
            outcome = StepOutcome::Trapped {
                cause: cause.code(),
            };
        }
        Op::Ebreak => {
            let code = core.state.gpr(REG_A0);
            core.run_state = RunState::Ended { pc, code };
            outcome = StepOutcome::Ended { code };
        }
        Op::Mret => {
            let mpie = core.state.csr.mstatus.mpie();
            core.state.csr.mstatus.set_mie(mpie);
            core.state.csr.mstatus.set_mpie(true);
            dnpc = core.state.csr.mepc;
        }

        Op::Csrrw => {
            let addr = (imm as u32) & 0xFFF;
            match core.state.csr.read(addr) {
                Some(old) => {
                    let _ = core.state.csr.write(addr, src1);
                    core.state.set_gpr(rd, old);
                }
                None => (dnpc, outcome) = illegal(core, raw, pc),
            }
        }
        Op::Csrrs => {
            let addr = (imm as u32) & 0xFFF;
            match core.state.csr.read(addr) {
                Some(old) => {
                    let _ = core.state.csr.write(addr, old | src1);
                    core.state.set_gpr(rd, old);
                }
                None => (dnpc, outcome) = illegal(core, raw, pc),
            }
        }

        Op::Illegal => (dnpc, outcome) = illegal(core, raw, pc),
    }

    Ok((dnpc, outcome))
}

fn illegal(core: &mut Core, raw: u32, pc: Word) -> (Word, StepOutcome) {
    warn!(
        raw = format_args!("{raw:#010x}"),
        pc = format_args!("{pc:#x}"),
        "illegal instruction"
    );
    let cause = Cause::IllegalInstruction;
    let vector = raise(&mut core.state, cause, pc);
    core.emit(TraceEvent::TrapRaised { cause, pc });
    (
        vector,
        StepOutcome::Trapped {
            cause: cause.code(),
        },
    )
}

fn emit_transfer(core: &mut Core, raw: u32, from: Word, to: Word) {
    let kind = if raw == RET_ENCODING {
        TransferKind::Return
    } else {
        TransferKind::Call
    };
    core.emit(TraceEvent::ControlTransfer { kind, from, to });
}

fn abort(core: &mut Core, pc: Word, fault: BusFault) -> StepOutcome {
    error!(pc = format_args!("{pc:#x}"), "{fault}; machine aborted");
    core.ring.dump();
    core.run_state = RunState::Aborted { pc };
    StepOutcome::Aborted
}
