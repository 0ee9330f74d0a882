//! Instruction decode: template match plus operand extraction.
//!
//! Decoding is pure: it reads the register file to resolve source operand
//! values but mutates nothing. The returned [`DecodedInst`] lives only for
//! the duration of one execute step.

use crate::encoding::{match_word, InstFormat, Op};
use crate::state::CpuState;
use crate::word::{bits, sext, Word};

/// A decoded instruction with resolved operand values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInst {
    /// Raw fetched instruction word.
    pub raw: u32,
    /// Semantic operation selected by the matching template.
    pub op: Op,
    /// Operand shape of the matching template.
    pub format: InstFormat,
    /// Destination register index.
    pub rd: usize,
    /// First source operand value (register read).
    pub src1: Word,
    /// Second source operand value (register read).
    pub src2: Word,
    /// Decoded immediate, sign-extended to the word width.
    pub imm: Word,
}

/// Decodes a raw instruction word against the ordered template table.
#[must_use]
pub fn decode(word: u32, state: &CpuState) -> DecodedInst {
    let pattern = match_word(word);
    let rs1 = bits(word, 19, 15) as usize;
    let rs2 = bits(word, 24, 20) as usize;
    let rd = bits(word, 11, 7) as usize;

    let mut src1 = 0;
    let mut src2 = 0;
    let mut imm = 0;
    match pattern.format {
        InstFormat::I => {
            src1 = state.gpr(rs1);
            imm = sext(Word::from(bits(word, 31, 20)), 12);
        }
        InstFormat::U => {
            imm = sext(Word::from(bits(word, 31, 12)), 20) << 12;
        }
        InstFormat::S => {
            src1 = state.gpr(rs1);
            src2 = state.gpr(rs2);
            imm = sext(Word::from(bits(word, 31, 25) << 5 | bits(word, 11, 7)), 12);
        }
        InstFormat::R => {
            src1 = state.gpr(rs1);
            src2 = state.gpr(rs2);
        }
        InstFormat::B => {
            src1 = state.gpr(rs1);
            src2 = state.gpr(rs2);
            imm = sext(
                Word::from(
                    bits(word, 31, 31) << 12
                        | bits(word, 7, 7) << 11
                        | bits(word, 30, 25) << 5
                        | bits(word, 11, 8) << 1,
                ),
                13,
            );
        }
        InstFormat::J => {
            imm = sext(
                Word::from(
                    bits(word, 31, 31) << 20
                        | bits(word, 19, 12) << 12
                        | bits(word, 20, 20) << 11
                        | bits(word, 30, 21) << 1,
                ),
                21,
            );
        }
        InstFormat::N => {}
    }

    DecodedInst {
        raw: word,
        op: pattern.op,
        format: pattern.format,
        rd,
        src1,
        src2,
        imm,
    }
}
