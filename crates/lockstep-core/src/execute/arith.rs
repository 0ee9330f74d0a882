//! Width-exact arithmetic helpers.
//!
//! Everything here operates on the two's-complement interpretation of the
//! configured word type. The multiply-high family widens through the
//! double-width intermediate so the widening factor tracks the word width.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use crate::word::{DWord, SDWord, SWord, Word, SHAMT_MASK, XLEN};

/// Logical left shift; the shift amount is masked to the architectural
/// low bits.
#[must_use]
pub const fn shl(value: Word, amount: Word) -> Word {
    value << (amount & SHAMT_MASK)
}

/// Logical right shift with the masked shift amount.
#[must_use]
pub const fn shr(value: Word, amount: Word) -> Word {
    value >> (amount & SHAMT_MASK)
}

/// Arithmetic right shift with the masked shift amount.
#[must_use]
pub const fn sar(value: Word, amount: Word) -> Word {
    ((value as SWord) >> (amount & SHAMT_MASK)) as Word
}

/// Signed less-than producing the 0/1 comparison result.
#[must_use]
pub const fn slt(lhs: Word, rhs: Word) -> Word {
    ((lhs as SWord) < (rhs as SWord)) as Word
}

/// Unsigned less-than producing the 0/1 comparison result.
#[must_use]
pub const fn sltu(lhs: Word, rhs: Word) -> Word {
    (lhs < rhs) as Word
}

/// Upper half of the signed × signed double-width product.
#[must_use]
pub const fn mulh(lhs: Word, rhs: Word) -> Word {
    (((lhs as SWord as SDWord) * (rhs as SWord as SDWord)) >> XLEN) as Word
}

/// Upper half of the signed × unsigned double-width product.
#[must_use]
pub const fn mulhsu(lhs: Word, rhs: Word) -> Word {
    (((lhs as SWord as SDWord) * (rhs as DWord as SDWord)) >> XLEN) as Word
}

/// Upper half of the unsigned × unsigned double-width product.
#[must_use]
pub const fn mulhu(lhs: Word, rhs: Word) -> Word {
    (((lhs as DWord) * (rhs as DWord)) >> XLEN) as Word
}

/// Signed division with the architecturally defined edge results:
/// division by zero yields all ones, overflow yields the dividend.
#[must_use]
pub const fn div(lhs: Word, rhs: Word) -> Word {
    if rhs == 0 {
        Word::MAX
    } else {
        (lhs as SWord).wrapping_div(rhs as SWord) as Word
    }
}

/// Unsigned division; division by zero yields all ones.
#[must_use]
pub const fn divu(lhs: Word, rhs: Word) -> Word {
    if rhs == 0 {
        Word::MAX
    } else {
        lhs / rhs
    }
}

/// Signed remainder; division by zero yields the dividend, overflow yields
/// zero.
#[must_use]
pub const fn rem(lhs: Word, rhs: Word) -> Word {
    if rhs == 0 {
        lhs
    } else {
        (lhs as SWord).wrapping_rem(rhs as SWord) as Word
    }
}

/// Unsigned remainder; division by zero yields the dividend.
#[must_use]
pub const fn remu(lhs: Word, rhs: Word) -> Word {
    if rhs == 0 {
        lhs
    } else {
        lhs % rhs
    }
}
