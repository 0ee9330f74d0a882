//! Flat state dump persistence.
//!
//! The format is bit-exact and unversioned: the architectural state fields
//! in a fixed order and fixed little-endian width, followed by the full
//! main-memory window. Any layout change silently breaks compatibility, so
//! the field order below never changes.

use std::io::{Read, Write};
use std::mem::size_of;

use crate::core::Core;
use crate::fault::CoreError;
use crate::state::GPR_COUNT;
use crate::word::Word;

/// Size in bytes of the architectural-state header preceding the memory
/// window.
pub const STATE_BYTES: usize = (GPR_COUNT + 5) * size_of::<Word>();

/// Writes the engine's full state: every GPR in index order, the program
/// counter, then `mstatus`, `mtvec`, `mepc`, `mcause`, then main memory.
///
/// # Errors
///
/// [`CoreError::Snapshot`] on writer failure.
pub fn save<W: Write>(core: &Core, writer: &mut W) -> Result<(), CoreError> {
    for index in 0..GPR_COUNT {
        writer.write_all(&core.state.gpr(index).to_le_bytes())?;
    }
    writer.write_all(&core.state.pc().to_le_bytes())?;
    writer.write_all(&core.state.csr.mstatus.raw().to_le_bytes())?;
    writer.write_all(&core.state.csr.mtvec.to_le_bytes())?;
    writer.write_all(&core.state.csr.mepc.to_le_bytes())?;
    writer.write_all(&core.state.csr.mcause.to_le_bytes())?;
    writer.write_all(core.bus.mem_bytes())?;
    Ok(())
}

/// Reads the same layout back byte-for-byte.
///
/// # Errors
///
/// [`CoreError::Snapshot`] on reader failure, including short input.
pub fn load<R: Read>(core: &mut Core, reader: &mut R) -> Result<(), CoreError> {
    for index in 0..GPR_COUNT {
        core.state.set_gpr(index, read_word(reader)?);
    }
    core.state.set_pc(read_word(reader)?);
    core.state.csr.mstatus.set_raw(read_word(reader)?);
    core.state.csr.mtvec = read_word(reader)?;
    core.state.csr.mepc = read_word(reader)?;
    core.state.csr.mcause = read_word(reader)?;
    reader.read_exact(core.bus.mem_bytes_mut())?;
    Ok(())
}

fn read_word<R: Read>(reader: &mut R) -> Result<Word, CoreError> {
    let mut buf = [0u8; size_of::<Word>()];
    reader.read_exact(&mut buf)?;
    Ok(Word::from_le_bytes(buf))
}
