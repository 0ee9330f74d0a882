//! Always-ready serial port device.
//!
//! Output-only UART model: bytes stored to the data register are collected
//! into a host-visible buffer, and the line-status register always reports
//! the transmitter as ready. A standard reference device model may instead
//! report busy, which is exactly why serial accesses are the canonical
//! producer of the differential harness skip hint.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::core::Core;
use crate::fault::CoreError;
use crate::word::PAddr;

/// Default MMIO base address of the serial port.
pub const SERIAL_BASE: PAddr = 0xA000_03F8;
/// Size of the serial register window in bytes.
pub const SERIAL_SIZE: usize = 8;

/// Offset of the transmit data register.
const REG_DATA: PAddr = 0;
/// Offset of the line-status register.
const REG_LSR: PAddr = 5;
/// Line-status value: transmit holding register empty and transmitter idle.
const LSR_TX_READY: u8 = 0x60;

/// Host handle to an attached serial device.
#[derive(Debug)]
pub struct Serial {
    output: Rc<RefCell<Vec<u8>>>,
}

impl Serial {
    /// Registers the serial region on `core` at `base` and returns the
    /// output handle.
    ///
    /// # Errors
    ///
    /// Registration errors from the address router.
    pub fn attach(core: &mut Core, base: PAddr) -> Result<Self, CoreError> {
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);
        core.add_mmio(
            "serial",
            base,
            SERIAL_SIZE,
            Some(Box::new(move |space, offset, _len, dir| {
                if dir.is_write() {
                    if offset == REG_DATA {
                        let byte = space[REG_DATA as usize];
                        trace!(byte, "serial transmit");
                        sink.borrow_mut().push(byte);
                    }
                } else if offset == REG_LSR {
                    space[REG_LSR as usize] = LSR_TX_READY;
                }
            })),
        )?;
        Ok(Self { output })
    }

    /// Bytes transmitted so far.
    #[must_use]
    pub fn output(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }

    /// Drains and returns the transmitted bytes.
    #[must_use]
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.borrow_mut())
    }
}
