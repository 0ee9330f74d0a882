//! Deterministic real-time counter device.
//!
//! Exposes a 64-bit upcounter as two word-sized halves. Reading the high
//! half latches a new counter value; the counter advances by a fixed
//! quantum per latch instead of sampling host time, so two engines given
//! the same access sequence observe the same values.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::AccessDirection;
use crate::core::Core;
use crate::fault::CoreError;
use crate::word::PAddr;

/// Default MMIO base address of the counter.
pub const RTC_BASE: PAddr = 0xA000_0048;
/// Size of the counter register window in bytes.
pub const RTC_SIZE: usize = 8;

/// Offset of the high half; reading it latches the counter.
const REG_HIGH: PAddr = 4;
/// Counter advance per latch, in microsecond-like units.
const TICK_QUANTUM: u64 = 1000;

/// Host handle to an attached counter device.
#[derive(Debug)]
pub struct Rtc {
    ticks: Rc<RefCell<u64>>,
}

impl Rtc {
    /// Registers the counter region on `core` at `base`.
    ///
    /// # Errors
    ///
    /// Registration errors from the address router.
    pub fn attach(core: &mut Core, base: PAddr) -> Result<Self, CoreError> {
        let ticks = Rc::new(RefCell::new(0u64));
        let counter = Rc::clone(&ticks);
        core.add_mmio(
            "rtc",
            base,
            RTC_SIZE,
            Some(Box::new(move |space, offset, _len, dir| {
                if dir == AccessDirection::Read && offset == REG_HIGH {
                    let mut ticks = counter.borrow_mut();
                    *ticks += TICK_QUANTUM;
                    space[..8].copy_from_slice(&ticks.to_le_bytes());
                }
            })),
        )?;
        Ok(Self { ticks })
    }

    /// Current latched counter value.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        *self.ticks.borrow()
    }
}
