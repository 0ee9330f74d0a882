//! Built-in device models registered through the public MMIO surface.

/// Deterministic real-time counter device.
pub mod rtc;
/// Always-ready serial port device.
pub mod serial;

pub use rtc::{Rtc, RTC_BASE, RTC_SIZE};
pub use serial::{Serial, SERIAL_BASE, SERIAL_SIZE};
