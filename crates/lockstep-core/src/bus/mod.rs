//! Physical address router.
//!
//! Routes every load, store, and fetch to either main memory or one of the
//! registered device regions. Resolution failure is not a guest-visible
//! exception: it is a fatal machine condition that puts the emulator into
//! the aborted state.

/// Mapped device region model.
pub mod region;

use thiserror::Error;
use tracing::{trace, warn};

pub use region::{AccessDirection, IoCallback, MappedRegion, RegionKind};

use crate::api::CoreConfig;
use crate::fault::CoreError;
use crate::word::PAddr;

/// Platform page size; MMIO backing allocations are rounded up to it.
pub const PAGE_SIZE: usize = 4096;

/// Fatal routing failures; the engine converts these into the aborted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusFault {
    /// The address resolved to no mapping, or fell outside the resolved
    /// region's range.
    #[error("address {addr:#x} is out of bound")]
    OutOfBound {
        /// The unresolvable physical address.
        addr: PAddr,
    },
    /// The access length was outside the 1–8 byte contract.
    #[error("unsupported access length {len}")]
    UnsupportedLength {
        /// The rejected length.
        len: usize,
    },
}

/// Address router over main memory and registered device regions.
pub struct Bus {
    mem_base: PAddr,
    mem: Box<[u8]>,
    mmio: Vec<MappedRegion>,
    pio: Vec<MappedRegion>,
    device_touched: bool,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("mem_base", &format_args!("{:#x}", self.mem_base))
            .field("mem_len", &self.mem.len())
            .field("mmio", &self.mmio)
            .field("pio", &self.pio)
            .finish_non_exhaustive()
    }
}

impl Bus {
    /// Builds a router with main memory sized and placed per `config` and no
    /// device regions.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            mem_base: config.mem_base,
            mem: vec![0; config.mem_size].into_boxed_slice(),
            mmio: Vec::new(),
            pio: Vec::new(),
            device_touched: false,
        }
    }

    /// Inclusive main-memory bounds.
    #[must_use]
    pub fn mem_range(&self) -> (PAddr, PAddr) {
        let high = self.mem_base as u64 + self.mem.len() as u64 - 1;
        (self.mem_base, high as PAddr)
    }

    /// Registers a memory-mapped device region.
    ///
    /// Only valid during device initialization. The inclusive range is
    /// `[base, base + len - 1]`; the backing allocation is rounded up to the
    /// page size. Rejects zero lengths and any overlap with main memory or a
    /// previously registered MMIO range.
    ///
    /// # Errors
    ///
    /// [`CoreError::EmptyRegion`] or [`CoreError::RegionOverlap`].
    pub fn add_mmio(
        &mut self,
        name: &'static str,
        base: PAddr,
        len: usize,
        callback: Option<IoCallback>,
    ) -> Result<(), CoreError> {
        let region = Self::build_region(name, base, len, callback, RegionKind::Mmio)?;
        let (mem_low, mem_high) = self.mem_range();
        if ranges_overlap(region.low, region.high, mem_low, mem_high) {
            return Err(CoreError::RegionOverlap {
                name,
                low: region.low,
                high: region.high,
            });
        }
        Self::check_region_overlap(&self.mmio, &region)?;
        self.mmio.push(region);
        Ok(())
    }

    /// Registers a port-mapped device region.
    ///
    /// Same contract as [`Self::add_mmio`], resolved through the dedicated
    /// port access surface instead of loads and stores.
    ///
    /// # Errors
    ///
    /// [`CoreError::EmptyRegion`] or [`CoreError::RegionOverlap`].
    pub fn add_pio(
        &mut self,
        name: &'static str,
        port: PAddr,
        len: usize,
        callback: Option<IoCallback>,
    ) -> Result<(), CoreError> {
        let region = Self::build_region(name, port, len, callback, RegionKind::PortIo)?;
        Self::check_region_overlap(&self.pio, &region)?;
        self.pio.push(region);
        Ok(())
    }

    fn build_region(
        name: &'static str,
        base: PAddr,
        len: usize,
        callback: Option<IoCallback>,
        kind: RegionKind,
    ) -> Result<MappedRegion, CoreError> {
        if len == 0 {
            return Err(CoreError::EmptyRegion { name });
        }
        let space_len = len.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        Ok(MappedRegion {
            name,
            low: base,
            high: base + (len as PAddr - 1),
            space: vec![0; space_len].into_boxed_slice(),
            callback,
            kind,
        })
    }

    fn check_region_overlap(
        existing: &[MappedRegion],
        candidate: &MappedRegion,
    ) -> Result<(), CoreError> {
        for other in existing {
            if ranges_overlap(candidate.low, candidate.high, other.low, other.high) {
                return Err(CoreError::RegionOverlap {
                    name: candidate.name,
                    low: candidate.low,
                    high: candidate.high,
                });
            }
        }
        Ok(())
    }

    /// Reads `len` bytes (1–8, little endian) at `addr`.
    ///
    /// # Errors
    ///
    /// [`BusFault`] when the address resolves nowhere; fatal, never
    /// guest-visible.
    pub fn read(&mut self, addr: PAddr, len: usize) -> Result<u64, BusFault> {
        check_len(len)?;
        if let Some(offset) = self.pmem_offset(addr, len) {
            return Ok(load_le(&self.mem[offset..offset + len]));
        }
        let index = self.find_mmio(addr).ok_or(BusFault::OutOfBound { addr })?;
        self.region_read(index, addr, len)
    }

    /// Writes the low `len` bytes (1–8, little endian) of `value` at `addr`.
    ///
    /// # Errors
    ///
    /// [`BusFault`] when the address resolves nowhere; fatal, never
    /// guest-visible.
    pub fn write(&mut self, addr: PAddr, len: usize, value: u64) -> Result<(), BusFault> {
        check_len(len)?;
        if let Some(offset) = self.pmem_offset(addr, len) {
            store_le(&mut self.mem[offset..offset + len], value);
            return Ok(());
        }
        let index = self.find_mmio(addr).ok_or(BusFault::OutOfBound { addr })?;
        self.region_write(index, addr, len, value)
    }

    /// Reads from the port-mapped space.
    ///
    /// # Errors
    ///
    /// [`BusFault`] when no registered port range contains `port`.
    pub fn port_read(&mut self, port: PAddr, len: usize) -> Result<u64, BusFault> {
        check_len(len)?;
        let index =
            Self::find_region(&self.pio, port).ok_or(BusFault::OutOfBound { addr: port })?;
        Self::access_read(&mut self.pio[index], &mut self.device_touched, port, len)
    }

    /// Writes to the port-mapped space.
    ///
    /// # Errors
    ///
    /// [`BusFault`] when no registered port range contains `port`.
    pub fn port_write(&mut self, port: PAddr, len: usize, value: u64) -> Result<(), BusFault> {
        check_len(len)?;
        let index =
            Self::find_region(&self.pio, port).ok_or(BusFault::OutOfBound { addr: port })?;
        Self::access_write(&mut self.pio[index], &mut self.device_touched, port, len, value)
    }

    /// Drains the flag recording whether any access since the last call
    /// touched a device region.
    ///
    /// The differential harness consumes this to suppress comparisons over
    /// instruction windows whose device behavior is allowed to differ from
    /// the reference model.
    pub const fn take_device_touched(&mut self) -> bool {
        let touched = self.device_touched;
        self.device_touched = false;
        touched
    }

    pub(crate) fn pmem_offset(&self, addr: PAddr, len: usize) -> Option<usize> {
        let addr = addr as u64;
        let base = self.mem_base as u64;
        let end = base + self.mem.len() as u64;
        if addr >= base && addr + len as u64 <= end {
            Some((addr - base) as usize)
        } else {
            None
        }
    }

    pub(crate) fn mem_bytes(&self) -> &[u8] {
        &self.mem
    }

    pub(crate) fn mem_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    fn find_mmio(&self, addr: PAddr) -> Option<usize> {
        Self::find_region(&self.mmio, addr)
    }

    fn find_region(regions: &[MappedRegion], addr: PAddr) -> Option<usize> {
        regions.iter().position(|region| region.contains(addr))
    }

    fn region_read(&mut self, index: usize, addr: PAddr, len: usize) -> Result<u64, BusFault> {
        Self::access_read(&mut self.mmio[index], &mut self.device_touched, addr, len)
    }

    fn region_write(
        &mut self,
        index: usize,
        addr: PAddr,
        len: usize,
        value: u64,
    ) -> Result<(), BusFault> {
        Self::access_write(&mut self.mmio[index], &mut self.device_touched, addr, len, value)
    }

    fn access_read(
        region: &mut MappedRegion,
        device_touched: &mut bool,
        addr: PAddr,
        len: usize,
    ) -> Result<u64, BusFault> {
        let offset = Self::region_offset(region, addr, len)?;
        *device_touched = true;
        if let Some(callback) = region.callback.as_mut() {
            callback(&mut region.space, addr - region.low, len, AccessDirection::Read);
        }
        trace!(name = region.name, addr = format_args!("{addr:#x}"), len, "device read");
        Ok(load_le(&region.space[offset..offset + len]))
    }

    fn access_write(
        region: &mut MappedRegion,
        device_touched: &mut bool,
        addr: PAddr,
        len: usize,
        value: u64,
    ) -> Result<(), BusFault> {
        let offset = Self::region_offset(region, addr, len)?;
        *device_touched = true;
        store_le(&mut region.space[offset..offset + len], value);
        if let Some(callback) = region.callback.as_mut() {
            callback(&mut region.space, addr - region.low, len, AccessDirection::Write);
        }
        trace!(name = region.name, addr = format_args!("{addr:#x}"), len, "device write");
        Ok(())
    }

    fn region_offset(region: &MappedRegion, addr: PAddr, len: usize) -> Result<usize, BusFault> {
        if !region.contains(addr) {
            warn!(
                name = region.name,
                addr = format_args!("{addr:#x}"),
                low = format_args!("{:#x}", region.low),
                high = format_args!("{:#x}", region.high),
                "access outside region bounds"
            );
            return Err(BusFault::OutOfBound { addr });
        }
        let offset = (addr - region.low) as usize;
        if offset + len > region.space.len() {
            return Err(BusFault::OutOfBound { addr });
        }
        Ok(offset)
    }
}

const fn check_len(len: usize) -> Result<(), BusFault> {
    if len >= 1 && len <= 8 {
        Ok(())
    } else {
        Err(BusFault::UnsupportedLength { len })
    }
}

const fn ranges_overlap(a_low: PAddr, a_high: PAddr, b_low: PAddr, b_high: PAddr) -> bool {
    a_low <= b_high && b_low <= a_high
}

fn load_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn store_le(bytes: &mut [u8], value: u64) {
    let src = value.to_le_bytes();
    bytes.copy_from_slice(&src[..bytes.len()]);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{AccessDirection, Bus, BusFault, PAGE_SIZE};
    use crate::api::CoreConfig;
    use crate::fault::CoreError;
    use crate::word::PAddr;

    fn bus() -> Bus {
        Bus::new(&CoreConfig {
            mem_size: 0x1000,
            ..CoreConfig::default()
        })
    }

    #[test]
    fn main_memory_round_trips_all_widths() {
        let mut bus = bus();
        let base = CoreConfig::default().mem_base;
        for len in 1..=8usize {
            let value = 0x1122_3344_5566_7788u64 & (u64::MAX >> ((8 - len) * 8));
            bus.write(base + 0x100, len, value).unwrap();
            assert_eq!(bus.read(base + 0x100, len).unwrap(), value);
        }
    }

    #[test]
    fn main_memory_is_little_endian() {
        let mut bus = bus();
        let base = CoreConfig::default().mem_base;
        bus.write(base, 4, 0xDDCC_BBAA).unwrap();
        assert_eq!(bus.read(base, 1).unwrap(), 0xAA);
        assert_eq!(bus.read(base + 1, 1).unwrap(), 0xBB);
        assert_eq!(bus.read(base + 3, 1).unwrap(), 0xDD);
    }

    #[test]
    fn unmapped_address_is_out_of_bound() {
        let mut bus = bus();
        assert_eq!(
            bus.read(0x1000, 4),
            Err(BusFault::OutOfBound { addr: 0x1000 })
        );
        assert_eq!(
            bus.write(0x1000, 4, 0),
            Err(BusFault::OutOfBound { addr: 0x1000 })
        );
    }

    #[test]
    fn one_byte_past_a_region_end_is_out_of_bound() {
        let mut bus = bus();
        bus.add_mmio("probe", 0x1000, 4, None).unwrap();
        assert!(bus.read(0x1003, 1).is_ok());
        assert_eq!(
            bus.read(0x1004, 1),
            Err(BusFault::OutOfBound { addr: 0x1004 })
        );
    }

    #[test]
    fn length_contract_is_one_to_eight_bytes() {
        let mut bus = bus();
        let base = CoreConfig::default().mem_base;
        assert_eq!(
            bus.read(base, 0),
            Err(BusFault::UnsupportedLength { len: 0 })
        );
        assert_eq!(
            bus.read(base, 9),
            Err(BusFault::UnsupportedLength { len: 9 })
        );
    }

    #[test]
    fn region_callback_fires_once_per_access_with_relative_offset() {
        let mut bus = bus();
        let log: Rc<RefCell<Vec<(PAddr, usize, bool)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        bus.add_mmio(
            "probe",
            0x2000,
            16,
            Some(Box::new(move |_space, offset, len, dir| {
                sink.borrow_mut().push((offset, len, dir.is_write()));
            })),
        )
        .unwrap();

        let _ = bus.read(0x2004, 2).unwrap();
        bus.write(0x2008, 4, 0xAABB_CCDD).unwrap();

        let log = log.borrow();
        assert_eq!(log.as_slice(), &[(4, 2, false), (8, 4, true)]);
    }

    #[test]
    fn read_callback_runs_before_the_bytes_are_sampled() {
        let mut bus = bus();
        bus.add_mmio(
            "probe",
            0x2000,
            4,
            Some(Box::new(|space, offset, _len, dir| {
                if !dir.is_write() {
                    space[offset as usize] = 0x5A;
                }
            })),
        )
        .unwrap();
        assert_eq!(bus.read(0x2001, 1).unwrap(), 0x5A);
    }

    #[test]
    fn write_callback_observes_the_stored_bytes() {
        let mut bus = bus();
        let seen = Rc::new(RefCell::new(0u8));
        let sink = Rc::clone(&seen);
        bus.add_mmio(
            "probe",
            0x2000,
            4,
            Some(Box::new(move |space, offset, _len, dir| {
                if dir.is_write() {
                    *sink.borrow_mut() = space[offset as usize];
                }
            })),
        )
        .unwrap();
        bus.write(0x2000, 1, 0x77).unwrap();
        assert_eq!(*seen.borrow(), 0x77);
    }

    #[test]
    fn registration_rejects_zero_length_and_overlap() {
        let mut bus = bus();
        assert!(matches!(
            bus.add_mmio("empty", 0x3000, 0, None),
            Err(CoreError::EmptyRegion { name: "empty" })
        ));

        bus.add_mmio("first", 0x3000, 0x10, None).unwrap();
        assert!(matches!(
            bus.add_mmio("second", 0x300F, 0x10, None),
            Err(CoreError::RegionOverlap { name: "second", .. })
        ));
        assert!(bus.add_mmio("third", 0x3010, 0x10, None).is_ok());
    }

    #[test]
    fn registration_rejects_overlap_with_main_memory() {
        let mut bus = bus();
        let base = CoreConfig::default().mem_base;
        assert!(matches!(
            bus.add_mmio("shadow", base + 0x10, 4, None),
            Err(CoreError::RegionOverlap { name: "shadow", .. })
        ));
    }

    #[test]
    fn mmio_backing_is_page_rounded() {
        let mut bus = bus();
        bus.add_mmio("tiny", 0x4000, 8, None).unwrap();
        assert_eq!(bus.mmio[0].space.len(), PAGE_SIZE);
        // Bounds stay exact despite the rounded backing.
        assert_eq!(bus.mmio[0].high, 0x4007);
    }

    #[test]
    fn port_space_is_disjoint_from_the_memory_space() {
        let mut bus = bus();
        bus.add_pio("port", 0x70, 4, None).unwrap();
        // A load at the port number does not reach the port region.
        assert_eq!(bus.read(0x70, 1), Err(BusFault::OutOfBound { addr: 0x70 }));
        bus.port_write(0x70, 2, 0xBEEF).unwrap();
        assert_eq!(bus.port_read(0x70, 2).unwrap(), 0xBEEF);
        assert_eq!(
            bus.port_read(0x74, 1),
            Err(BusFault::OutOfBound { addr: 0x74 })
        );
    }

    #[test]
    fn device_touch_hint_is_set_and_drained() {
        let mut bus = bus();
        bus.add_mmio("probe", 0x2000, 4, None).unwrap();
        let base = CoreConfig::default().mem_base;

        let _ = bus.read(base, 4).unwrap();
        assert!(!bus.take_device_touched());

        let _ = bus.read(0x2000, 4).unwrap();
        assert!(bus.take_device_touched());
        assert!(!bus.take_device_touched());
    }
}
