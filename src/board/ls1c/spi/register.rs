use alloc::sync::Arc;
use core::ptr::{read_volatile, write_volatile};

/* register offsets from the controller base */
pub mod offsets {
    /// Control register
    pub const SPCR: usize = 0x0;
    /// Status register
    pub const SPSR: usize = 0x1;
    /// Tx FIFO on write, Rx FIFO on read
    pub const DATA: usize = 0x2;
    /// Extended register
    pub const SPER: usize = 0x3;
    /// SPI flash parameter register
    pub const SFC_PARAM: usize = 0x4;
    /// SPI flash software chip select register
    pub const SFC_SOFTCS: usize = 0x5;
    /// SPI flash timing register
    pub const SFC_TIMING: usize = 0x6;
}

bitflags! {
    pub struct Spcr: u8 {
        const SPIE = 0x80;
        const SPE  = 0x40;
        const MSTR = 0x10;
        const CPOL = 0x08;
        const CPHA = 0x04;
        const SPR  = 0x03;
    }
}

bitflags! {
    pub struct Spsr: u8 {
        const SPIF    = 0x80;
        const WCOL    = 0x40;
        const WFFULL  = 0x08;
        const WFEMPTY = 0x04;
        const RFFULL  = 0x02;
        const RFEMPTY = 0x01;
    }
}

bitflags! {
    pub struct Sper: u8 {
        const ICNT = 0xc0;
        const MODE = 0x04;
        const SPRE = 0x03;
    }
}

bitflags! {
    pub struct SfcParam: u8 {
        const MEMORY_EN = 0x01;
    }
}

/// Idle-state values written on every configuration
pub mod reset {
    /// SPE | MSTR | SPR=3, interrupts off
    pub const SPCR: u8 = 0x53;
    /// clear SPIF and WCOL
    pub const SPSR: u8 = 0xc0;
    /// one byte per interrupt, sample and send on the same edge
    pub const SPER: u8 = 0x03;
    pub const SFC_TIMING: u8 = 0x05;
}

/// SFC_SOFTCS: high nibble is the line level (active low), low nibble the
/// software enable of each line
pub const fn csn_bit(line: u8) -> u8 {
    0x10 << line
}

pub const fn csen_bit(line: u8) -> u8 {
    0x01 << line
}

/// Lines currently driven low with software control enabled
pub fn asserted_lines(softcs: u8) -> u8 {
    (softcs & 0x0f) & !(softcs >> 4)
}

/// Divisors selected by SPRE:SPR, in encoding order
pub const DIVIDERS: [u32; 12] = [2, 4, 16, 32, 8, 64, 128, 256, 512, 1024, 2048, 4096];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClockDivider(u8);

impl ClockDivider {
    /// The smallest divisor whose output does not exceed `target`.
    ///
    /// `None` when even the slowest divisor is faster than `target`.
    pub fn at_most(input: u32, target: u32) -> Option<Self> {
        (0..DIVIDERS.len())
            .filter(|&i| input as u64 <= target as u64 * DIVIDERS[i] as u64)
            .min_by_key(|&i| DIVIDERS[i])
            .map(|i| Self(i as u8))
    }

    pub fn slowest() -> Self {
        Self(11)
    }

    pub fn divisor(&self) -> u32 {
        DIVIDERS[self.0 as usize]
    }

    pub fn spr(&self) -> u8 {
        self.0 & 0x3
    }

    pub fn spre(&self) -> u8 {
        (self.0 >> 2) & 0x3
    }

    pub fn output(&self, input: u32) -> u32 {
        input / self.divisor()
    }
}

/// Raw access to the 8-bit controller registers. No validation, no errors.
pub trait RegisterIo: Send + Sync {
    fn read(&self, base: usize, offset: usize) -> u8;
    fn write(&self, base: usize, offset: usize, value: u8);
}

/// Memory mapped registers
#[derive(Debug, Copy, Clone)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Every base address handed to `read`/`write` must be a mapped
    /// controller register block (see `board::MMIO`).
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read(&self, base: usize, offset: usize) -> u8 {
        unsafe { read_volatile((base + offset) as *const u8) }
    }

    #[inline]
    fn write(&self, base: usize, offset: usize, value: u8) {
        unsafe { write_volatile((base + offset) as *mut u8, value) }
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for Arc<T> {
    fn read(&self, base: usize, offset: usize) -> u8 {
        (**self).read(base, offset)
    }

    fn write(&self, base: usize, offset: usize, value: u8) {
        (**self).write(base, offset, value)
    }
}
