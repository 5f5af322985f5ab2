use core::convert::Infallible;

use embedded_hal::spi::{FullDuplex, Phase, Polarity};
use log::*;

use super::register::*;
use super::SpiActions;
use crate::board::CLOCK_FREQ;
use crate::config::{SPI_CS_LINES, SPI_POLL_LIMIT};
use crate::utils::{Error, Result};

/** SPI controller instances */

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpiPort {
    SPI0,
    SPI1,
}

impl SpiPort {
    pub fn base_addr(&self) -> usize {
        match self {
            SpiPort::SPI0 => 0xbfe80000usize,
            SpiPort::SPI1 => 0xbfec0000usize,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            SpiPort::SPI0 => 0,
            SpiPort::SPI1 => 1,
        }
    }

    /// Compiled into this build
    pub fn is_enabled(&self) -> bool {
        match self {
            SpiPort::SPI0 => cfg!(feature = "spi0"),
            SpiPort::SPI1 => cfg!(feature = "spi1"),
        }
    }
}

impl TryFrom<u8> for SpiPort {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        let port = match index {
            0 => SpiPort::SPI0,
            1 => SpiPort::SPI1,
            _ => return Err(Error::UnknownController),
        };
        if port.is_enabled() {
            Ok(port)
        } else {
            Err(Error::UnknownController)
        }
    }
}

/// SPCR clock bits for one of the four standard modes
pub fn mode_bits(polarity: Polarity, phase: Phase) -> Spcr {
    let mut bits = Spcr::empty();
    bits.set(Spcr::CPOL, polarity == Polarity::IdleHigh);
    bits.set(Spcr::CPHA, phase == Phase::CaptureOnSecondTransition);
    bits
}

/// Standard mode number (CPOL << 1 | CPHA) programmed in `spcr`
pub fn mode_number(spcr: u8) -> u8 {
    let spcr = Spcr::from_bits_truncate(spcr);
    (spcr.contains(Spcr::CPOL) as u8) << 1 | spcr.contains(Spcr::CPHA) as u8
}

pub struct SpiController<IO: RegisterIo> {
    port: SpiPort,
    base: usize,
    io: IO,
    clock: u32,
    poll_limit: Option<usize>,
    selected: Option<u8>,
}

impl<IO: RegisterIo> SpiController<IO> {
    pub fn new(port: SpiPort, io: IO) -> Self {
        Self {
            port,
            base: port.base_addr(),
            io,
            clock: CLOCK_FREQ,
            poll_limit: Some(SPI_POLL_LIMIT),
            selected: None,
        }
    }

    pub fn port(&self) -> SpiPort {
        self.port
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn clock(&self) -> u32 {
        self.clock
    }

    /// `None` polls forever
    pub fn set_poll_limit(&mut self, limit: Option<usize>) {
        self.poll_limit = limit;
    }

    fn reg_read(&self, offset: usize) -> u8 {
        self.io.read(self.base, offset)
    }

    fn reg_write(&self, offset: usize, value: u8) {
        self.io.write(self.base, offset, value)
    }

    fn reg_modify(&self, offset: usize, f: impl FnOnce(u8) -> u8) {
        let val = self.reg_read(offset);
        self.reg_write(offset, f(val));
    }

    fn status(&self) -> Spsr {
        Spsr::from_bits_truncate(self.reg_read(offsets::SPSR))
    }

    fn drive_cs(&self, line: u8, asserted: bool) {
        self.reg_modify(offsets::SFC_SOFTCS, |mut val| {
            val |= csen_bit(line);
            if asserted {
                val &= !csn_bit(line);
            } else {
                val |= csn_bit(line);
            }
            val
        });
    }

    /// Retry `f` until it stops blocking or the poll bound runs out. The
    /// controller does not count bytes, so a timeout reports `transferred: 0`
    /// and the transfer engine replaces it with its own count.
    fn poll<T>(&mut self, mut f: impl FnMut(&mut Self) -> nb::Result<T, Infallible>) -> Result<T> {
        let mut polls = 0usize;
        loop {
            match f(self) {
                Ok(v) => return Ok(v),
                Err(nb::Error::Other(e)) => match e {},
                Err(nb::Error::WouldBlock) => {}
            }
            polls += 1;
            if let Some(limit) = self.poll_limit {
                if polls >= limit {
                    return Err(Error::HardwareTimeout { transferred: 0 });
                }
            }
            core::hint::spin_loop();
        }
    }
}

impl<IO: RegisterIo> FullDuplex<u8> for SpiController<IO> {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        if self.status().contains(Spsr::RFEMPTY) {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(self.reg_read(offsets::DATA))
        }
    }

    fn send(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if self.status().contains(Spsr::WFFULL) {
            Err(nb::Error::WouldBlock)
        } else {
            self.reg_write(offsets::DATA, word);
            Ok(())
        }
    }
}

impl<IO: RegisterIo> SpiActions for SpiController<IO> {
    fn init(&mut self) {
        self.reg_write(offsets::SPCR, reset::SPCR);
        self.reg_write(offsets::SPSR, reset::SPSR);
        self.reg_write(offsets::SPER, reset::SPER);
        // memory mapped flash reads would fight the software chip select
        self.reg_modify(offsets::SFC_PARAM, |val| val & !SfcParam::MEMORY_EN.bits());
        self.reg_write(offsets::SFC_TIMING, reset::SFC_TIMING);
    }

    fn set_clk_rate(&mut self, spi_clk: u32) -> u32 {
        let div = match ClockDivider::at_most(self.clock, spi_clk) {
            Some(div) => div,
            None => {
                warn!(
                    "spi{}: {} Hz is below the slowest rate, using {} Hz",
                    self.port.index(),
                    spi_clk,
                    ClockDivider::slowest().output(self.clock)
                );
                ClockDivider::slowest()
            }
        };
        self.reg_modify(offsets::SPCR, |val| {
            (val & !Spcr::SPR.bits()) | div.spr()
        });
        self.reg_modify(offsets::SPER, |val| {
            (val & !Sper::SPRE.bits()) | div.spre()
        });
        div.output(self.clock)
    }

    fn set_mode(&mut self, polarity: Polarity, phase: Phase) {
        let bits = mode_bits(polarity, phase);
        self.reg_modify(offsets::SPCR, |val| {
            (val & !(Spcr::CPOL | Spcr::CPHA).bits()) | bits.bits()
        });
    }

    fn switch_cs(&mut self, line: u8, asserted: bool) {
        debug_assert!(line < SPI_CS_LINES);
        if asserted {
            if let Some(held) = self.selected.filter(|&held| held != line) {
                warn!("spi{}: cs{} still asserted, releasing it", self.port.index(), held);
                self.drive_cs(held, false);
            }
            self.selected = Some(line);
        } else if self.selected == Some(line) {
            self.selected = None;
        }
        self.drive_cs(line, asserted);
    }

    fn selected(&self) -> Option<u8> {
        self.selected
    }

    fn txrx_byte(&mut self, data: u8) -> Result<u8> {
        self.poll(|spi| spi.send(data))?;
        self.poll(|spi| FullDuplex::read(spi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::spi::sim::SimRegisters;
    use alloc::sync::Arc;
    use embedded_hal::spi::{MODE_0, MODE_1, MODE_2, MODE_3};

    fn controller() -> (Arc<SimRegisters>, SpiController<Arc<SimRegisters>>) {
        let sim = Arc::new(SimRegisters::new());
        (sim.clone(), SpiController::new(SpiPort::SPI0, sim))
    }

    #[test]
    fn port_lookup() {
        assert_eq!(SpiPort::try_from(0), Ok(SpiPort::SPI0));
        assert_eq!(SpiPort::try_from(1), Ok(SpiPort::SPI1));
        assert_eq!(SpiPort::try_from(2), Err(Error::UnknownController));
        assert_eq!(SpiPort::SPI1.base_addr(), 0xbfec0000);
    }

    #[test]
    fn mode_table() {
        for (mode, number) in [(MODE_0, 0), (MODE_1, 1), (MODE_2, 2), (MODE_3, 3)] {
            let (sim, mut spi) = controller();
            spi.apply_configuration(1_000_000, mode.polarity, mode.phase);
            assert_eq!(mode_number(sim.peek(spi.base(), offsets::SPCR)), number);
        }
    }

    #[test]
    fn idle_state_after_configuration() {
        let (sim, mut spi) = controller();
        let base = spi.base();
        assert_eq!(sim.peek(base, offsets::SFC_PARAM) & 1, 1);

        let rate = spi.apply_configuration(CLOCK_FREQ / 8, Polarity::IdleHigh, Phase::CaptureOnSecondTransition);
        assert_eq!(rate, CLOCK_FREQ / 8);

        let spcr = Spcr::from_bits_truncate(sim.peek(base, offsets::SPCR));
        assert!(spcr.contains(Spcr::SPE | Spcr::MSTR | Spcr::CPOL | Spcr::CPHA));
        assert!(!spcr.contains(Spcr::SPIE));
        // /8 is SPRE=1, SPR=0
        assert_eq!(spcr.bits() & Spcr::SPR.bits(), 0);
        assert_eq!(sim.peek(base, offsets::SPER), 0x01);
        assert_eq!(sim.peek(base, offsets::SFC_PARAM) & 1, 0);
        assert_eq!(sim.peek(base, offsets::SFC_TIMING), 0x05);
        assert_eq!(sim.writes_to(base, offsets::SPSR), vec![0xc0]);
    }

    #[test]
    fn configuration_is_idempotent() {
        let (sim, mut spi) = controller();
        let base = spi.base();
        let snapshot = |sim: &SimRegisters| {
            [offsets::SPCR, offsets::SPER, offsets::SFC_PARAM, offsets::SFC_TIMING]
                .map(|off| sim.peek(base, off))
        };
        spi.apply_configuration(3_000_000, Polarity::IdleLow, Phase::CaptureOnSecondTransition);
        let first = snapshot(&sim);
        spi.apply_configuration(3_000_000, Polarity::IdleLow, Phase::CaptureOnSecondTransition);
        assert_eq!(snapshot(&sim), first);
    }

    #[test]
    fn slow_rate_clamps() {
        let (_sim, mut spi) = controller();
        assert_eq!(spi.set_clk_rate(1_000), CLOCK_FREQ / 4096);
    }

    #[test]
    fn select_lines() {
        let (sim, mut spi) = controller();
        let base = spi.base();
        spi.switch_cs(2, true);
        assert_eq!(spi.selected(), Some(2));
        assert_eq!(asserted_lines(sim.peek(base, offsets::SFC_SOFTCS)), 0b0100);

        // a second line forces the first one off
        spi.switch_cs(1, true);
        assert_eq!(spi.selected(), Some(1));
        assert_eq!(sim.select_history(base), vec![0b0100, 0b0000, 0b0010]);

        spi.switch_cs(1, false);
        assert_eq!(spi.selected(), None);
        assert_eq!(asserted_lines(sim.peek(base, offsets::SFC_SOFTCS)), 0);
    }

    #[test]
    fn exchange_and_timeout() {
        let (sim, mut spi) = controller();
        assert_eq!(spi.txrx_byte(0x3c), Ok(0x3c));

        spi.set_poll_limit(Some(16));
        sim.set_stalled(spi.base(), true);
        assert_eq!(spi.txrx_byte(0x3c), Err(Error::HardwareTimeout { transferred: 0 }));
    }
}
