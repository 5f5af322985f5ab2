mod layout;
pub mod register;
pub mod sim;

pub use layout::{mode_bits, mode_number, SpiController, SpiPort};

use crate::utils::Result;
use embedded_hal::spi::{Phase, Polarity};

pub trait SpiActions {
    /// Master mode, interrupts off, status cleared, byte granularity,
    /// flash boot acceleration off
    fn init(&mut self);
    /// Returns the rate actually programmed
    fn set_clk_rate(&mut self, spi_clk: u32) -> u32;
    fn set_mode(&mut self, polarity: Polarity, phase: Phase);
    fn switch_cs(&mut self, line: u8, asserted: bool);
    /// Line currently held asserted by this controller
    fn selected(&self) -> Option<u8>;
    /// One full-duplex byte exchange
    fn txrx_byte(&mut self, data: u8) -> Result<u8>;

    fn apply_configuration(&mut self, requested_hz: u32, polarity: Polarity, phase: Phase) -> u32 {
        self.init();
        let rate = self.set_clk_rate(requested_hz);
        self.set_mode(polarity, phase);
        rate
    }
}
