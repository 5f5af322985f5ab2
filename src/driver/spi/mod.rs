//! Shared SPI bus: the configure/transfer operation table, the bus and device
//! handles built on top of it, and the registry that hands them out.

mod bus;
mod device;
mod registry;
mod xfer;

pub use bus::SpiBus;
pub use device::{SpiDevice, SpiSession};
pub use registry::SpiRegistry;
pub use xfer::transfer;

use core::fmt;
use embedded_hal::spi::{Mode, Phase, Polarity, MODE_0};

use super::DevId;
use crate::board::spi::register::ClockDivider;
use crate::board::spi::{mode_bits, mode_number, SpiPort};
use crate::board::CLOCK_FREQ;
use crate::config::SPI_DEFAULT_HZ;
use crate::utils::{Error, Result};

/// Per-session bus parameters
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub max_hz: u32,
    pub mode: Mode,
}

impl Configuration {
    pub fn new(max_hz: u32, mode: Mode) -> Self {
        Self { max_hz, mode }
    }

    pub fn polarity(&self) -> Polarity {
        self.mode.polarity
    }

    pub fn phase(&self) -> Phase {
        self.mode.phase
    }

    /// Standard SPI mode number, 0 to 3
    pub fn mode_number(&self) -> u8 {
        mode_number(mode_bits(self.polarity(), self.phase()).bits())
    }

    /// The programmed rate may never exceed `max_hz`, so rates below the
    /// slowest divider are refused instead of clamped.
    fn validate(&self) -> Result<()> {
        if self.max_hz == 0 {
            return Err(Error::PreconditionViolation("zero clock rate"));
        }
        if ClockDivider::at_most(CLOCK_FREQ, self.max_hz).is_none() {
            return Err(Error::PreconditionViolation("clock rate below the slowest divider"));
        }
        Ok(())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("max_hz", &self.max_hz)
            .field("mode", &self.mode_number())
            .finish()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(SPI_DEFAULT_HZ, MODE_0)
    }
}

/// One transfer request.
///
/// `assert_select`/`release_select` let several messages share one
/// chip-select assertion.
#[derive(Debug)]
pub struct Message<'a> {
    pub length: usize,
    pub send_buf: Option<&'a [u8]>,
    pub recv_buf: Option<&'a mut [u8]>,
    pub assert_select: bool,
    pub release_select: bool,
}

impl<'a> Message<'a> {
    fn with_length(length: usize) -> Self {
        Self {
            length,
            send_buf: None,
            recv_buf: None,
            assert_select: true,
            release_select: true,
        }
    }

    pub fn write(send: &'a [u8]) -> Self {
        Self {
            length: send.len(),
            send_buf: Some(send),
            ..Self::with_length(0)
        }
    }

    pub fn read(recv: &'a mut [u8]) -> Self {
        Self {
            length: recv.len(),
            recv_buf: Some(recv),
            ..Self::with_length(0)
        }
    }

    pub fn transfer(send: &'a [u8], recv: &'a mut [u8]) -> Self {
        Self {
            length: send.len(),
            send_buf: Some(send),
            recv_buf: Some(recv),
            ..Self::with_length(0)
        }
    }

    /// Leave chip select asserted after this message
    pub fn hold_select(mut self) -> Self {
        self.release_select = false;
        self
    }

    /// Chip select is already asserted by an earlier message
    pub fn continue_select(mut self) -> Self {
        self.assert_select = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.send_buf.is_none() && self.recv_buf.is_none() && self.length != 0 {
            return Err(Error::PreconditionViolation("message without buffers"));
        }
        if self.send_buf.map_or(false, |buf| buf.len() < self.length) {
            return Err(Error::PreconditionViolation("send buffer shorter than message"));
        }
        if self.recv_buf.as_ref().map_or(false, |buf| buf.len() < self.length) {
            return Err(Error::PreconditionViolation("receive buffer shorter than message"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusContext {
    pub port: SpiPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceContext {
    pub port: SpiPort,
    pub id: DevId,
    pub cs: u8,
}

/// Caller handle resolved by the operation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Bus(BusContext),
    Device(DeviceContext),
}

impl Context {
    pub fn port(&self) -> SpiPort {
        match self {
            Context::Bus(bus) => bus.port,
            Context::Device(dev) => dev.port,
        }
    }
}

/// Operation table a bus exposes to the device framework
pub trait SpiOps: Send + Sync {
    fn configure(&self, ctx: &Context, cfg: &Configuration) -> Result<()>;
    fn transfer(&self, ctx: &Context, msg: &mut Message<'_>) -> Result<usize>;
}
