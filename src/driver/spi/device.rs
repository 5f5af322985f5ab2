use alloc::string::{String, ToString};
use alloc::sync::Arc;
use embedded_hal::blocking::spi::{Transfer, Write};
use log::*;
use spin::MutexGuard;

use super::bus::{BusState, SpiBus};
use super::{Configuration, Context, DeviceContext, Message, SpiOps};
use crate::board::spi::register::RegisterIo;
use crate::board::spi::SpiActions;
use crate::driver::DevId;
use crate::utils::{Error, Result};

/// In-place transfers are copied through a stack buffer this large
const CHUNK: usize = 32;

/// A peripheral attached to one chip-select line of a bus.
///
/// Dropping the handle frees the line.
pub struct SpiDevice<IO: RegisterIo> {
    id: DevId,
    name: String,
    cs: u8,
    bus: Arc<SpiBus<IO>>,
}

impl<IO: RegisterIo> SpiDevice<IO> {
    pub(super) fn new(id: DevId, name: &str, cs: u8, bus: Arc<SpiBus<IO>>) -> Self {
        Self {
            id,
            name: name.to_string(),
            cs,
            bus,
        }
    }

    pub fn id(&self) -> DevId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chip_select(&self) -> u8 {
        self.cs
    }

    pub fn bus(&self) -> &Arc<SpiBus<IO>> {
        &self.bus
    }

    fn device_context(&self) -> DeviceContext {
        DeviceContext {
            port: self.bus.port(),
            id: self.id,
            cs: self.cs,
        }
    }

    pub fn context(&self) -> Context {
        Context::Device(self.device_context())
    }

    pub fn configure(&self, cfg: &Configuration) -> Result<()> {
        self.bus.configure(&self.context(), cfg)
    }

    pub fn transfer(&self, msg: &mut Message<'_>) -> Result<usize> {
        self.bus.transfer(&self.context(), msg)
    }

    /// Take the bus until the session is dropped. A stored configuration
    /// from an earlier `configure` is put back on the hardware first.
    pub fn lock(&self) -> Result<SpiSession<'_, IO>> {
        let ctx = self.device_context();
        let mut state = self.bus.state();
        state.take(&ctx)?;
        Ok(SpiSession {
            device: self,
            ctx,
            state,
        })
    }
}

impl<IO: RegisterIo> Drop for SpiDevice<IO> {
    fn drop(&mut self) {
        self.bus.detach(self.id, self.cs);
        debug!("{}: {} detached from cs{}", self.bus.name(), self.name, self.cs);
    }
}

/// Exclusive use of a bus by one device
pub struct SpiSession<'a, IO: RegisterIo> {
    device: &'a SpiDevice<IO>,
    ctx: DeviceContext,
    state: MutexGuard<'a, BusState<IO>>,
}

impl<'a, IO: RegisterIo> SpiSession<'a, IO> {
    pub fn device(&self) -> &SpiDevice<IO> {
        self.device
    }

    pub fn configure(&mut self, cfg: &Configuration) -> Result<()> {
        self.state.configure(&Context::Device(self.ctx), cfg)
    }

    pub fn transfer(&mut self, msg: &mut Message<'_>) -> Result<usize> {
        self.state.transfer(&self.ctx, msg)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.transfer(&mut Message::write(data))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.transfer(&mut Message::read(buf))
    }

    /// Command then response under one select assertion
    pub fn write_then_read(&mut self, cmd: &[u8], buf: &mut [u8]) -> Result<()> {
        self.transfer(&mut Message::write(cmd).hold_select())?;
        self.transfer(&mut Message::read(buf).continue_select())?;
        Ok(())
    }

    /// Run `msgs` in order without giving up the bus, returns the bytes moved
    pub fn transfer_chain(&mut self, msgs: &mut [Message<'_>]) -> Result<usize> {
        let mut total = 0;
        for msg in msgs.iter_mut() {
            total += self.transfer(msg)?;
        }
        Ok(total)
    }
}

impl<IO: RegisterIo> Drop for SpiSession<'_, IO> {
    fn drop(&mut self) {
        let cs = self.ctx.cs;
        if self.state.spi.selected() == Some(cs) {
            warn!("{}: cs{} left asserted, releasing", self.device.name, cs);
            self.state.spi.switch_cs(cs, false);
        }
    }
}

impl<IO: RegisterIo> Transfer<u8> for SpiSession<'_, IO> {
    type Error = Error;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8]> {
        let total = words.len();
        let mut tx = [0u8; CHUNK];
        let mut done = 0;
        for chunk in words.chunks_mut(CHUNK) {
            let len = chunk.len();
            tx[..len].copy_from_slice(chunk);
            let mut msg = Message::transfer(&tx[..len], chunk);
            msg.assert_select = done == 0;
            msg.release_select = done + len == total;
            SpiSession::transfer(self, &mut msg)?;
            done += len;
        }
        Ok(words)
    }
}

impl<IO: RegisterIo> Write<u8> for SpiSession<'_, IO> {
    type Error = Error;

    fn write(&mut self, words: &[u8]) -> Result<()> {
        SpiSession::write(self, words).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::spi::register::{offsets, Spcr};
    use crate::board::spi::sim::{Access, SimRegisters};
    use crate::board::spi::{mode_number, SpiPort};
    use alloc::vec::Vec;
    use embedded_hal::spi::{MODE_0, MODE_3};

    type Sim = Arc<SimRegisters>;

    fn bus() -> (Sim, Arc<SpiBus<Sim>>) {
        let sim = Arc::new(SimRegisters::new());
        let bus = Arc::new(SpiBus::new("spi0", SpiPort::SPI0, sim.clone()));
        (sim, bus)
    }

    fn base() -> usize {
        SpiPort::SPI0.base_addr()
    }

    #[test]
    fn write_then_read_holds_select() {
        let (sim, bus) = bus();
        let flash = bus.attach("flash", 1).unwrap();
        flash.configure(&Configuration::default()).unwrap();
        sim.push_responses(base(), &[0xff, 0xef, 0x40, 0x18]);

        let mut id = [0u8; 3];
        flash.lock().unwrap().write_then_read(&[0x9f], &mut id).unwrap();
        assert_eq!(id, [0xef, 0x40, 0x18]);
        assert_eq!(sim.transmitted(base()), vec![0x9f, 0xff, 0xff, 0xff]);
        assert_eq!(sim.select_history(base()), vec![0b0010, 0b0000]);
    }

    #[test]
    fn stored_configuration_follows_the_device() {
        let (sim, bus) = bus();
        let a = bus.attach("a", 0).unwrap();
        let b = bus.attach("b", 2).unwrap();
        a.configure(&Configuration::new(1_000_000, MODE_3)).unwrap();
        b.configure(&Configuration::new(1_000_000, MODE_0)).unwrap();
        assert_eq!(mode_number(sim.peek(base(), offsets::SPCR)), 0);

        let session = a.lock().unwrap();
        assert_eq!(mode_number(sim.peek(base(), offsets::SPCR)), 3);
        drop(session);

        // already the owner, nothing is rewritten
        sim.clear_trace();
        a.lock().unwrap().write(&[0x01]).unwrap();
        assert!(sim.writes_to(base(), offsets::SPCR).is_empty());
    }

    #[test]
    fn unconfigured_device_cannot_transfer() {
        let (sim, bus) = bus();
        let dev = bus.attach("dev", 0).unwrap();
        let mut session = dev.lock().unwrap();
        assert_eq!(
            session.write(&[1, 2]),
            Err(Error::PreconditionViolation("device not configured"))
        );
        drop(session);
        assert!(sim.transmitted(base()).is_empty());
    }

    #[test]
    fn dropped_session_releases_select() {
        let (sim, bus) = bus();
        let dev = bus.attach("dev", 3).unwrap();
        let mut session = dev.lock().unwrap();
        session.configure(&Configuration::default()).unwrap();
        session.transfer(&mut Message::write(&[0x06]).hold_select()).unwrap();
        drop(session);

        assert_eq!(sim.select_history(base()), vec![0b1000, 0b0000]);
        assert_eq!(bus.state().spi.selected(), None);
    }

    #[test]
    fn held_line_keeps_other_devices_out() {
        let (sim, bus) = bus();
        let a = bus.attach("a", 0).unwrap();
        let b = bus.attach("b", 1).unwrap();
        a.configure(&Configuration::default()).unwrap();
        b.configure(&Configuration::new(2_000_000, MODE_3)).unwrap();

        a.transfer(&mut Message::write(&[0x9f]).hold_select()).unwrap();
        sim.clear_trace();
        assert_eq!(
            b.lock().err(),
            Some(Error::PreconditionViolation("bus held by another device"))
        );
        assert_eq!(
            b.configure(&Configuration::default()),
            Err(Error::PreconditionViolation("bus held by another device"))
        );
        // nothing reprogrammed, a's line untouched
        assert!(sim.trace().iter().all(|acc| !matches!(acc, Access::Write { .. })));
        assert_eq!(bus.state().spi.selected(), Some(0));

        let mut rx = [0u8; 3];
        a.transfer(&mut Message::read(&mut rx).continue_select()).unwrap();
        assert_eq!(sim.select_history(base()), vec![0b0000]);
        assert!(b.lock().is_ok());
    }

    #[test]
    fn detach_releases_held_line() {
        let (sim, bus) = bus();
        let a = bus.attach("a", 2).unwrap();
        let b = bus.attach("b", 3).unwrap();
        a.configure(&Configuration::default()).unwrap();
        b.configure(&Configuration::default()).unwrap();
        a.transfer(&mut Message::write(&[0x06]).hold_select()).unwrap();
        drop(a);

        assert_eq!(sim.select_history(base()), vec![0b0100, 0b0000]);
        b.lock().unwrap().write(&[0x01]).unwrap();
    }

    #[test]
    fn chain_counts_every_message() {
        let (sim, bus) = bus();
        let dev = bus.attach("dev", 0).unwrap();
        dev.configure(&Configuration::default()).unwrap();
        let mut rx = [0u8; 4];
        let mut msgs = [
            Message::write(&[0x03, 0x00]).hold_select(),
            Message::read(&mut rx).continue_select(),
        ];
        assert_eq!(dev.lock().unwrap().transfer_chain(&mut msgs), Ok(6));
        assert_eq!(sim.select_history(base()), vec![0b0001, 0b0000]);
    }

    #[test]
    fn blocking_transfer_is_one_assertion() {
        let (sim, bus) = bus();
        let dev = bus.attach("dev", 1).unwrap();
        dev.configure(&Configuration::default()).unwrap();
        let data: Vec<u8> = (0..80).collect();
        let mut words = data.clone();

        let mut session = dev.lock().unwrap();
        let echoed = Transfer::<u8>::transfer(&mut session, &mut words[..]).unwrap().to_vec();
        Write::<u8>::write(&mut session, &[0xaa]).unwrap();
        drop(session);

        assert_eq!(echoed, data);
        assert_eq!(
            sim.select_history(base()),
            vec![0b0010, 0b0000, 0b0010, 0b0000]
        );
    }

    #[test]
    fn detach_on_drop() {
        let (sim, bus) = bus();
        let dev = bus.attach("dev", 2).unwrap();
        assert_eq!(bus.attach("other", 2).err(), Some(Error::DuplicateSelect));
        drop(dev);
        assert!(bus.devices().is_empty());
        let again = bus.attach("other", 2).unwrap();
        again.configure(&Configuration::new(500_000, MODE_3)).unwrap();
        let spcr = Spcr::from_bits_truncate(sim.peek(base(), offsets::SPCR));
        assert!(spcr.contains(Spcr::CPOL | Spcr::CPHA));
    }
}
