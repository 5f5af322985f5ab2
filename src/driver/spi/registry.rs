use alloc::sync::Arc;
use alloc::vec::Vec;
use log::*;

use super::{SpiBus, SpiDevice, SpiOps};
use crate::board::spi::register::{Mmio, RegisterIo};
use crate::board::spi::SpiPort;
use crate::utils::{Error, Result};

/// Buses known to the system, looked up by name
pub struct SpiRegistry<IO: RegisterIo + Clone> {
    io: IO,
    buses: Vec<Arc<SpiBus<IO>>>,
}

impl SpiRegistry<Mmio> {
    /// Registry driving the real controllers.
    ///
    /// # Safety
    ///
    /// The controller windows listed in `board::MMIO` must be mapped and
    /// owned by this registry alone.
    pub unsafe fn mmio() -> Self {
        Self::new(Mmio::new())
    }
}

impl<IO: RegisterIo + Clone> SpiRegistry<IO> {
    pub fn new(io: IO) -> Self {
        Self {
            io,
            buses: Vec::new(),
        }
    }

    /// Bring up controller `index` under `name`
    pub fn register_bus(&mut self, index: u8, name: &str) -> Result<Arc<SpiBus<IO>>> {
        let port = SpiPort::try_from(index)?;
        if self
            .buses
            .iter()
            .any(|bus| bus.port() == port || bus.name() == name)
        {
            warn!("spi{} or bus {} already registered", index, name);
            return Err(Error::AlreadyRegistered);
        }
        let bus = Arc::new(SpiBus::new(name, port, self.io.clone()));
        self.buses.push(bus.clone());
        info!("{} registered at {:#x}", name, port.base_addr());
        Ok(bus)
    }

    pub fn bus(&self, name: &str) -> Option<Arc<SpiBus<IO>>> {
        self.buses.iter().find(|bus| bus.name() == name).cloned()
    }

    pub fn buses(&self) -> &[Arc<SpiBus<IO>>] {
        &self.buses
    }

    pub fn attach_device(&self, bus_name: &str, dev_name: &str, cs: u8) -> Result<SpiDevice<IO>> {
        self.bus(bus_name).ok_or(Error::UnknownBus)?.attach(dev_name, cs)
    }
}

impl<IO: RegisterIo + Clone + 'static> SpiRegistry<IO> {
    /// Operation table of a bus for callers that only hold contexts
    pub fn ops(&self, bus_name: &str) -> Option<Arc<dyn SpiOps>> {
        self.bus(bus_name).map(|bus| bus as Arc<dyn SpiOps>)
    }
}
