use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::*;
use spin::{Mutex, MutexGuard};

use super::{xfer, BusContext, Configuration, Context, DeviceContext, Message, SpiDevice, SpiOps};
use crate::board::spi::register::RegisterIo;
use crate::board::spi::{SpiActions, SpiController, SpiPort};
use crate::config::SPI_CS_LINES;
use crate::driver::DevId;
use crate::utils::{Error, Result};

pub(super) struct DeviceSlot {
    id: DevId,
    name: String,
    config: Option<Configuration>,
}

/// Everything behind the bus lock
pub(super) struct BusState<IO: RegisterIo> {
    pub(super) spi: SpiController<IO>,
    /// Device whose configuration is currently programmed
    owner: Option<DevId>,
    devices: BTreeMap<u8, DeviceSlot>,
}

impl<IO: RegisterIo> BusState<IO> {
    fn apply(&mut self, cfg: &Configuration) {
        let rate = self
            .spi
            .apply_configuration(cfg.max_hz, cfg.polarity(), cfg.phase());
        debug!(
            "spi{} configuration: {} Hz requested, {} Hz programmed, mode {}",
            self.spi.port().index(),
            cfg.max_hz,
            rate,
            cfg.mode_number()
        );
    }

    fn slot(&mut self, dev: &DeviceContext) -> Result<&mut DeviceSlot> {
        self.devices
            .get_mut(&dev.cs)
            .filter(|slot| slot.id == dev.id)
            .ok_or(Error::PreconditionViolation("device not attached to this bus"))
    }

    /// A select line left asserted by one device keeps every other caller off
    /// the bus until that device releases it.
    fn check_holder(&self, cs: Option<u8>) -> Result<()> {
        match self.spi.selected() {
            Some(held) if Some(held) != cs => {
                Err(Error::PreconditionViolation("bus held by another device"))
            }
            _ => Ok(()),
        }
    }

    pub(super) fn configure(&mut self, ctx: &Context, cfg: &Configuration) -> Result<()> {
        cfg.validate()?;
        match ctx {
            Context::Bus(_) => {
                self.check_holder(None)?;
                self.apply(cfg);
                self.owner = None;
            }
            Context::Device(dev) => {
                self.check_holder(Some(dev.cs))?;
                self.slot(dev)?.config = Some(*cfg);
                self.apply(cfg);
                self.owner = Some(dev.id);
            }
        }
        Ok(())
    }

    /// Make the hardware carry `dev`'s configuration, if it has one
    pub(super) fn take(&mut self, dev: &DeviceContext) -> Result<Option<Configuration>> {
        let config = self.slot(dev)?.config;
        self.check_holder(Some(dev.cs))?;
        if let Some(cfg) = config {
            if self.owner != Some(dev.id) {
                self.apply(&cfg);
                self.owner = Some(dev.id);
            }
        }
        Ok(config)
    }

    pub(super) fn transfer(&mut self, dev: &DeviceContext, msg: &mut Message<'_>) -> Result<usize> {
        if self.take(dev)?.is_none() {
            return Err(Error::PreconditionViolation("device not configured"));
        }
        xfer::transfer(&mut self.spi, dev.cs, msg)
    }
}

pub struct SpiBus<IO: RegisterIo> {
    name: String,
    port: SpiPort,
    inner: Mutex<BusState<IO>>,
}

impl<IO: RegisterIo> SpiBus<IO> {
    pub(super) fn new(name: &str, port: SpiPort, io: IO) -> Self {
        Self {
            name: name.to_string(),
            port,
            inner: Mutex::new(BusState {
                spi: SpiController::new(port, io),
                owner: None,
                devices: BTreeMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> SpiPort {
        self.port
    }

    pub fn context(&self) -> Context {
        Context::Bus(BusContext { port: self.port })
    }

    /// See `SpiController::set_poll_limit`
    pub fn set_poll_limit(&self, limit: Option<usize>) {
        self.inner.lock().spi.set_poll_limit(limit);
    }

    /// Attached devices as (chip select, name)
    pub fn devices(&self) -> Vec<(u8, String)> {
        self.inner
            .lock()
            .devices
            .iter()
            .map(|(cs, slot)| (*cs, slot.name.clone()))
            .collect()
    }

    pub fn attach(self: &Arc<Self>, name: &str, cs: u8) -> Result<SpiDevice<IO>> {
        if cs >= SPI_CS_LINES {
            return Err(Error::PreconditionViolation("chip select out of range"));
        }
        let mut state = self.inner.lock();
        if let Some(slot) = state.devices.get(&cs) {
            warn!("{}: cs{} already owned by {}", self.name, cs, slot.name);
            return Err(Error::DuplicateSelect);
        }
        let id = DevId::new();
        state.devices.insert(
            cs,
            DeviceSlot {
                id,
                name: name.to_string(),
                config: None,
            },
        );
        drop(state);
        info!("{}: {} attached on cs{} as {}", self.name, name, cs, id);
        Ok(SpiDevice::new(id, name, cs, self.clone()))
    }

    pub(super) fn detach(&self, id: DevId, cs: u8) {
        let mut state = self.inner.lock();
        if state.devices.get(&cs).map_or(false, |slot| slot.id == id) {
            if state.spi.selected() == Some(cs) {
                warn!("{}: cs{} still asserted on detach, releasing", self.name, cs);
                state.spi.switch_cs(cs, false);
            }
            state.devices.remove(&cs);
            if state.owner == Some(id) {
                state.owner = None;
            }
        }
    }

    pub(super) fn state(&self) -> MutexGuard<'_, BusState<IO>> {
        self.inner.lock()
    }

    fn check_port(&self, ctx: &Context) -> Result<()> {
        if ctx.port() != self.port {
            return Err(Error::PreconditionViolation("context belongs to another bus"));
        }
        Ok(())
    }
}

impl<IO: RegisterIo> SpiOps for SpiBus<IO> {
    fn configure(&self, ctx: &Context, cfg: &Configuration) -> Result<()> {
        self.check_port(ctx)?;
        self.inner.lock().configure(ctx, cfg)
    }

    fn transfer(&self, ctx: &Context, msg: &mut Message<'_>) -> Result<usize> {
        self.check_port(ctx)?;
        let dev = match ctx {
            Context::Device(dev) => dev,
            Context::Bus(_) => {
                return Err(Error::PreconditionViolation("transfer needs a device context"))
            }
        };
        self.inner.lock().transfer(dev, msg)
    }
}
