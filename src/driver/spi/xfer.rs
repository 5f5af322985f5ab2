use log::*;

use super::Message;
use crate::board::spi::SpiActions;
use crate::config::SPI_FILL_BYTE;
use crate::utils::{Error, Result};

/// Run one message on chip select `cs`, a byte at a time.
///
/// Returns `msg.length`. A message that continues a held select needs `cs`
/// to still be asserted, and no message may start while another line is
/// held. On a controller error the line is released first; a timeout carries
/// the bytes already exchanged.
pub fn transfer<A: SpiActions>(spi: &mut A, cs: u8, msg: &mut Message<'_>) -> Result<usize> {
    msg.validate()?;
    match spi.selected() {
        Some(held) if held != cs => {
            return Err(Error::PreconditionViolation("bus held by another device"))
        }
        held if !msg.assert_select && held != Some(cs) => {
            return Err(Error::PreconditionViolation("chip select not held"))
        }
        _ => {}
    }
    trace!("[xfer] cs={}, len={}", cs, msg.length);

    // take cs
    if msg.assert_select {
        spi.switch_cs(cs, true);
    }

    for i in 0..msg.length {
        let data = msg.send_buf.map_or(SPI_FILL_BYTE, |buf| buf[i]);
        match spi.txrx_byte(data) {
            Ok(received) => {
                if let Some(recv) = msg.recv_buf.as_deref_mut() {
                    recv[i] = received;
                }
            }
            Err(Error::HardwareTimeout { .. }) => {
                error!("[xfer] cs={}: no response after {} of {} bytes", cs, i, msg.length);
                spi.switch_cs(cs, false);
                return Err(Error::HardwareTimeout { transferred: i });
            }
            Err(e) => {
                error!("[xfer] cs={}: {} after {} bytes", cs, e, i);
                spi.switch_cs(cs, false);
                return Err(e);
            }
        }
    }

    // release cs
    if msg.release_select {
        spi.switch_cs(cs, false);
    }

    Ok(msg.length)
}
