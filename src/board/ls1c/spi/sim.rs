//! Simulated register file for host-side testing.
//!
//! Behaves like the controller as far as the driver can observe: the data
//! register loops transmitted bytes back into the receive FIFO (or returns
//! scripted responses), SPSR reports the FIFO state, everything else is plain
//! storage. Every access is recorded.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;
use spin::Mutex;

use super::register::{asserted_lines, offsets, RegisterIo, Spsr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { base: usize, offset: usize, value: u8 },
    Write { base: usize, offset: usize, value: u8 },
}

impl Access {
    pub fn base(&self) -> usize {
        match *self {
            Access::Read { base, .. } | Access::Write { base, .. } => base,
        }
    }
}

#[derive(Default)]
struct SimState {
    regs: BTreeMap<(usize, usize), u8>,
    rx: BTreeMap<usize, VecDeque<u8>>,
    responses: BTreeMap<usize, VecDeque<u8>>,
    stalled: BTreeSet<usize>,
    trace: Vec<Access>,
}

impl SimState {
    fn reg(&self, base: usize, offset: usize) -> u8 {
        match self.regs.get(&(base, offset)) {
            Some(v) => *v,
            None => reset_value(offset),
        }
    }

    fn rx_empty(&self, base: usize) -> bool {
        self.rx.get(&base).map_or(true, |q| q.is_empty())
    }
}

/// Power-on values of the controller
fn reset_value(offset: usize) -> u8 {
    match offset {
        offsets::SPCR => 0x10,
        offsets::SPSR => 0x05,
        offsets::SFC_PARAM => 0x21,
        offsets::SFC_SOFTCS => 0xf0,
        offsets::SFC_TIMING => 0x03,
        _ => 0x00,
    }
}

#[derive(Default)]
pub struct SimRegisters {
    inner: Mutex<SimState>,
}

impl SimRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a plain register
    pub fn peek(&self, base: usize, offset: usize) -> u8 {
        self.inner.lock().reg(base, offset)
    }

    /// Preset a register without tracing it
    pub fn poke(&self, base: usize, offset: usize, value: u8) {
        self.inner.lock().regs.insert((base, offset), value);
    }

    /// Bytes returned by the next exchanges on `base` instead of the loopback
    pub fn push_responses(&self, base: usize, bytes: &[u8]) {
        self.inner
            .lock()
            .responses
            .entry(base)
            .or_default()
            .extend(bytes.iter().copied());
    }

    /// A stalled controller accepts transmit bytes but never receives
    pub fn set_stalled(&self, base: usize, stalled: bool) {
        let mut inner = self.inner.lock();
        if stalled {
            inner.stalled.insert(base);
        } else {
            inner.stalled.remove(&base);
        }
    }

    pub fn trace(&self) -> Vec<Access> {
        self.inner.lock().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.inner.lock().trace.clear();
    }

    /// Writes to one register of one controller, in order
    pub fn writes_to(&self, base: usize, offset: usize) -> Vec<u8> {
        self.inner
            .lock()
            .trace
            .iter()
            .filter_map(|a| match *a {
                Access::Write { base: b, offset: o, value } if b == base && o == offset => {
                    Some(value)
                }
                _ => None,
            })
            .collect()
    }

    /// Bytes shifted out on `base`
    pub fn transmitted(&self, base: usize) -> Vec<u8> {
        self.writes_to(base, offsets::DATA)
    }

    /// Asserted-line mask after each chip-select write on `base`
    pub fn select_history(&self, base: usize) -> Vec<u8> {
        self.writes_to(base, offsets::SFC_SOFTCS)
            .into_iter()
            .map(asserted_lines)
            .collect()
    }
}

impl RegisterIo for SimRegisters {
    fn read(&self, base: usize, offset: usize) -> u8 {
        let mut inner = self.inner.lock();
        let value = match offset {
            offsets::SPSR => {
                let mut status = Spsr::from_bits_truncate(inner.reg(base, offset));
                status.set(Spsr::RFEMPTY, inner.rx_empty(base));
                status.insert(Spsr::WFEMPTY);
                status.remove(Spsr::WFFULL);
                status.bits()
            }
            offsets::DATA => inner
                .rx
                .get_mut(&base)
                .and_then(|q| q.pop_front())
                .unwrap_or(0xff),
            _ => inner.reg(base, offset),
        };
        inner.trace.push(Access::Read { base, offset, value });
        value
    }

    fn write(&self, base: usize, offset: usize, value: u8) {
        let mut inner = self.inner.lock();
        inner.trace.push(Access::Write { base, offset, value });
        match offset {
            offsets::DATA => {
                if inner.stalled.contains(&base) {
                    return;
                }
                let reply = inner
                    .responses
                    .get_mut(&base)
                    .and_then(|q| q.pop_front())
                    .unwrap_or(value);
                inner.rx.entry(base).or_default().push_back(reply);
            }
            offsets::SPSR => {
                // SPIF and WCOL are write-one-to-clear
                let old = inner.reg(base, offset);
                inner.regs.insert((base, offset), old & !(value & 0xc0));
            }
            _ => {
                inner.regs.insert((base, offset), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x1000;

    #[test]
    fn loopback() {
        let sim = SimRegisters::new();
        assert_eq!(sim.read(BASE, offsets::SPSR) & Spsr::RFEMPTY.bits(), 1);
        sim.write(BASE, offsets::DATA, 0x5a);
        assert_eq!(sim.read(BASE, offsets::SPSR) & Spsr::RFEMPTY.bits(), 0);
        assert_eq!(sim.read(BASE, offsets::DATA), 0x5a);
        assert_eq!(sim.transmitted(BASE), vec![0x5a]);
    }

    #[test]
    fn scripted_responses_then_loopback() {
        let sim = SimRegisters::new();
        sim.push_responses(BASE, &[0x01]);
        sim.write(BASE, offsets::DATA, 0xaa);
        sim.write(BASE, offsets::DATA, 0xbb);
        assert_eq!(sim.read(BASE, offsets::DATA), 0x01);
        assert_eq!(sim.read(BASE, offsets::DATA), 0xbb);
    }

    #[test]
    fn stalled_never_fills() {
        let sim = SimRegisters::new();
        sim.set_stalled(BASE, true);
        sim.write(BASE, offsets::DATA, 0xaa);
        assert_eq!(sim.read(BASE, offsets::SPSR) & Spsr::RFEMPTY.bits(), 1);
    }

    #[test]
    fn controllers_are_independent() {
        let sim = SimRegisters::new();
        sim.write(BASE, offsets::SFC_TIMING, 0x05);
        assert_eq!(sim.peek(BASE, offsets::SFC_TIMING), 0x05);
        assert_eq!(sim.peek(BASE + 0x100, offsets::SFC_TIMING), 0x03);
    }
}
