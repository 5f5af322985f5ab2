//! Polled SPI bus core for the Loongson 1C SPI controllers.
//!
//! `SpiRegistry` brings controllers up as named buses, devices attach to a
//! chip-select line, and transfers run byte by byte against the controller's
//! status register under a per-bus lock.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
extern crate alloc;

pub mod config;
pub mod driver;
pub mod utils;

#[path = "board/ls1c/mod.rs"]
pub mod board;

pub use driver::spi::{
    Configuration, Context, Message, SpiBus, SpiDevice, SpiOps, SpiRegistry, SpiSession,
};
pub use utils::{Error, Result};
