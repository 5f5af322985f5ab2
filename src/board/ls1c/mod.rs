/* Loongson 1C300 */

pub mod clock;
pub mod spi;

/// Input clock of both SPI controllers
pub const CLOCK_FREQ: u32 = clock::APB_CLK;

//MMIO
pub const MMIO: &[(usize, usize)] = &[
    (0xbfe80000, 0x10), //spi0
    (0xbfec0000, 0x10), //spi1
];
