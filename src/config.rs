/* SPI */
pub const SPI_CS_LINES: u8 = 4;
/// Shifted out when a message has no send buffer
pub const SPI_FILL_BYTE: u8 = 0xff;
/// Status polls per byte before giving up
pub const SPI_POLL_LIMIT: usize = 0x10_0000;

/* default session parameters */
pub const SPI_DEFAULT_HZ: u32 = 1_000_000;
