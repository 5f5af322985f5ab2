use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid handle, context or message handed in by the caller
    PreconditionViolation(&'static str),
    /// Controller index or bus name registered twice
    AlreadyRegistered,
    /// Controller index not compiled into this build
    UnknownController,
    /// No bus registered under that name
    UnknownBus,
    /// Chip select already owned by another device on the bus
    DuplicateSelect,
    /// Byte exchange did not complete within the poll bound
    HardwareTimeout { transferred: usize },
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PreconditionViolation(what) => write!(f, "precondition violated: {}", what),
            Error::AlreadyRegistered => write!(f, "already registered"),
            Error::UnknownController => write!(f, "unknown spi controller"),
            Error::UnknownBus => write!(f, "unknown spi bus"),
            Error::DuplicateSelect => write!(f, "chip select already in use"),
            Error::HardwareTimeout { transferred } => {
                write!(f, "spi timeout after {} bytes", transferred)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display() {
        assert_eq!(
            Error::HardwareTimeout { transferred: 3 }.to_string(),
            "spi timeout after 3 bytes"
        );
        assert_eq!(
            Error::PreconditionViolation("no buffer").to_string(),
            "precondition violated: no buffer"
        );
    }
}
