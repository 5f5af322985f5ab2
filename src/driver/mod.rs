pub mod spi;

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

static NEXT_DEV_ID: AtomicUsize = AtomicUsize::new(0);

/// Identity of an attached device, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DevId(pub usize);

impl DevId {
    pub fn new() -> Self {
        let id = NEXT_DEV_ID.fetch_add(1, Ordering::Relaxed);
        Self(id)
    }
}

impl fmt::Display for DevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = DevId::new();
        let b = DevId::new();
        assert!(b > a);
        assert_eq!(DevId(7).to_string(), "dev7");
    }
}
