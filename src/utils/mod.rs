pub mod error;
pub mod logger;

pub use error::{Error, Result};
pub use logger::init;
