pub mod error;
pub mod log;

pub use error::Error;
