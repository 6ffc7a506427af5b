pub mod assertions;
pub mod config;
pub mod error;
pub mod expected;
pub mod io;
pub mod paths;
pub mod random;
pub mod template;

pub use error::{IntegError, Result};
