use std::time::Duration;

use cli_driver::DriverError;
use integ_core::IntegError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to provision fixture for '{test}': {reason}")]
    Provision { test: String, reason: String },

    #[error("failed to acquire lock '{name}': {source}")]
    Lock {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resource pool is empty; nothing to lease")]
    EmptyPool,

    #[error("test '{name}' failed: {error:#}")]
    Body { name: String, error: anyhow::Error },

    #[error("test '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("test '{name}' timed out after {}s", .after.as_secs())]
    TimedOut { name: String, after: Duration },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Core(#[from] IntegError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
