//! `cli-driver`: async drivers for the command lines under test.
//!
//! ```text
//! Shell            ← env/cwd defaults + OutputSink, runs or spawns commands
//!   │
//!   ├── CdkCli     ← cdk synth / deploy / destroy
//!   └── SamCli     ← sam build / sam local start-api (+ HTTP invoke)
//! ```
//!
//! Every line a subprocess prints is forwarded to the [`OutputSink`] the
//! shell was built with, so callers can capture per-test transcripts.

pub mod cdk;
pub mod error;
pub mod process;
pub mod sam;

pub use cdk::{CdkCli, DeployOptions, SynthOptions};
pub use error::DriverError;
pub use process::{
    resolve_binary, BackgroundProcess, NullSink, OutputSink, Shell, ShellOptions, ShellOutput,
};
pub use sam::{ActionOutput, SamCli};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;
