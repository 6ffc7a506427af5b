//! `cli-integ`: fixture provisioning and the integration-test wrapper.
//!
//! ```rust,ignore
//! use cli_integ::{integ_test, IntegTestOptions};
//!
//! integ_test!(synth_produces_template, IntegTestOptions::new(), |fixture| async move {
//!     fixture.cdk_synth(&Default::default()).await?;
//!     let template = fixture.template("TestStack")?;
//!     assert!(template.contains("PythonFunction0BCF77FD"));
//!     Ok(())
//! });
//! ```
//!
//! Each test gets its own [`Fixture`] (working directory + unique stack-name
//! prefix). Locks and a region lease are acquired inside the test's timeout,
//! and everything is released on every exit path.

pub mod error;
pub mod fixture;
pub mod integ_test;
pub mod lock;
pub mod output;
pub mod pool;

pub use error::{HarnessError, Result};
pub use fixture::Fixture;
pub use integ_test::{integ_test, run_integ_test, CleanupHook, IntegTestOptions};
pub use output::FixtureOutput;

pub use cli_driver::{ActionOutput, DeployOptions, ShellOptions, ShellOutput, SynthOptions};
pub use integ_core::config::HarnessConfig;
pub use integ_core::random::random_integer;

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Register an async integration test.
///
/// Expands to a `#[tokio::test]` that runs the body through [`integ_test()`]
/// and panics with the rendered error on failure. Extra attributes (such as
/// `#[ignore]`) may precede the test name.
#[macro_export]
macro_rules! integ_test {
    ($(#[$meta:meta])* $name:ident, $options:expr, $body:expr $(,)?) => {
        #[tokio::test(flavor = "multi_thread")]
        $(#[$meta])*
        async fn $name() {
            $crate::init_tracing();
            if let Err(e) = $crate::integ_test(stringify!($name), $options, $body).await {
                panic!("{e}");
            }
        }
    };
}
