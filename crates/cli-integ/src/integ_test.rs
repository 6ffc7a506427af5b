//! The integration-test wrapper: lock acquisition, fixture lifecycle, timeout
//! and output capture around one test body.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use integ_core::config::HarnessConfig;
use tokio::time::Instant;

use crate::error::{HarnessError, Result};
use crate::fixture::Fixture;
use crate::lock::LockSet;
use crate::output::FixtureOutput;
use crate::pool::{region_pool, Lease};

/// How long an aborted body gets to unwind before cleanup proceeds anyway.
const ABORT_GRACE: Duration = Duration::from_secs(10);

/// Runs during teardown, before the fixture is disposed. Hooks run in
/// reverse registration order.
pub type CleanupHook = Box<dyn FnOnce(&Fixture) + Send>;

/// Explicit per-test configuration.
pub struct IntegTestOptions {
    /// Wall-clock budget covering lock waits, provisioning and the body.
    /// `None` uses the configured default.
    pub timeout: Option<Duration>,
    /// Named exclusive locks held for the whole test.
    pub locks: Vec<String>,
    /// Lease a region from the process-wide pool.
    pub region: bool,
    pub cleanup: Vec<CleanupHook>,
}

impl Default for IntegTestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            locks: Vec::new(),
            region: true,
            cleanup: Vec::new(),
        }
    }
}

impl IntegTestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_lock(mut self, name: impl Into<String>) -> Self {
        self.locks.push(name.into());
        self
    }

    /// Skip the region lease, for tests that never talk to the cloud.
    pub fn without_region(mut self) -> Self {
        self.region = false;
        self
    }

    pub fn on_cleanup<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Fixture) + Send + 'static,
    {
        self.cleanup.push(Box::new(hook));
        self
    }
}

/// Run one integration test with configuration resolved from the environment.
pub async fn integ_test<F, Fut>(name: &str, options: IntegTestOptions, body: F) -> Result<()>
where
    F: FnOnce(Arc<Fixture>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let config = Arc::new(HarnessConfig::load()?);
    run_integ_test(name, config, options, body).await
}

/// Run one integration test against an explicit configuration.
///
/// Resources are released on every exit path: success, body error, panic
/// and timeout.
pub async fn run_integ_test<F, Fut>(
    name: &str,
    config: Arc<HarnessConfig>,
    options: IntegTestOptions,
    body: F,
) -> Result<()>
where
    F: FnOnce(Arc<Fixture>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    if let Some(reason) = config.filter_reason(name) {
        tracing::info!(test = %name, %reason, "skipping test");
        return Ok(());
    }

    let limit = options.timeout.unwrap_or_else(|| config.default_timeout());
    let deadline = Instant::now() + limit;
    let timed_out = || HarnessError::TimedOut {
        name: name.to_string(),
        after: limit,
    };

    let output = Arc::new(FixtureOutput::new(config.verbose));
    output.header(name);

    let IntegTestOptions {
        locks: lock_names,
        region: wants_region,
        cleanup,
        ..
    } = options;

    let acquired = tokio::time::timeout_at(
        deadline,
        acquire(Arc::clone(&config), lock_names, wants_region),
    )
    .await;
    let (locks, lease) = match acquired {
        Ok(Ok(held)) => held,
        Ok(Err(e)) => {
            report(name, &output, Some(&e), config.verbose);
            return Err(e);
        }
        Err(_elapsed) => {
            output.log("timed out waiting for locks");
            let err = timed_out();
            report(name, &output, Some(&err), config.verbose);
            return Err(err);
        }
    };
    if !locks.is_empty() {
        output.log(&format!("holding locks {:?}", locks.names()));
    }

    let region = lease.as_ref().map(|l| l.value().to_string());
    let provisioning = tokio::task::spawn_blocking({
        let name = name.to_string();
        let config = Arc::clone(&config);
        let output = Arc::clone(&output);
        move || Fixture::provision(&name, config, output, region)
    });
    let provisioned = match tokio::time::timeout_at(deadline, provisioning).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(HarnessError::Provision {
            test: name.to_string(),
            reason: format!("provisioning task failed: {join}"),
        }),
        Err(_elapsed) => {
            // A late fixture removes its own directory when dropped.
            output.log("timed out while provisioning");
            Err(timed_out())
        }
    };
    let fixture = match provisioned {
        Ok(f) => Arc::new(f),
        Err(e) => {
            report(name, &output, Some(&e), config.verbose);
            return Err(e);
        }
    };

    let started = Instant::now();
    let mut handle = tokio::spawn(body(Arc::clone(&fixture)));
    let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(error))) => Err(HarnessError::Body {
            name: name.to_string(),
            error,
        }),
        Ok(Err(join)) => Err(HarnessError::Panicked {
            name: name.to_string(),
            message: if join.is_panic() {
                panic_message(join.into_panic())
            } else {
                "test task was cancelled".to_string()
            },
        }),
        Err(_elapsed) => {
            handle.abort();
            let _ = tokio::time::timeout(ABORT_GRACE, handle).await;
            Err(timed_out())
        }
    };
    tracing::info!(
        test = %name,
        passed = outcome.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "test body finished"
    );

    for hook in cleanup.into_iter().rev() {
        if std::panic::catch_unwind(AssertUnwindSafe(|| hook(fixture.as_ref()))).is_err() {
            tracing::warn!(test = %name, "cleanup hook panicked");
            fixture.log("cleanup hook panicked");
        }
    }
    fixture.dispose(outcome.is_ok()).await;
    drop(fixture);

    // Reverse acquisition order: region lease, then locks.
    drop(lease);
    drop(locks);

    report(name, &output, outcome.as_ref().err(), config.verbose);
    outcome
}

async fn acquire(
    config: Arc<HarnessConfig>,
    names: Vec<String>,
    region: bool,
) -> Result<(LockSet, Option<Lease>)> {
    let locks = LockSet::acquire_all(&config.lock_dir, &names).await?;
    let lease = if region {
        Some(region_pool(&config.regions).take().await?)
    } else {
        None
    };
    Ok((locks, lease))
}

fn report(name: &str, output: &FixtureOutput, error: Option<&HarnessError>, verbose: bool) {
    match error {
        Some(e) => {
            tracing::error!(test = %name, error = %e, "test failed");
            if !verbose {
                // Verbose mode already echoed everything live.
                eprintln!("{}", output.contents());
            }
        }
        None => tracing::info!(test = %name, "test passed"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let opts = IntegTestOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_lock("docker")
            .without_region()
            .on_cleanup(|_| {});
        assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.locks, ["docker"]);
        assert!(!opts.region);
        assert_eq!(opts.cleanup.len(), 1);
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
