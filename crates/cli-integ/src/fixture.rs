//! Per-test fixture: an isolated working directory, a unique stack-name
//! prefix, and the CLI drivers bound to both.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cli_driver::{
    ActionOutput, CdkCli, DeployOptions, DriverError, SamCli, Shell, ShellOptions, ShellOutput,
    SynthOptions,
};
use integ_core::config::HarnessConfig;
use integ_core::IntegError;
use integ_core::paths;
use integ_core::random::{random_string, StackPrefix};
use integ_core::template::Template;
use uuid::Uuid;

use crate::error::{HarnessError, Result};
use crate::output::FixtureOutput;

/// Top-level entries of the app directory never copied into a fixture.
const APP_COPY_EXCLUDES: &[&str] = &[paths::CDK_OUT_DIR, ".aws-sam"];

pub struct Fixture {
    name: String,
    run_id: Uuid,
    dir: PathBuf,
    prefix: StackPrefix,
    region: Option<String>,
    config: Arc<HarnessConfig>,
    output: Arc<FixtureOutput>,
    cdk: CdkCli,
    sam: SamCli,
    deployed: Mutex<Vec<String>>,
    disposed: AtomicBool,
}

impl Fixture {
    /// Create the working directory, stage the app and reserve a prefix.
    ///
    /// Any failure here is fatal for the test.
    pub fn provision(
        name: &str,
        config: Arc<HarnessConfig>,
        output: Arc<FixtureOutput>,
        region: Option<String>,
    ) -> Result<Self> {
        let provision_err = |reason: String| HarnessError::Provision {
            test: name.to_string(),
            reason,
        };

        let dir = create_work_dir(&config.work_root())
            .map_err(|e| provision_err(format!("cannot create working directory: {e}")))?;

        if let Some(app) = &config.app_dir {
            if let Err(e) = integ_core::io::copy_dir_all(app, &dir, APP_COPY_EXCLUDES) {
                let _ = std::fs::remove_dir_all(&dir);
                return Err(provision_err(format!(
                    "cannot copy app from {}: {e}",
                    app.display()
                )));
            }
        }

        let prefix = StackPrefix::allocate();
        let run_id = Uuid::new_v4();

        let mut shell = Shell::new(output.clone())
            .with_cwd(&dir)
            .with_env("STACK_NAME_PREFIX", prefix.as_str())
            .with_env("CDK_DISABLE_VERSION_CHECK", "1");
        if let Some(r) = &region {
            shell = shell
                .with_env("AWS_REGION", r.as_str())
                .with_env("AWS_DEFAULT_REGION", r.as_str());
        }

        output.log(&format!(
            "fixture {run_id}: dir={} prefix={} region={}",
            dir.display(),
            prefix,
            region.as_deref().unwrap_or("-")
        ));
        tracing::info!(
            test = %name,
            %run_id,
            prefix = %prefix,
            dir = %dir.display(),
            "fixture provisioned"
        );

        Ok(Self {
            name: name.to_string(),
            run_id,
            cdk: CdkCli::new(&config.cdk_bin, shell.clone()),
            sam: SamCli::new(&config.sam_bin, shell),
            dir,
            prefix,
            region,
            config,
            output,
            deployed: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        })
    }

    // ─── Accessors ────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn integ_test_dir(&self) -> &Path {
        &self.dir
    }

    pub fn stack_name_prefix(&self) -> &str {
        self.prefix.as_str()
    }

    /// Prefix with its first `-` removed, as used in nested-stack asset names.
    pub fn compact_prefix(&self) -> String {
        self.prefix.compact()
    }

    pub fn full_stack_name(&self, stack: &str) -> String {
        self.prefix.full_stack_name(stack)
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn output(&self) -> &Arc<FixtureOutput> {
        &self.output
    }

    pub fn log(&self, message: &str) {
        self.output.log(message);
    }

    pub fn cdk_out_dir(&self) -> PathBuf {
        paths::cdk_out_dir(&self.dir)
    }

    pub fn asset_dir(&self, asset_path: &str) -> PathBuf {
        paths::asset_dir(&self.dir, asset_path)
    }

    /// Full names of stacks deployed through this fixture and not yet destroyed.
    pub fn deployed_stacks(&self) -> Vec<String> {
        self.deployed
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    // ─── CDK ──────────────────────────────────────────────────────────────

    pub async fn cdk(&self, args: &[String], opts: &ShellOptions) -> Result<ShellOutput> {
        Ok(self.cdk.run(args, opts).await?)
    }

    pub async fn cdk_synth(&self, opts: &SynthOptions) -> Result<ShellOutput> {
        Ok(self.cdk.synth(opts).await?)
    }

    /// Deploy stacks by short name. Each is recorded before the deploy starts
    /// so a half-finished deploy is still torn down on dispose.
    pub async fn cdk_deploy(&self, stacks: &[&str], opts: &DeployOptions) -> Result<ShellOutput> {
        let full: Vec<String> = stacks.iter().map(|s| self.full_stack_name(s)).collect();
        {
            let mut deployed = self.deployed.lock().unwrap_or_else(|p| p.into_inner());
            for name in &full {
                if !deployed.contains(name) {
                    deployed.push(name.clone());
                }
            }
        }
        Ok(self.cdk.deploy(&full, opts).await?)
    }

    pub async fn cdk_destroy(&self, stacks: &[&str]) -> Result<ShellOutput> {
        let full: Vec<String> = stacks.iter().map(|s| self.full_stack_name(s)).collect();
        let out = self.cdk.destroy(&full, &ShellOptions::default()).await?;
        self.deployed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|d| !full.contains(d));
        Ok(out)
    }

    /// Read back the template synthesized for `stack`.
    pub fn template(&self, stack: &str) -> Result<Template> {
        let path = paths::template_path(&self.dir, &self.full_stack_name(stack));
        Ok(Template::load(&path)?)
    }

    // ─── SAM ──────────────────────────────────────────────────────────────

    pub async fn sam_build(&self, stack: &str) -> Result<ShellOutput> {
        let template = paths::relative_template_path(&self.full_stack_name(stack));
        Ok(self.sam.build(&template, &ShellOptions::default()).await?)
    }

    /// Serve `stack` with `sam local start-api` on `port` and GET `api_path`.
    ///
    /// With `is_built` the emulator uses the output of [`Fixture::sam_build`]
    /// instead of the synthesized template, which must already exist.
    pub async fn sam_local_start_api(
        &self,
        stack: &str,
        is_built: bool,
        port: u16,
        api_path: &str,
    ) -> Result<ActionOutput> {
        if is_built {
            let built = self.dir.join(paths::SAM_BUILD_TEMPLATE);
            if !built.exists() {
                return Err(IntegError::TemplateNotFound(built).into());
            }
        }
        let template = (!is_built).then(|| paths::relative_template_path(&self.full_stack_name(stack)));
        let result = self
            .sam
            .local_start_api(
                template.as_deref(),
                port,
                api_path,
                self.config.start_api_timeout(),
                &ShellOptions::default(),
            )
            .await?;
        self.log(&format!(
            "local api {api_path} on port {port}: succeeded={}",
            result.action_succeeded
        ));
        Ok(result)
    }

    // ─── Teardown ─────────────────────────────────────────────────────────

    /// Destroy deployed stacks and remove the working directory.
    ///
    /// Never fails: problems are logged so they cannot mask the test outcome.
    /// Only the first call does anything.
    pub async fn dispose(&self, success: bool) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.config.no_clean {
            self.log(&format!(
                "no-clean set: leaving {} and stacks {:?}",
                self.dir.display(),
                self.deployed_stacks()
            ));
            return;
        }

        let stacks = self.deployed_stacks();
        if !stacks.is_empty() {
            self.log(&format!("destroying stacks {stacks:?}"));
            let opts = ShellOptions {
                timeout: Some(self.config.cleanup_timeout()),
                ..Default::default()
            };
            match self.cdk.destroy(&stacks, &opts).await {
                Ok(_) => {
                    if let Ok(mut d) = self.deployed.lock() {
                        d.clear();
                    }
                }
                Err(DriverError::Timeout { after, .. }) => {
                    tracing::warn!(
                        test = %self.name,
                        stacks = ?stacks,
                        "stack cleanup abandoned after {}s",
                        after.as_secs()
                    );
                    self.log(&format!(
                        "stack cleanup abandoned after {}s; destroy {stacks:?} by hand",
                        after.as_secs()
                    ));
                }
                Err(e) => {
                    tracing::warn!(test = %self.name, error = %e, "stack cleanup failed");
                    self.log(&format!("stack cleanup failed: {e}"));
                }
            }
        }

        if !success && self.config.keep_on_failure {
            self.log(&format!("test failed; leaving {} for inspection", self.dir.display()));
            tracing::info!(test = %self.name, dir = %self.dir.display(), "kept working directory");
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove working directory");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if self.is_disposed() || self.config.no_clean {
            return;
        }
        tracing::warn!(test = %self.name, "fixture dropped without dispose; removing directory only");
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("name", &self.name)
            .field("run_id", &self.run_id)
            .field("dir", &self.dir)
            .field("prefix", &self.prefix.as_str())
            .field("region", &self.region)
            .finish()
    }
}

/// `<root>/cdk-integ-<random>`, retried on the unlikely name collision.
fn create_work_dir(root: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    loop {
        let dir = root.join(format!("{}{}", paths::WORK_DIR_PREFIX, random_string()));
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}
