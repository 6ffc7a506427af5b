use crate::error::{IntegError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub const ENV_CONFIG: &str = "CLI_INTEG_CONFIG";
pub const ENV_CDK: &str = "CLI_INTEG_CDK";
pub const ENV_SAM: &str = "CLI_INTEG_SAM";
pub const ENV_APP_DIR: &str = "CLI_INTEG_APP_DIR";
pub const ENV_WORK_ROOT: &str = "CLI_INTEG_WORK_ROOT";
pub const ENV_LOCK_DIR: &str = "CLI_INTEG_LOCK_DIR";
pub const ENV_REGIONS: &str = "AWS_REGIONS";
pub const ENV_KEEP: &str = "CLI_INTEG_KEEP";
pub const ENV_NO_CLEAN: &str = "INTEG_NO_CLEAN";
pub const ENV_VERBOSE: &str = "CLI_INTEG_VERBOSE";
pub const ENV_ONLY: &str = "CLI_INTEG_ONLY";
pub const ENV_SKIP: &str = "CLI_INTEG_SKIP";

// ---------------------------------------------------------------------------
// HarnessConfig
// ---------------------------------------------------------------------------

/// Process-wide settings shared by every fixture.
///
/// Resolved once per process: defaults, then the YAML file, then environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_cdk_bin")]
    pub cdk_bin: String,
    #[serde(default = "default_sam_bin")]
    pub sam_bin: String,
    /// CDK app copied into every fixture directory. `None` runs in an empty dir.
    #[serde(default)]
    pub app_dir: Option<PathBuf>,
    /// Parent of the per-test working directories (default: system temp dir).
    #[serde(default)]
    pub work_root: Option<PathBuf>,
    #[serde(default = "paths::default_lock_dir")]
    pub lock_dir: PathBuf,
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// Leave the working directory behind when a test fails.
    #[serde(default = "default_true")]
    pub keep_on_failure: bool,
    /// Never delete working directories or destroy stacks.
    #[serde(default)]
    pub no_clean: bool,
    /// Echo captured fixture output even for passing tests.
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub only: Vec<String>,
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_start_api_timeout_secs")]
    pub start_api_timeout_secs: u64,
    /// Upper bound on `cdk destroy` during teardown, which runs after the
    /// test budget may already be spent.
    #[serde(default = "default_cleanup_timeout_secs")]
    pub cleanup_timeout_secs: u64,
}

fn default_cdk_bin() -> String {
    "cdk".to_string()
}

fn default_sam_bin() -> String {
    "sam".to_string()
}

fn default_regions() -> Vec<String> {
    vec!["us-east-1".to_string()]
}

fn default_true() -> bool {
    true
}

/// Includes the time to acquire locks, worst-case single-threaded runtime.
fn default_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_start_api_timeout_secs() -> u64 {
    5 * 60
}

fn default_cleanup_timeout_secs() -> u64 {
    30 * 60
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cdk_bin: default_cdk_bin(),
            sam_bin: default_sam_bin(),
            app_dir: None,
            work_root: None,
            lock_dir: paths::default_lock_dir(),
            regions: default_regions(),
            keep_on_failure: true,
            no_clean: false,
            verbose: false,
            only: Vec::new(),
            skip: Vec::new(),
            default_timeout_secs: default_timeout_secs(),
            start_api_timeout_secs: default_start_api_timeout_secs(),
            cleanup_timeout_secs: default_cleanup_timeout_secs(),
        }
    }
}

impl HarnessConfig {
    /// Resolve configuration from the process environment.
    ///
    /// The YAML file named by `CLI_INTEG_CONFIG` is required to exist; the
    /// implicit `cli-integ.yaml` in the current directory is optional.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`HarnessConfig::load`] with an injectable environment lookup.
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match env(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                let implicit = Path::new(paths::DEFAULT_CONFIG_FILE);
                if implicit.exists() {
                    Self::from_file(implicit)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(env);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IntegError::InvalidConfig(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&data)?;
        tracing::debug!(path = %path.display(), "loaded harness config");
        Ok(config)
    }

    /// Overlay environment variables onto the file/default values.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env(ENV_CDK) {
            self.cdk_bin = v;
        }
        if let Some(v) = env(ENV_SAM) {
            self.sam_bin = v;
        }
        if let Some(v) = env(ENV_APP_DIR) {
            self.app_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env(ENV_WORK_ROOT) {
            self.work_root = Some(PathBuf::from(v));
        }
        if let Some(v) = env(ENV_LOCK_DIR) {
            self.lock_dir = PathBuf::from(v);
        }
        if let Some(v) = env(ENV_REGIONS) {
            self.regions = split_list(&v);
        }
        if let Some(v) = env(ENV_KEEP) {
            self.keep_on_failure = is_truthy(&v);
        }
        if let Some(v) = env(ENV_NO_CLEAN) {
            self.no_clean = is_truthy(&v);
        }
        if let Some(v) = env(ENV_VERBOSE) {
            self.verbose = is_truthy(&v);
        }
        if let Some(v) = env(ENV_ONLY) {
            self.only = split_list(&v);
        }
        if let Some(v) = env(ENV_SKIP) {
            self.skip = split_list(&v);
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn start_api_timeout(&self) -> Duration {
        Duration::from_secs(self.start_api_timeout_secs)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    /// Parent directory for per-test working directories.
    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Whether a test with this name should run under the `only`/`skip` filters.
    ///
    /// Returns the reason when the test is filtered out.
    pub fn filter_reason(&self, name: &str) -> Option<String> {
        if !self.only.is_empty() && !self.only.iter().any(|o| name.contains(o.as_str())) {
            return Some(format!("not selected by {ENV_ONLY}"));
        }
        if let Some(s) = self.skip.iter().find(|s| name.contains(s.as_str())) {
            return Some(format!("matches skip entry '{s}'"));
        }
        None
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.regions.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "no regions configured; tests requesting a region lease would wait forever"
                    .to_string(),
            });
        }
        if let Some(app) = &self.app_dir {
            if !app.is_dir() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("app_dir does not exist: {}", app.display()),
                });
            }
        } else {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "app_dir not set; fixtures start from an empty directory".to_string(),
            });
        }
        if self.default_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "default_timeout_secs is 0; every test would time out".to_string(),
            });
        }
        if self.start_api_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "start_api_timeout_secs is 0".to_string(),
            });
        }
        if self.cleanup_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "cleanup_timeout_secs is 0; stacks could never be destroyed".to_string(),
            });
        }
        if self.no_clean {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("{ENV_NO_CLEAN} set; deployed stacks will not be destroyed"),
            });
        }
        warnings
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
