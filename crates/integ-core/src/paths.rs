use crate::error::{IntegError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

/// Directory the CDK CLI synthesizes into, relative to the app directory.
pub const CDK_OUT_DIR: &str = "cdk.out";
/// Template written by `sam build`, relative to the app directory.
pub const SAM_BUILD_TEMPLATE: &str = ".aws-sam/build/template.yaml";

pub const TEMPLATE_SUFFIX: &str = ".template.json";
pub const LOCK_SUFFIX: &str = ".lock";

pub const WORK_DIR_PREFIX: &str = "cdk-integ-";
pub const DEFAULT_CONFIG_FILE: &str = "cli-integ.yaml";
pub const DEFAULT_LOCK_DIR: &str = "cli-integ-locks";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn cdk_out_dir(app_dir: &Path) -> PathBuf {
    app_dir.join(CDK_OUT_DIR)
}

/// `<app>/cdk.out/<full stack name>.template.json`
pub fn template_path(app_dir: &Path, full_stack_name: &str) -> PathBuf {
    cdk_out_dir(app_dir).join(format!("{full_stack_name}{TEMPLATE_SUFFIX}"))
}

/// Template path relative to the app directory, as handed to `sam --template`.
pub fn relative_template_path(full_stack_name: &str) -> PathBuf {
    Path::new(CDK_OUT_DIR).join(format!("{full_stack_name}{TEMPLATE_SUFFIX}"))
}

/// Directory holding the staged files of one asset.
pub fn asset_dir(app_dir: &Path, asset_path: &str) -> PathBuf {
    cdk_out_dir(app_dir).join(asset_path)
}

pub fn lock_file(lock_dir: &Path, name: &str) -> Result<PathBuf> {
    validate_lock_name(name)?;
    Ok(lock_dir.join(format!("{name}{LOCK_SUFFIX}")))
}

pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_LOCK_DIR)
}

// ---------------------------------------------------------------------------
// Lock name validation
// ---------------------------------------------------------------------------

static LOCK_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn lock_name_re() -> &'static Regex {
    LOCK_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

/// Lock names become file names, so they are restricted to a safe alphabet.
pub fn validate_lock_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 || !lock_name_re().is_match(name) {
        return Err(IntegError::InvalidLockName(name.to_string()));
    }
    Ok(())
}
