use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegError {
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("resource '{0}' not present in template")]
    ResourceNotFound(String),

    #[error("resource '{id}' has no metadata key '{key}'")]
    MetadataMissing { id: String, key: String },

    #[error("{context}: {mismatch}")]
    Mismatch {
        context: String,
        mismatch: crate::assertions::Mismatch,
    },

    #[error("bundled file '{file}' missing for resource '{id}' (expected at {})", .path.display())]
    AssetMissing {
        id: String,
        file: String,
        path: PathBuf,
    },

    #[error("invalid lock name '{0}': must be alphanumeric with '-', '_' or '.'")]
    InvalidLockName(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, IntegError>;
