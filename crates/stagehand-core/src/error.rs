//! Error taxonomy for Stagehand runs.
//!
//! Every variant is fatal to the task being run; transient store contention
//! is absorbed inside [`stagehand_store::VersionedStore::publish`] and only
//! surfaces here once retries are exhausted.

use std::path::PathBuf;

use stagehand_store::StoreError;

/// Stagehand errors.
#[derive(Debug, thiserror::Error)]
pub enum StagehandError {
    #[error("missing build token '{0}'")]
    MissingToken(String),

    #[error("missing key '{0}' in project descriptor")]
    MissingKey(String),

    #[error("missing required file {}", .0.display())]
    MissingFile(PathBuf),

    #[error("missing tag {tag} ({})", path.display())]
    MissingTag { tag: String, path: PathBuf },

    #[error("environment '{0}' is not declared by the project")]
    UnknownEnvironment(String),

    #[error("invalid environment name '{0}': expected <dev|int|stg|prod>-<partition>")]
    InvalidEnvironmentName(String),

    #[error("task '{0}' requires an environment")]
    EnvironmentRequired(String),

    #[error("environment is missing package '{0}'")]
    MissingPackage(String),

    #[error("invalid job name '{0}'")]
    InvalidJobName(String),

    #[error("release mismatch: invocation has {invocation}, project config has {config}")]
    ReleaseMismatch { invocation: String, config: String },

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("unknown project type '{0}'")]
    UnknownProjectType(String),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("no package has been built for release {0}")]
    NoPackageBuilt(String),

    #[error("unable to resolve git {what}: {output}")]
    Source { what: String, output: String },

    #[error("action '{action}' failed with exit code {code}: {output}")]
    ActionFailed {
        action: String,
        code: i32,
        output: String,
    },

    #[error("invalid substitution pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid project descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Stagehand operations.
pub type Result<T> = std::result::Result<T, StagehandError>;
