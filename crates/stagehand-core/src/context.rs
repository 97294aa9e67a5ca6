//! Per-invocation context: which task runs where, and with what settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_store::{Namespace, RetryPolicy};

use crate::environment::EnvironmentName;
use crate::error::{Result, StagehandError};

/// Lifecycle task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Build,
    Devbuild,
    Assemble,
    Deploy,
    Test,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Build => "build",
            Task::Devbuild => "devbuild",
            Task::Assemble => "assemble",
            Task::Deploy => "deploy",
            Task::Test => "test",
        }
    }

    /// Deploy and test act on a named environment.
    pub fn requires_environment(&self) -> bool {
        matches!(self, Task::Deploy | Task::Test)
    }
}

impl FromStr for Task {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "build" => Ok(Task::Build),
            "devbuild" => Ok(Task::Devbuild),
            "assemble" => Ok(Task::Assemble),
            "deploy" => Ok(Task::Deploy),
            "test" => Ok(Task::Test),
            other => Err(StagehandError::UnknownTask(other.to_string())),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host configuration for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Working tree of the shared metadata repository.
    pub central_path: PathBuf,
    /// Root under which environments are deployed.
    pub deploy_root: PathBuf,
    /// Local maven home (the `.m2` directory).
    pub maven_repo: PathBuf,
    /// Project checkout the commands run in.
    pub workdir: PathBuf,
    /// Externally supplied build-run number (devbuild).
    pub build_number: Option<String>,
    pub remote: String,
    pub branch: String,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub dry_run: bool,
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_backoff)
    }
}

impl Default for Settings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            central_path: PathBuf::from("/data/central/projects"),
            deploy_root: PathBuf::from("/data/envs"),
            maven_repo: PathBuf::from(".m2"),
            workdir: PathBuf::from("."),
            build_number: None,
            remote: "origin".to_string(),
            branch: "master".to_string(),
            retry_attempts: policy.attempts,
            retry_backoff: policy.backoff,
            dry_run: false,
        }
    }
}

/// Immutable description of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub namespace: Namespace,
    pub task: Task,
    pub environment: Option<EnvironmentName>,
    pub settings: Settings,
}

impl RunContext {
    /// Checks that deploy and test name an environment.
    pub fn new(
        namespace: Namespace,
        task: Task,
        environment: Option<EnvironmentName>,
        settings: Settings,
    ) -> Result<Self> {
        if task.requires_environment() && environment.is_none() {
            return Err(StagehandError::EnvironmentRequired(task.to_string()));
        }
        Ok(Self {
            namespace,
            task,
            environment,
            settings,
        })
    }

    /// The environment of a deploy or test run.
    pub fn required_environment(&self) -> Result<&EnvironmentName> {
        self.environment
            .as_ref()
            .ok_or_else(|| StagehandError::EnvironmentRequired(self.task.to_string()))
    }
}
