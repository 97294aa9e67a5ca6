//! Project types and the build steps each one runs per task.

mod generic;
mod maven;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use stagehand_store::Namespace;

use crate::action::Action;
use crate::context::{Settings, Task};
use crate::descriptor::ProjectDescriptor;
use crate::environment::{EnvironmentName, EnvironmentState};
use crate::error::{Result, StagehandError};
use crate::tokens::TokenTable;
use crate::versioning::ArtifactIndex;

pub use generic::GenericProject;
pub use maven::{MavenJarApp, TEST_SCRIPT};

/// Kind of project, from the `PROJECT_TYPE` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    Generic,
    MavenJarApp,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Generic => "generic",
            ProjectType::MavenJarApp => "maven_jar_app",
        }
    }
}

impl FromStr for ProjectType {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generic" => Ok(ProjectType::Generic),
            "maven_jar_app" => Ok(ProjectType::MavenJarApp),
            other => Err(StagehandError::UnknownProjectType(other.to_string())),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a provider may look at when planning a task's steps.
pub struct StepContext<'a> {
    pub namespace: &'a Namespace,
    pub descriptor: &'a ProjectDescriptor,
    pub tokens: &'a TokenTable,
    pub settings: &'a Settings,
    pub environment: Option<&'a EnvironmentName>,
    /// State of the environment at the resolved revision (deploy and test).
    pub state: Option<&'a EnvironmentState>,
}

impl StepContext<'_> {
    /// `<deploy_root>/<domain>/<project>-<release>/<env>`.
    pub fn deploy_dir(&self, env: &str) -> PathBuf {
        self.settings
            .deploy_root
            .join(self.namespace.root())
            .join(env)
    }

    pub fn required_environment(&self) -> Result<&EnvironmentName> {
        self.environment
            .ok_or_else(|| StagehandError::EnvironmentRequired("deploy/test".to_string()))
    }

    pub fn required_state(&self) -> Result<&EnvironmentState> {
        self.state
            .ok_or_else(|| StagehandError::MissingKey("state".to_string()))
    }
}

/// Supplies the concrete steps of a project type.
pub trait BuildStepProvider {
    fn project_type(&self) -> ProjectType;

    /// Adjust tokens before a task runs.
    fn prepare(&self, _task: Task, _tokens: &mut TokenTable) -> Result<()> {
        Ok(())
    }

    /// Actions for `task`, in execution order.
    fn steps_for(&self, task: Task, ctx: &StepContext<'_>) -> Result<Vec<Action>>;

    /// Where published package versions can be listed, if the project type
    /// has such a place.
    fn artifact_index(
        &self,
        tokens: &TokenTable,
        settings: &Settings,
    ) -> Result<Option<Box<dyn ArtifactIndex>>>;

    /// Package name recorded in `LAST_BUILT`.
    fn artifact_name(&self, tokens: &TokenTable) -> Result<String>;
}

/// Provider for `project_type`.
pub fn provider_for(project_type: ProjectType) -> Box<dyn BuildStepProvider> {
    match project_type {
        ProjectType::Generic => Box::new(GenericProject),
        ProjectType::MavenJarApp => Box::new(MavenJarApp),
    }
}
