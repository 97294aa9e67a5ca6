//! Per-task tags: the last-write-wins record of what a task last produced.

use serde::{Deserialize, Serialize};
use stagehand_store::{PublishOutcome, VersionedStore};
use tracing::info;

use crate::context::Task;
use crate::environment::EnvironmentName;
use crate::error::{Result, StagehandError};
use crate::versioning::ArtifactIndex;

pub const LAST_BUILT: &str = "LAST_BUILT";
pub const LAST_ASSEMBLED: &str = "LAST_ASSEMBLED";

/// Tag written by `task`, or `None` for tasks that record nothing.
///
/// Deploy and test tags are per environment: `LAST_DEPLOYED_PROD-1A`.
pub fn tag_name(task: Task, environment: Option<&EnvironmentName>) -> Result<Option<String>> {
    let per_env = |prefix: &str| {
        environment
            .map(|env| format!("{prefix}_{}", env.tag_suffix()))
            .ok_or_else(|| StagehandError::EnvironmentRequired(task.to_string()))
    };
    Ok(match task {
        Task::Build => Some(LAST_BUILT.to_string()),
        Task::Assemble => Some(LAST_ASSEMBLED.to_string()),
        Task::Deploy => Some(per_env("LAST_DEPLOYED")?),
        Task::Test => Some(per_env("LAST_TESTED")?),
        Task::Devbuild => None,
    })
}

/// One built package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
}

/// Payload of `LAST_BUILT`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildTag {
    pub packages: Vec<PackageRecord>,
}

/// The last build's packages, for project types without a package
/// repository of their own.
impl ArtifactIndex for BuildTag {
    fn versions(&self) -> Result<Option<Vec<String>>> {
        Ok(Some(self.packages.iter().map(|p| p.version.clone()).collect()))
    }
}

/// Payload of `LAST_ASSEMBLED`, `LAST_DEPLOYED_*` and `LAST_TESTED_*`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseTag {
    pub release_version: String,
    pub git_revision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagPayload {
    Build(BuildTag),
    Release(ReleaseTag),
}

/// Writes and reads tags of one namespace.
pub struct TagWriter<'a> {
    store: &'a VersionedStore,
}

impl<'a> TagWriter<'a> {
    pub fn new(store: &'a VersionedStore) -> Self {
        Self { store }
    }

    /// Write and publish the tag for `task`. Returns the tag name, or `None`
    /// when the task records no tag.
    pub fn write_tag(
        &self,
        task: Task,
        environment: Option<&EnvironmentName>,
        payload: &TagPayload,
    ) -> Result<Option<String>> {
        let Some(name) = tag_name(task, environment)? else {
            return Ok(None);
        };
        let path = self.store.layout().tag(&name);
        self.store.write(&path, payload)?;
        let outcome = self.store.publish(&[path])?;
        info!(tag = %name, published = outcome == PublishOutcome::Published, "tag written");
        Ok(Some(name))
    }

    /// Read a tag in either payload shape.
    pub fn read_tag(&self, name: &str) -> Result<TagPayload> {
        let path = self.store.layout().tag(name);
        self.store
            .read(&path)?
            .ok_or(StagehandError::MissingTag {
                tag: name.to_string(),
                path,
            })
    }

    /// Read a tag that must carry a release version and revision.
    pub fn read_release_tag(&self, name: &str) -> Result<ReleaseTag> {
        let path = self.store.layout().tag(name);
        self.store
            .read(&path)?
            .ok_or(StagehandError::MissingTag {
                tag: name.to_string(),
                path,
            })
    }
}
