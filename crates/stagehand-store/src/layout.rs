//! Path conventions inside the shared store.
//!
//! Every project release line owns one subtree:
//!
//! ```text
//! <domain>/<project>-<release>/
//!     envs/<env>/state.yml
//!     tags/<TAG>.yml
//!     meta/config.yml
//!     meta/relhist.yml
//! ```
//!
//! All paths handed out here are relative to the store root so they can be
//! passed straight to git.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of one project release line in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub domain: String,
    pub project: String,
    pub release: String,
}

impl Namespace {
    pub fn new(
        domain: impl Into<String>,
        project: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            project: project.into(),
            release: release.into(),
        }
    }

    /// `<project>-<release>`
    pub fn name(&self) -> String {
        format!("{}-{}", self.project, self.release)
    }

    /// Subtree of this namespace relative to the store root.
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.domain).join(self.name())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.name())
    }
}

/// Relative file locations for a [`Namespace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(namespace: &Namespace) -> Self {
        Self {
            root: namespace.root(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn envs_dir(&self) -> PathBuf {
        self.root.join("envs")
    }

    pub fn env_state(&self, env: &str) -> PathBuf {
        self.envs_dir().join(env).join("state.yml")
    }

    pub fn tags_dir(&self) -> PathBuf {
        self.root.join("tags")
    }

    pub fn tag(&self, name: &str) -> PathBuf {
        self.tags_dir().join(format!("{name}.yml"))
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    /// Synced copy of the project descriptor.
    pub fn config(&self) -> PathBuf {
        self.meta_dir().join("config.yml")
    }

    /// Release history ledger.
    pub fn release_history(&self) -> PathBuf {
        self.meta_dir().join("relhist.yml")
    }
}
