//! The shared, git-backed metadata store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::layout::{Namespace, StoreLayout};
use crate::retry::{run_with_retry, RetryPolicy, Sleeper, StepOutcome, ThreadSleeper};
use crate::vcs::Vcs;
use crate::Result;

/// Result of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new commit was pushed upstream.
    Published,
    /// The store already held identical content; nothing was committed.
    Unchanged,
}

/// Working copy of the shared repository, scoped to one namespace.
///
/// Reads and writes go straight to the working tree. Other writers only see
/// changes after [`VersionedStore::publish`], which stages, commits and
/// pushes under the retry policy. Concurrency control is entirely
/// optimistic: nothing here takes an in-process lock.
pub struct VersionedStore {
    root: PathBuf,
    namespace: Namespace,
    layout: StoreLayout,
    vcs: Box<dyn Vcs>,
    sleeper: Box<dyn Sleeper>,
    policy: RetryPolicy,
}

impl VersionedStore {
    /// Open the store rooted at `root` (the shared repository's working tree).
    pub fn new(root: impl Into<PathBuf>, namespace: Namespace, vcs: Box<dyn Vcs>) -> Self {
        let layout = StoreLayout::new(&namespace);
        Self {
            root: root.into(),
            namespace,
            layout,
            vcs,
            sleeper: Box::new(ThreadSleeper),
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy and the sleeper used between attempts.
    pub fn with_retry(mut self, policy: RetryPolicy, sleeper: Box<dyn Sleeper>) -> Self {
        self.policy = policy;
        self.sleeper = sleeper;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn absolute(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: &Path) -> bool {
        self.absolute(rel).is_file()
    }

    /// Raw contents of `rel`, or `None` when it does not exist.
    pub fn read_bytes(&self, rel: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(self.absolute(rel)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Load a structured file. A missing file or an empty document is `None`.
    pub fn read<T: DeserializeOwned>(&self, rel: &Path) -> Result<Option<T>> {
        let Some(bytes) = self.read_bytes(rel)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        if text.trim().is_empty() {
            return Ok(None);
        }
        parse(rel, &text).map(Some)
    }

    /// Load a structured file that must exist.
    pub fn read_required<T: DeserializeOwned>(&self, rel: &Path) -> Result<T> {
        self.read(rel)?.ok_or_else(|| StoreError::NotFound {
            path: self.absolute(rel),
        })
    }

    /// Load `rel` as it was committed at `revision`.
    pub fn read_at<T: DeserializeOwned>(&self, revision: &str, rel: &Path) -> Result<T> {
        let text = self.vcs.show(&self.root, revision, rel).map_err(|failure| {
            if failure.output.contains("does not exist")
                || failure.output.contains("exists on disk, but not in")
            {
                StoreError::NotFound {
                    path: PathBuf::from(format!("{revision}:{}", rel.display())),
                }
            } else {
                StoreError::Vcs {
                    step: "show".to_string(),
                    output: failure.output,
                }
            }
        })?;
        parse(rel, &text)
    }

    /// Replace the full contents of `rel` with raw bytes.
    pub fn write_bytes(&self, rel: &Path, bytes: &[u8]) -> Result<()> {
        let path = self.absolute(rel);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %rel.display(), bytes = bytes.len(), "wrote store file");
        Ok(())
    }

    /// Replace the full contents of `rel` with `value` serialized as YAML.
    pub fn write<T: Serialize>(&self, rel: &Path, value: &T) -> Result<()> {
        let yaml = serde_yaml::to_string(value)?;
        self.write_bytes(rel, yaml.as_bytes())
    }

    /// Revision of the shared repository's HEAD.
    pub fn head_revision(&self) -> Result<String> {
        self.vcs
            .head_revision(&self.root)
            .map(|rev| rev.trim().to_string())
            .map_err(|failure| StoreError::Vcs {
                step: "rev-parse".to_string(),
                output: failure.output,
            })
    }

    /// Stage, commit and push `paths` so other writers can see them.
    ///
    /// Each step is retried on transient lock contention. A commit that
    /// finds nothing to record means an identical state is already
    /// published: the push is skipped and [`PublishOutcome::Unchanged`]
    /// returned. Any other failure is fatal and nothing is claimed as
    /// published.
    pub fn publish(&self, paths: &[PathBuf]) -> Result<PublishOutcome> {
        if paths.is_empty() {
            return Ok(PublishOutcome::Unchanged);
        }

        let listed = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let message = format!("auto update {listed}");
        info!(namespace = %self.namespace, paths = %listed, "publishing");

        let sleeper = self.sleeper.as_ref();
        run_with_retry("add", &self.policy, sleeper, false, || {
            self.vcs.stage(&self.root, paths)
        })?;

        let commit = run_with_retry("commit", &self.policy, sleeper, true, || {
            self.vcs.commit(&self.root, &message)
        })?;
        if commit == StepOutcome::NothingToCommit {
            info!(paths = %listed, "nothing to commit, store already up to date");
            return Ok(PublishOutcome::Unchanged);
        }

        run_with_retry("push", &self.policy, sleeper, false, || {
            self.vcs.push(&self.root)
        })?;
        info!(paths = %listed, "published");
        Ok(PublishOutcome::Published)
    }
}

fn parse<T: DeserializeOwned>(rel: &Path, text: &str) -> Result<T> {
    serde_yaml::from_str(text).map_err(|e| StoreError::Deserialization {
        path: rel.to_path_buf(),
        message: e.to_string(),
    })
}
