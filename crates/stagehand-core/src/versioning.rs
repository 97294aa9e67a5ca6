//! Release and package version allocation.
//!
//! Release versions (`<release>.<n>`) are allocated from the shared release
//! ledger. Package build numbers are derived from an artifact index, such as
//! a local maven repository.

use std::path::{Path, PathBuf};

use regex::Regex;
use stagehand_store::{ReleaseLedger, VersionedStore};
use tracing::debug;

use crate::error::{Result, StagehandError};

/// Allocates release versions from the ledger's last entry.
pub struct ReleaseVersioner;

impl ReleaseVersioner {
    /// Next release version: `<release>.0` for an empty ledger, otherwise
    /// the last inserted version's suffix plus one.
    pub fn next_release_version(release: &str, ledger: &ReleaseLedger) -> Result<String> {
        let Some(last) = ledger.last() else {
            return Ok(format!("{release}.0"));
        };
        let suffix = last
            .version
            .rsplit_once('.')
            .map(|(_, n)| n)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| StagehandError::InvalidVersion(last.version.clone()))?;
        Ok(format!("{release}.{}", suffix + 1))
    }

    /// Append `version -> revision`. The caller publishes the ledger.
    pub fn record_release(ledger: &mut ReleaseLedger, version: &str, revision: &str) -> Result<()> {
        ledger.append(version, revision)?;
        debug!(version, revision, "recorded release");
        Ok(())
    }
}

/// The namespace's release ledger; empty when none has been recorded.
pub fn load_ledger(store: &VersionedStore) -> Result<ReleaseLedger> {
    let path = store.layout().release_history();
    Ok(store.read(&path)?.unwrap_or_default())
}

/// The release version the next assemble would allocate. Records nothing.
pub fn peek_next_release(store: &VersionedStore) -> Result<String> {
    let ledger = load_ledger(store)?;
    ReleaseVersioner::next_release_version(&store.namespace().release, &ledger)
}

/// A source of already-published package versions.
pub trait ArtifactIndex {
    /// Version strings present in the index, or `None` when the index does
    /// not exist yet.
    fn versions(&self) -> Result<Option<Vec<String>>>;
}

impl ArtifactIndex for Vec<String> {
    fn versions(&self) -> Result<Option<Vec<String>>> {
        Ok(Some(self.clone()))
    }
}

/// Version directories of one artifact in a local maven repository.
#[derive(Debug, Clone)]
pub struct MavenRepositoryIndex {
    dir: PathBuf,
}

impl MavenRepositoryIndex {
    /// `maven_home` is the `.m2` directory.
    pub fn new(maven_home: &Path, group_id: &str, artifact_id: &str) -> Self {
        let mut dir = maven_home.join("repository");
        for part in group_id.split('.') {
            dir.push(part);
        }
        dir.push(artifact_id);
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactIndex for MavenRepositoryIndex {
    fn versions(&self) -> Result<Option<Vec<String>>> {
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "artifact index absent");
            return Ok(None);
        }
        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(Some(versions))
    }
}

/// Highest `n` among index entries that are exactly `<release>.<n>`.
pub fn last_package_build_number(release: &str, index: &dyn ArtifactIndex) -> Result<Option<u64>> {
    let Some(versions) = index.versions()? else {
        return Ok(None);
    };
    let pattern = format!(r"^{}\.(\d+)$", regex::escape(release));
    let re = Regex::new(&pattern).map_err(|_| StagehandError::InvalidVersion(release.to_string()))?;

    Ok(versions
        .iter()
        .filter_map(|v| re.captures(v))
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .max())
}

/// Build number for the next package: last plus one, or `0` for the first.
pub fn next_package_build_number(release: &str, index: &dyn ArtifactIndex) -> Result<u64> {
    Ok(last_package_build_number(release, index)?.map_or(0, |n| n + 1))
}

/// `<release>.<build_number>`.
pub fn package_version(release: &str, build_number: impl std::fmt::Display) -> String {
    format!("{release}.{build_number}")
}
