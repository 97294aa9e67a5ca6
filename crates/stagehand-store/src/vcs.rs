//! Version control capability used by the store.
//!
//! The store never reimplements git. It drives a [`Vcs`] whose steps either
//! return their captured output or a [`VcsFailure`] carrying the text the
//! retry loop classifies. [`GitCli`] shells out to the `git` binary;
//! in-memory doubles live in [`crate::fakes`].

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// Combined stdout/stderr of a version control command that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsFailure {
    pub output: String,
}

impl VcsFailure {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Result of a single version control step: captured output on success.
pub type VcsResult = std::result::Result<String, VcsFailure>;

/// Version control operations over a working tree.
///
/// `repo` is the working tree the command runs in. Paths are relative to it.
pub trait Vcs: Send + Sync {
    /// Stage the given paths (`git add`).
    fn stage(&self, repo: &Path, paths: &[PathBuf]) -> VcsResult;

    /// Commit whatever is staged.
    fn commit(&self, repo: &Path, message: &str) -> VcsResult;

    /// Push the current branch to the shared upstream.
    fn push(&self, repo: &Path) -> VcsResult;

    /// Revision identifier of HEAD.
    fn head_revision(&self, repo: &Path) -> VcsResult;

    /// Contents of `path` as of `revision`.
    fn show(&self, repo: &Path, revision: &str, path: &Path) -> VcsResult;

    /// Name of the checked-out branch. Fails on a detached HEAD.
    fn current_branch(&self, repo: &Path) -> VcsResult;
}

/// [`Vcs`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    remote: String,
    branch: String,
}

impl GitCli {
    pub fn new(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    fn run(&self, repo: &Path, args: &[&str]) -> VcsResult {
        debug!(repo = %repo.display(), ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .map_err(|e| VcsFailure::new(format!("failed to run git: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        // git reports some refusals (e.g. "nothing to commit") on stdout only.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
            (_, true) => stdout.trim().to_string(),
            (true, false) => stderr.trim().to_string(),
            (false, false) => format!("{}\n{}", stdout.trim(), stderr.trim()),
        };
        Err(VcsFailure::new(combined))
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("origin", "master")
    }
}

impl Vcs for GitCli {
    fn stage(&self, repo: &Path, paths: &[PathBuf]) -> VcsResult {
        let mut args = vec!["add".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|p| git_path(p)));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(repo, &args)
    }

    fn commit(&self, repo: &Path, message: &str) -> VcsResult {
        self.run(repo, &["commit", "-m", message])
    }

    fn push(&self, repo: &Path) -> VcsResult {
        self.run(repo, &["push", &self.remote, &self.branch])
    }

    fn head_revision(&self, repo: &Path) -> VcsResult {
        let sha = self.run(repo, &["rev-parse", "HEAD"])?.trim().to_string();
        if sha.is_empty() {
            return Err(VcsFailure::new("git rev-parse HEAD returned empty output"));
        }
        Ok(sha)
    }

    fn show(&self, repo: &Path, revision: &str, path: &Path) -> VcsResult {
        let spec = format!("{revision}:{}", git_path(path));
        self.run(repo, &["show", &spec])
    }

    fn current_branch(&self, repo: &Path) -> VcsResult {
        let branch = self
            .run(repo, &["symbolic-ref", "--short", "HEAD"])?
            .trim()
            .to_string();
        if branch.is_empty() {
            return Err(VcsFailure::new("unable to resolve current branch"));
        }
        Ok(branch)
    }
}

/// Git pathspecs always use forward slashes.
fn git_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
