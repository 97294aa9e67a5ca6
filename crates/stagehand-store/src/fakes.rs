//! In-memory fakes for the store's capabilities (testing only)
//!
//! Provides `ScriptedVcs`, a [`Vcs`] that keeps an in-memory commit history
//! and can be told to fail upcoming steps with chosen messages, and
//! `RecordingSleeper`, a [`Sleeper`] that records instead of blocking.
//! Both are cheap to clone; clones share state so a test can keep a handle
//! after boxing one into a store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::retry::Sleeper;
use crate::vcs::{Vcs, VcsFailure, VcsResult};

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// [`Sleeper`] that records requested pauses and returns immediately.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// ScriptedVcs
// ---------------------------------------------------------------------------

/// A version control step, for scripting failures and inspecting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsStep {
    Stage,
    Commit,
    Push,
    HeadRevision,
    Show,
    CurrentBranch,
}

type Tree = BTreeMap<PathBuf, Vec<u8>>;

#[derive(Debug)]
struct Commit {
    revision: String,
    tree: Tree,
}

#[derive(Debug)]
struct VcsState {
    failures: HashMap<VcsStep, VecDeque<String>>,
    steps: Vec<VcsStep>,
    staged: Tree,
    commits: Vec<Commit>,
    pushed: usize,
    branch: Option<String>,
}

impl Default for VcsState {
    fn default() -> Self {
        Self {
            failures: HashMap::new(),
            steps: Vec::new(),
            staged: Tree::new(),
            commits: vec![Commit {
                revision: revision_for("", &Tree::new()),
                tree: Tree::new(),
            }],
            pushed: 0,
            branch: Some("master".to_string()),
        }
    }
}

impl VcsState {
    fn enter(&mut self, step: VcsStep) -> Result<(), VcsFailure> {
        self.steps.push(step);
        match self.failures.get_mut(&step).and_then(VecDeque::pop_front) {
            Some(output) => Err(VcsFailure::new(output)),
            None => Ok(()),
        }
    }

    fn head(&self) -> &Commit {
        // The history always starts with a root commit.
        &self.commits[self.commits.len() - 1]
    }
}

/// In-memory [`Vcs`] with a linear commit history.
///
/// `stage` snapshots file contents from the working tree on disk, `commit`
/// records them as a new revision (or reports "nothing to commit" when the
/// tree would not change), and `show` serves historical contents.
#[derive(Debug, Default, Clone)]
pub struct ScriptedVcs {
    state: Arc<Mutex<VcsState>>,
}

impl ScriptedVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `step` fail with `output`. Calls queue up.
    pub fn fail_next(&self, step: VcsStep, output: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(step)
            .or_default()
            .push_back(output.into());
    }

    /// Report `branch` as checked out, or a detached HEAD when `None`.
    pub fn set_branch(&self, branch: Option<&str>) {
        self.state.lock().unwrap().branch = branch.map(str::to_string);
    }

    /// Every step invoked so far, in order.
    pub fn steps(&self) -> Vec<VcsStep> {
        self.state.lock().unwrap().steps.clone()
    }

    /// Commits recorded after the root commit.
    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits.len() - 1
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().unwrap().pushed
    }

    /// Paths touched by the most recent commit relative to its parent.
    pub fn last_commit_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock().unwrap();
        let n = state.commits.len();
        if n < 2 {
            return Vec::new();
        }
        let (prev, head) = (&state.commits[n - 2].tree, &state.commits[n - 1].tree);
        head.iter()
            .filter(|(path, bytes)| prev.get(*path) != Some(*bytes))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl Vcs for ScriptedVcs {
    fn stage(&self, repo: &Path, paths: &[PathBuf]) -> VcsResult {
        let mut state = self.state.lock().unwrap();
        state.enter(VcsStep::Stage)?;
        for rel in paths {
            let mut files = Vec::new();
            collect_files(repo, rel, &mut files)
                .map_err(|e| VcsFailure::new(format!("fatal: pathspec '{}': {e}", rel.display())))?;
            for (path, bytes) in files {
                state.staged.insert(path, bytes);
            }
        }
        Ok(String::new())
    }

    fn commit(&self, _repo: &Path, _message: &str) -> VcsResult {
        let mut state = self.state.lock().unwrap();
        state.enter(VcsStep::Commit)?;

        let mut tree = state.head().tree.clone();
        tree.extend(std::mem::take(&mut state.staged));
        if tree == state.head().tree {
            return Err(VcsFailure::new(
                "On branch master\nnothing to commit, working tree clean",
            ));
        }

        let revision = revision_for(&state.head().revision, &tree);
        state.commits.push(Commit {
            revision: revision.clone(),
            tree,
        });
        Ok(format!("[master {}] auto update", &revision[..7]))
    }

    fn push(&self, _repo: &Path) -> VcsResult {
        let mut state = self.state.lock().unwrap();
        state.enter(VcsStep::Push)?;
        state.pushed += 1;
        Ok(String::new())
    }

    fn head_revision(&self, _repo: &Path) -> VcsResult {
        let mut state = self.state.lock().unwrap();
        state.enter(VcsStep::HeadRevision)?;
        Ok(state.head().revision.clone())
    }

    fn show(&self, _repo: &Path, revision: &str, path: &Path) -> VcsResult {
        let mut state = self.state.lock().unwrap();
        state.enter(VcsStep::Show)?;
        let commit = state
            .commits
            .iter()
            .find(|c| c.revision == revision)
            .ok_or_else(|| VcsFailure::new(format!("fatal: invalid object name '{revision}'")))?;
        commit
            .tree
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| {
                VcsFailure::new(format!(
                    "fatal: path '{}' does not exist in '{revision}'",
                    path.display()
                ))
            })
    }

    fn current_branch(&self, _repo: &Path) -> VcsResult {
        let mut state = self.state.lock().unwrap();
        state.enter(VcsStep::CurrentBranch)?;
        state
            .branch
            .clone()
            .ok_or_else(|| VcsFailure::new("fatal: ref HEAD is not a symbolic ref"))
    }
}

fn revision_for(parent: &str, tree: &Tree) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    for (path, bytes) in tree {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(bytes);
        hasher.update(b"\0");
    }
    hex::encode(&hasher.finalize()[..20])
}

fn collect_files(
    repo: &Path,
    rel: &Path,
    out: &mut Vec<(PathBuf, Vec<u8>)>,
) -> std::io::Result<()> {
    let abs = repo.join(rel);
    if abs.is_dir() {
        let mut entries = fs::read_dir(&abs)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            collect_files(repo, &rel.join(entry.file_name()), out)?;
        }
    } else {
        out.push((rel.to_path_buf(), fs::read(&abs)?));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_failures_are_consumed_in_order() {
        let vcs = ScriptedVcs::new();
        vcs.fail_next(VcsStep::Push, "first");
        vcs.fail_next(VcsStep::Push, "second");
        let repo = Path::new(".");

        assert_eq!(vcs.push(repo).unwrap_err().output, "first");
        assert_eq!(vcs.push(repo).unwrap_err().output, "second");
        assert!(vcs.push(repo).is_ok());
        assert_eq!(vcs.push_count(), 1);
    }

    #[test]
    fn commit_without_changes_reports_nothing_to_commit() {
        let vcs = ScriptedVcs::new();
        let err = vcs.commit(Path::new("."), "msg").unwrap_err();
        assert!(err.output.contains("nothing to commit"));
        assert_eq!(vcs.commit_count(), 0);
    }

    #[test]
    fn stage_directory_captures_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("envs/dev-1")).unwrap();
        fs::write(dir.path().join("envs/dev-1/state.yml"), "a: 1\n").unwrap();

        let vcs = ScriptedVcs::new();
        vcs.stage(dir.path(), &[PathBuf::from("envs")]).unwrap();
        vcs.commit(dir.path(), "msg").unwrap();

        assert_eq!(
            vcs.last_commit_paths(),
            vec![PathBuf::from("envs/dev-1/state.yml")]
        );
    }

    #[test]
    fn detached_head_has_no_branch() {
        let vcs = ScriptedVcs::new();
        vcs.set_branch(None);
        assert!(vcs.current_branch(Path::new(".")).is_err());
    }

    #[test]
    fn recording_sleeper_collects_durations() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(5));
        sleeper.sleep(Duration::from_secs(5));
        assert_eq!(sleeper.sleeps().len(), 2);
    }
}
