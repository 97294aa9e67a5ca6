//! Side-effecting steps of a task, and the executor that performs them.
//!
//! Providers describe what to do as a list of [`Action`]s; an
//! [`ActionExecutor`] does it. Every failure is fatal to the task and is
//! never retried.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, StagehandError};

/// A single step of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Run a command line through `sh -c`.
    Shell { command: String, dir: PathBuf },

    /// Copy a file, creating the destination directory.
    Copy { from: PathBuf, to: PathBuf },

    /// Point `dir/link` at `target` (relative to `dir`), replacing any
    /// existing link.
    Link {
        dir: PathBuf,
        target: String,
        link: String,
    },

    /// Extract `member` from a jar archive into `dir`.
    Extract {
        dir: PathBuf,
        archive: String,
        member: String,
    },

    /// Run `interpreter script` inside `dir`.
    RunScript {
        dir: PathBuf,
        interpreter: String,
        script: String,
    },

    /// Fetch `<group>:<artifact>:<version>` from a maven repository to `dest`.
    FetchArtifact {
        coordinates: String,
        repository: PathBuf,
        dest: PathBuf,
    },

    /// Write `export KEY="VALUE"` lines, one per variable.
    WriteEnvExports {
        path: PathBuf,
        variables: BTreeMap<String, String>,
    },
}

impl Action {
    pub fn shell(command: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Action::Shell {
            command: command.into(),
            dir: dir.into(),
        }
    }

    /// Short name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Shell { .. } => "shell",
            Action::Copy { .. } => "copy",
            Action::Link { .. } => "link",
            Action::Extract { .. } => "extract",
            Action::RunScript { .. } => "run_script",
            Action::FetchArtifact { .. } => "fetch_artifact",
            Action::WriteEnvExports { .. } => "write_env_exports",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shell { command, dir } => write!(f, "cd {} && {command}", dir.display()),
            Action::Copy { from, to } => write!(f, "cp {} {}", from.display(), to.display()),
            Action::Link { dir, target, link } => {
                write!(f, "cd {} && ln -sf {target} {link}", dir.display())
            }
            Action::Extract {
                dir,
                archive,
                member,
            } => write!(f, "cd {} && jar xvf {archive} {member}", dir.display()),
            Action::RunScript {
                dir,
                interpreter,
                script,
            } => write!(f, "cd {} && {interpreter} {script}", dir.display()),
            Action::FetchArtifact {
                coordinates, dest, ..
            } => write!(f, "fetch {coordinates} -> {}", dest.display()),
            Action::WriteEnvExports { path, variables } => {
                write!(f, "write {} ({} variables)", path.display(), variables.len())
            }
        }
    }
}

/// Render environment variables as a sourceable shell file.
pub fn env_exports(variables: &BTreeMap<String, String>) -> String {
    variables
        .iter()
        .map(|(k, v)| format!("export {k}=\"{v}\"\n"))
        .collect()
}

/// Performs actions.
pub trait ActionExecutor {
    fn execute(&self, action: &Action) -> Result<()>;
}

/// Executes actions on the local host.
///
/// With `dry_run` set, actions are logged and not performed.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    dry_run: bool,
}

impl SystemExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn run(&self, action: &Action, mut cmd: Command) -> Result<()> {
        let start = Instant::now();
        let output = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).output()?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(action = %action, duration_ms, stdout = %stdout.trim_end(), "action output");

        if !output.status.success() {
            return Err(StagehandError::ActionFailed {
                action: action.to_string(),
                code: output.status.code().unwrap_or(-1),
                output: format!("{stdout}{stderr}"),
            });
        }
        Ok(())
    }
}

impl ActionExecutor for SystemExecutor {
    fn execute(&self, action: &Action) -> Result<()> {
        info!(kind = action.kind(), action = %action, dry_run = self.dry_run, "executing");
        if self.dry_run {
            return Ok(());
        }

        match action {
            Action::Shell { command, dir } => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command).current_dir(dir);
                self.run(action, cmd)
            }
            Action::Copy { from, to } => {
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                if !from.is_file() {
                    return Err(StagehandError::MissingFile(from.clone()));
                }
                std::fs::copy(from, to)?;
                Ok(())
            }
            Action::Link { dir, target, link } => relink(dir, target, link),
            Action::Extract {
                dir,
                archive,
                member,
            } => {
                let mut cmd = Command::new("jar");
                cmd.arg("xvf").arg(archive).arg(member).current_dir(dir);
                self.run(action, cmd)
            }
            Action::RunScript {
                dir,
                interpreter,
                script,
            } => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(script).current_dir(dir);
                self.run(action, cmd)
            }
            Action::FetchArtifact {
                coordinates,
                repository,
                dest,
            } => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut cmd = Command::new("mvn");
                cmd.arg("org.apache.maven.plugins:maven-dependency-plugin:LATEST:get")
                    .arg(format!("-DremoteRepositories={}", repository.display()))
                    .arg(format!("-Dartifact={coordinates}"))
                    .arg(format!("-Ddest={}", dest.display()));
                self.run(action, cmd)
            }
            Action::WriteEnvExports { path, variables } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, env_exports(variables))?;
                Ok(())
            }
        }
    }
}

fn relink(dir: &Path, target: &str, link: &str) -> Result<()> {
    let path = dir.join(link);
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(&path)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, &path)?;
    #[cfg(not(unix))]
    std::fs::copy(dir.join(target), &path)?;
    Ok(())
}
