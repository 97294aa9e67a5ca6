//! Job-name convention: `<domain>-<project>[-<release>]-<task>[-<env>]`.
//!
//! ```text
//! diy-demo_app-deploy-dev-1        release defaults to 1.0
//! diy-demo_app-2.1-test-prod-1a
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use stagehand_store::Namespace;
use tracing::debug;

use crate::context::Task;
use crate::environment::EnvironmentName;
use crate::error::{Result, StagehandError};

/// Release assumed when the job name carries none.
pub const DEFAULT_RELEASE: &str = "1.0";

fn release_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+").expect("static regex"))
}

/// A parsed job name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobName {
    pub domain: String,
    pub project: String,
    pub release: String,
    pub task: Task,
    pub environment: Option<EnvironmentName>,
}

impl JobName {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.domain, &self.project, &self.release)
    }
}

impl FromStr for JobName {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StagehandError::InvalidJobName(s.to_string());
        let mut parts = s.split('-').peekable();

        let domain = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let project = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let release = match parts.peek() {
            Some(seg) if release_segment().is_match(seg) => parts.next(),
            _ => None,
        };
        let task: Task = parts.next().ok_or_else(invalid)?.parse()?;
        let param = parts.collect::<Vec<_>>().join("-");

        let environment = if task.requires_environment() {
            let env = param
                .parse::<EnvironmentName>()
                .map_err(|_| StagehandError::EnvironmentRequired(task.to_string()))?;
            Some(env)
        } else {
            None
        };

        let job = Self {
            domain: domain.to_string(),
            project: project.to_string(),
            release: release.unwrap_or(DEFAULT_RELEASE).to_string(),
            task,
            environment,
        };
        debug!(job = %job, "parsed job name");
        Ok(job)
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.domain, self.project, self.release, self.task)?;
        if let Some(env) = &self.environment {
            write!(f, "-{env}")?;
        }
        Ok(())
    }
}
