//! The task state machine.
//!
//! | Task     | Precondition                  | Tag                   |
//! |----------|-------------------------------|-----------------------|
//! | build    | none                          | `LAST_BUILT`          |
//! | devbuild | branch known, build number    | none                  |
//! | assemble | a package has been built      | `LAST_ASSEMBLED`      |
//! | deploy   | environment and its deploy tag| `LAST_DEPLOYED_<ENV>` |
//! | test     | as deploy                     | `LAST_TESTED_<ENV>`   |
//!
//! A task's tag is written only after every one of its steps succeeded.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use stagehand_store::{PublishOutcome, Vcs, VersionedStore};
use tracing::{debug, info, warn};

use crate::action::{Action, ActionExecutor};
use crate::context::{RunContext, Task};
use crate::descriptor::ProjectDescriptor;
use crate::environment::EnvironmentState;
use crate::error::{Result, StagehandError};
use crate::provider::{provider_for, BuildStepProvider, ProjectType, StepContext};
use crate::substitute::apply_rules;
use crate::tags::{self, BuildTag, PackageRecord, ReleaseTag, TagPayload, TagWriter};
use crate::tokens::{self, TokenTable};
use crate::versioning::{
    last_package_build_number, load_ledger, package_version, ArtifactIndex, ReleaseVersioner,
};

/// Descriptor file name, in the project work dir and in the shared store.
pub const DESCRIPTOR_FILE: &str = "config.yml";

/// Environment variable carrying the build-run number for devbuild.
pub const BUILD_NUMBER_VAR: &str = "BUILD_NUMBER";

/// What a completed task produced.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: Task,
    pub tag: Option<String>,
    pub package_version: Option<String>,
    pub release_version: Option<String>,
    pub git_revision: Option<String>,
}

impl TaskOutcome {
    fn new(task: Task) -> Self {
        Self {
            task,
            tag: None,
            package_version: None,
            release_version: None,
            git_revision: None,
        }
    }
}

/// Read the project descriptor from `<workdir>/config.yml`, falling back to
/// the copy kept in the shared store.
pub fn load_descriptor(workdir: &Path, store: &VersionedStore) -> Result<ProjectDescriptor> {
    let local = workdir.join(DESCRIPTOR_FILE);
    let path = if local.is_file() {
        local
    } else {
        store.root().join(store.layout().config())
    };
    info!(path = %path.display(), "loading project descriptor");
    ProjectDescriptor::load(&path)
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Runs one task of one project against the shared store.
pub struct Lifecycle {
    ctx: RunContext,
    descriptor: ProjectDescriptor,
    tokens: TokenTable,
    provider: Box<dyn BuildStepProvider>,
    store: VersionedStore,
    source: Box<dyn Vcs>,
    executor: Box<dyn ActionExecutor>,
    index: Option<Box<dyn ArtifactIndex>>,
    env: EnvLookup,
}

impl Lifecycle {
    /// Validate the descriptor against the invocation and pick the project's
    /// step provider.
    ///
    /// `source` is the version control of the project checkout
    /// (`ctx.settings.workdir`), distinct from the shared store's.
    pub fn new(
        ctx: RunContext,
        descriptor: ProjectDescriptor,
        store: VersionedStore,
        source: Box<dyn Vcs>,
        executor: Box<dyn ActionExecutor>,
    ) -> Result<Self> {
        descriptor.domain()?;
        descriptor.project()?;
        let release = descriptor.release()?;
        if release != ctx.namespace.release {
            return Err(StagehandError::ReleaseMismatch {
                invocation: ctx.namespace.release.clone(),
                config: release.to_string(),
            });
        }
        let project_type: ProjectType = descriptor.project_type()?.parse()?;
        let provider = provider_for(project_type);

        let mut tokens = descriptor.tokens();
        tokens.insert(tokens::TASK, ctx.task.name());
        if let Some(env) = &ctx.environment {
            tokens.insert(tokens::ENVIRONMENT, env.to_string());
        }
        provider.prepare(ctx.task, &mut tokens)?;

        Ok(Self {
            ctx,
            descriptor,
            tokens,
            provider,
            store,
            source,
            executor,
            index: None,
            env: Box::new(|name| std::env::var(name).ok()),
        })
    }

    /// Use `index` instead of the provider's artifact index.
    pub fn with_artifact_index(mut self, index: Box<dyn ArtifactIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Resolve `env_tokens` through `lookup` instead of the process
    /// environment.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env = Box::new(lookup);
        self
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    pub fn store(&self) -> &VersionedStore {
        &self.store
    }

    /// Run the task. Any error leaves the task's tag untouched.
    pub fn run(&mut self) -> Result<TaskOutcome> {
        let task = self.ctx.task;
        info!(
            task = %task,
            namespace = %self.ctx.namespace,
            environment = ?self.ctx.environment.as_ref().map(|e| e.to_string()),
            project_type = %self.provider.project_type(),
            "running task"
        );
        let outcome = match task {
            Task::Build => self.build(),
            Task::Devbuild => self.devbuild(),
            Task::Assemble => self.assemble(),
            Task::Deploy | Task::Test => self.deploy_or_test(task),
        };
        match &outcome {
            Ok(done) => info!(task = %task, tag = ?done.tag, "task complete"),
            Err(e) => warn!(task = %task, error = %e, "task failed"),
        }
        outcome
    }

    fn build(&mut self) -> Result<TaskOutcome> {
        self.sync_config()?;

        let release = self.ctx.namespace.release.clone();
        let number = self.last_build_number()?.map_or(0, |last| last + 1);
        let version = package_version(&release, number);
        info!(package_version = %version, "allocated package version");
        self.tokens.insert(tokens::PACKAGE_VERSION, version.clone());

        self.substitute()?;
        self.run_steps(Task::Build, None)?;

        let payload = TagPayload::Build(BuildTag {
            packages: vec![PackageRecord {
                name: self.provider.artifact_name(&self.tokens)?,
                version: version.clone(),
            }],
        });
        let mut outcome = TaskOutcome::new(Task::Build);
        outcome.tag = self.write_tag(&payload)?;
        outcome.package_version = Some(version);
        Ok(outcome)
    }

    fn devbuild(&mut self) -> Result<TaskOutcome> {
        let workdir = self.ctx.settings.workdir.clone();
        let branch = self
            .source
            .current_branch(&workdir)
            .map_err(|f| StagehandError::Source {
                what: "branch".to_string(),
                output: f.output,
            })?;
        let number = self
            .ctx
            .settings
            .build_number
            .clone()
            .ok_or_else(|| StagehandError::MissingToken(BUILD_NUMBER_VAR.to_string()))?;
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(StagehandError::InvalidVersion(number));
        }

        let version = package_version(&self.ctx.namespace.release, &number);
        info!(branch = %branch.trim(), package_version = %version, "dev build");
        self.tokens.insert(tokens::PACKAGE_VERSION, version.clone());

        self.substitute()?;
        self.run_steps(Task::Devbuild, None)?;

        let mut outcome = TaskOutcome::new(Task::Devbuild);
        outcome.package_version = Some(version);
        Ok(outcome)
    }

    fn assemble(&mut self) -> Result<TaskOutcome> {
        let release = self.ctx.namespace.release.clone();
        let last = self
            .last_build_number()?
            .ok_or_else(|| StagehandError::NoPackageBuilt(release.clone()))?;
        let version = package_version(&release, last);
        info!(package_version = %version, "assembling last built package");
        self.tokens.insert(tokens::PACKAGE_VERSION, version.clone());

        self.substitute()?;
        self.run_steps(Task::Assemble, None)?;

        let ledger = load_ledger(&self.store)?;
        let next = ReleaseVersioner::next_release_version(&release, &ledger)?;
        self.publish_environment_states(&next)?;

        // The ledger points at the store revision that holds the states
        // just published, so deploys can read them back from history.
        let revision = self.store.head_revision()?;
        let mut ledger = load_ledger(&self.store)?;
        ReleaseVersioner::record_release(&mut ledger, &next, &revision)?;
        let relhist = self.store.layout().release_history();
        self.store.write(&relhist, &ledger)?;
        self.store.publish(&[relhist])?;
        info!(release_version = %next, revision = %revision, "recorded release");

        self.tokens.insert(tokens::RELEASE_VERSION, next.clone());
        self.tokens.insert(tokens::GIT_REVISION, revision.clone());

        let payload = TagPayload::Release(ReleaseTag {
            release_version: next.clone(),
            git_revision: revision.clone(),
        });
        let mut outcome = TaskOutcome::new(Task::Assemble);
        outcome.tag = self.write_tag(&payload)?;
        outcome.package_version = Some(version);
        outcome.release_version = Some(next);
        outcome.git_revision = Some(revision);
        Ok(outcome)
    }

    /// Write every declared environment's state for `release_version` and
    /// publish them together.
    fn publish_environment_states(&self, release_version: &str) -> Result<PublishOutcome> {
        let workdir = &self.ctx.settings.workdir;
        let source_revision = self
            .source
            .head_revision(workdir)
            .map_err(|f| StagehandError::Source {
                what: "revision".to_string(),
                output: f.output,
            })?;
        let source_revision = source_revision.trim();

        let mut paths = Vec::new();
        for spec in self.descriptor.envs.as_deref().unwrap_or_default() {
            spec.environment_name()?;
            let mut state = EnvironmentState::from_spec(spec, release_version, source_revision);
            state.expand_tokens(&self.tokens);
            let path = self.store.layout().env_state(&spec.name);
            self.store.write(&path, &state)?;
            debug!(environment = %spec.name, "wrote environment state");
            paths.push(path);
        }
        Ok(self.store.publish(&paths)?)
    }

    fn deploy_or_test(&mut self, task: Task) -> Result<TaskOutcome> {
        let env = self.ctx.required_environment()?.clone();
        let env_name = env.to_string();
        let deploy_tag = self.descriptor.deploy_tag(&env_name)?.to_string();

        let release = TagWriter::new(&self.store).read_release_tag(&deploy_tag)?;
        info!(
            tag = %deploy_tag,
            release_version = %release.release_version,
            revision = %release.git_revision,
            "resolved deploy tag"
        );
        self.tokens
            .insert(tokens::RELEASE_VERSION, release.release_version.clone());
        self.tokens
            .insert(tokens::GIT_REVISION, release.git_revision.clone());

        let state: EnvironmentState = self
            .store
            .read_at(&release.git_revision, &self.store.layout().env_state(&env_name))?;
        self.run_steps(task, Some(&state))?;

        let mut outcome = TaskOutcome::new(task);
        outcome.tag = self.write_tag(&TagPayload::Release(release.clone()))?;
        outcome.release_version = Some(release.release_version);
        outcome.git_revision = Some(release.git_revision);
        Ok(outcome)
    }

    /// Copy the local descriptor into the store when its content differs.
    fn sync_config(&self) -> Result<bool> {
        let local = self.ctx.settings.workdir.join(DESCRIPTOR_FILE);
        if !local.is_file() {
            debug!("no local descriptor, shared copy is authoritative");
            return Ok(false);
        }
        let bytes = std::fs::read(&local)?;
        let path = self.store.layout().config();
        let shared = self.store.read_bytes(&path)?;
        if shared.as_deref().map(digest) == Some(digest(&bytes)) {
            debug!("shared descriptor is up to date");
            return Ok(false);
        }

        info!(path = %path.display(), "updating shared descriptor");
        self.store.write_bytes(&path, &bytes)?;
        self.store.publish(&[path])?;
        Ok(true)
    }

    /// Last package build number of this release.
    ///
    /// Uses the configured index, else the provider's, else the versions
    /// recorded in `LAST_BUILT`.
    fn last_build_number(&self) -> Result<Option<u64>> {
        let release = &self.ctx.namespace.release;
        if let Some(index) = &self.index {
            return last_package_build_number(release, index.as_ref());
        }
        if let Some(index) = self
            .provider
            .artifact_index(&self.tokens, &self.ctx.settings)?
        {
            return last_package_build_number(release, index.as_ref());
        }
        let path = self.store.layout().tag(tags::LAST_BUILT);
        match self.store.read::<BuildTag>(&path)? {
            Some(built) => last_package_build_number(release, &built),
            None => Ok(None),
        }
    }

    fn substitute(&self) -> Result<Vec<PathBuf>> {
        let rules = self.descriptor.substitution_rules()?;
        let changed = apply_rules(
            rules,
            &self.tokens,
            &self.ctx.settings.workdir,
            self.env.as_ref(),
        )?;
        info!(files = changed.len(), "substituted tokens");
        Ok(changed)
    }

    fn run_steps(&self, task: Task, state: Option<&EnvironmentState>) -> Result<()> {
        let ctx = StepContext {
            namespace: &self.ctx.namespace,
            descriptor: &self.descriptor,
            tokens: &self.tokens,
            settings: &self.ctx.settings,
            environment: self.ctx.environment.as_ref(),
            state,
        };
        let steps: Vec<Action> = self.provider.steps_for(task, &ctx)?;
        let total = steps.len();
        for (i, step) in steps.iter().enumerate() {
            info!(task = %task, step = i + 1, total, action = %step, "step");
            self.executor.execute(step)?;
        }
        Ok(())
    }

    fn write_tag(&self, payload: &TagPayload) -> Result<Option<String>> {
        TagWriter::new(&self.store).write_tag(
            self.ctx.task,
            self.ctx.environment.as_ref(),
            payload,
        )
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
