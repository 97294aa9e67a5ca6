//! Stagehand - project build/release orchestrator CLI
//!
//! The `stagehand` command runs one lifecycle task of a project and records
//! the outcome in the shared metadata repository.
//!
//! ## Commands
//!
//! - `run`: execute build, devbuild, assemble, deploy or test
//! - `next-release`: print the release version the next assemble allocates
//! - `tag`: print a tag as JSON
//!
//! The project and task come from explicit flags or from a job name of the
//! form `<domain>-<project>[-<release>]-<task>[-<env>]` (`JOB_NAME`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};

use stagehand_core::{
    load_descriptor, peek_next_release, EnvironmentName, JobName, Lifecycle, RunContext,
    Settings, SystemExecutor, TagWriter, Task, TaskOutcome,
};
use stagehand_store::{GitCli, Namespace, RetryPolicy, ThreadSleeper, VersionedStore};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Project build/release orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Working tree of the shared metadata repository
    #[arg(
        long,
        global = true,
        env = "STAGEHAND_CENTRAL_PATH",
        default_value = "/data/central/projects"
    )]
    central_path: PathBuf,

    /// Root directory environments are deployed under
    #[arg(
        long,
        global = true,
        env = "STAGEHAND_DEPLOY_ROOT",
        default_value = "/data/envs"
    )]
    deploy_root: PathBuf,

    /// Local maven home (default: ~/.m2)
    #[arg(long, global = true, env = "STAGEHAND_MAVEN_REPO")]
    maven_repo: Option<PathBuf>,

    /// Remote the shared repository publishes to
    #[arg(long, global = true, default_value = "origin")]
    remote: String,

    /// Branch the shared repository publishes to
    #[arg(long, global = true, default_value = "master")]
    branch: String,

    /// Attempts per contended publish step
    #[arg(long, global = true, default_value_t = 6)]
    retry_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, global = true, default_value_t = 5)]
    retry_backoff_secs: u64,

    /// Log actions instead of executing them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a lifecycle task
    Run {
        #[command(flatten)]
        target: Target,

        /// Task to run (overrides the job name)
        #[arg(long)]
        task: Option<Task>,

        /// Environment for deploy and test (overrides the job name)
        #[arg(long = "env")]
        environment: Option<EnvironmentName>,

        /// Project checkout to build in
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Build-run number for devbuild
        #[arg(long, env = "BUILD_NUMBER")]
        build_number: Option<String>,
    },

    /// Print the next release version without recording it
    NextRelease {
        #[command(flatten)]
        target: Target,
    },

    /// Print a tag as JSON
    Tag {
        /// Tag name, e.g. LAST_ASSEMBLED or LAST_DEPLOYED_PROD-1A
        name: String,

        #[command(flatten)]
        target: Target,
    },
}

/// Which project namespace a command addresses.
#[derive(Args, Debug, Clone, Default)]
struct Target {
    /// Job name, `<domain>-<project>[-<release>]-<task>[-<env>]`
    #[arg(long, env = "JOB_NAME")]
    job: Option<String>,

    /// Project domain (overrides the job name)
    #[arg(long)]
    domain: Option<String>,

    /// Project name (overrides the job name)
    #[arg(long)]
    project: Option<String>,

    /// Release line, e.g. 1.0 (overrides the job name)
    #[arg(long)]
    release: Option<String>,
}

impl Target {
    fn job(&self) -> Result<Option<JobName>> {
        self.job
            .as_deref()
            .map(|name| name.parse::<JobName>())
            .transpose()
            .context("Invalid job name")
    }

    /// Namespace from explicit flags, falling back to the job name.
    fn namespace(&self, job: Option<&JobName>) -> Result<Namespace> {
        let domain = self.domain.clone().or_else(|| job.map(|j| j.domain.clone()));
        let project = self.project.clone().or_else(|| job.map(|j| j.project.clone()));
        let release = self
            .release
            .clone()
            .or_else(|| job.map(|j| j.release.clone()))
            .unwrap_or_else(|| stagehand_core::job::DEFAULT_RELEASE.to_string());

        match (domain, project) {
            (Some(domain), Some(project)) => Ok(Namespace::new(domain, project, release)),
            _ => bail!("no project given: pass --job (or set JOB_NAME), or --domain and --project"),
        }
    }
}

impl Cli {
    fn settings(&self, workdir: PathBuf, build_number: Option<String>) -> Settings {
        let maven_repo = self.maven_repo.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".m2"))
                .unwrap_or_else(|| PathBuf::from(".m2"))
        });
        Settings {
            central_path: self.central_path.clone(),
            deploy_root: self.deploy_root.clone(),
            maven_repo,
            workdir,
            build_number,
            remote: self.remote.clone(),
            branch: self.branch.clone(),
            retry_attempts: self.retry_attempts,
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
            dry_run: self.dry_run,
        }
    }
}

fn open_store(settings: &Settings, namespace: Namespace) -> VersionedStore {
    let vcs = GitCli::new(&settings.remote, &settings.branch);
    VersionedStore::new(&settings.central_path, namespace, Box::new(vcs)).with_retry(
        RetryPolicy::new(settings.retry_attempts, settings.retry_backoff),
        Box::new(ThreadSleeper),
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stagehand_core::init_tracing(cli.json, level);

    match &cli.command {
        Commands::Run {
            target,
            task,
            environment,
            workdir,
            build_number,
        } => {
            let settings = cli.settings(workdir.clone(), build_number.clone());
            let outcome = cmd_run(settings, target, *task, environment.clone())?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::NextRelease { target } => {
            let settings = cli.settings(PathBuf::from("."), None);
            println!("{}", cmd_next_release(&settings, target)?);
            Ok(())
        }
        Commands::Tag { name, target } => {
            let settings = cli.settings(PathBuf::from("."), None);
            let tag = cmd_tag(&settings, target, name)?;
            println!("{}", serde_json::to_string_pretty(&tag)?);
            Ok(())
        }
    }
}

fn cmd_run(
    settings: Settings,
    target: &Target,
    task: Option<Task>,
    environment: Option<EnvironmentName>,
) -> Result<TaskOutcome> {
    let job = target.job()?;
    let namespace = target.namespace(job.as_ref())?;
    let task = match task.or_else(|| job.as_ref().map(|j| j.task)) {
        Some(task) => task,
        None => bail!("no task given: pass --task or a job name"),
    };
    let environment = environment.or_else(|| job.and_then(|j| j.environment));

    let store = open_store(&settings, namespace.clone());
    let descriptor = load_descriptor(&settings.workdir, &store)
        .with_context(|| format!("Failed to load project descriptor for {namespace}"))?;
    let source = GitCli::new(&settings.remote, &settings.branch);
    let executor = SystemExecutor::new(settings.dry_run);
    let ctx = RunContext::new(namespace, task, environment, settings)?;

    info!(task = %task, "starting");
    let mut lifecycle = Lifecycle::new(ctx, descriptor, store, Box::new(source), Box::new(executor))?;
    let outcome = lifecycle
        .run()
        .with_context(|| format!("Task {task} failed"))?;
    Ok(outcome)
}

fn cmd_next_release(settings: &Settings, target: &Target) -> Result<String> {
    let job = target.job()?;
    let store = open_store(settings, target.namespace(job.as_ref())?);
    peek_next_release(&store).context("Failed to read release history")
}

fn cmd_tag(settings: &Settings, target: &Target, name: &str) -> Result<Value> {
    let job = target.job()?;
    let store = open_store(settings, target.namespace(job.as_ref())?);
    let tag = TagWriter::new(&store)
        .read_tag(name)
        .with_context(|| format!("Failed to read tag {name}"))?;
    Ok(serde_json::to_value(tag)?)
}
