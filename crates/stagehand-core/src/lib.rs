//! Stagehand Core Library
//!
//! Project lifecycle orchestration on top of `stagehand-store`: versioning,
//! tags, token substitution, project types and the task state machine.

pub mod action;
pub mod context;
pub mod descriptor;
pub mod environment;
pub mod error;
pub mod fakes;
pub mod job;
pub mod lifecycle;
pub mod provider;
pub mod substitute;
pub mod tags;
pub mod telemetry;
pub mod tokens;
pub mod versioning;

pub use action::{Action, ActionExecutor, SystemExecutor};
pub use context::{RunContext, Settings, Task};
pub use descriptor::{ProjectDescriptor, SubstitutionRule};
pub use environment::{EnvironmentName, EnvironmentSpec, EnvironmentState, Stage};
pub use error::{Result, StagehandError};
pub use job::JobName;
pub use lifecycle::{load_descriptor, Lifecycle, TaskOutcome};
pub use provider::{provider_for, BuildStepProvider, ProjectType, StepContext};
pub use tags::{tag_name, BuildTag, ReleaseTag, TagPayload, TagWriter};
pub use telemetry::init_tracing;
pub use tokens::TokenTable;
pub use versioning::{
    last_package_build_number, next_package_build_number, peek_next_release, ArtifactIndex,
    MavenRepositoryIndex, ReleaseVersioner,
};

/// Stagehand version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
