//! Stagehand-Store: git-backed metadata store
//!
//! This crate provides the persistence layer for Stagehand. Facts about
//! builds, releases, deployments and tests live as YAML files in a shared
//! git repository; build agents agree on them by publishing commits to a
//! single upstream history.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: durable writes under contention, insertion-ordered history.
//!
//! ## Key Components
//!
//! - `VersionedStore`: read/write files of one namespace, publish with retry
//! - `Vcs`: version control capability (`GitCli`, or `fakes::ScriptedVcs`)
//! - `RetryPolicy`: bounded fixed-interval retry of contended steps
//! - `ReleaseLedger`: append-only release history schema

mod error;
pub mod fakes;
mod layout;
mod ledger;
pub mod retry;
mod store;
pub mod vcs;

pub use error::StoreError;
pub use layout::{Namespace, StoreLayout};
pub use ledger::{scalar_to_string, LedgerEntry, ReleaseLedger};
pub use retry::{classify, FailureClass, RetryPolicy, Sleeper, ThreadSleeper};
pub use store::{PublishOutcome, VersionedStore};
pub use vcs::{GitCli, Vcs, VcsFailure, VcsResult};

/// Result type for stagehand-store operations
pub type Result<T> = std::result::Result<T, StoreError>;
