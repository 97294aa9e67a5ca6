//! Bounded, fixed-interval retry for shared-store publish steps.
//!
//! Writers race to append to one shared history. Lock contention is
//! expected and clears on its own, so transient lock messages are retried
//! after a fixed sleep. Anything else is surfaced immediately.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::error::StoreError;
use crate::vcs::{VcsFailure, VcsResult};

/// Default number of attempts per publish step.
pub const DEFAULT_ATTEMPTS: u32 = 6;

/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// How often and how long to retry a contended step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub attempts: u32,
    /// Fixed pause between attempts (no exponential growth).
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

/// Source of blocking pauses, injectable so tests do not wait.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] that blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What a failed step's output means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Another writer holds a lock; try again later.
    Transient,
    /// Commit found nothing to record; an equivalent state is already published.
    NothingToCommit,
    /// Unrecognised failure; give up.
    Fatal,
}

fn transient_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(Unable to create|failed to lock|cannot lock HEAD ref|cannot lock ref|index\.lock)")
            .expect("transient lock pattern is valid")
    })
}

fn nothing_to_commit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(nothing (added )?to commit|no changes added to commit)")
            .expect("nothing-to-commit pattern is valid")
    })
}

/// Classify the output of a failed step.
pub fn classify(output: &str) -> FailureClass {
    if transient_pattern().is_match(output) {
        FailureClass::Transient
    } else if nothing_to_commit_pattern().is_match(output) {
        FailureClass::NothingToCommit
    } else {
        FailureClass::Fatal
    }
}

/// Terminal result of a retried step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded with this output.
    Done(String),
    /// The step reported nothing to commit and the caller allowed that.
    NothingToCommit,
}

/// Run `step` until it succeeds, hits a non-transient failure, or the
/// policy's attempts run out.
///
/// When `accept_nothing_to_commit` is set, a "nothing to commit" failure
/// ends the loop successfully without retrying.
pub fn run_with_retry<F>(
    name: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    accept_nothing_to_commit: bool,
    mut step: F,
) -> Result<StepOutcome, StoreError>
where
    F: FnMut() -> VcsResult,
{
    let attempts = policy.attempts.max(1);
    let mut last = VcsFailure::new("");

    for attempt in 1..=attempts {
        let failure = match step() {
            Ok(output) => return Ok(StepOutcome::Done(output)),
            Err(failure) => failure,
        };

        match classify(&failure.output) {
            FailureClass::NothingToCommit if accept_nothing_to_commit => {
                return Ok(StepOutcome::NothingToCommit);
            }
            FailureClass::Transient => {
                warn!(
                    step = name,
                    attempt,
                    attempts,
                    output = %failure.output,
                    "transient lock contention"
                );
                last = failure;
                if attempt < attempts {
                    sleeper.sleep(policy.backoff);
                }
            }
            FailureClass::NothingToCommit | FailureClass::Fatal => {
                return Err(StoreError::Vcs {
                    step: name.to_string(),
                    output: failure.output,
                });
            }
        }
    }

    Err(StoreError::RetriesExhausted {
        step: name.to_string(),
        attempts,
        output: last.output,
    })
}
