//! In-memory test doubles for stagehand-core.
//!
//! Use these in tests to run a lifecycle without touching the host.

use std::sync::{Arc, Mutex};

use crate::action::{Action, ActionExecutor};
use crate::error::{Result, StagehandError};

#[derive(Debug, Default)]
struct ExecutorState {
    executed: Vec<Action>,
    fail_at: Option<usize>,
}

/// Records actions instead of performing them.
///
/// Clones share state, so a test can keep a handle after boxing one into a
/// lifecycle.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the action at zero-based position `index` (counted across all
    /// calls) with a non-zero exit.
    pub fn fail_at(&self, index: usize) {
        self.state.lock().unwrap().fail_at = Some(index);
    }

    /// Actions that ran successfully, in order.
    pub fn executed(&self) -> Vec<Action> {
        self.state.lock().unwrap().executed.clone()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn execute(&self, action: &Action) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_at == Some(state.executed.len()) {
            return Err(StagehandError::ActionFailed {
                action: action.to_string(),
                code: 1,
                output: "injected failure".to_string(),
            });
        }
        state.executed.push(action.clone());
        Ok(())
    }
}
