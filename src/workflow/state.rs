

use serde::Serialize;
use strum::{Display, IntoStaticStr};
use tracing::debug;

use super::WorkflowError;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
pub enum WorkflowState {
    Rewriting,
    Classifying,
    Routing,
    CasualResponse,
    ParallelRetrieval,
    Merging,
    AnswerPending,
    HistoryUpdate,
    Done,
}

impl WorkflowState {
    /// Forward edges of the turn graph. Every unfinished state may jump to
    /// `HistoryUpdate` so failed or cancelled turns are still recorded.
    pub fn can_advance_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;

        match (self, next) {
            (HistoryUpdate, Done) => true,
            (HistoryUpdate | Done, _) => false,
            (_, HistoryUpdate) => true,
            (Rewriting, Classifying) => true,
            (Classifying, Routing | CasualResponse) => true,
            (Routing, ParallelRetrieval) => true,
            (ParallelRetrieval, Merging) => true,
            (CasualResponse | Merging, AnswerPending) => true,
            _ => false,
        }
    }
}


/// States visited by one turn, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTrace {
    states: Vec<WorkflowState>,
}

impl StateTrace {
    pub fn new() -> Self {
        Self {
            states: vec![WorkflowState::Rewriting],
        }
    }

    pub fn current(&self) -> WorkflowState {
        self.states
            .last()
            .copied()
            .unwrap_or(WorkflowState::Rewriting)
    }

    pub fn advance(&mut self, next: WorkflowState) -> Result<(), WorkflowError> {
        let from = self.current();
        if !from.can_advance_to(next) {
            return Err(WorkflowError::InvalidTransition { from, to: next });
        }
        debug!("Workflow {} -> {}", from, next);
        self.states.push(next);
        Ok(())
    }

    pub fn visited(&self, state: WorkflowState) -> bool {
        self.states.contains(&state)
    }

    pub fn count(&self, state: WorkflowState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }

    pub fn states(&self) -> &[WorkflowState] {
        &self.states
    }
}

impl Default for StateTrace {
    fn default() -> Self {
        Self::new()
    }
}
