

pub mod builder;
pub mod engine;
pub mod state;

use thiserror::Error;

pub use builder::from_config;
pub use engine::{
    BranchStatus, CancelHandle, CancelSignal, RetrievalWorkflow, TurnOutcome, WorkflowComponents, cancel_pair,
};
pub use state::{StateTrace, WorkflowState};

use crate::conversation::CheckpointError;
use crate::core::entities::EntityError;
use crate::llm::providers::LlmProviderError;
use crate::search::vector::VectorIndexError;


#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Neither retrieval branch produced anything usable.
    #[error("Retrieval failed (structured: {structured}; vector: {vector})")]
    RetrievalFailed { structured: String, vector: String },

    #[error("Vector index misconfigured: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Entity contract violated: {0}")]
    Contract(#[from] EntityError),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(#[from] LlmProviderError),

    #[error("Conversation history unavailable: {0}")]
    History(#[from] CheckpointError),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Invalid workflow transition {from} -> {to}")]
    InvalidTransition { from: WorkflowState, to: WorkflowState },

    #[error("Workflow configuration error: {0}")]
    Configuration(String),
}

impl WorkflowError {
    /// Failures the user sees as "not enough information" rather than a fault.
    pub fn is_insufficient_information(&self) -> bool {
        matches!(self, WorkflowError::RetrievalFailed { .. })
    }
}
