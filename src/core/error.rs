

use thiserror::Error;

use super::entities::EntityError;
use crate::conversation::checkpoint::CheckpointError;
use crate::db::GraphError;
use crate::llm::embeddings::EmbeddingError;
use crate::llm::providers::base::LlmProviderError;
use crate::search::router::RouterError;
use crate::search::vector::VectorIndexError;
use crate::workflow::WorkflowError;

#[derive(Error, Debug)]
pub enum WayfinderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Llm(#[from] LlmProviderError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WayfinderError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, WayfinderError>;
