

pub mod enrich;
pub mod index;
pub mod registry;
pub mod searcher;
pub mod selector;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub use enrich::{EnrichedHit, HitEnricher};
pub use index::VectorIndex;
pub use registry::{RegistrySnapshot, VectorIndexRegistry};
pub use searcher::{MultiIndexSearcher, merge_hits};
pub use selector::IndexSelector;

use crate::llm::embeddings::EmbeddingError;


pub const HOTEL_INDEX: &str = "hotel";
pub const REVIEW_INDEX: &str = "review";
pub const VISA_INDEX: &str = "visa";


#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("Vector index not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid artifact for index {index}: {message}")]
    Artifact { index: String, message: String },

    #[error("Index {index} expects {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VectorIndexError {
    pub fn artifact(index: &str, message: impl Into<String>) -> Self {
        Self::Artifact {
            index: index.to_string(),
            message: message.into(),
        }
    }
}


/// One matching vector in one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity_id: String,
    pub index_name: String,
    pub similarity: f32,
}


/// An entity found by one or more indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
    pub entity_id: String,
    pub aggregate_score: f32,
    pub source_indexes: BTreeSet<String>,
    pub boosted: bool,
    /// Best similarity per contributing index.
    pub similarities: BTreeMap<String, f32>,
}

impl MergedHit {
    pub fn max_similarity(&self) -> f32 {
        self.similarities.values().copied().fold(0.0, f32::max)
    }
}
