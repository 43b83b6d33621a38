

pub mod conversation;
pub mod core;
pub mod db;
pub mod llm;
pub mod mcp;
pub mod search;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use utils::{safe_truncate, safe_truncate_ellipsis};


pub use conversation::{ConversationStore, ConversationThread, ConversationTurn, QueryRewriter, TurnStatus};
pub use core::config::WayfinderConfig;
pub use core::entities::{EntityBag, EntityKey};
pub use core::error::{Result, WayfinderError};
pub use core::intent::Intent;
pub use search::{
    IndexSelector, MultiIndexSearcher, QueryRouter, QueryTemplateLibrary, ResultMerger, StructuredRetriever,
    VectorIndexRegistry,
};
pub use workflow::{RetrievalWorkflow, TurnOutcome, WorkflowError};


pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";


pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";


pub const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";


pub const DEFAULT_CACHE_SIZE: usize = 1000;


pub const DEFAULT_CACHE_TTL: u64 = 300;
