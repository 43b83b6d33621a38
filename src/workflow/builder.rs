

use std::sync::Arc;
use tracing::info;

use super::engine::{RetrievalWorkflow, WorkflowComponents};
use crate::conversation::{ConversationStore, JsonlCheckpointer};
use crate::core::config::WayfinderConfig;
use crate::core::error::{Result, WayfinderError};
use crate::db::create_executor;
use crate::llm::{
    EmbeddingGenerator, LlmAnswerSynthesizer, LlmEntityExtractor, LlmIntentClassifier, LlmProvider,
    OllamaProvider,
};
use crate::search::VectorIndexRegistry;


fn create_llm(config: &WayfinderConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.llm.provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::from_config(&config.llm)?)),
        other => Err(WayfinderError::configuration(format!(
            "Unknown LLM provider: {}. Supported: ollama",
            other
        ))),
    }
}

/// Wires production collaborators from `config`: Ollama for classification,
/// extraction and answers, the configured graph backend, on-disk indexes and,
/// when a checkpoint directory is set, durable conversation history.
pub async fn from_config(config: &WayfinderConfig) -> Result<RetrievalWorkflow> {
    config.validate()?;

    let llm = create_llm(config)?;
    info!("LLM provider: {}/{}", llm.provider_name(), llm.model_name());
    let graph = create_executor(&config.graph)?;
    let embedder = Arc::new(EmbeddingGenerator::new(&config.embeddings)?);
    let registry = Arc::new(VectorIndexRegistry::load(
        &config.indexes.indexes,
        &config.indexes.directory,
        &config.embeddings.model,
    )?);

    let store = match &config.conversation.checkpoint_dir {
        Some(dir) => {
            let checkpointer = JsonlCheckpointer::new(dir).await?;
            ConversationStore::with_checkpointer(Arc::new(checkpointer))
        }
        None => ConversationStore::new(),
    };

    info!(
        "Building workflow: graph={} at {}, llm={}/{}, {} indexes",
        config.graph.backend,
        config.graph.base_url(),
        config.llm.provider,
        config.llm.model,
        config.indexes.indexes.len()
    );

    let workflow = RetrievalWorkflow::new(
        WorkflowComponents {
            classifier: Arc::new(LlmIntentClassifier::new(llm.clone())),
            extractor: Arc::new(LlmEntityExtractor::new(llm.clone())),
            synthesizer: Arc::new(LlmAnswerSynthesizer::new(llm)),
            graph,
            embedder,
            registry,
            store: Arc::new(store),
        },
        config,
    )?;

    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_llm_provider_rejected() {
        let mut config = WayfinderConfig::default();
        config.llm.provider = "telepathy".to_string();
        let err = from_config(&config).await.err().unwrap();
        assert!(matches!(err, WayfinderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_missing_index_artifacts_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WayfinderConfig::default();
        config.indexes.directory = dir.path().to_path_buf();
        let err = from_config(&config).await.err().unwrap();
        assert!(matches!(err, WayfinderError::VectorIndex(_)));
    }
}
