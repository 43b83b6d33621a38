

pub mod classifier;
pub mod embeddings;
pub mod extractor;
pub mod providers;
pub mod synthesis;

pub use classifier::{IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier};
pub use embeddings::{Embedder, EmbeddingError, EmbeddingGenerator};
pub use extractor::{EntityExtractor, LlmEntityExtractor, PatternEntityExtractor, RawEntities};
pub use providers::{LlmMetadata, LlmProvider, LlmProviderError, OllamaProvider};
pub use synthesis::{AnswerRequest, AnswerSynthesizer, LlmAnswerSynthesizer, casual_response};
