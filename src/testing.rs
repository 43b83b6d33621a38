

//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::core::intent::Intent;
use crate::db::{GraphError, GraphExecutor, Row};
use crate::llm::classifier::IntentClassifier;
use crate::llm::embeddings::{Embedder, EmbeddingError};
use crate::llm::extractor::{EntityExtractor, RawEntities};
use crate::llm::providers::LlmProviderError;
use crate::llm::synthesis::{AnswerRequest, AnswerSynthesizer};


fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}


/// Graph executor answering from scripted rows, optionally failing first.
pub struct ScriptedGraph {
    default_rows: Vec<Row>,
    per_template: HashMap<String, Vec<Row>>,
    failures: Mutex<(usize, Option<GraphError>)>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ScriptedGraph {
    pub fn with_rows(values: Vec<Value>) -> Self {
        Self {
            default_rows: rows(values),
            per_template: HashMap::new(),
            failures: Mutex::new((0, None)),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The first `count` calls fail with `error`, later ones return `values`.
    pub fn failing_then(count: usize, error: GraphError, values: Vec<Value>) -> Self {
        let graph = Self::with_rows(values);
        *graph.failures.lock() = (count, Some(error));
        graph
    }

    pub fn always_failing(error: GraphError) -> Self {
        Self::failing_then(usize::MAX, error, Vec::new())
    }

    pub fn on(mut self, template: &str, values: Vec<Value>) -> Self {
        self.per_template.insert(template.to_string(), rows(values));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().clone()
    }

    pub fn templates_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl GraphExecutor for ScriptedGraph {
    async fn execute(
        &self,
        template: &str,
        _statement: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Row>, GraphError> {
        self.calls.lock().push((template.to_string(), params.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock();
            if failures.0 > 0 {
                failures.0 -= 1;
                if let Some(error) = &failures.1 {
                    return Err(error.clone());
                }
            }
        }

        Ok(self
            .per_template
            .get(template)
            .cloned()
            .unwrap_or_else(|| self.default_rows.clone()))
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}


/// Embedder with a fixed text table. Unknown text hashes to a unit vector.
pub struct TableEmbedder {
    any_model: HashMap<String, Vec<f32>>,
    per_model: HashMap<(String, String), Vec<f32>>,
    dimension: usize,
    failing: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl TableEmbedder {
    pub fn new() -> Self {
        Self {
            any_model: HashMap::new(),
            per_model: HashMap::new(),
            dimension: 2,
            failing: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.any_model.insert(text.to_string(), vector);
        self
    }

    pub fn with_model(mut self, model: &str, text: &str, vector: Vec<f32>) -> Self {
        self.per_model
            .insert((model.to_string(), text.to_string()), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// (text, model) per call.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                ((hasher.finish() as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
            })
            .collect();
        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            result.iter_mut().for_each(|v| *v /= norm);
        }
        result
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().push((text.to_string(), model.to_string()));
        if self.failing {
            return Err(EmbeddingError::InvalidResponse("embedding service unreachable".to_string()));
        }
        if text.is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        let vector = self
            .per_model
            .get(&(model.to_string(), text.to_string()))
            .or_else(|| self.any_model.get(text))
            .cloned()
            .unwrap_or_else(|| self.hash_to_vector(text));
        Ok(vector)
    }

    fn default_model(&self) -> &str {
        "minilm"
    }
}


pub struct FixedClassifier(pub Intent);

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _query: &str) -> Intent {
        self.0
    }
}


/// Returns the same raw entities for every query and remembers what it was asked.
pub struct FixedExtractor {
    entities: RawEntities,
    calls: Mutex<Vec<(String, Intent)>>,
}

impl FixedExtractor {
    pub fn new(entities: Value) -> Self {
        Self {
            entities: entities.as_object().cloned().unwrap_or_default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Intent)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EntityExtractor for FixedExtractor {
    async fn extract(&self, query: &str, intent: Intent) -> RawEntities {
        self.calls.lock().push((query.to_string(), intent));
        self.entities.clone()
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub query: String,
    pub intent: Intent,
    pub context: String,
    pub conversation: String,
}

/// Answers with a fixed prefix plus the query; can stall or fail.
pub struct ScriptedSynthesizer {
    fail: bool,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            fail: false,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AnswerSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: AnswerRequest<'_>) -> Result<String, LlmProviderError> {
        self.requests.lock().push(RecordedRequest {
            query: request.query.to_string(),
            intent: request.intent,
            context: request.context.to_string(),
            conversation: request.conversation.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LlmProviderError::Provider("model offline".to_string()));
        }
        Ok(format!("Answer to: {}", request.query))
    }
}
