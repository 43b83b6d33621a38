

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString, IntoStaticStr};

use super::error::{Result, WayfinderError};
use crate::{DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL, DEFAULT_OLLAMA_URL};


/// How contract violations (unknown entity keys, untyped values) are treated.
/// Lenient logs and drops them; strict fails the turn and suits tests and development.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ContractMode {
    Strict,
    #[default]
    Lenient,
}


/// Which retrieval branches a turn runs, and whether it reads conversation history.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RetrievalMode {
    /// Templated graph queries only.
    BaselineOnly,
    /// Vector search only.
    EmbeddingOnly,
    /// Both branches, each turn stands alone.
    Hybrid,
    #[default]
    ConversationalHybrid,
}

impl RetrievalMode {
    pub fn runs_structured(self) -> bool {
        !matches!(self, RetrievalMode::EmbeddingOnly)
    }

    pub fn runs_vector(self) -> bool {
        !matches!(self, RetrievalMode::BaselineOnly)
    }

    /// Rewriting references and feeding prior turns to synthesis.
    pub fn uses_history(self) -> bool {
        matches!(self, RetrievalMode::ConversationalHybrid)
    }
}


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GraphBackendKind {
    #[default]
    Neo4j,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackendKind::Neo4j,
            host: "localhost".to_string(),
            port: 7474,
            database: "neo4j".to_string(),
            username: Some("neo4j".to_string()),
            password: None,
            timeout_secs: 30,
        }
    }
}

impl GraphConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub url: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            url: DEFAULT_OLLAMA_URL.to_string(),
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            timeout_secs: 30,
            cache_size: crate::DEFAULT_CACHE_SIZE,
            cache_ttl_secs: crate::DEFAULT_CACHE_TTL,
        }
    }
}


/// One named vector index and the artifacts it is loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// Embedding model the index was built with; the default model when absent.
    #[serde(default)]
    pub model: Option<String>,
    pub index_file: PathBuf,
    pub mapping_file: PathBuf,
}

impl IndexSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: None,
            index_file: PathBuf::from(format!("{}_index.json", name)),
            mapping_file: PathBuf::from(format!("{}_id_mapping.json", name)),
        }
    }

    pub fn index_path(&self, dir: &Path) -> PathBuf {
        resolve(dir, &self.index_file)
    }

    pub fn mapping_path(&self, dir: &Path) -> PathBuf {
        resolve(dir, &self.mapping_file)
    }
}

fn resolve(dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        dir.join(file)
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub directory: PathBuf,
    pub indexes: Vec<IndexSpec>,
    /// Attach graph details to vector hits before merging.
    pub enrich_hits: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/indexes"),
            indexes: vec![
                IndexSpec::new("hotel"),
                IndexSpec::new("visa"),
                IndexSpec::new("review"),
            ],
            enrich_hits: true,
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    pub vector_top_k: usize,
    pub similarity_threshold: f32,
    pub max_vector_results: usize,
    pub max_context_items: usize,
    pub max_context_tokens: usize,
    pub cross_index_boost: f32,
    pub structured_match_boost: f32,
    pub structured_base_score: f32,
    pub structured_timeout_ms: u64,
    pub vector_timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::ConversationalHybrid,
            vector_top_k: 10,
            similarity_threshold: 0.7,
            max_vector_results: 10,
            max_context_items: 15,
            max_context_tokens: 2500,
            cross_index_boost: 0.5,
            structured_match_boost: 0.2,
            structured_base_score: 1.0,
            structured_timeout_ms: 10_000,
            vector_timeout_ms: 10_000,
            retry_backoff_ms: 200,
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub history_window: usize,
    pub message_preview_chars: usize,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            message_preview_chars: 150,
            checkpoint_dir: None,
        }
    }
}


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfinderConfig {
    pub graph: GraphConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingConfig,
    pub indexes: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    pub contract_mode: ContractMode,
}

impl WayfinderConfig {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.apply_env();
        config
    }

    /// Loads a config file (TOML, YAML or JSON by extension) layered under
    /// `WAYFINDER_<SECTION>__<FIELD>` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("WAYFINDER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| WayfinderError::configuration(format!("{}: {}", path.display(), e)))?;

        let mut config: WayfinderConfig = settings
            .try_deserialize()
            .map_err(|e| WayfinderError::configuration(e.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(backend) = std::env::var("WAYFINDER_GRAPH_BACKEND") {
            if let Ok(kind) = backend.parse() {
                self.graph.backend = kind;
            }
        }
        if let Ok(host) = std::env::var("WAYFINDER_GRAPH_HOST") {
            self.graph.host = host;
        }
        if let Some(port) = std::env::var("WAYFINDER_GRAPH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.graph.port = port;
        }
        if let Ok(user) = std::env::var("WAYFINDER_GRAPH_USER") {
            self.graph.username = Some(user);
        }
        if let Ok(password) = std::env::var("WAYFINDER_GRAPH_PASSWORD") {
            self.graph.password = Some(password);
        }
        if let Ok(model) = std::env::var("WAYFINDER_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("WAYFINDER_LLM_URL") {
            self.llm.url = url;
        }
        if let Ok(provider) = std::env::var("WAYFINDER_EMBEDDING_PROVIDER") {
            self.embeddings.provider = provider;
        }
        if let Ok(model) = std::env::var("WAYFINDER_EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Ok(url) = std::env::var("WAYFINDER_EMBEDDING_URL") {
            self.embeddings.url = url;
        }
        if let Ok(key) = std::env::var("WAYFINDER_EMBEDDING_API_KEY") {
            self.embeddings.api_key = Some(key);
        }
        if let Ok(dir) = std::env::var("WAYFINDER_INDEX_DIR") {
            self.indexes.directory = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("WAYFINDER_CHECKPOINT_DIR") {
            self.conversation.checkpoint_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = std::env::var("WAYFINDER_RETRIEVAL_MODE")
            .ok()
            .and_then(|m| m.parse().ok())
        {
            self.retrieval.mode = mode;
        }
        if let Ok(mode) = std::env::var("WAYFINDER_CONTRACT_MODE") {
            if let Ok(mode) = mode.parse() {
                self.contract_mode = mode;
            }
        }
    }


    pub fn validate(&self) -> Result<()> {
        if self.indexes.indexes.is_empty() {
            return Err(WayfinderError::configuration("no vector indexes configured"));
        }

        let mut seen = HashSet::new();
        for spec in &self.indexes.indexes {
            if spec.name.trim().is_empty() {
                return Err(WayfinderError::configuration("index name must not be empty"));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(WayfinderError::configuration(format!(
                    "duplicate index name: {}",
                    spec.name
                )));
            }
        }

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.similarity_threshold) {
            return Err(WayfinderError::configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                r.similarity_threshold
            )));
        }
        if r.vector_top_k == 0 || r.max_vector_results == 0 || r.max_context_items == 0 {
            return Err(WayfinderError::configuration(
                "vector_top_k, max_vector_results and max_context_items must be positive",
            ));
        }
        if r.cross_index_boost < 0.0 || r.structured_match_boost < 0.0 {
            return Err(WayfinderError::configuration("boosts must not be negative"));
        }

        for (label, raw) in [
            ("llm.url", self.llm.url.as_str()),
            ("embeddings.url", self.embeddings.url.as_str()),
        ] {
            url::Url::parse(raw)
                .map_err(|e| WayfinderError::configuration(format!("{} '{}': {}", label, raw, e)))?;
        }

        Ok(())
    }
}
