

use rmcp::{
    handler::server::{
        router::prompt::PromptRouter,
        router::tool::ToolRouter,
        wrapper::Parameters,
    },
    model::*,
    prompt, prompt_handler, prompt_router,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::conversation::{CheckpointError, ConversationStore};
use crate::core::config::WayfinderConfig;
use crate::llm::synthesis::INSUFFICIENT_INFORMATION;
use crate::workflow::{RetrievalWorkflow, WorkflowError};


#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskParams {
    #[schemars(description = "Travel question, e.g. 'Best hotels in Paris for couples'")]
    pub query: String,
    #[schemars(description = "Conversation thread to continue; a new thread is started when omitted")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClearThreadParams {
    #[schemars(description = "Conversation thread to reset")]
    pub thread_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ThreadHistoryParams {
    #[schemars(description = "Conversation thread to read")]
    pub thread_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TripBriefArgs {
    #[schemars(description = "Destination city or country")]
    pub destination: String,
    #[schemars(description = "Traveller type: business, couple, family, solo or group")]
    pub traveller_type: Option<String>,
}


#[derive(Clone)]
pub struct WayfinderMcpServer {
    workflow: Arc<RetrievalWorkflow>,
    config: Arc<WayfinderConfig>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl WayfinderMcpServer {
    pub fn new(workflow: RetrievalWorkflow, config: WayfinderConfig) -> Self {
        Self {
            workflow: Arc::new(workflow),
            config: Arc::new(config),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    fn convert_error(err: WorkflowError) -> McpError {
        match err {
            WorkflowError::Contract(e) => McpError::invalid_params(e.to_string(), None),
            WorkflowError::History(CheckpointError::InvalidThreadId(id)) => {
                McpError::invalid_params(format!("Invalid thread id: {}", id), None)
            }
            other => McpError::internal_error(other.to_string(), None),
        }
    }

    fn result_to_json<T: Serialize>(result: T) -> Result<String, McpError> {
        serde_json::to_string_pretty(&result).map_err(|e| McpError::internal_error(e.to_string(), None))
    }
}

#[tool_router]
impl WayfinderMcpServer {
    #[tool(description = "Answer a hotel or travel question using graph queries and vector search. Continues the given thread, resolving references like 'there' against earlier turns. Returns: {thread_id, turn_index, rewritten_query, intent, entities, template, indexes, items, answer, status}")]
    async fn ask_travel_question(
        &self,
        Parameters(params): Parameters<AskParams>,
    ) -> Result<CallToolResult, McpError> {
        let thread_id = params
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(ConversationStore::new_thread_id);
        info!("Question on {}: {}", thread_id, crate::safe_truncate(&params.query, 50));

        match self.workflow.handle_turn(&thread_id, &params.query).await {
            Ok(outcome) => {
                info!("Answered with {} items ({})", outcome.items.len(), outcome.status);
                let json = Self::result_to_json(&outcome)?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) if e.is_insufficient_information() => {
                warn!("Retrieval failed for {}: {}", thread_id, e);
                let json = Self::result_to_json(json!({
                    "thread_id": thread_id,
                    "answer": INSUFFICIENT_INFORMATION,
                    "status": "retrieval_failed",
                }))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => Err(Self::convert_error(e)),
        }
    }

    #[tool(description = "Forget the history of a conversation thread. Returns: {thread_id, cleared: true}")]
    async fn clear_thread(
        &self,
        Parameters(params): Parameters<ClearThreadParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Clearing thread {}", params.thread_id);

        self.workflow
            .store()
            .clear(&params.thread_id)
            .await
            .map_err(|e| Self::convert_error(e.into()))?;

        let json = Self::result_to_json(json!({"thread_id": params.thread_id, "cleared": true}))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Recorded turns of a conversation thread. Returns: {thread_id, turns: [{turn_index, raw_query, rewritten_query, intent, entities, result_count, answer, status, timestamp}]}")]
    async fn get_thread_history(
        &self,
        Parameters(params): Parameters<ThreadHistoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let thread = self
            .workflow
            .store()
            .snapshot(&params.thread_id)
            .await
            .map_err(|e| Self::convert_error(e.into()))?;

        let json = Self::result_to_json(&thread)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Reload vector indexes from disk after an offline rebuild. In-flight questions finish on the previous generation. Returns: {version, indexes}")]
    async fn reload_indexes(&self) -> Result<CallToolResult, McpError> {
        info!("Reloading vector indexes from {}", self.config.indexes.directory.display());

        let registry = self.workflow.registry().clone();
        let specs = self.config.indexes.indexes.clone();
        let reload = {
            let registry = registry.clone();
            tokio::task::spawn_blocking(move || registry.reload(&specs))
        };
        let version = reload
            .await
            .map_err(|e| McpError::internal_error(format!("index reload task failed: {}", e), None))?
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let names: Vec<String> = registry.snapshot().names().map(str::to_string).collect();
        let json = Self::result_to_json(json!({"version": version, "indexes": names}))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[prompt_router]
impl WayfinderMcpServer {
    #[prompt(
        name = "trip_brief",
        description = "Plan a short hotel brief for a destination and traveller type"
    )]
    async fn trip_brief(
        &self,
        Parameters(args): Parameters<TripBriefArgs>,
    ) -> Result<GetPromptResult, McpError> {
        let who = args
            .traveller_type
            .map(|t| format!(" for {} travellers", t))
            .unwrap_or_default();

        let messages = vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Prepare a hotel brief for {destination}{who}.

Use ask_travel_question on one thread_id for every step:
1. Find hotels in {destination}
2. Ask which of them suit the traveller type best
3. Ask for the best location scores there
4. Summarise the top three with their scores",
                destination = args.destination,
                who = who
            ),
        )];

        Ok(GetPromptResult {
            description: Some(format!("Hotel brief for {}", args.destination)),
            messages,
        })
    }
}

#[tool_handler]
#[prompt_handler]
impl ServerHandler for WayfinderMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "wayfinder".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Hotel travel assistant over a knowledge graph of hotels, reviews and visa rules. \
                 Use ask_travel_question with a stable thread_id so follow-up questions can refer to \
                 earlier ones, and clear_thread to start over."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![
                RawResource::new("config://wayfinder", "wayfinder-config".to_string()).no_annotation(),
                RawResource::new("status://indexes", "vector-index-status".to_string()).no_annotation(),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match uri.as_str() {
            "config://wayfinder" => {
                let config = &self.config;
                let content = Self::result_to_json(json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "graph": {
                        "backend": config.graph.backend,
                        "url": config.graph.base_url(),
                        "database": config.graph.database,
                    },
                    "llm": {
                        "provider": config.llm.provider,
                        "model": config.llm.model,
                    },
                    "embeddings": {
                        "provider": config.embeddings.provider,
                        "model": config.embeddings.model,
                    },
                    "retrieval": config.retrieval,
                    "contract_mode": config.contract_mode,
                    "tools": ["ask_travel_question", "clear_thread", "get_thread_history", "reload_indexes"],
                }))?;

                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(content, uri)],
                })
            }
            "status://indexes" => {
                let snapshot = self.workflow.registry().snapshot();
                let indexes: Vec<_> = snapshot
                    .indexes()
                    .map(|index| {
                        json!({
                            "name": index.name(),
                            "model": index.model(),
                            "dimension": index.dimension(),
                            "vectors": index.len(),
                        })
                    })
                    .collect();
                let content = Self::result_to_json(json!({
                    "version": snapshot.version,
                    "loaded_at": snapshot.loaded_at,
                    "indexes": indexes,
                    "threads": self.workflow.store().thread_count(),
                }))?;

                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(content, uri)],
                })
            }
            _ => Err(McpError::resource_not_found(
                format!("Unknown resource: {}", uri),
                Some(json!({ "uri": uri })),
            )),
        }
    }
}


pub async fn run_server() -> anyhow::Result<()> {
    info!("Initializing Wayfinder MCP server...");

    let config = match std::env::var("WAYFINDER_CONFIG") {
        Ok(path) => WayfinderConfig::from_file(path)?,
        Err(_) => WayfinderConfig::from_env(),
    };
    let workflow = crate::workflow::from_config(&config).await?;

    info!("Wayfinder MCP server ready");
    info!("   Graph: {} at {}", config.graph.backend, config.graph.base_url());
    info!("   LLM: {}/{}", config.llm.provider, config.llm.model);
    info!(
        "   Indexes: {} from {}",
        config.indexes.indexes.len(),
        config.indexes.directory.display()
    );

    let server = WayfinderMcpServer::new(workflow, config);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexSpec;
    use crate::core::intent::Intent;
    use crate::search::{VectorIndex, VectorIndexRegistry};
    use crate::testing::{FixedClassifier, FixedExtractor, ScriptedGraph, ScriptedSynthesizer, TableEmbedder};
    use crate::workflow::WorkflowComponents;
    use serde_json::Value;
    use std::path::Path;

    fn save_index(dir: &Path, name: &str, ids: &[&str]) {
        let vectors = ids.iter().map(|_| vec![1.0, 0.0]).collect();
        let mapping = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (i.to_string(), id.to_string()))
            .collect();
        VectorIndex::from_parts(name, "minilm", 2, vectors, mapping)
            .unwrap()
            .save(&IndexSpec::new(name), dir)
            .unwrap();
    }

    fn server_over(dir: &Path) -> WayfinderMcpServer {
        let mut config = WayfinderConfig::default();
        config.indexes.directory = dir.to_path_buf();
        config.indexes.enrich_hits = false;
        let registry =
            VectorIndexRegistry::load(&config.indexes.indexes, dir, "minilm").unwrap();

        let workflow = RetrievalWorkflow::new(
            WorkflowComponents {
                classifier: Arc::new(FixedClassifier(Intent::HotelSearch)),
                extractor: Arc::new(FixedExtractor::new(json!({}))),
                synthesizer: Arc::new(ScriptedSynthesizer::new()),
                graph: Arc::new(ScriptedGraph::with_rows(vec![])),
                embedder: Arc::new(TableEmbedder::new()),
                registry: Arc::new(registry),
                store: Arc::new(ConversationStore::new()),
            },
            &config,
        )
        .unwrap();
        WayfinderMcpServer::new(workflow, config)
    }

    #[tokio::test]
    async fn test_reload_indexes_swaps_generation() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["hotel", "visa", "review"] {
            save_index(dir.path(), name, &["a"]);
        }
        let server = server_over(dir.path());

        save_index(dir.path(), "hotel", &["a", "b", "c"]);
        let result = server.reload_indexes().await.unwrap();
        let text = &result.content[0].as_text().unwrap().text;
        let body: Value = serde_json::from_str(text).unwrap();

        assert_eq!(body["version"], 2);
        assert_eq!(body["indexes"].as_array().unwrap().len(), 3);
        let snapshot = server.workflow.registry().snapshot();
        assert_eq!(snapshot.get("hotel").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_reload_reports_error_and_keeps_generation() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["hotel", "visa", "review"] {
            save_index(dir.path(), name, &["a"]);
        }
        let server = server_over(dir.path());

        std::fs::remove_file(IndexSpec::new("visa").index_path(dir.path())).unwrap();
        assert!(server.reload_indexes().await.is_err());
        assert_eq!(server.workflow.registry().snapshot().version, 1);
    }
}
