

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::WorkflowError;
use super::state::{StateTrace, WorkflowState};
use crate::conversation::{
    ConversationStore, ConversationThread, QueryRewriter, TurnRecord, TurnStatus,
};
use crate::core::config::{ContractMode, RetrievalMode, WayfinderConfig};
use crate::core::entities::EntityBag;
use crate::core::intent::Intent;
use crate::db::{GraphExecutor, Row};
use crate::llm::classifier::IntentClassifier;
use crate::llm::embeddings::Embedder;
use crate::llm::extractor::EntityExtractor;
use crate::llm::synthesis::{AnswerRequest, AnswerSynthesizer, INSUFFICIENT_INFORMATION, casual_response};
use crate::search::vector::{HOTEL_INDEX, REVIEW_INDEX, VISA_INDEX};
use crate::search::{
    BoundQuery, ContextFormatter, EnrichedHit, HitEnricher, IndexSelector, MultiIndexSearcher,
    QueryRouter, QueryTemplateLibrary, RankedItem, ResultMerger, StructuredRetriever,
    VectorIndexError, VectorIndexRegistry,
};


/// Collaborators a workflow is built from. Constructed once per process.
pub struct WorkflowComponents {
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub synthesizer: Arc<dyn AnswerSynthesizer>,
    pub graph: Arc<dyn GraphExecutor>,
    pub embedder: Arc<dyn Embedder>,
    pub registry: Arc<VectorIndexRegistry>,
    pub store: Arc<ConversationStore>,
}


/// How one retrieval branch ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    Succeeded { count: usize },
    Skipped { reason: String },
    Failed { reason: String },
}

impl BranchStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, BranchStatus::Failed { .. })
    }

    fn describe(&self) -> String {
        match self {
            BranchStatus::Succeeded { count } => format!("{} results", count),
            BranchStatus::Skipped { reason } => format!("skipped: {}", reason),
            BranchStatus::Failed { reason } => reason.clone(),
        }
    }
}


#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub turn_index: usize,
    pub rewritten_query: String,
    pub intent: Intent,
    pub entities: EntityBag,
    pub template: Option<&'static str>,
    pub indexes: Vec<&'static str>,
    pub structured: BranchStatus,
    pub vector: BranchStatus,
    pub items: Vec<RankedItem>,
    pub answer: String,
    pub status: TurnStatus,
    pub trace: StateTrace,
}


/// Requests cancellation of an in-flight turn.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Resolves once cancellation is requested. Pends forever if the handle is dropped.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}


struct Settings {
    mode: RetrievalMode,
    top_k: usize,
    similarity_threshold: f32,
    max_vector_results: usize,
    max_context_items: usize,
    structured_timeout: Duration,
    vector_timeout: Duration,
    history_window: usize,
    preview_chars: usize,
    contract_mode: ContractMode,
}

impl Settings {
    fn from_config(config: &WayfinderConfig) -> Self {
        let r = &config.retrieval;
        Self {
            mode: r.mode,
            top_k: r.vector_top_k,
            similarity_threshold: r.similarity_threshold,
            max_vector_results: r.max_vector_results,
            max_context_items: r.max_context_items,
            structured_timeout: Duration::from_millis(r.structured_timeout_ms),
            vector_timeout: Duration::from_millis(r.vector_timeout_ms),
            history_window: config.conversation.history_window,
            preview_chars: config.conversation.message_preview_chars,
            contract_mode: config.contract_mode,
        }
    }
}


/// Everything a turn has learned so far. Survives failure and cancellation
/// so the history entry can still be written.
struct TurnDraft {
    raw_query: String,
    rewritten_query: String,
    intent: Option<Intent>,
    entities: EntityBag,
    template: Option<&'static str>,
    indexes: Vec<&'static str>,
    structured: BranchStatus,
    vector: BranchStatus,
    items: Vec<RankedItem>,
    answer: Option<String>,
    status: Option<TurnStatus>,
    trace: StateTrace,
}

impl TurnDraft {
    fn new(raw_query: &str) -> Self {
        let not_run = || BranchStatus::Skipped {
            reason: "not run".to_string(),
        };
        Self {
            raw_query: raw_query.to_string(),
            rewritten_query: raw_query.to_string(),
            intent: None,
            entities: EntityBag::new(),
            template: None,
            indexes: Vec::new(),
            structured: not_run(),
            vector: not_run(),
            items: Vec::new(),
            answer: None,
            status: None,
            trace: StateTrace::new(),
        }
    }

    fn record(&self, status: TurnStatus) -> TurnRecord {
        TurnRecord {
            raw_query: self.raw_query.clone(),
            rewritten_query: self.rewritten_query.clone(),
            intent: self.intent.unwrap_or(Intent::GeneralQuestionAnswering),
            entities: self.entities.clone(),
            result_count: self.items.len(),
            answer: self.answer.clone(),
            status,
        }
    }
}

fn failure_status(error: &WorkflowError) -> TurnStatus {
    match error {
        WorkflowError::Cancelled => TurnStatus::Cancelled,
        WorkflowError::Synthesis(_) => TurnStatus::SynthesisFailed,
        _ => TurnStatus::RetrievalFailed,
    }
}


/// One conversational turn: rewrite, classify, route, retrieve in parallel,
/// merge, answer and record.
pub struct RetrievalWorkflow {
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn EntityExtractor>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    rewriter: QueryRewriter,
    router: QueryRouter,
    structured: Arc<StructuredRetriever>,
    selector: IndexSelector,
    searcher: MultiIndexSearcher,
    enricher: Option<HitEnricher>,
    merger: ResultMerger,
    formatter: ContextFormatter,
    store: Arc<ConversationStore>,
    settings: Settings,
}

impl RetrievalWorkflow {
    /// Fails when the registry lacks an index the selector can name, or a route
    /// names a template the library does not carry.
    pub fn new(components: WorkflowComponents, config: &WayfinderConfig) -> Result<Self, WorkflowError> {
        components
            .registry
            .ensure_names(&[HOTEL_INDEX, REVIEW_INDEX, VISA_INDEX])?;

        let library = Arc::new(QueryTemplateLibrary::standard());
        let router = QueryRouter::new(library.clone())
            .map_err(|e| WorkflowError::Configuration(e.to_string()))?;

        let r = &config.retrieval;
        let structured = Arc::new(StructuredRetriever::new(
            library,
            components.graph,
            Duration::from_millis(r.retry_backoff_ms),
        ));
        let enricher = config
            .indexes
            .enrich_hits
            .then(|| HitEnricher::new(structured.clone()));

        info!(
            "Retrieval workflow ready (mode {}, top_k {}, threshold {}, enrichment {})",
            r.mode, r.vector_top_k, r.similarity_threshold, config.indexes.enrich_hits
        );

        Ok(Self {
            classifier: components.classifier,
            extractor: components.extractor,
            synthesizer: components.synthesizer,
            rewriter: QueryRewriter::new(),
            router,
            structured,
            selector: IndexSelector::new(),
            searcher: MultiIndexSearcher::new(components.registry, components.embedder, r.cross_index_boost),
            enricher,
            merger: ResultMerger::new(r.structured_base_score, r.structured_match_boost),
            formatter: ContextFormatter::new(r.max_context_tokens),
            store: components.store,
            settings: Settings::from_config(config),
        })
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<VectorIndexRegistry> {
        self.searcher.registry()
    }

    pub async fn handle_turn(&self, thread_id: &str, query: &str) -> Result<TurnOutcome, WorkflowError> {
        self.run_turn(thread_id, query, CancelSignal::never()).await
    }

    /// Runs one turn on `thread_id`. Turns on the same thread are serialized.
    /// History is updated exactly once whether the turn answers, fails or is cancelled.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        query: &str,
        mut cancel: CancelSignal,
    ) -> Result<TurnOutcome, WorkflowError> {
        let mut guard = self.store.begin_turn(thread_id).await?;
        info!("Turn on {}: {}", thread_id, crate::safe_truncate(query, 80));

        let mut draft = TurnDraft::new(query);
        let result = {
            let history = guard.thread();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
                result = self.process(history, &mut draft) => result,
            }
        };

        let status = match &result {
            Ok(()) => draft.status.unwrap_or(TurnStatus::Answered),
            Err(e) => {
                warn!("Turn on {} ended without an answer: {}", thread_id, e);
                failure_status(e)
            }
        };

        draft.trace.advance(WorkflowState::HistoryUpdate)?;
        if let Err(e) = guard.record(draft.record(status)).await {
            error!("History for {} was not persisted: {}", thread_id, e);
        }
        draft.trace.advance(WorkflowState::Done)?;
        debug!("Turn trace {:?}", draft.trace.states());

        result?;

        let turn_index = guard.thread().len().saturating_sub(1);
        Ok(TurnOutcome {
            thread_id: thread_id.to_string(),
            turn_index,
            rewritten_query: draft.rewritten_query,
            intent: draft.intent.unwrap_or(Intent::GeneralQuestionAnswering),
            entities: draft.entities,
            template: draft.template,
            indexes: draft.indexes,
            structured: draft.structured,
            vector: draft.vector,
            items: draft.items,
            answer: draft.answer.unwrap_or_else(|| INSUFFICIENT_INFORMATION.to_string()),
            status,
            trace: draft.trace,
        })
    }

    async fn process(&self, history: &ConversationThread, draft: &mut TurnDraft) -> Result<(), WorkflowError> {
        let mode = self.settings.mode;
        if mode.uses_history() {
            let rewrite = self.rewriter.rewrite(&draft.raw_query, history);
            for issue in &rewrite.unresolved {
                warn!("{}; passing query through", issue);
            }
            draft.rewritten_query = rewrite.query;
        }

        draft.trace.advance(WorkflowState::Classifying)?;
        let intent = self.classifier.classify(&draft.rewritten_query).await;
        draft.intent = Some(intent);

        if intent.is_conversational() {
            draft.trace.advance(WorkflowState::CasualResponse)?;
            draft.trace.advance(WorkflowState::AnswerPending)?;
            draft.answer = Some(casual_response(&draft.rewritten_query));
            draft.status = Some(TurnStatus::Casual);
            return Ok(());
        }

        let raw = self.extractor.extract(&draft.rewritten_query, intent).await;
        draft.entities = EntityBag::from_raw(&raw, self.settings.contract_mode)?;

        draft.trace.advance(WorkflowState::Routing)?;
        let bound = if mode.runs_structured() {
            match self.router.select(intent, &draft.entities) {
                Ok(bound) => Some(bound),
                Err(e) => {
                    warn!("No structured query for this turn: {}", e);
                    None
                }
            }
        } else {
            None
        };
        draft.template = bound.as_ref().map(|b| b.template);
        if mode.runs_vector() {
            draft.indexes = self
                .selector
                .select(intent, &draft.entities, &draft.rewritten_query);
        }

        draft.trace.advance(WorkflowState::ParallelRetrieval)?;
        let ((structured, rows), vector) = tokio::join!(
            self.structured_branch(bound.as_ref()),
            self.vector_branch(&draft.rewritten_query, &draft.indexes),
        );
        let (vector, hits) = vector?;
        draft.structured = structured;
        draft.vector = vector;

        if rows.is_empty() && hits.is_empty() && (draft.structured.is_failed() || draft.vector.is_failed()) {
            return Err(WorkflowError::RetrievalFailed {
                structured: draft.structured.describe(),
                vector: draft.vector.describe(),
            });
        }

        draft.trace.advance(WorkflowState::Merging)?;
        draft.items = self.merger.merge(rows, hits, self.settings.max_context_items);

        draft.trace.advance(WorkflowState::AnswerPending)?;
        if draft.items.is_empty() {
            info!("Both retrieval branches came back empty");
            draft.answer = Some(INSUFFICIENT_INFORMATION.to_string());
            draft.status = Some(TurnStatus::InsufficientInformation);
            return Ok(());
        }

        let context = self.formatter.format(intent, &draft.entities, &draft.items);
        let conversation = if mode.uses_history() {
            history.history_context(self.settings.history_window, self.settings.preview_chars)
        } else {
            String::new()
        };
        let answer = self
            .synthesizer
            .synthesize(AnswerRequest {
                query: &draft.rewritten_query,
                intent,
                context: &context,
                conversation: &conversation,
            })
            .await?;

        draft.answer = Some(answer);
        draft.status = Some(TurnStatus::Answered);
        Ok(())
    }

    async fn structured_branch(&self, bound: Option<&BoundQuery>) -> (BranchStatus, Vec<Row>) {
        if !self.settings.mode.runs_structured() {
            return (self.disabled_by_mode(), Vec::new());
        }
        let Some(bound) = bound else {
            return (
                BranchStatus::Skipped {
                    reason: "no applicable template".to_string(),
                },
                Vec::new(),
            );
        };

        let run = self.structured.execute(bound.template, &bound.params);
        match tokio::time::timeout(self.settings.structured_timeout, run).await {
            Ok(Ok(rows)) => (BranchStatus::Succeeded { count: rows.len() }, rows),
            Ok(Err(e)) => {
                warn!("Structured retrieval failed, continuing without it: {}", e);
                (BranchStatus::Failed { reason: e.to_string() }, Vec::new())
            }
            Err(_) => {
                warn!("Structured retrieval timed out after {:?}", self.settings.structured_timeout);
                (
                    BranchStatus::Failed {
                        reason: format!("timed out after {:?}", self.settings.structured_timeout),
                    },
                    Vec::new(),
                )
            }
        }
    }

    fn disabled_by_mode(&self) -> BranchStatus {
        BranchStatus::Skipped {
            reason: format!("disabled in {} mode", self.settings.mode),
        }
    }

    /// Embedding failures and timeouts degrade the branch. Any other index error
    /// is a configuration fault and ends the turn.
    async fn vector_branch(
        &self,
        query: &str,
        indexes: &[&'static str],
    ) -> Result<(BranchStatus, Vec<EnrichedHit>), WorkflowError> {
        if !self.settings.mode.runs_vector() {
            return Ok((self.disabled_by_mode(), Vec::new()));
        }
        if indexes.is_empty() {
            return Ok((
                BranchStatus::Skipped {
                    reason: "no indexes selected".to_string(),
                },
                Vec::new(),
            ));
        }

        let s = &self.settings;
        let search = self
            .searcher
            .search(query, indexes, s.top_k, s.similarity_threshold, s.max_vector_results);
        let hits = match tokio::time::timeout(s.vector_timeout, search).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(VectorIndexError::Embedding(e))) => {
                warn!("Vector search failed, continuing without it: {}", e);
                return Ok((BranchStatus::Failed { reason: e.to_string() }, Vec::new()));
            }
            Ok(Err(e)) => {
                error!("Vector index fault: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Vector search timed out after {:?}", s.vector_timeout);
                return Ok((
                    BranchStatus::Failed {
                        reason: format!("timed out after {:?}", s.vector_timeout),
                    },
                    Vec::new(),
                ));
            }
        };

        let count = hits.len();
        let enriched = match &self.enricher {
            Some(enricher) if !hits.is_empty() => {
                let bare: Vec<EnrichedHit> = hits.iter().cloned().map(EnrichedHit::from).collect();
                match tokio::time::timeout(s.vector_timeout, enricher.enrich(hits)).await {
                    Ok(enriched) => enriched,
                    Err(_) => {
                        warn!("Hit enrichment timed out, using bare hits");
                        bare
                    }
                }
            }
            _ => hits.into_iter().map(EnrichedHit::from).collect(),
        };

        Ok((BranchStatus::Succeeded { count }, enriched))
    }
}
