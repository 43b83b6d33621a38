

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::templates::{QueryTemplate, QueryTemplateLibrary};
use crate::core::entities::SlotKind;
use crate::db::{GraphError, GraphExecutor, Row};


/// Runs catalogue templates against the graph store with typed parameter checks.
pub struct StructuredRetriever {
    library: Arc<QueryTemplateLibrary>,
    executor: Arc<dyn GraphExecutor>,
    retry_backoff: Duration,
}

impl StructuredRetriever {
    pub fn new(
        library: Arc<QueryTemplateLibrary>,
        executor: Arc<dyn GraphExecutor>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            library,
            executor,
            retry_backoff,
        }
    }

    /// Executes `template_name` with `params`. An unavailable backend is retried once.
    pub async fn execute(
        &self,
        template_name: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Row>, GraphError> {
        let template = self
            .library
            .get(template_name)
            .ok_or_else(|| GraphError::query(template_name, "template is not in the library"))?;

        let checked = check_params(template, params)?;

        match self.run(template, &checked).await {
            Err(e) if e.is_unavailable() => {
                warn!(
                    "{} unavailable for {}, retrying in {:?}: {}",
                    self.executor.backend_name(),
                    template_name,
                    self.retry_backoff,
                    e
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.run(template, &checked).await
            }
            other => other,
        }
    }

    async fn run(&self, template: &QueryTemplate, params: &Map<String, Value>) -> Result<Vec<Row>, GraphError> {
        let rows = self
            .executor
            .execute(template.name, template.statement, params)
            .await?;
        info!("{} returned {} rows", template.name, rows.len());
        Ok(rows)
    }
}

fn kind_matches(kind: SlotKind, value: &Value) -> bool {
    match kind {
        SlotKind::Text => value.is_string(),
        SlotKind::Number => value.is_number(),
        SlotKind::Integer => value.is_i64() || value.is_u64(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "number".to_string(),
        Value::Number(_) => "integer".to_string(),
        Value::String(_) => "text".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// Rejects undeclared or mistyped parameters and fills missing optional slots.
fn check_params(template: &QueryTemplate, params: &Map<String, Value>) -> Result<Map<String, Value>, GraphError> {
    if let Some(undeclared) = params
        .keys()
        .find(|name| !template.slots.iter().any(|s| s.param_name() == name.as_str()))
    {
        return Err(GraphError::InvalidParameter {
            template: template.name.to_string(),
            slot: undeclared.clone(),
            expected: "no such parameter".to_string(),
            actual: describe(&params[undeclared.as_str()]),
        });
    }

    let mut checked = Map::new();
    for slot in &template.slots {
        let name = slot.param_name();
        match params.get(name) {
            Some(value) if kind_matches(slot.kind, value) => {
                checked.insert(name.to_string(), value.clone());
            }
            Some(value) => {
                return Err(GraphError::InvalidParameter {
                    template: template.name.to_string(),
                    slot: name.to_string(),
                    expected: format!("{:?}", slot.kind).to_lowercase(),
                    actual: describe(value),
                });
            }
            None => match (&slot.default, slot.required) {
                (Some(default), _) => {
                    checked.insert(name.to_string(), default.to_json());
                }
                (None, true) => {
                    return Err(GraphError::InvalidParameter {
                        template: template.name.to_string(),
                        slot: name.to_string(),
                        expected: format!("{:?}", slot.kind).to_lowercase(),
                        actual: "missing".to_string(),
                    });
                }
                (None, false) => {}
            },
        }
    }

    debug!("Parameters for {} checked: {:?}", template.name, checked.keys().collect::<Vec<_>>());
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::templates::names;
    use crate::testing::ScriptedGraph;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn retriever(graph: Arc<ScriptedGraph>) -> StructuredRetriever {
        StructuredRetriever::new(
            Arc::new(QueryTemplateLibrary::standard()),
            graph,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_executes_with_defaults_filled() {
        let graph = Arc::new(ScriptedGraph::with_rows(vec![json!({"hotel_id": "h1"})]));
        let rows = retriever(graph.clone())
            .execute(names::BEST_LOCATION_IN_CITY, &params(json!({"city": "Tokyo"})))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let calls = graph.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, names::BEST_LOCATION_IN_CITY);
        assert_eq!(calls[0].1, params(json!({"city": "Tokyo", "limit": 5})));
    }

    #[tokio::test]
    async fn test_rejects_mistyped_parameter() {
        let graph = Arc::new(ScriptedGraph::with_rows(vec![]));
        let err = retriever(graph.clone())
            .execute(names::HOTELS_BY_COMFORT, &params(json!({"min_comfort": "high"})))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { ref slot, .. } if slot == "min_comfort"));
        assert!(graph.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_undeclared_parameter() {
        let graph = Arc::new(ScriptedGraph::with_rows(vec![]));
        let err = retriever(graph)
            .execute(names::HOTELS_BY_CITY, &params(json!({"city": "Rome", "mood": "calm"})))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { ref slot, .. } if slot == "mood"));
    }

    #[tokio::test]
    async fn test_rejects_missing_required() {
        let graph = Arc::new(ScriptedGraph::with_rows(vec![]));
        let err = retriever(graph)
            .execute(names::VISA_REQUIREMENTS, &params(json!({"from_country": "Egypt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { ref actual, .. } if actual == "missing"));
    }

    #[tokio::test]
    async fn test_unavailable_retried_once() {
        let graph = Arc::new(ScriptedGraph::failing_then(
            1,
            GraphError::BackendUnavailable("connection refused".into()),
            vec![json!({"hotel_id": "h9"})],
        ));
        let rows = retriever(graph.clone())
            .execute(names::HOTELS_BY_CITY, &params(json!({"city": "Lagos"})))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(graph.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_persistent_outage_surfaces_typed_error() {
        let graph = Arc::new(ScriptedGraph::failing_then(
            5,
            GraphError::BackendUnavailable("connection refused".into()),
            vec![],
        ));
        let err = retriever(graph.clone())
            .execute(names::HOTELS_BY_CITY, &params(json!({"city": "Lagos"})))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(graph.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_query_error_not_retried() {
        let graph = Arc::new(ScriptedGraph::failing_then(
            5,
            GraphError::query(names::HOTELS_BY_CITY, "syntax"),
            vec![],
        ));
        let err = retriever(graph.clone())
            .execute(names::HOTELS_BY_CITY, &params(json!({"city": "Lagos"})))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Query { .. }));
        assert_eq!(graph.calls().len(), 1);
    }
}
