

pub mod neo4j;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

pub use neo4j::Neo4jHttpExecutor;

use crate::core::config::{GraphBackendKind, GraphConfig};

/// One result row: column name to value.
pub type Row = Map<String, Value>;


#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("Graph backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Query {template} failed: {message}")]
    Query { template: String, message: String },

    #[error("Parameter {slot} of {template} expects {expected}, got {actual}")]
    InvalidParameter {
        template: String,
        slot: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GraphError {
    pub fn query(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Transient conditions worth one more attempt.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GraphError::BackendUnavailable(_))
    }
}


/// Executes a bound structured query against the graph store.
///
/// `template` is the catalogue name used for logs and errors, `statement` the
/// parameterised Cypher text that is sent.
#[async_trait]
pub trait GraphExecutor: Send + Sync {
    async fn execute(
        &self,
        template: &str,
        statement: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Row>, GraphError>;

    fn backend_name(&self) -> &str;
}

#[async_trait]
impl GraphExecutor for Arc<dyn GraphExecutor> {
    async fn execute(
        &self,
        template: &str,
        statement: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Row>, GraphError> {
        (**self).execute(template, statement, params).await
    }

    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }
}


pub fn create_executor(config: &GraphConfig) -> Result<Arc<dyn GraphExecutor>, GraphError> {
    match config.backend {
        GraphBackendKind::Neo4j => Ok(Arc::new(Neo4jHttpExecutor::new(config)?)),
    }
}
