

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{GraphError, GraphExecutor, Row};
use crate::core::config::GraphConfig;

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: Vec<TxStatement<'a>>,
}

#[derive(Debug, Serialize)]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}


/// Cypher over the Neo4j transactional HTTP endpoint.
pub struct Neo4jHttpExecutor {
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    client: Client,
}

impl Neo4jHttpExecutor {
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let endpoint = format!("{}/db/{}/tx/commit", config.base_url(), config.database);
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphError::BackendUnavailable(e.to_string()))?;

        info!("Neo4j executor created for {}", endpoint);

        Ok(Self {
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GraphExecutor for Neo4jHttpExecutor {
    async fn execute(
        &self,
        template: &str,
        statement: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Row>, GraphError> {
        debug!("Executing {} against {}", template, self.endpoint);

        let body = TxRequest {
            statements: vec![TxStatement {
                statement,
                parameters: params,
            }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| GraphError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(template, status, &detail));
        }

        let parsed = response
            .json::<TxResponse>()
            .await
            .map_err(|e| GraphError::MalformedResponse(e.to_string()))?;

        rows_from_response(template, parsed)
    }

    fn backend_name(&self) -> &str {
        "neo4j"
    }
}

fn classify_status(template: &str, status: StatusCode, detail: &str) -> GraphError {
    let message = format!("HTTP {}: {}", status, crate::safe_truncate(detail, 200));
    if status.is_server_error()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        GraphError::BackendUnavailable(message)
    } else {
        GraphError::query(template, message)
    }
}

fn rows_from_response(template: &str, response: TxResponse) -> Result<Vec<Row>, GraphError> {
    if let Some(err) = response.errors.into_iter().next() {
        return Err(if err.code.starts_with("Neo.TransientError") {
            GraphError::BackendUnavailable(format!("{}: {}", err.code, err.message))
        } else {
            GraphError::query(template, format!("{}: {}", err.code, err.message))
        });
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    let columns = result.columns;
    result
        .data
        .into_iter()
        .map(|data| {
            if data.row.len() != columns.len() {
                return Err(GraphError::MalformedResponse(format!(
                    "row has {} values for {} columns",
                    data.row.len(),
                    columns.len()
                )));
            }
            Ok(columns.iter().cloned().zip(data.row).collect::<Row>())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> TxResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_rows_zip_columns() {
        let response = parse(json!({
            "results": [{
                "columns": ["hotel_id", "hotel_name"],
                "data": [
                    {"row": ["h1", "Le Marais"], "meta": [null, null]},
                    {"row": ["h2", "Opera Suites"], "meta": [null, null]}
                ]
            }],
            "errors": []
        }));

        let rows = rows_from_response("hotels_by_city", response).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["hotel_id"], json!("h1"));
        assert_eq!(rows[1]["hotel_name"], json!("Opera Suites"));
    }

    #[test]
    fn test_transient_error_is_unavailable() {
        let response = parse(json!({
            "results": [],
            "errors": [{"code": "Neo.TransientError.General.DatabaseUnavailable", "message": "down"}]
        }));
        let err = rows_from_response("hotels_by_city", response).unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_syntax_error_is_query_error() {
        let response = parse(json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]
        }));
        let err = rows_from_response("hotels_by_city", response).unwrap_err();
        assert!(matches!(err, GraphError::Query { .. }));
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status("t", StatusCode::SERVICE_UNAVAILABLE, "").is_unavailable());
        assert!(classify_status("t", StatusCode::UNAUTHORIZED, "").is_unavailable());
        assert!(!classify_status("t", StatusCode::BAD_REQUEST, "").is_unavailable());
    }

    #[test]
    fn test_endpoint_shape() {
        let executor = Neo4jHttpExecutor::new(&GraphConfig::default()).unwrap();
        assert_eq!(executor.endpoint(), "http://localhost:7474/db/neo4j/tx/commit");
    }
}
