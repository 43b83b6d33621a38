

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;


#[derive(Error, Debug)]
pub enum LlmProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON object, got: {0}")]
    NotAnObject(String),

    #[error("Provider error: {0}")]
    Provider(String),
}


/// Usage and timing of one completion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmMetadata {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_prompt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_completion: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl LlmMetadata {
    pub fn total_tokens(&self) -> Option<u32> {
        Some(self.tokens_prompt? + self.tokens_completion?)
    }
}


/// Some models wrap JSON-mode replies in a ```json fence anyway.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}


/// Chat completion backend used for classification, extraction and answer synthesis.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// `response_format` of `Some("json_object")` asks for a JSON-only reply.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_format: Option<&str>,
    ) -> Result<(String, LlmMetadata), LlmProviderError>;

    /// JSON-mode completion that must decode to a single object.
    async fn generate_object(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<(Map<String, Value>, LlmMetadata), LlmProviderError> {
        let (reply, metadata) = self
            .generate(system_prompt, user_prompt, Some("json_object"))
            .await?;
        match serde_json::from_str::<Value>(strip_code_fence(&reply))? {
            Value::Object(map) => Ok((map, metadata)),
            other => Err(LlmProviderError::NotAnObject(crate::safe_truncate(
                &other.to_string(),
                80,
            ))),
        }
    }

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _format: Option<&str>,
        ) -> Result<(String, LlmMetadata), LlmProviderError> {
            Ok((self.0.to_string(), LlmMetadata::default()))
        }

        fn provider_name(&self) -> &str {
            "canned"
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```{}```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_total_tokens_needs_both_counts() {
        let mut metadata = LlmMetadata {
            tokens_prompt: Some(120),
            tokens_completion: Some(30),
            ..LlmMetadata::default()
        };
        assert_eq!(metadata.total_tokens(), Some(150));
        metadata.tokens_completion = None;
        assert_eq!(metadata.total_tokens(), None);
    }

    #[tokio::test]
    async fn test_generate_object_accepts_fenced_reply() {
        let (map, _) = Canned("```json\n{\"city\": \"Paris\"}\n```")
            .generate_object("s", "u")
            .await
            .unwrap();
        assert_eq!(map["city"], "Paris");
    }

    #[tokio::test]
    async fn test_generate_object_rejects_non_objects() {
        assert!(matches!(
            Canned("[1, 2]").generate_object("s", "u").await,
            Err(LlmProviderError::NotAnObject(_))
        ));
        assert!(matches!(
            Canned("sure, here you go").generate_object("s", "u").await,
            Err(LlmProviderError::Json(_))
        ));
    }
}
