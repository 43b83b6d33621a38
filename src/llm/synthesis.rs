

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::providers::{LlmProvider, LlmProviderError};
use crate::core::intent::Intent;


pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer that. Please try rephrasing or asking about something else.";


#[derive(Debug, Clone, Copy)]
pub struct AnswerRequest<'a> {
    pub query: &'a str,
    pub intent: Intent,
    /// Formatted retrieval context, never empty when synthesis is requested.
    pub context: &'a str,
    /// Rendered recent turns of the thread, possibly empty.
    pub conversation: &'a str,
}


#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, request: AnswerRequest<'_>) -> Result<String, LlmProviderError>;
}


fn intent_guidance(intent: Intent) -> &'static str {
    match intent {
        Intent::HotelSearch => "List the matching hotels with their city, star rating and average score.",
        Intent::HotelRecommendation => {
            "Recommend the strongest options and say which scores or traveller statistics support each one."
        }
        Intent::ReviewLookup => "Summarise what reviewers say, quoting scores and short excerpts.",
        Intent::LocationQuery => "Focus on location scores and where the hotels are.",
        Intent::VisaQuestion => "State clearly whether a visa is required and which type, if known.",
        Intent::AmenityFilter => "Mention the relevant quality score for every hotel you list.",
        Intent::GeneralQuestionAnswering => "Answer directly using the hotel details provided.",
        Intent::CasualConversation => "Reply briefly and warmly.",
    }
}

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful hotel travel assistant. Answer using ONLY the provided context. \
Do not invent hotels, scores or visa rules. If the context does not contain the answer, say you don't have enough information. \
Cite specific hotels, scores or reviews. Be concise and use natural language.";


pub struct LlmAnswerSynthesizer {
    llm: Arc<dyn LlmProvider>,
}

impl LlmAnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    fn build_user_prompt(request: &AnswerRequest<'_>) -> String {
        let mut prompt = String::new();
        prompt.push_str(intent_guidance(request.intent));
        prompt.push_str("\n\n");
        if !request.conversation.trim().is_empty() {
            prompt.push_str("Previous conversation:\n");
            prompt.push_str(request.conversation);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Context:\n");
        prompt.push_str(request.context);
        prompt.push_str(&format!("\n\nUser question: \"{}\"\nAnswer:", request.query));
        prompt
    }
}

#[async_trait]
impl AnswerSynthesizer for LlmAnswerSynthesizer {
    async fn synthesize(&self, request: AnswerRequest<'_>) -> Result<String, LlmProviderError> {
        let user_prompt = Self::build_user_prompt(&request);
        debug!("Synthesizing answer ({} prompt chars)", user_prompt.len());

        let (answer, metadata) = self.llm.generate(ANSWER_SYSTEM_PROMPT, &user_prompt, None).await?;
        debug!(
            "Answer from {}/{}: {:?} tokens in {:?} ms",
            metadata.provider,
            metadata.model,
            metadata.total_tokens(),
            metadata.duration_ms
        );
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(INSUFFICIENT_INFORMATION.to_string());
        }
        Ok(answer.to_string())
    }
}


fn has_word(lowered: &str, words: &[&str]) -> bool {
    lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|token| words.contains(&token))
}

/// Canned reply for small-talk turns; no retrieval and no model call.
pub fn casual_response(query: &str) -> String {
    let lowered = query.to_lowercase();

    let reply = if ["what can you", "what do you do", "your purpose", "help me", "how can you", "who are you"]
        .iter()
        .any(|p| lowered.contains(p))
    {
        "I'm a hotel travel assistant. I can search hotels by city, country or rating, recommend hotels \
         for business travellers, couples, families, solo travellers or groups, show guest reviews, find \
         hotels with the best location scores, filter by cleanliness, comfort, value or staff scores, and \
         check visa requirements between countries."
    } else if lowered.contains("thank") || has_word(&lowered, &["appreciate", "cheers"]) {
        "You're welcome! Feel free to ask if you need anything else about hotels or travel."
    } else if has_word(&lowered, &["bye", "goodbye", "exit"]) || lowered.contains("see you") {
        "Goodbye and safe travels! Come back anytime you need hotel recommendations."
    } else if lowered.contains("how are you") || lowered.contains("how's it going") {
        "I'm doing great, thanks for asking! What kind of hotel are you looking for?"
    } else if has_word(&lowered, &["hi", "hello", "hey", "greetings", "yo"]) {
        "Hello! I'm your hotel travel assistant. Ask me to find hotels, recommend places for your kind of \
         trip, show reviews, compare location scores or check visa requirements."
    } else {
        "I'm here to help with hotels and travel planning. Try \"Find hotels in Paris\", \"Best hotels for \
         couples\" or \"Do I need a visa from Egypt to Italy?\""
    };

    reply.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::LlmMetadata;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        async fn generate(
            &self,
            _system: &str,
            user: &str,
            _format: Option<&str>,
        ) -> Result<(String, LlmMetadata), LlmProviderError> {
            self.prompts.lock().push(user.to_string());
            Ok(("  Hotel Aurora is your best bet.  ".to_string(), LlmMetadata::default()))
        }

        fn provider_name(&self) -> &str {
            "recording"
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_casual_response_routes() {
        assert!(casual_response("hi there").starts_with("Hello"));
        assert!(casual_response("Thanks!").starts_with("You're welcome"));
        assert!(casual_response("ok bye").starts_with("Goodbye"));
        assert!(casual_response("what can you do?").contains("visa requirements"));
        assert!(casual_response("this is fine").starts_with("I'm here to help"));
    }

    #[tokio::test]
    async fn test_prompt_carries_context_and_history() {
        let llm = Arc::new(RecordingLlm::default());
        let synthesizer = LlmAnswerSynthesizer::new(llm.clone());

        let answer = synthesizer
            .synthesize(AnswerRequest {
                query: "which is best?",
                intent: Intent::HotelRecommendation,
                context: "HOTELS:\n1. Hotel Aurora",
                conversation: "User: hotels in Oslo",
            })
            .await
            .unwrap();

        assert_eq!(answer, "Hotel Aurora is your best bet.");
        let prompts = llm.prompts.lock();
        assert!(prompts[0].contains("Previous conversation:\nUser: hotels in Oslo"));
        assert!(prompts[0].contains("HOTELS:\n1. Hotel Aurora"));
        assert!(prompts[0].contains("\"which is best?\""));
    }
}
