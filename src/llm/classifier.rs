

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use super::providers::LlmProvider;
use crate::core::intent::Intent;


#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Always yields an intent; unusable input falls back to `GeneralQuestionAnswering`.
    async fn classify(&self, query: &str) -> Intent;
}


lazy_static! {
    static ref INTENT_PATTERNS: Vec<(Intent, Vec<Regex>)> = {
        let table: Vec<(Intent, Vec<&str>)> = vec![
            (Intent::CasualConversation, vec![
                r"(?i)^\s*(hi|hello|hey|yo|good (morning|afternoon|evening)|thanks?( you)?|thank you|bye|goodbye|see you)\b[\s!.?,a-z]{0,20}$",
                r"(?i)\b(who are you|what can you do|what are you|how are you)\b",
            ]),
            (Intent::VisaQuestion, vec![
                r"(?i)\bvisas?\b",
                r"(?i)\btravel documents?\b",
                r"(?i)\bpassport\b",
            ]),
            (Intent::ReviewLookup, vec![
                r"(?i)\breviews?\b",
                r"(?i)\bfeedback\b",
                r"(?i)\bwhat do (guests|people|travell?ers) say\b",
            ]),
            (Intent::LocationQuery, vec![
                r"(?i)\blocation (scores?|ratings?)\b",
                r"(?i)\bbest locat",
                r"(?i)\bwell[- ]located\b",
            ]),
            (Intent::AmenityFilter, vec![
                r"(?i)\b(cleanliness|clean|comfort|comfortable|value for money|staff|facilities)\b.*\b(above|over|at least|more than|score)\b",
                r"(?i)\b(above|over|at least|more than)\b.*\b(cleanliness|comfort|value|staff|facilities)\b",
            ]),
            (Intent::HotelRecommendation, vec![
                r"(?i)\b(recommend\w*|best|top|suggest\w*|ideal)\b",
                r"(?i)\bfor (a |an )?(famil(y|ies)|couples?|solo|business|groups?)\b",
            ]),
            (Intent::HotelSearch, vec![
                r"(?i)\bhotels?\b.*\b(in|at|near)\b",
                r"(?i)\b(find|search|show|list)\b.*\bhotels?\b",
                r"(?i)\brating (above|over|of at least)\b",
            ]),
        ];

        table
            .into_iter()
            .map(|(intent, patterns)| {
                let compiled = patterns
                    .into_iter()
                    .filter_map(|p| Regex::new(p).ok())
                    .collect();
                (intent, compiled)
            })
            .collect()
    };
}


/// Offline classifier over an ordered pattern table. First matching intent wins.
#[derive(Debug, Default, Clone)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_sync(&self, query: &str) -> Intent {
        if query.trim().is_empty() {
            return Intent::GeneralQuestionAnswering;
        }

        INTENT_PATTERNS
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(query)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::GeneralQuestionAnswering)
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, query: &str) -> Intent {
        self.classify_sync(query)
    }
}


fn intent_capabilities(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::HotelSearch => &[
            "Find hotels by city name",
            "Find hotels by country",
            "Filter hotels by minimum rating threshold",
        ],
        Intent::HotelRecommendation => &[
            "Top hotels for a traveller type (Business, Couple, Family, Solo, Group)",
            "Hotels by cleanliness, comfort, value for money or staff score",
        ],
        Intent::ReviewLookup => &["Reviews by hotel name", "Reviews by hotel id"],
        Intent::LocationQuery => &["Hotels with the best location scores, optionally in a city"],
        Intent::VisaQuestion => &["Visa requirements between two countries"],
        Intent::AmenityFilter => &[
            "Filter hotels by cleanliness, comfort, value, staff, location or facilities score",
        ],
        Intent::GeneralQuestionAnswering => &["Comprehensive details about a specific hotel"],
        Intent::CasualConversation => &["Greetings, questions about the assistant, thanks, goodbye"],
    }
}

fn build_classification_prompt() -> String {
    let mut prompt = String::from(
        "You are an intent classifier for a hotel travel assistant. \
         Classify the user query into exactly ONE of these intents.\n\n",
    );
    for intent in Intent::iter() {
        prompt.push_str(&format!("{} - {}\n", intent, intent.description()));
        for capability in intent_capabilities(intent) {
            prompt.push_str(&format!("  - {}\n", capability));
        }
    }
    prompt.push_str("\nRespond with ONLY the intent name exactly as written above. No explanation.");
    prompt
}


/// LLM classifier; provider failures and unparseable replies fall back to the keyword table.
pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmProvider>,
    fallback: KeywordIntentClassifier,
    system_prompt: String,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            fallback: KeywordIntentClassifier::new(),
            system_prompt: build_classification_prompt(),
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, query: &str) -> Intent {
        if query.trim().is_empty() {
            return Intent::GeneralQuestionAnswering;
        }

        let user_prompt = format!("User query: \"{}\"", query);
        match self.llm.generate(&self.system_prompt, &user_prompt, None).await {
            Ok((reply, _)) => match Intent::parse_loose(&reply) {
                Some(intent) => {
                    debug!("LLM intent for '{}': {}", crate::safe_truncate(query, 50), intent);
                    intent
                }
                None => {
                    warn!("Unrecognised intent reply '{}', using keyword fallback", crate::safe_truncate(&reply, 40));
                    self.fallback.classify_sync(query)
                }
            },
            Err(e) => {
                warn!("Intent classification failed, using keyword fallback: {}", e);
                self.fallback.classify_sync(query)
            }
        }
    }
}
