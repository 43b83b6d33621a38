

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::core::entities::EntityBag;
use crate::core::intent::Intent;
use crate::utils::safe_truncate_ellipsis;


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnStatus {

    Answered,

    Casual,
    /// Retrieval ran but nothing usable came back.
    InsufficientInformation,
    /// Both retrieval branches failed.
    RetrievalFailed,

    SynthesisFailed,
    /// The client went away before an answer was produced.
    Cancelled,
}


/// A completed turn as recorded in its thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_index: usize,
    pub raw_query: String,
    pub rewritten_query: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: EntityBag,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
}


/// Everything a turn knows when it is recorded; the thread assigns the index.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRecord {
    pub raw_query: String,
    pub rewritten_query: String,
    pub intent: Intent,
    pub entities: EntityBag,
    pub result_count: usize,
    pub answer: Option<String>,
    pub status: TurnStatus,
}


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub thread_id: String,
    turns: Vec<ConversationTurn>,
}

impl ConversationThread {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            turns: Vec::new(),
        }
    }

    /// Rebuilds a thread from persisted turns, renumbering them in order.
    pub fn from_turns(thread_id: impl Into<String>, mut turns: Vec<ConversationTurn>) -> Self {
        for (i, turn) in turns.iter_mut().enumerate() {
            turn.turn_index = i;
        }
        Self {
            thread_id: thread_id.into(),
            turns,
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends a turn. History only grows until `reset`.
    pub fn append(&mut self, record: TurnRecord) -> &ConversationTurn {
        let turn = ConversationTurn {
            turn_index: self.turns.len(),
            raw_query: record.raw_query,
            rewritten_query: record.rewritten_query,
            intent: record.intent,
            entities: record.entities,
            result_count: record.result_count,
            answer: record.answer,
            status: record.status,
            timestamp: Utc::now(),
        };
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Renders the last `window` turns for answer synthesis.
    pub fn history_context(&self, window: usize, preview_chars: usize) -> String {
        let start = self.turns.len().saturating_sub(window);
        let mut lines = Vec::new();
        for turn in &self.turns[start..] {
            lines.push(format!("User: {}", turn.rewritten_query));
            if let Some(answer) = &turn.answer {
                lines.push(format!("Assistant: {}", safe_truncate_ellipsis(answer, preview_chars)));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::EntityKey;

    fn record(query: &str, answer: Option<&str>) -> TurnRecord {
        TurnRecord {
            raw_query: query.to_string(),
            rewritten_query: query.to_string(),
            intent: Intent::HotelSearch,
            entities: EntityBag::builder().with(EntityKey::City, "Paris").build(),
            result_count: 3,
            answer: answer.map(str::to_string),
            status: TurnStatus::Answered,
        }
    }

    #[test]
    fn test_append_assigns_indexes() {
        let mut thread = ConversationThread::new("t1");
        thread.append(record("hotels in Paris", Some("Hotel Aurora")));
        let second = thread.append(record("cheaper ones", None));
        assert_eq!(second.turn_index, 1);
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_history_context_window() {
        let mut thread = ConversationThread::new("t1");
        thread.append(record("first", Some("one")));
        thread.append(record("second", Some("a very long answer indeed")));
        thread.append(record("third", None));

        let context = thread.history_context(2, 6);
        assert_eq!(context, "User: second\nAssistant: a very...\nUser: third");
    }

    #[test]
    fn test_turn_serde_shape() {
        let mut thread = ConversationThread::new("t1");
        let turn = thread.append(record("hotels in Paris", None)).clone();
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["status"], "answered");
        assert_eq!(json["intent"], "HotelSearch");
        assert_eq!(json["entities"]["city"], "Paris");
        assert!(json.get("answer").is_none());

        let back: ConversationTurn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
    }
}
