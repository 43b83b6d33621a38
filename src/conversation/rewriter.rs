

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::ConversationThread;
use crate::core::entities::EntityKey;


/// A reference marker with no antecedent in the thread. Not fatal.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("No antecedent for reference '{marker}'")]
pub struct RewriteAmbiguous {
    pub marker: String,
}


#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub marker: String,
    pub key: EntityKey,
    pub value: String,
}


#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub query: String,
    pub resolutions: Vec<Resolution>,
    pub unresolved: Vec<RewriteAmbiguous>,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        !self.resolutions.is_empty()
    }
}


#[derive(Clone, Copy)]
enum Substitution {
    /// "there" becomes "in Dubai".
    Place,
    /// "that hotel" becomes "Hotel Aurora".
    Value,
}

struct Marker {
    pattern: Regex,
    candidates: &'static [EntityKey],
    substitution: Substitution,
    /// Rejects matches that are not references in context.
    accepts: fn(&str, &Captures) -> bool,
}

const EXISTENTIAL_BEFORE: [&str; 11] = [
    "is", "are", "was", "were", "any", "be", "been", "isn't", "aren't", "wasn't", "weren't",
];
const EXISTENTIAL_AFTER: [&str; 12] = [
    "is", "are", "was", "were", "isn't", "aren't", "will", "would", "should", "must", "might", "be",
];
const GREETINGS: [&str; 6] = ["hi", "hello", "hey", "thanks", "cheers", "yo"];

fn word(token: Option<&str>) -> String {
    token
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

fn any_match(_: &str, _: &Captures) -> bool {
    true
}

/// "in there" and "around here" point at a place; bare "here" is the speaker's own
/// location; "is there", "there are" and "hi there" point at nothing.
fn place_reference(text: &str, caps: &Captures) -> bool {
    let (Some(whole), Some(adverb)) = (caps.get(0), caps.name("adverb")) else {
        return false;
    };
    if caps.name("prep").is_some() {
        return true;
    }
    if adverb.as_str().eq_ignore_ascii_case("here") {
        return false;
    }

    let rest = &text[whole.end()..];
    if rest.starts_with('\'') || rest.starts_with('’') {
        return false;
    }
    let previous = word(text[..whole.start()].split_whitespace().last());
    let next = word(rest.split_whitespace().next());

    !EXISTENTIAL_BEFORE.contains(&previous.as_str())
        && !EXISTENTIAL_AFTER.contains(&next.as_str())
        && !GREETINGS.contains(&previous.as_str())
}

lazy_static! {
    static ref MARKERS: Vec<Marker> = vec![
        Marker {
            pattern: Regex::new(r"(?i)\b(?:(?P<prep>in|at|over|around|near) )?(?P<adverb>there|here)\b").unwrap(),
            candidates: &[EntityKey::City, EntityKey::Country],
            substitution: Substitution::Place,
            accepts: place_reference,
        },
        Marker {
            pattern: Regex::new(r"(?i)\b(?:that|this|the same) city\b").unwrap(),
            candidates: &[EntityKey::City],
            substitution: Substitution::Value,
            accepts: any_match,
        },
        Marker {
            pattern: Regex::new(r"(?i)\b(?:that|this|the same) country\b").unwrap(),
            candidates: &[EntityKey::Country, EntityKey::ToCountry],
            substitution: Substitution::Value,
            accepts: any_match,
        },
        Marker {
            pattern: Regex::new(r"(?i)\b(?:that|this|the same) hotel\b").unwrap(),
            candidates: &[EntityKey::HotelName],
            substitution: Substitution::Value,
            accepts: any_match,
        },
        Marker {
            pattern: Regex::new(r"(?i)\b(?:that|this|the same) (?:place|destination)\b").unwrap(),
            candidates: &[EntityKey::City, EntityKey::Country],
            substitution: Substitution::Value,
            accepts: any_match,
        },
    ];
}


/// Most recent value for the first candidate key any earlier turn mentioned.
fn antecedent(thread: &ConversationThread, candidates: &[EntityKey]) -> Option<(EntityKey, String)> {
    thread
        .turns()
        .iter()
        .rev()
        .filter(|turn| !turn.entities.is_empty())
        .find_map(|turn| {
            candidates
                .iter()
                .find_map(|key| turn.entities.text(*key).map(|value| (*key, value.to_string())))
        })
}

fn starts_upper(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_uppercase)
}


/// Resolves place and entity references against earlier turns of the thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryRewriter;

impl QueryRewriter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrites only explicit reference markers. A query without one comes back unchanged.
    pub fn rewrite(&self, raw_query: &str, thread: &ConversationThread) -> RewriteOutcome {
        let mut query = raw_query.to_string();
        let mut resolutions = Vec::new();
        let mut unresolved = Vec::new();

        for marker in MARKERS.iter() {
            let spans: Vec<(usize, usize)> = marker
                .pattern
                .captures_iter(&query)
                .filter(|caps| (marker.accepts)(&query, caps))
                .filter_map(|caps| caps.get(0).map(|m| (m.start(), m.end())))
                .collect();
            let Some(&(first_start, first_end)) = spans.first() else {
                continue;
            };
            let marker_text = query[first_start..first_end].to_string();

            let Some((key, value)) = antecedent(thread, marker.candidates) else {
                unresolved.push(RewriteAmbiguous { marker: marker_text });
                continue;
            };

            for &(start, end) in spans.iter().rev() {
                let replacement = match marker.substitution {
                    Substitution::Place if starts_upper(&query[start..end]) => format!("In {}", value),
                    Substitution::Place => format!("in {}", value),
                    Substitution::Value => value.clone(),
                };
                query.replace_range(start..end, &replacement);
            }
            resolutions.push(Resolution {
                marker: marker_text,
                key,
                value,
            });
        }

        if !resolutions.is_empty() {
            debug!(
                "Rewrote '{}' -> '{}'",
                crate::safe_truncate(raw_query, 80),
                crate::safe_truncate(&query, 80)
            );
        }
        for ambiguous in &unresolved {
            warn!("{} in thread {}", ambiguous, thread.thread_id);
        }

        RewriteOutcome {
            query,
            resolutions,
            unresolved,
        }
    }
}
