

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::providers::LlmProvider;
use crate::core::intent::Intent;
use crate::utils::title_case;

/// Loosely typed extractor output; keys are validated later against the entity vocabulary.
pub type RawEntities = Map<String, Value>;


#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, query: &str, intent: Intent) -> RawEntities;
}


pub const TRAVELLER_TYPES: [&str; 5] = ["Business", "Couple", "Family", "Solo", "Group"];

pub const KNOWN_CITIES: [&str; 25] = [
    "New York", "London", "Paris", "Tokyo", "Dubai", "Singapore", "Sydney",
    "Rio de Janeiro", "Berlin", "Toronto", "Shanghai", "Mexico City", "Mumbai",
    "Rome", "Cape Town", "Seoul", "Moscow", "Cairo", "Barcelona", "Bangkok",
    "Istanbul", "Amsterdam", "Buenos Aires", "Lagos", "Wellington",
];

pub const KNOWN_COUNTRIES: [&str; 25] = [
    "United States", "United Kingdom", "France", "Japan", "United Arab Emirates",
    "Singapore", "Australia", "Brazil", "Germany", "Canada", "China", "Mexico",
    "India", "Italy", "South Africa", "South Korea", "Russia", "Egypt", "Spain",
    "Thailand", "Turkey", "Netherlands", "Argentina", "Nigeria", "New Zealand",
];

const COUNTRY_ALIASES: [(&str, &str); 8] = [
    ("usa", "United States"),
    ("us", "United States"),
    ("america", "United States"),
    ("uk", "United Kingdom"),
    ("england", "United Kingdom"),
    ("uae", "United Arab Emirates"),
    ("korea", "South Korea"),
    ("holland", "Netherlands"),
];

const NUMERIC_KEYS: [&str; 8] = [
    "min_rating",
    "star_rating",
    "min_cleanliness",
    "min_comfort",
    "min_value",
    "min_staff",
    "min_location",
    "min_facilities",
];


fn match_known(input: &str, known: &[&str]) -> Option<String> {
    let lowered = input.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    if let Some(exact) = known.iter().find(|k| k.to_lowercase() == lowered) {
        return Some(exact.to_string());
    }
    if lowered.chars().count() < 3 {
        return None;
    }
    known
        .iter()
        .find(|k| {
            let k = k.to_lowercase();
            k.contains(&lowered) || lowered.contains(&k)
        })
        .map(|k| k.to_string())
}

pub fn normalize_city(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match_known(trimmed, &KNOWN_CITIES).unwrap_or_else(|| title_case(trimmed)))
}

pub fn normalize_country(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if let Some((_, canonical)) = COUNTRY_ALIASES.iter().find(|(alias, _)| *alias == lowered) {
        return Some(canonical.to_string());
    }
    Some(match_known(trimmed, &KNOWN_COUNTRIES).unwrap_or_else(|| title_case(trimmed)))
}

pub fn normalize_traveller_type(input: &str) -> Option<String> {
    let singular = match input.trim().to_lowercase().as_str() {
        "families" | "family" | "kids" | "children" => "Family",
        "couples" | "couple" | "honeymoon" => "Couple",
        "groups" | "group" | "friends" => "Group",
        "solo" | "alone" | "single" => "Solo",
        "business" | "business travellers" | "business travelers" => "Business",
        _ => return None,
    };
    TRAVELLER_TYPES.contains(&singular).then(|| singular.to_string())
}

/// Canonicalises extractor output: drops nulls, types numbers, normalises places and
/// traveller types. Unknown keys are left for the entity contract to accept or drop.
pub fn normalize_entities(raw: RawEntities) -> RawEntities {
    let mut normalized = Map::new();

    for (key, value) in raw {
        if value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty() || s == "null") {
            continue;
        }

        let as_text = || match &value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        let normalized_value = match key.as_str() {
            "traveller_type" => normalize_traveller_type(&as_text()).map(Value::from),
            "city" => normalize_city(&as_text()).map(Value::from),
            "country" | "from_country" | "to_country" => normalize_country(&as_text()).map(Value::from),
            "limit" => as_text()
                .parse::<f64>()
                .ok()
                .filter(|n| *n >= 1.0)
                .map(|n| Value::from(n.round() as i64)),
            k if NUMERIC_KEYS.contains(&k) => as_text().parse::<f64>().ok().map(Value::from),
            _ => Some(value.clone()),
        };

        match normalized_value {
            Some(v) => {
                normalized.insert(key, v);
            }
            None => debug!("Discarding unusable value for {}: {}", key, value),
        }
    }

    normalized
}


fn entity_schema(intent: Intent) -> &'static [(&'static str, &'static str)] {
    match intent {
        Intent::HotelSearch => &[
            ("city", "string or null"),
            ("country", "string or null"),
            ("min_rating", "number or null"),
            ("star_rating", "number or null"),
            ("limit", "number or null"),
        ],
        Intent::HotelRecommendation => &[
            ("traveller_type", "string or null"),
            ("min_cleanliness", "number or null"),
            ("min_comfort", "number or null"),
            ("min_value", "number or null"),
            ("min_staff", "number or null"),
            ("city", "string or null"),
            ("limit", "number or null"),
        ],
        Intent::ReviewLookup => &[
            ("hotel_name", "string or null"),
            ("hotel_id", "string or null"),
            ("limit", "number or null"),
        ],
        Intent::LocationQuery => &[("city", "string or null"), ("limit", "number or null")],
        Intent::VisaQuestion => &[
            ("from_country", "string or null"),
            ("to_country", "string or null"),
            ("traveller_type", "Business|Couple|Family|Solo|Group or null"),
        ],
        Intent::AmenityFilter => &[
            ("min_cleanliness", "number or null"),
            ("min_comfort", "number or null"),
            ("min_value", "number or null"),
            ("min_staff", "number or null"),
            ("min_location", "number or null"),
            ("min_facilities", "number or null"),
            ("limit", "number or null"),
        ],
        Intent::GeneralQuestionAnswering => &[
            ("hotel_name", "string or null"),
            ("city", "string or null"),
            ("country", "string or null"),
        ],
        Intent::CasualConversation => &[],
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract entities from hotel travel questions. \
Extract ONLY entities explicitly mentioned and use null for anything missing. \
Traveller types are singular (Family, Couple, Solo, Business, Group); \"me and my partner\" is Couple. \
Scores are numbers: \"above 8.5\" is 8.5, \"high\" without a number is 8.0, \"good\" or \"best\" without a number is 7.5. \
Reply with a single JSON object using exactly the requested keys.";


/// Extraction through the LLM's JSON mode; provider failures and malformed replies
/// fall back to the pattern extractor.
pub struct LlmEntityExtractor {
    llm: Arc<dyn LlmProvider>,
    fallback: PatternEntityExtractor,
}

impl LlmEntityExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            fallback: PatternEntityExtractor::new(),
        }
    }
}

#[async_trait]
impl EntityExtractor for LlmEntityExtractor {
    async fn extract(&self, query: &str, intent: Intent) -> RawEntities {
        let schema = entity_schema(intent);
        if query.trim().is_empty() || schema.is_empty() {
            return RawEntities::new();
        }

        let schema_json: Map<String, Value> = schema
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect();
        let user_prompt = format!(
            "Query: \"{}\"\nIntent: {}\nJSON keys: {}",
            query,
            intent,
            Value::Object(schema_json)
        );

        match self.llm.generate_object(EXTRACTION_SYSTEM_PROMPT, &user_prompt).await {
            Ok((map, metadata)) => {
                debug!("Extracted {} raw entities ({:?} tokens)", map.len(), metadata.total_tokens());
                normalize_entities(map)
            }
            Err(e) => {
                warn!("Entity extraction failed, using pattern fallback: {}", e);
                self.fallback.extract_sync(query, intent)
            }
        }
    }
}


lazy_static! {
    static ref VISA_ROUTE: Regex =
        Regex::new(r"(?i)\bfrom\s+(?:the\s+)?([a-z][a-z ]*?)\s+to\s+(?:the\s+)?([a-z][a-z ]*?)\s*(?:[?.!,]|$)").unwrap();
    static ref TRAVELLER: Regex =
        Regex::new(r"(?i)\b(business|couples?|famil(?:y|ies)|solo|groups?)\b").unwrap();
    static ref PARTNER: Regex =
        Regex::new(r"(?i)\b(my (wife|husband|partner|girlfriend|boyfriend)|honeymoon)\b").unwrap();
    static ref SCORE: Regex = Regex::new(
        r"(?i)\b(cleanliness|clean|comfort|value|staff|location|facilities)\b[^0-9\n]{0,30}?(\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref HIGH_SCORE: Regex =
        Regex::new(r"(?i)\b(high|great|excellent)\s+(cleanliness|comfort|value|staff|location|facilities)\b").unwrap();
    static ref RATING: Regex =
        Regex::new(r"(?i)\brat(?:ing|ed)\s+(?:of\s+)?(?:above|over|at least|more than|>=?)\s*(\d+(?:\.\d+)?)").unwrap();
    static ref STARS: Regex = Regex::new(r"(?i)\b([1-5])[- ]?stars?\b").unwrap();
    static ref LIMIT: Regex = Regex::new(r"(?i)\b(?:top|best|first)\s+(\d{1,2})\b").unwrap();
    static ref QUOTED_NAME: Regex = Regex::new(r#"["“]([^"”]{2,80})["”]"#).unwrap();
    static ref CAPITALISED_NAME: Regex =
        Regex::new(r"\b(?:for|about|at|of)\s+((?:[A-Z][\w'&-]*)(?:\s+[A-Z][\w'&-]*)*)").unwrap();
}

fn score_key(word: &str) -> &'static str {
    match word.to_lowercase().as_str() {
        "cleanliness" | "clean" => "min_cleanliness",
        "comfort" => "min_comfort",
        "value" => "min_value",
        "staff" => "min_staff",
        "location" => "min_location",
        _ => "min_facilities",
    }
}

fn find_known(query: &str, known: &[&str]) -> Option<String> {
    let lowered = query.to_lowercase();
    known
        .iter()
        .filter(|k| {
            Regex::new(&format!(r"\b{}\b", regex::escape(&k.to_lowercase())))
                .map(|re| re.is_match(&lowered))
                .unwrap_or(false)
        })
        .max_by_key(|k| k.len())
        .map(|k| k.to_string())
}


/// Offline extractor built on the dataset's known places and a handful of patterns.
#[derive(Debug, Default, Clone)]
pub struct PatternEntityExtractor;

impl PatternEntityExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_sync(&self, query: &str, intent: Intent) -> RawEntities {
        let mut raw = RawEntities::new();
        if query.trim().is_empty() || intent.is_conversational() {
            return raw;
        }

        if intent == Intent::VisaQuestion {
            if let Some(caps) = VISA_ROUTE.captures(query) {
                raw.insert("from_country".into(), Value::from(caps[1].trim()));
                raw.insert("to_country".into(), Value::from(caps[2].trim()));
            }
            if let Some(caps) = TRAVELLER.captures(query) {
                raw.insert("traveller_type".into(), Value::from(&caps[1]));
            }
            return normalize_entities(raw);
        }

        let city = find_known(query, &KNOWN_CITIES);
        if let Some(city) = &city {
            raw.insert("city".into(), Value::from(city.as_str()));
        }
        let country = find_known(query, &KNOWN_COUNTRIES).filter(|c| Some(c) != city.as_ref());
        if let Some(country) = country {
            raw.insert("country".into(), Value::from(country));
        }

        if let Some(caps) = TRAVELLER.captures(query) {
            raw.insert("traveller_type".into(), Value::from(&caps[1]));
        } else if PARTNER.is_match(query) {
            raw.insert("traveller_type".into(), Value::from("Couple"));
        }

        for caps in SCORE.captures_iter(query) {
            raw.entry(score_key(&caps[1]))
                .or_insert_with(|| Value::from(&caps[2]));
        }
        for caps in HIGH_SCORE.captures_iter(query) {
            raw.entry(score_key(&caps[2])).or_insert_with(|| Value::from(8.0));
        }
        if let Some(caps) = RATING.captures(query) {
            raw.insert("min_rating".into(), Value::from(&caps[1]));
        }
        if let Some(caps) = STARS.captures(query) {
            raw.insert("star_rating".into(), Value::from(&caps[1]));
        }
        if let Some(caps) = LIMIT.captures(query) {
            raw.insert("limit".into(), Value::from(&caps[1]));
        }

        let hotel_name = QUOTED_NAME
            .captures(query)
            .or_else(|| CAPITALISED_NAME.captures(query))
            .map(|caps| caps[1].trim().to_string())
            .filter(|name| {
                find_known(name, &KNOWN_CITIES).is_none() && find_known(name, &KNOWN_COUNTRIES).is_none()
            });
        if let Some(name) = hotel_name {
            raw.insert("hotel_name".into(), Value::from(name));
        }

        normalize_entities(raw)
    }
}

#[async_trait]
impl EntityExtractor for PatternEntityExtractor {
    async fn extract(&self, query: &str, intent: Intent) -> RawEntities {
        self.extract_sync(query, intent)
    }
}
