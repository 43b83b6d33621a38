

use serde_json::{Map, Value};
use std::fmt::Write;

use super::merger::RankedItem;
use crate::core::entities::{EntityBag, EntityKey};
use crate::core::intent::Intent;
use crate::utils::{safe_truncate_ellipsis, title_case};


pub const NO_RESULTS: &str = "No results found.";

const CHARS_PER_TOKEN: usize = 4;
const REVIEW_EXCERPT_CHARS: usize = 200;


fn is_hotel(row: &Map<String, Value>) -> bool {
    !is_review(row) && (row.contains_key("hotel_name") || row.contains_key("hotel_id"))
}

fn is_review(row: &Map<String, Value>) -> bool {
    row.contains_key("review_id") || row.contains_key("review_text")
}

fn field<'a>(row: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    row.get(name).filter(|v| !v.is_null())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.2}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}


/// Renders ranked items into the bounded text block handed to answer synthesis.
#[derive(Debug, Clone, Copy)]
pub struct ContextFormatter {
    max_chars: usize,
}

impl ContextFormatter {
    pub fn new(max_context_tokens: usize) -> Self {
        Self {
            max_chars: max_context_tokens * CHARS_PER_TOKEN,
        }
    }

    pub fn format(&self, intent: Intent, entities: &EntityBag, items: &[RankedItem]) -> String {
        if items.is_empty() {
            return NO_RESULTS.to_string();
        }

        let mut out = String::new();
        let mut used = 0usize;
        let mut push = |out: &mut String, block: String| -> bool {
            if used + block.len() > self.max_chars {
                return false;
            }
            used += block.len();
            out.push_str(&block);
            true
        };

        push(&mut out, format!("{}\n\n", header(intent, entities)));

        let hotels: Vec<_> = items.iter().filter(|i| is_hotel(&i.row)).collect();
        let reviews: Vec<_> = items.iter().filter(|i| is_review(&i.row)).collect();
        let others: Vec<_> = items
            .iter()
            .filter(|i| !is_hotel(&i.row) && !is_review(&i.row))
            .collect();

        for (n, item) in others.iter().enumerate() {
            if !push(&mut out, format_other(item, n + 1)) {
                break;
            }
        }

        if !hotels.is_empty() && push(&mut out, "=== HOTELS ===\n".to_string()) {
            for (n, item) in hotels.iter().enumerate() {
                if !push(&mut out, format_hotel(item, n + 1)) {
                    break;
                }
            }
        }

        if !reviews.is_empty() && push(&mut out, "\n=== REVIEWS ===\n".to_string()) {
            for (n, item) in reviews.iter().enumerate() {
                if !push(&mut out, format_review(item, n + 1)) {
                    break;
                }
            }
        }

        out.trim_end().to_string()
    }
}

/// Describes what the rows represent, using the entities that shaped the query.
fn header(intent: Intent, entities: &EntityBag) -> String {
    let city = entities.text(EntityKey::City);
    let traveller = entities.text(EntityKey::TravellerType);

    if let Some(from) = entities.text(EntityKey::FromCountry).filter(|_| intent != Intent::VisaQuestion) {
        return format!("Hotels Popular Among Travellers from {}", from);
    }
    if intent == Intent::HotelRecommendation {
        match (traveller, city) {
            (Some(t), Some(c)) => return format!("Top Hotels in {} for {} Travellers", c, t),
            (Some(t), None) => return format!("Top Hotels for {} Travellers", t),
            _ => {}
        }
    }
    if intent == Intent::AmenityFilter {
        let criteria: Vec<String> = [
            (EntityKey::MinCleanliness, "Cleanliness"),
            (EntityKey::MinComfort, "Comfort"),
            (EntityKey::MinStaff, "Staff"),
            (EntityKey::MinValue, "Value"),
            (EntityKey::MinLocation, "Location"),
            (EntityKey::MinFacilities, "Facilities"),
        ]
        .iter()
        .filter_map(|(key, label)| entities.get(*key).map(|v| format!("{} >= {}", label, v)))
        .collect();
        if !criteria.is_empty() {
            return match city {
                Some(c) => format!("Hotels in {} matching: {}", c, criteria.join(", ")),
                None => format!("Hotels matching: {}", criteria.join(", ")),
            };
        }
    }

    match intent {
        Intent::HotelSearch => "Search Results for Hotels",
        Intent::HotelRecommendation => "Recommended Hotels",
        Intent::ReviewLookup => "Reviews and Feedback",
        Intent::LocationQuery => "Hotels by Location",
        Intent::VisaQuestion => "Visa Information",
        Intent::AmenityFilter => "Hotels Matching Your Criteria",
        Intent::GeneralQuestionAnswering => "Hotel Information",
        Intent::CasualConversation => "Search Results",
    }
    .to_string()
}

const SCORE_FIELDS: &[(&str, &str)] = &[
    ("avg_cleanliness", "Cleanliness"),
    ("avg_comfort", "Comfort"),
    ("avg_value", "Value"),
    ("avg_staff_score", "Staff"),
    ("avg_location_score", "Location"),
    ("avg_facilities", "Facilities"),
    ("avg_rating", "Overall Rating"),
];

fn format_hotel(item: &RankedItem, n: usize) -> String {
    let row = &item.row;
    let name = field(row, "hotel_name").map(render_value).unwrap_or_else(|| "Unknown Hotel".to_string());
    let location = match (field(row, "city").map(render_value), field(row, "country").map(render_value)) {
        (Some(city), Some(country)) => format!("{}, {}", city, country),
        (Some(one), None) | (None, Some(one)) => one,
        (None, None) => "Location unknown".to_string(),
    };

    let mut text = format!("{}. {}\n   Location: {}\n", n, name, location);
    if let Some(stars) = field(row, "star_rating") {
        let _ = writeln!(text, "   Star Rating: {}", render_value(stars));
    }
    if let Some(avg) = field(row, "avg_score").or_else(|| field(row, "average_reviews_score")) {
        let _ = writeln!(text, "   Average Score: {}", render_value(avg));
    }
    let _ = writeln!(text, "   Relevance: {:.2}", item.score);

    let scores: Vec<String> = SCORE_FIELDS
        .iter()
        .filter_map(|(name, label)| field(row, name).map(|v| format!("{}: {}", label, render_value(v))))
        .collect();
    if !scores.is_empty() {
        let _ = writeln!(text, "   Scores: {}", scores.join(", "));
    }

    if let Some(count) = field(row, "review_count").or_else(|| field(row, "total_reviews")) {
        let _ = write!(text, "   Reviews: {}", render_value(count));
        if let Some(t) = field(row, "traveller_type") {
            let _ = write!(text, " (by {} travellers)", render_value(t));
        }
        text.push('\n');
    }

    text.push('\n');
    text
}

fn format_review(item: &RankedItem, n: usize) -> String {
    let row = &item.row;
    let hotel = field(row, "hotel_name").map(render_value).unwrap_or_else(|| "Unknown Hotel".to_string());
    let body = field(row, "review_text")
        .map(render_value)
        .unwrap_or_else(|| "No review text".to_string());

    let mut text = format!("{}. Review for {}\n", n, hotel);
    if let Some(score) = field(row, "score_overall") {
        let _ = writeln!(text, "   Score: {}", render_value(score));
    }
    if let Some(t) = field(row, "traveller_type") {
        let _ = writeln!(text, "   Traveller: {}", render_value(t));
    }
    let _ = writeln!(text, "   Relevance: {:.2}", item.score);
    let _ = writeln!(text, "   Text: {}\n", safe_truncate_ellipsis(&body, REVIEW_EXCERPT_CHARS));
    text
}

fn format_other(item: &RankedItem, n: usize) -> String {
    let row = &item.row;
    let from = field(row, "from_country").map(render_value);
    let to = field(row, "to_country").map(render_value);

    match (from, to) {
        (Some(from), Some(to)) if row.contains_key("traveller_count") => format!(
            "{}. TRAVELLER STATISTICS\n   From: {}\n   Destination: {}\n   Travellers (no visa required): {}\n\n",
            n,
            from,
            to,
            field(row, "traveller_count").map(render_value).unwrap_or_else(|| "0".to_string())
        ),
        (Some(from), Some(to)) => {
            let required = field(row, "visa_required").and_then(Value::as_bool);
            let mut text = format!("{}. VISA INFORMATION\n   From: {}\n   To: {}\n", n, from, to);
            let _ = writeln!(
                text,
                "   Visa Required: {}",
                match required {
                    Some(true) => "Yes",
                    Some(false) => "No",
                    None => "Unknown",
                }
            );
            if let (Some(true), Some(kind)) = (required, field(row, "visa_type")) {
                let _ = writeln!(text, "   Visa Type: {}", render_value(kind));
            }
            text.push('\n');
            text
        }
        _ => {
            let mut text = format!("=== QUERY RESULT {} ===\n", n);
            for (key, value) in row {
                let _ = writeln!(text, "{}: {}", title_case(&key.replace('_', " ")), render_value(value));
            }
            text.push('\n');
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::merger::Provenance;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn item(id: &str, score: f32, row: Value) -> RankedItem {
        RankedItem {
            entity_id: id.to_string(),
            score,
            provenance: BTreeSet::from([Provenance::Structured]),
            source_indexes: BTreeSet::new(),
            row: row.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_empty_is_no_results() {
        let formatter = ContextFormatter::new(2500);
        assert_eq!(formatter.format(Intent::HotelSearch, &EntityBag::new(), &[]), NO_RESULTS);
    }

    #[test]
    fn test_sections_and_header() {
        let entities = EntityBag::builder()
            .with(EntityKey::TravellerType, "Solo")
            .with(EntityKey::City, "Paris")
            .build();
        let items = vec![
            item(
                "h1",
                1.2,
                json!({"hotel_id": "h1", "hotel_name": "Aurora", "city": "Paris", "country": "France",
                       "star_rating": 4, "avg_cleanliness": 9.126}),
            ),
            item("review:3", 0.9, json!({"review_id": 3, "hotel_name": "Aurora", "review_text": "Lovely stay"})),
            item("Egypt_to_France", 0.8, json!({"from_country": "Egypt", "to_country": "France", "visa_required": false})),
        ];

        let text = ContextFormatter::new(2500).format(Intent::HotelRecommendation, &entities, &items);
        assert!(text.starts_with("Top Hotels in Paris for Solo Travellers\n\n1. VISA INFORMATION"));
        assert!(text.contains("Visa Required: No"));
        assert!(text.contains("=== HOTELS ===\n1. Aurora\n   Location: Paris, France"));
        assert!(text.contains("Scores: Cleanliness: 9.13"));
        assert!(text.contains("=== REVIEWS ===\n1. Review for Aurora"));
        assert!(text.contains("Text: Lovely stay"));
    }

    #[test]
    fn test_output_bounded_by_token_budget() {
        let items: Vec<_> = (0..50)
            .map(|i| item(&format!("h{}", i), 1.0, json!({"hotel_id": format!("h{}", i), "hotel_name": "Hotel"})))
            .collect();
        let text = ContextFormatter::new(100).format(Intent::HotelSearch, &EntityBag::new(), &items);
        assert!(text.len() <= 400);
        assert!(text.contains("1. Hotel"));
    }

    #[test]
    fn test_amenity_header_lists_thresholds() {
        let entities = EntityBag::builder().with(EntityKey::MinComfort, 8.5).build();
        let text = ContextFormatter::new(500).format(
            Intent::AmenityFilter,
            &entities,
            &[item("h1", 1.0, json!({"hotel_id": "h1"}))],
        );
        assert!(text.starts_with("Hotels matching: Comfort >= 8.5"));
    }
}
