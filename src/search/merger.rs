

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use strum::{Display, IntoStaticStr};
use tracing::debug;

use super::vector::enrich::parse_visa_id;
use super::vector::{EnrichedHit, VISA_INDEX};
use crate::db::Row;


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provenance {
    Structured,
    Vector,
}


/// One deduplicated context entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub entity_id: String,
    pub score: f32,
    pub provenance: BTreeSet<Provenance>,
    pub source_indexes: BTreeSet<String>,
    pub row: Row,
}

impl RankedItem {
    pub fn is_hybrid(&self) -> bool {
        self.provenance.len() > 1
    }
}


fn text_field<'a>(row: &'a Row, field: &str) -> Option<&'a str> {
    row.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Identity of a structured row: review, then hotel, then visa route.
fn row_key(row: &Row) -> Option<String> {
    if let Some(review_id) = row.get("review_id").filter(|v| !v.is_null()) {
        let id = review_id.as_str().map(str::to_string).unwrap_or_else(|| review_id.to_string());
        return Some(format!("review:{}", id));
    }
    if let Some(hotel_id) = text_field(row, "hotel_id") {
        return Some(hotel_id.to_string());
    }
    if let (Some(from), Some(to)) = (text_field(row, "from_country"), text_field(row, "to_country")) {
        return Some(format!("{}_to_{}", from, to));
    }
    None
}

/// Placeholder row for a vector hit the graph could not describe.
fn bare_row(hit: &EnrichedHit) -> Row {
    let mut row = Row::new();
    match parse_visa_id(&hit.hit.entity_id) {
        Some((from, to)) if hit.hit.source_indexes.contains(VISA_INDEX) => {
            row.insert("from_country".to_string(), Value::String(from.to_string()));
            row.insert("to_country".to_string(), Value::String(to.to_string()));
        }
        _ => {
            row.insert("hotel_id".to_string(), Value::String(hit.hit.entity_id.clone()));
        }
    }
    row
}


/// Combines graph rows and vector hits into one ranked, bounded list.
#[derive(Debug, Clone, Copy)]
pub struct ResultMerger {
    structured_base_score: f32,
    structured_match_boost: f32,
}

impl ResultMerger {
    pub fn new(structured_base_score: f32, structured_match_boost: f32) -> Self {
        Self {
            structured_base_score,
            structured_match_boost,
        }
    }

    /// Entities found by both sources appear once, scored `max(base, vector) + match boost`.
    /// Equal scores keep arrival order, structured rows first.
    pub fn merge(&self, structured_rows: Vec<Row>, hits: Vec<EnrichedHit>, max_items: usize) -> Vec<RankedItem> {
        let mut items: Vec<RankedItem> = Vec::with_capacity(structured_rows.len() + hits.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (i, row) in structured_rows.into_iter().enumerate() {
            let key = row_key(&row);
            if let Some(key) = &key {
                if positions.contains_key(key) {
                    continue;
                }
                positions.insert(key.clone(), items.len());
            }
            items.push(RankedItem {
                entity_id: key.unwrap_or_else(|| format!("row:{}", i)),
                score: self.structured_base_score,
                provenance: BTreeSet::from([Provenance::Structured]),
                source_indexes: BTreeSet::new(),
                row,
            });
        }

        let mut corroborated = 0;
        for hit in hits {
            match positions.get(&hit.hit.entity_id) {
                Some(&position) => {
                    let item = &mut items[position];
                    if item.provenance.insert(Provenance::Vector) {
                        item.score = item.score.max(hit.hit.aggregate_score) + self.structured_match_boost;
                        corroborated += 1;
                    }
                    item.source_indexes.extend(hit.hit.source_indexes.iter().cloned());
                    if let Some(details) = hit.details {
                        for (field, value) in details {
                            item.row.entry(field).or_insert(value);
                        }
                    }
                }
                None => {
                    let row = match &hit.details {
                        Some(details) => details.clone(),
                        None => bare_row(&hit),
                    };
                    positions.insert(hit.hit.entity_id.clone(), items.len());
                    items.push(RankedItem {
                        entity_id: hit.hit.entity_id,
                        score: hit.hit.aggregate_score,
                        provenance: BTreeSet::from([Provenance::Vector]),
                        source_indexes: hit.hit.source_indexes,
                        row,
                    });
                }
            }
        }

        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        items.truncate(max_items);

        debug!(
            "Merged context: {} items, {} corroborated by both sources",
            items.len(),
            corroborated
        );
        items
    }
}
