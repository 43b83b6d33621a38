

use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{MergedHit, VISA_INDEX};
use crate::db::Row;
use crate::search::structured::StructuredRetriever;
use crate::search::templates::names;


/// A merged vector hit plus whatever graph details could be attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedHit {
    pub hit: MergedHit,
    pub details: Option<Row>,
}

impl From<MergedHit> for EnrichedHit {
    fn from(hit: MergedHit) -> Self {
        Self { hit, details: None }
    }
}


/// Splits a visa entity id of the form `From_to_To`.
pub fn parse_visa_id(entity_id: &str) -> Option<(&str, &str)> {
    let (from, to) = entity_id.split_once("_to_")?;
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some((from, to))
}


/// Looks up graph details for vector hits. Failures leave the hit bare.
pub struct HitEnricher {
    retriever: Arc<StructuredRetriever>,
}

impl HitEnricher {
    pub fn new(retriever: Arc<StructuredRetriever>) -> Self {
        Self { retriever }
    }

    pub async fn enrich(&self, hits: Vec<MergedHit>) -> Vec<EnrichedHit> {
        let lookups = hits.iter().map(|hit| self.details_for(hit));
        let details = join_all(lookups).await;

        let enriched: Vec<EnrichedHit> = hits
            .into_iter()
            .zip(details)
            .map(|(hit, details)| EnrichedHit { hit, details })
            .collect();
        debug!(
            "Enriched {}/{} vector hits",
            enriched.iter().filter(|h| h.details.is_some()).count(),
            enriched.len()
        );
        enriched
    }

    async fn details_for(&self, hit: &MergedHit) -> Option<Row> {
        let (template, params) = if hit.source_indexes.contains(VISA_INDEX) {
            let (from, to) = parse_visa_id(&hit.entity_id)?;
            let mut params = Map::new();
            params.insert("from_country".to_string(), Value::String(from.to_string()));
            params.insert("to_country".to_string(), Value::String(to.to_string()));
            (names::VISA_REQUIREMENTS, params)
        } else {
            let mut params = Map::new();
            params.insert("hotel_id".to_string(), Value::String(hit.entity_id.clone()));
            (names::HOTEL_DETAILS_BY_ID, params)
        };

        match self.retriever.execute(template, &params).await {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!("Could not enrich {} via {}: {}", hit.entity_id, template, e);
                None
            }
        }
    }
}
