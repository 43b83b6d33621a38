

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::index::{distance_to_similarity, normalize};
use super::{MergedHit, SearchHit, VectorIndex, VectorIndexError, VectorIndexRegistry};
use crate::llm::embeddings::{Embedder, EmbeddingError};


/// Embeds a query and searches several indexes, merging hits per entity.
pub struct MultiIndexSearcher {
    registry: Arc<VectorIndexRegistry>,
    embedder: Arc<dyn Embedder>,
    cross_index_boost: f32,
}

impl MultiIndexSearcher {
    pub fn new(registry: Arc<VectorIndexRegistry>, embedder: Arc<dyn Embedder>, cross_index_boost: f32) -> Self {
        Self {
            registry,
            embedder,
            cross_index_boost,
        }
    }

    pub fn registry(&self) -> &Arc<VectorIndexRegistry> {
        &self.registry
    }

    /// Ranked merged hits, at most `limit`. Unknown index names fail before any embedding.
    pub async fn search(
        &self,
        query: &str,
        indexes: &[&str],
        top_k: usize,
        similarity_threshold: f32,
        limit: usize,
    ) -> Result<Vec<MergedHit>, VectorIndexError> {
        let snapshot = self.registry.snapshot();
        let selected: Vec<&Arc<VectorIndex>> = indexes
            .iter()
            .map(|name| snapshot.get(name))
            .collect::<Result<_, _>>()?;

        if selected.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let embeddings = self.embed_per_space(query, &selected).await?;

        let mut hits = Vec::new();
        for index in &selected {
            let key = (index.model().to_string(), index.dimension());
            let Some(embedding) = embeddings.get(&key) else {
                continue;
            };
            hits.extend(search_index(index, embedding, top_k, similarity_threshold)?);
        }

        let merged = merge_hits(hits, self.cross_index_boost, limit);
        info!(
            "Vector search over {:?} returned {} merged hits ({} boosted)",
            indexes,
            merged.len(),
            merged.iter().filter(|h| h.boosted).count()
        );
        Ok(merged)
    }

    /// One unit-length embedding per distinct (model, dimension) among the selected indexes.
    async fn embed_per_space(
        &self,
        query: &str,
        selected: &[&Arc<VectorIndex>],
    ) -> Result<HashMap<(String, usize), Vec<f32>>, VectorIndexError> {
        let spaces: BTreeSet<(String, usize)> = selected
            .iter()
            .map(|index| (index.model().to_string(), index.dimension()))
            .collect();

        let futures = spaces.iter().map(|(model, _)| self.embedder.embed(query, model));
        let results = join_all(futures).await;

        let mut embeddings = HashMap::with_capacity(spaces.len());
        for (space, result) in spaces.into_iter().zip(results) {
            let mut embedding = result?;
            if !normalize(&mut embedding) {
                return Err(EmbeddingError::InvalidResponse(format!("zero-length embedding from {}", space.0)).into());
            }
            debug!("Embedded query for model {} (dim {})", space.0, space.1);
            embeddings.insert(space, embedding);
        }
        Ok(embeddings)
    }
}

fn search_index(
    index: &VectorIndex,
    embedding: &[f32],
    top_k: usize,
    similarity_threshold: f32,
) -> Result<Vec<SearchHit>, VectorIndexError> {
    let mut hits = Vec::new();
    for (slot, distance) in index.nearest(embedding, top_k)? {
        let similarity = distance_to_similarity(distance);
        if similarity < similarity_threshold {
            continue;
        }
        let entity_id = index.entity_id(slot).ok_or_else(|| {
            VectorIndexError::artifact(index.name(), format!("slot {} has no id mapping entry", slot))
        })?;
        hits.push(SearchHit {
            entity_id: entity_id.to_string(),
            index_name: index.name().to_string(),
            similarity,
        });
    }
    debug!("Index {} produced {} hits above {}", index.name(), hits.len(), similarity_threshold);
    Ok(hits)
}

/// Groups hits by entity. Repeat hits within one index keep the best similarity;
/// the strongest index seeds the score and every other index adds `boost` times its similarity.
pub fn merge_hits(hits: Vec<SearchHit>, boost: f32, limit: usize) -> Vec<MergedHit> {
    let mut per_entity: BTreeMap<String, BTreeMap<String, f32>> = BTreeMap::new();
    for hit in hits {
        let best = per_entity
            .entry(hit.entity_id)
            .or_default()
            .entry(hit.index_name)
            .or_insert(hit.similarity);
        if hit.similarity > *best {
            *best = hit.similarity;
        }
    }

    let mut merged: Vec<MergedHit> = per_entity
        .into_iter()
        .map(|(entity_id, similarities)| {
            let seed = similarities.values().copied().fold(0.0, f32::max);
            let corroboration: f32 = similarities.values().sum::<f32>() - seed;
            MergedHit {
                entity_id,
                aggregate_score: seed + boost * corroboration,
                source_indexes: similarities.keys().cloned().collect(),
                boosted: similarities.len() > 1,
                similarities,
            }
        })
        .collect();

    merged.sort_by(|a, b| {
        b.aggregate_score
            .total_cmp(&a.aggregate_score)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::vector::{HOTEL_INDEX, REVIEW_INDEX, VISA_INDEX};
    use crate::testing::TableEmbedder;

    fn hit(entity: &str, index: &str, similarity: f32) -> SearchHit {
        SearchHit {
            entity_id: entity.to_string(),
            index_name: index.to_string(),
            similarity,
        }
    }

    fn index(name: &str, model: &str, rows: &[(&str, Vec<f32>)]) -> VectorIndex {
        let dimension = rows[0].1.len();
        let vectors = rows.iter().map(|(_, v)| v.clone()).collect();
        let mapping = rows
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (i.to_string(), id.to_string()))
            .collect();
        VectorIndex::from_parts(name, model, dimension, vectors, mapping).unwrap()
    }

    fn searcher(embedder: Arc<TableEmbedder>) -> MultiIndexSearcher {
        let registry = VectorIndexRegistry::from_indexes(vec![
            index(
                HOTEL_INDEX,
                "minilm",
                &[("h1", vec![1.0, 0.0]), ("h2", vec![0.0, 1.0]), ("h3", vec![0.8, 0.6])],
            ),
            index(
                REVIEW_INDEX,
                "minilm",
                &[("h1", vec![0.6, 0.8]), ("h3", vec![1.0, 0.0]), ("h3", vec![0.98, 0.199])],
            ),
            index(VISA_INDEX, "mpnet", &[("Egypt_to_France", vec![0.0, 0.0, 1.0])]),
        ]);
        MultiIndexSearcher::new(Arc::new(registry), embedder, 0.5)
    }

    #[test]
    fn test_cross_index_hits_are_boosted() {
        let merged = merge_hits(
            vec![hit("h1", "review", 0.8), hit("h1", "hotel", 0.9), hit("h2", "hotel", 0.85)],
            0.5,
            10,
        );
        assert_eq!(merged[0].entity_id, "h1");
        assert!((merged[0].aggregate_score - 1.3).abs() < 1e-6);
        assert!(merged[0].boosted);
        assert_eq!(merged[0].source_indexes.len(), 2);
        assert!(merged[0].aggregate_score > 0.9);
        assert!(!merged[1].boosted);
        assert_eq!(merged[1].aggregate_score, 0.85);
    }

    #[test]
    fn test_merge_is_independent_of_hit_order() {
        let hits = vec![hit("a", "review", 0.71), hit("a", "hotel", 0.95), hit("b", "hotel", 0.8)];
        let mut reversed = hits.clone();
        reversed.reverse();
        assert_eq!(merge_hits(hits, 0.5, 10), merge_hits(reversed, 0.5, 10));
    }

    #[test]
    fn test_same_index_repeat_is_not_corroboration() {
        let merged = merge_hits(vec![hit("h3", "review", 0.9), hit("h3", "review", 0.95)], 0.5, 10);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].boosted);
        assert_eq!(merged[0].aggregate_score, 0.95);
    }

    #[test]
    fn test_ties_broken_by_entity_id_and_truncated() {
        let merged = merge_hits(
            vec![hit("b", "hotel", 0.8), hit("a", "hotel", 0.8), hit("c", "hotel", 0.9)],
            0.5,
            2,
        );
        let ids: Vec<_> = merged.iter().map(|h| h.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_search_across_hotel_and_review() {
        let embedder = Arc::new(TableEmbedder::new().with("solo hotels", vec![1.0, 0.0]));
        let merged = searcher(embedder.clone())
            .search("solo hotels", &[REVIEW_INDEX, HOTEL_INDEX], 5, 0.7, 10)
            .await
            .unwrap();

        assert_eq!(merged[0].entity_id, "h3");
        assert!(merged[0].boosted);
        assert_eq!(
            merged[0].source_indexes,
            [HOTEL_INDEX, REVIEW_INDEX].iter().map(|s| s.to_string()).collect()
        );
        assert!(merged[0].aggregate_score > merged[0].max_similarity());
        assert!(merged.iter().all(|h| h.entity_id != "h2"));
        assert_eq!(embedder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_query_embedding_scaled_to_unit_length() {
        let embedder = Arc::new(TableEmbedder::new().with("paris", vec![3.0, 0.0]));
        let merged = searcher(embedder)
            .search("paris", &[HOTEL_INDEX], 5, 0.7, 10)
            .await
            .unwrap();

        assert_eq!(merged[0].entity_id, "h1");
        assert!((merged[0].aggregate_score - 1.0).abs() < 1e-6);
        assert!(merged.iter().all(|h| h.entity_id != "h2"));
    }

    #[tokio::test]
    async fn test_zero_query_embedding_is_an_embedding_error() {
        let embedder = Arc::new(TableEmbedder::new().with("void", vec![0.0, 0.0]));
        let err = searcher(embedder)
            .search("void", &[HOTEL_INDEX], 5, 0.7, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorIndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_unknown_index_fails_before_embedding() {
        let embedder = Arc::new(TableEmbedder::new());
        let err = searcher(embedder.clone())
            .search("anything", &[HOTEL_INDEX, "flights"], 5, 0.5, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorIndexError::IndexNotFound(name) if name == "flights"));
        assert!(embedder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_embeds_once_per_model_space() {
        let embedder = Arc::new(
            TableEmbedder::new()
                .with_model("mpnet", "visa egypt", vec![0.0, 0.0, 1.0])
                .with("visa egypt", vec![1.0, 0.0]),
        );
        let merged = searcher(embedder.clone())
            .search("visa egypt", &[VISA_INDEX, HOTEL_INDEX], 5, 0.9, 10)
            .await
            .unwrap();

        let ids: Vec<_> = merged.iter().map(|h| h.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["Egypt_to_France", "h1"]);
        let mut models: Vec<_> = embedder.calls().into_iter().map(|(_, m)| m).collect();
        models.sort();
        assert_eq!(models, vec!["minilm", "mpnet"]);
    }

    #[tokio::test]
    async fn test_no_hits_is_empty_not_error() {
        let embedder = Arc::new(TableEmbedder::new().with("nothing", vec![-1.0, 0.0]));
        let merged = searcher(embedder)
            .search("nothing", &[HOTEL_INDEX], 5, 0.7, 10)
            .await
            .unwrap();
        assert!(merged.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces() {
        let embedder = Arc::new(TableEmbedder::new().failing());
        let err = searcher(embedder)
            .search("x", &[HOTEL_INDEX], 5, 0.7, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorIndexError::Embedding(_)));
    }
}
