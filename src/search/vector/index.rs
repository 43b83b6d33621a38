

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use super::VectorIndexError;
use crate::core::config::IndexSpec;


/// On-disk vector artifact.
#[derive(Debug, Serialize, Deserialize)]
struct IndexArtifact {
    dimension: usize,
    #[serde(default = "default_metric")]
    metric: String,
    vectors: Vec<Vec<f32>>,
}

fn default_metric() -> String {
    "l2".to_string()
}


/// Immutable flat L2 index with its slot to entity id mapping.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    name: String,
    model: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    id_mapping: Vec<String>,
}

impl VectorIndex {
    /// Validates that every vector has `dimension` components and every slot is mapped.
    /// Vectors are stored unit length so distances compare directions.
    pub fn from_parts(
        name: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        mapping: BTreeMap<String, String>,
    ) -> Result<Self, VectorIndexError> {
        let name = name.into();

        if dimension == 0 {
            return Err(VectorIndexError::artifact(&name, "dimension must be positive"));
        }
        if let Some((slot, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(VectorIndexError::artifact(
                &name,
                format!("vector {} has {} components, expected {}", slot, v.len(), dimension),
            ));
        }

        let mut vectors = vectors;
        if let Some(slot) = vectors.iter_mut().position(|v| !normalize(v)) {
            return Err(VectorIndexError::artifact(
                &name,
                format!("vector {} has zero length", slot),
            ));
        }

        let mut id_mapping = Vec::with_capacity(vectors.len());
        for slot in 0..vectors.len() {
            match mapping.get(&slot.to_string()) {
                Some(id) if !id.is_empty() => id_mapping.push(id.clone()),
                _ => {
                    return Err(VectorIndexError::artifact(
                        &name,
                        format!("slot {} has no id mapping entry", slot),
                    ));
                }
            }
        }

        Ok(Self {
            name,
            model: model.into(),
            dimension,
            vectors,
            id_mapping,
        })
    }

    /// Loads the index and id-mapping artifacts named by `spec`.
    pub fn load(spec: &IndexSpec, directory: &Path, default_model: &str) -> Result<Self, VectorIndexError> {
        let index_path = spec.index_path(directory);
        let mapping_path = spec.mapping_path(directory);

        let artifact: IndexArtifact = serde_json::from_reader(BufReader::new(File::open(&index_path)?))
            .map_err(|e| VectorIndexError::artifact(&spec.name, format!("{}: {}", index_path.display(), e)))?;
        if !artifact.metric.eq_ignore_ascii_case("l2") {
            return Err(VectorIndexError::artifact(
                &spec.name,
                format!("unsupported metric {}", artifact.metric),
            ));
        }

        let mapping: BTreeMap<String, String> =
            serde_json::from_reader(BufReader::new(File::open(&mapping_path)?)).map_err(|e| {
                VectorIndexError::artifact(&spec.name, format!("{}: {}", mapping_path.display(), e))
            })?;

        let model = spec.model.clone().unwrap_or_else(|| default_model.to_string());
        let index = Self::from_parts(&spec.name, model, artifact.dimension, artifact.vectors, mapping)?;

        info!(
            "Loaded vector index {} ({} vectors, dim={}, model={})",
            index.name,
            index.len(),
            index.dimension,
            index.model
        );
        Ok(index)
    }

    /// Writes both artifacts in the format `load` reads.
    pub fn save(&self, spec: &IndexSpec, directory: &Path) -> Result<(), VectorIndexError> {
        let artifact = IndexArtifact {
            dimension: self.dimension,
            metric: default_metric(),
            vectors: self.vectors.clone(),
        };
        let mapping: BTreeMap<String, &String> = self
            .id_mapping
            .iter()
            .enumerate()
            .map(|(slot, id)| (slot.to_string(), id))
            .collect();

        let to_artifact_err = |e: serde_json::Error| VectorIndexError::artifact(&self.name, e.to_string());
        serde_json::to_writer(BufWriter::new(File::create(spec.index_path(directory))?), &artifact)
            .map_err(to_artifact_err)?;
        serde_json::to_writer(BufWriter::new(File::create(spec.mapping_path(directory))?), &mapping)
            .map_err(to_artifact_err)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn entity_id(&self, slot: usize) -> Option<&str> {
        self.id_mapping.get(slot).map(String::as_str)
    }

    /// The `k` closest slots by squared L2 distance, nearest first, ties by slot.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                index: self.name.clone(),
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, v)| (slot, squared_l2(query, v)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Scales `vector` to unit length in place. False for a zero or non-finite vector.
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return false;
    }
    vector.iter_mut().for_each(|v| *v /= norm);
    true
}

/// Squared L2 distance to similarity. Exact cosine for unit vectors, clamped to [0, 1].
pub fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(ids: &[&str]) -> BTreeMap<String, String> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (i.to_string(), id.to_string()))
            .collect()
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let index = VectorIndex::from_parts(
            "hotel",
            "m",
            2,
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.6, 0.8]],
            mapping(&["h1", "h2", "h3"]),
        )
        .unwrap();

        let nearest = index.nearest(&[1.0, 0.0], 2).unwrap();
        assert_eq!(nearest[0], (1, 0.0));
        assert_eq!(nearest[1].0, 2);
        assert_eq!(index.entity_id(2), Some("h3"));
    }

    #[test]
    fn test_similarity_is_monotone_and_bounded() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(4.0), 0.0);
        assert_eq!(distance_to_similarity(9.0), 0.0);
        assert!(distance_to_similarity(0.4) > distance_to_similarity(0.8));
    }

    #[test]
    fn test_vectors_stored_unit_length() {
        let index = VectorIndex::from_parts("hotel", "m", 2, vec![vec![3.0, 4.0]], mapping(&["h1"])).unwrap();
        let nearest = index.nearest(&[0.6, 0.8], 1).unwrap();
        assert!(nearest[0].1 < 1e-6);

        let err = VectorIndex::from_parts("hotel", "m", 2, vec![vec![0.0, 0.0]], mapping(&["h1"])).unwrap_err();
        assert!(err.to_string().contains("zero length"));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 0.0];
        assert!(normalize(&mut v));
        assert_eq!(v, vec![1.0, 0.0]);
        assert!(!normalize(&mut [0.0, 0.0]));
        assert!(!normalize(&mut [f32::NAN, 1.0]));
    }

    #[test]
    fn test_unmapped_slot_rejected() {
        let mut ids = mapping(&["h1"]);
        ids.insert("5".to_string(), "h5".to_string());
        let err = VectorIndex::from_parts("hotel", "m", 1, vec![vec![1.0], vec![0.5]], ids).unwrap_err();
        assert!(err.to_string().contains("slot 1 has no id mapping"));
    }

    #[test]
    fn test_dimension_checks() {
        let err = VectorIndex::from_parts("visa", "m", 2, vec![vec![1.0]], mapping(&["a"])).unwrap_err();
        assert!(matches!(err, VectorIndexError::Artifact { .. }));

        let index = VectorIndex::from_parts("visa", "m", 2, vec![vec![1.0, 0.0]], mapping(&["a"])).unwrap();
        assert!(matches!(
            index.nearest(&[1.0], 1),
            Err(VectorIndexError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_artifact_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let spec = IndexSpec::new("review");
        let index = VectorIndex::from_parts(
            "review",
            "nomic-embed-text",
            3,
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            mapping(&["h7", "h8"]),
        )
        .unwrap();
        index.save(&spec, dir.path()).unwrap();

        let raw = std::fs::read_to_string(spec.mapping_path(dir.path())).unwrap();
        assert_eq!(raw, r#"{"0":"h7","1":"h8"}"#);

        let loaded = VectorIndex::load(&spec, dir.path(), "fallback-model").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.model(), "fallback-model");
        assert_eq!(loaded.entity_id(1), Some("h8"));
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorIndex::load(&IndexSpec::new("hotel"), dir.path(), "m").unwrap_err();
        assert!(matches!(err, VectorIndexError::Io(_)));
    }
}
