

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{VectorIndex, VectorIndexError};
use crate::core::config::IndexSpec;


/// One consistent generation of loaded indexes.
#[derive(Debug)]
pub struct RegistrySnapshot {
    indexes: BTreeMap<String, Arc<VectorIndex>>,
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Result<&Arc<VectorIndex>, VectorIndexError> {
        self.indexes
            .get(name)
            .ok_or_else(|| VectorIndexError::IndexNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    pub fn indexes(&self) -> impl Iterator<Item = &Arc<VectorIndex>> {
        self.indexes.values()
    }
}


/// Named vector indexes, read concurrently and replaced only as a whole.
pub struct VectorIndexRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    directory: PathBuf,
    default_model: String,
}

impl VectorIndexRegistry {
    /// Loads every index in `specs`. Any failure aborts startup.
    pub fn load(specs: &[IndexSpec], directory: &Path, default_model: &str) -> Result<Self, VectorIndexError> {
        let indexes = load_all(specs, directory, default_model)?;
        Ok(Self {
            current: RwLock::new(Arc::new(RegistrySnapshot {
                indexes,
                version: 1,
                loaded_at: Utc::now(),
            })),
            directory: directory.to_path_buf(),
            default_model: default_model.to_string(),
        })
    }

    /// Registry over already-built indexes.
    pub fn from_indexes(indexes: Vec<VectorIndex>) -> Self {
        let default_model = indexes
            .first()
            .map(|i| i.model().to_string())
            .unwrap_or_default();
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot {
                indexes: indexes
                    .into_iter()
                    .map(|i| (i.name().to_string(), Arc::new(i)))
                    .collect(),
                version: 1,
                loaded_at: Utc::now(),
            })),
            directory: PathBuf::new(),
            default_model,
        }
    }

    /// Readers keep the returned snapshot for a whole search.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    /// Builds a complete new generation off to the side, then swaps it in.
    /// On error the active generation is left untouched.
    pub fn reload(&self, specs: &[IndexSpec]) -> Result<u64, VectorIndexError> {
        let indexes = match load_all(specs, &self.directory, &self.default_model) {
            Ok(indexes) => indexes,
            Err(e) => {
                warn!("Index reload failed, keeping current generation: {}", e);
                return Err(e);
            }
        };

        let mut current = self.current.write();
        let version = current.version + 1;
        *current = Arc::new(RegistrySnapshot {
            indexes,
            version,
            loaded_at: Utc::now(),
        });
        info!("Vector index registry swapped to generation {}", version);
        Ok(version)
    }

    /// Replaces the active generation with prebuilt indexes.
    pub fn swap(&self, indexes: Vec<VectorIndex>) -> u64 {
        let mut current = self.current.write();
        let version = current.version + 1;
        *current = Arc::new(RegistrySnapshot {
            indexes: indexes
                .into_iter()
                .map(|i| (i.name().to_string(), Arc::new(i)))
                .collect(),
            version,
            loaded_at: Utc::now(),
        });
        info!("Vector index registry swapped to generation {}", version);
        version
    }

    /// Fails on the first name the active generation does not carry.
    pub fn ensure_names(&self, names: &[&str]) -> Result<(), VectorIndexError> {
        let snapshot = self.snapshot();
        for name in names {
            snapshot.get(name)?;
        }
        Ok(())
    }
}

fn load_all(
    specs: &[IndexSpec],
    directory: &Path,
    default_model: &str,
) -> Result<BTreeMap<String, Arc<VectorIndex>>, VectorIndexError> {
    let mut indexes = BTreeMap::new();
    for spec in specs {
        let index = VectorIndex::load(spec, directory, default_model)?;
        indexes.insert(spec.name.clone(), Arc::new(index));
    }
    Ok(indexes)
}
