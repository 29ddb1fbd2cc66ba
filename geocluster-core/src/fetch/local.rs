//! Local dataset source
//!
//! Loads a JSON array of city objects from disk instead of the remote API
//! and fills a freshly sized store with it.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::record::{CityRecord, RawCity};
use crate::error::{GeoClusterError, Result};
use crate::storage::SharedDataStore;

/// Upper bound on entities taken from a local file
pub const MAX_LOCAL_ENTITIES: usize = 10_000;

/// Records plus the store they were written into
#[derive(Debug)]
pub struct LocalDataset {
    pub records: Vec<CityRecord>,
    pub store: Arc<SharedDataStore>,
}

impl LocalDataset {
    /// Read and prepare a dataset file
    pub fn load(path: impl AsRef<Path>, max_entities: usize) -> Result<Self> {
        let raw = load_dataset_file(path.as_ref())?;
        Self::from_raw(raw, max_entities)
    }

    /// Normalize items, drop those without population, cap, and fill a store.
    ///
    /// The store is sized to the capped source length, as the upstream
    /// pipeline does; positions past the kept records stay unpopulated.
    pub fn from_raw(raw: Vec<RawCity>, max_entities: usize) -> Result<Self> {
        let capacity = raw.len().min(max_entities);
        let store = Arc::new(SharedDataStore::new(capacity));

        let kept: Vec<(usize, &RawCity)> = raw
            .iter()
            .enumerate()
            .filter(|(idx, city)| city.normalize(*idx).population > 0)
            .take(capacity)
            .collect();

        let mut records = Vec::with_capacity(kept.len());
        for (position, (source_idx, city)) in kept.into_iter().enumerate() {
            let mut record = city.normalize(source_idx);
            record.index = position;
            if city.has_coordinates() {
                store.write(position, record.point())?;
            }
            records.push(record);
        }

        info!(
            "Local dataset: {} of {} items kept, {} populated",
            records.len(),
            raw.len(),
            store.populated_count()
        );

        Ok(Self { records, store })
    }
}

/// Parse a JSON array of city objects
pub fn load_dataset_file(path: &Path) -> Result<Vec<RawCity>> {
    let unreadable = |reason: String| GeoClusterError::DatasetUnreadable {
        path: path.display().to_string(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))
}
