//! Graph store backends
//!
//! Both backings implement the `GraphStore` trait. `MemoryStore` keeps
//! everything in DashMaps; `SpillStore` moves records into SQLite once a
//! configured record threshold is crossed.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SpillStore;
pub use traits::{GraphStore, RecordIter, StorageError, StorageResult, UpsertOutcome};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Which store backing a run uses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hot-tier record count that triggers a spill. `None` keeps the whole
    /// graph in memory.
    pub spill_threshold: Option<usize>,
    /// Spill database location; a scratch file is used when absent
    pub spill_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn spilling(threshold: usize) -> Self {
        Self {
            spill_threshold: Some(threshold),
            spill_path: None,
        }
    }
}

/// Open the store the configuration asks for
pub fn open_store(config: &StoreConfig) -> StorageResult<Arc<dyn GraphStore>> {
    match (config.spill_threshold, &config.spill_path) {
        (None, _) => Ok(Arc::new(MemoryStore::new())),
        (Some(threshold), None) => Ok(Arc::new(SpillStore::temporary(threshold)?)),
        (Some(threshold), Some(path)) => Ok(Arc::new(SpillStore::open(path, threshold)?)),
    }
}
