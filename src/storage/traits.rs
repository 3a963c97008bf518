//! Storage trait definitions

use crate::graph::{Edge, Node, NodeId};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dangling edges requested before the store was sealed")]
    NotSealed,

    #[error("store is sealed; no further upserts are accepted")]
    Sealed,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Lazy sequence of stored records
pub type RecordIter<'a, T> = Box<dyn Iterator<Item = StorageResult<T>> + Send + 'a>;

/// What an upsert did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// True if the key was not present before
    pub created: bool,
    /// Attribute names that disagreed with the stored record
    pub conflicts: Vec<String>,
}

impl UpsertOutcome {
    pub fn created() -> Self {
        Self { created: true, conflicts: Vec::new() }
    }

    pub fn merged(conflicts: Vec<String>) -> Self {
        Self { created: false, conflicts }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Deduplicating holder of canonical records
///
/// Implementations must be thread-safe (Send + Sync). Upserts of the same key
/// are linearized; upserts of different keys may run in parallel.
pub trait GraphStore: Send + Sync {
    // === Mutation ===

    /// Insert a node, or merge it into the stored node with the same id
    fn upsert_node(&self, node: Node) -> StorageResult<UpsertOutcome>;

    /// Insert an edge, or merge it into the stored edge with the same key
    fn upsert_edge(&self, edge: Edge) -> StorageResult<UpsertOutcome>;

    /// Declare ingestion complete and compute the dangling edge set.
    ///
    /// Returns the number of dangling edges. Upserts after sealing fail
    /// with `StorageError::Sealed`.
    fn seal(&self) -> StorageResult<usize>;

    // === Lookup ===

    fn has_node(&self, id: &NodeId) -> StorageResult<bool>;

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    fn node_count(&self) -> StorageResult<usize>;

    fn edge_count(&self) -> StorageResult<usize>;

    // === Iteration (restartable: every call starts a fresh pass) ===

    fn nodes(&self) -> StorageResult<RecordIter<'_, Node>>;

    fn edges(&self) -> StorageResult<RecordIter<'_, Edge>>;

    /// Edges whose subject or object is absent. Requires `seal`.
    fn dangling_edges(&self) -> StorageResult<RecordIter<'_, Edge>>;

    /// True once `seal` has run
    fn is_sealed(&self) -> bool;
}
