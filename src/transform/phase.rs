//! The node/edge barrier
//!
//! Every node from every source is merged before any edge. `NodePhase` only
//! accepts nodes; it must be consumed by `complete` to obtain the
//! `EdgePhase`, which only accepts edges and ends by sealing the store.

use crate::graph::{Edge, Node};
use crate::storage::{GraphStore, StorageResult, UpsertOutcome};
use std::sync::Arc;

/// Counters kept while merging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub nodes_created: usize,
    pub nodes_merged: usize,
    pub edges_created: usize,
    pub edges_merged: usize,
    /// Attribute conflicts across all merges
    pub conflicts: usize,
    /// Edges with a missing endpoint, known after sealing
    pub dangling: usize,
}


pub struct NodePhase {
    store: Arc<dyn GraphStore>,
    stats: MergeStats,
}

impl NodePhase {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            stats: MergeStats::default(),
        }
    }

    pub fn merge_node(&mut self, node: Node) -> StorageResult<UpsertOutcome> {
        let id = node.id.clone();
        let outcome = self.store.upsert_node(node)?;
        if outcome.has_conflicts() {
            tracing::debug!(node = %id, conflicts = ?outcome.conflicts, "node merge conflict");
        }
        if outcome.created {
            self.stats.nodes_created += 1;
        } else {
            self.stats.nodes_merged += 1;
        }
        self.stats.conflicts += outcome.conflicts.len();
        Ok(outcome)
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Close the node pass
    pub fn complete(self) -> EdgePhase {
        tracing::debug!(
            created = self.stats.nodes_created,
            merged = self.stats.nodes_merged,
            "node pass complete"
        );
        EdgePhase {
            store: self.store,
            stats: self.stats,
        }
    }
}

pub struct EdgePhase {
    store: Arc<dyn GraphStore>,
    stats: MergeStats,
}

impl EdgePhase {
    pub fn merge_edge(&mut self, edge: Edge) -> StorageResult<UpsertOutcome> {
        let id = edge.id.clone();
        let outcome = self.store.upsert_edge(edge)?;
        if outcome.has_conflicts() {
            tracing::debug!(edge = %id, conflicts = ?outcome.conflicts, "edge merge conflict");
        }
        if outcome.created {
            self.stats.edges_created += 1;
        } else {
            self.stats.edges_merged += 1;
        }
        self.stats.conflicts += outcome.conflicts.len();
        Ok(outcome)
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Seal the store and hand it back with the final counters
    pub fn finish(mut self) -> StorageResult<(Arc<dyn GraphStore>, MergeStats)> {
        self.stats.dangling = self.store.seal()?;
        tracing::debug!(
            created = self.stats.edges_created,
            merged = self.stats.edges_merged,
            dangling = self.stats.dangling,
            "edge pass complete"
        );
        Ok((self.store, self.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn phases_count_merges_and_dangling() {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
        let mut nodes = NodePhase::new(store);
        nodes.merge_node(Node::new("a", "biolink:Gene").with_attribute("name", "x")).unwrap();
        nodes.merge_node(Node::new("a", "biolink:Gene").with_attribute("name", "y")).unwrap();

        let mut edges = nodes.complete();
        edges.merge_edge(Edge::new("a", "biolink:related_to", "b")).unwrap();
        let (store, stats) = edges.finish().unwrap();

        assert_eq!(stats.nodes_created, 1);
        assert_eq!(stats.nodes_merged, 1);
        assert_eq!(stats.conflicts, 1);
        assert_eq!(stats.dangling, 1);
        assert!(store.is_sealed());
    }
}
