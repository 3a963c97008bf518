//! In-memory graph store for graphs that fit comfortably in RAM

use super::traits::{GraphStore, RecordIter, StorageError, StorageResult, UpsertOutcome};
use crate::graph::{merge_edge, merge_node, Edge, EdgeId, Node, NodeId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// DashMap-backed store.
///
/// Each upsert runs inside the map's entry lock for that key, so merges of
/// one id are linearized while different ids proceed on other shards.
/// Iteration yields records in key order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: DashMap<NodeId, Node>,
    edges: DashMap<EdgeId, Edge>,
    sealed: AtomicBool,
    dangling: OnceLock<Vec<EdgeId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(StorageError::Sealed);
        }
        Ok(())
    }

    fn sorted_node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    fn sorted_edge_ids(&self) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self.edges.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    fn edges_by_id(&self, ids: Vec<EdgeId>) -> RecordIter<'_, Edge> {
        Box::new(
            ids.into_iter()
                .filter_map(move |id| self.edges.get(&id).map(|r| Ok(r.value().clone()))),
        )
    }
}

impl GraphStore for MemoryStore {
    fn upsert_node(&self, node: Node) -> StorageResult<UpsertOutcome> {
        self.ensure_open()?;
        match self.nodes.entry(node.id.clone()) {
            Entry::Occupied(mut entry) => {
                let (merged, report) = merge_node(entry.get(), node);
                entry.insert(merged);
                Ok(UpsertOutcome::merged(report.conflicts))
            }
            Entry::Vacant(entry) => {
                entry.insert(node);
                Ok(UpsertOutcome::created())
            }
        }
    }

    fn upsert_edge(&self, edge: Edge) -> StorageResult<UpsertOutcome> {
        self.ensure_open()?;
        match self.edges.entry(edge.id.clone()) {
            Entry::Occupied(mut entry) => {
                let (merged, report) = merge_edge(entry.get(), edge);
                entry.insert(merged);
                Ok(UpsertOutcome::merged(report.conflicts))
            }
            Entry::Vacant(entry) => {
                entry.insert(edge);
                Ok(UpsertOutcome::created())
            }
        }
    }

    fn seal(&self) -> StorageResult<usize> {
        self.sealed.store(true, Ordering::Release);
        let dangling = self.dangling.get_or_init(|| {
            let mut ids: Vec<EdgeId> = self
                .edges
                .iter()
                .filter(|e| {
                    !self.nodes.contains_key(&e.subject) || !self.nodes.contains_key(&e.object)
                })
                .map(|e| e.key().clone())
                .collect();
            ids.sort();
            ids
        });
        Ok(dangling.len())
    }

    fn has_node(&self, id: &NodeId) -> StorageResult<bool> {
        Ok(self.nodes.contains_key(id))
    }

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        Ok(self.nodes.get(id).map(|r| r.value().clone()))
    }

    fn node_count(&self) -> StorageResult<usize> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> StorageResult<usize> {
        Ok(self.edges.len())
    }

    fn nodes(&self) -> StorageResult<RecordIter<'_, Node>> {
        let ids = self.sorted_node_ids();
        Ok(Box::new(
            ids.into_iter()
                .filter_map(move |id| self.nodes.get(&id).map(|r| Ok(r.value().clone()))),
        ))
    }

    fn edges(&self) -> StorageResult<RecordIter<'_, Edge>> {
        Ok(self.edges_by_id(self.sorted_edge_ids()))
    }

    fn dangling_edges(&self) -> StorageResult<RecordIter<'_, Edge>> {
        let ids = self.dangling.get().ok_or(StorageError::NotSealed)?;
        Ok(self.edges_by_id(ids.clone()))
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}
