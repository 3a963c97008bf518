//! Graph statistics
//!
//! A `GraphSummary` is either accumulated by the transformer over the records
//! that reach its sinks, or computed in one pass over a store.

use crate::graph::Record;
use crate::storage::{GraphStore, StorageResult};
use crate::validate::IssueKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records removed by the filter chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCounts {
    pub nodes: usize,
    pub edges: usize,
    /// Edges that passed their own rules but lost an endpoint
    pub edge_endpoints: usize,
}

impl FilterCounts {
    pub fn total(&self) -> usize {
        self.nodes + self.edges + self.edge_endpoints
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    /// Nodes per category label; a node counts once under each of its labels
    pub categories: BTreeMap<String, usize>,
    pub predicates: BTreeMap<String, usize>,
    /// Edges with a missing endpoint, whether or not they were written
    pub dangling_edges: usize,
    /// Attribute conflicts recorded while merging
    pub merge_conflicts: usize,
    pub issues: BTreeMap<IssueKind, usize>,
    pub filtered: FilterCounts,
    /// Records dropped because they failed validation
    pub invalid_dropped: usize,
    /// Dangling edges left out of the output
    pub dangling_dropped: usize,
}

impl GraphSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record toward the totals
    pub fn observe(&mut self, record: &Record) {
        match record {
            Record::Node(node) => {
                self.node_count += 1;
                for category in &node.categories {
                    *self.categories.entry(category.clone()).or_insert(0) += 1;
                }
            }
            Record::Edge(edge) => {
                self.edge_count += 1;
                *self.predicates.entry(edge.predicate.clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn category(&self, name: &str) -> usize {
        self.categories.get(name).copied().unwrap_or(0)
    }

    pub fn predicate(&self, name: &str) -> usize {
        self.predicates.get(name).copied().unwrap_or(0)
    }

    pub fn issue_count(&self, kind: IssueKind) -> usize {
        self.issues.get(&kind).copied().unwrap_or(0)
    }

    /// Write the summary to the log
    pub fn log(&self) {
        tracing::info!(
            nodes = self.node_count,
            edges = self.edge_count,
            dangling = self.dangling_edges,
            conflicts = self.merge_conflicts,
            filtered = self.filtered.total(),
            "graph summary"
        );
        for (category, count) in &self.categories {
            tracing::info!(category = %category, count, "nodes by category");
        }
        for (predicate, count) in &self.predicates {
            tracing::info!(predicate = %predicate, count, "edges by predicate");
        }
        for (kind, count) in &self.issues {
            tracing::info!(kind = %kind, count, "validation issues");
        }
    }
}

/// Summarize everything a store holds. Dangling edges are counted only once
/// the store is sealed.
pub fn summarize(store: &dyn GraphStore) -> StorageResult<GraphSummary> {
    let mut summary = GraphSummary::new();
    for node in store.nodes()? {
        let node = node?;
        summary.merge_conflicts += node.conflicts.len();
        summary.observe(&Record::Node(node));
    }
    for edge in store.edges()? {
        let edge = edge?;
        summary.merge_conflicts += edge.conflicts.len();
        summary.observe(&Record::Edge(edge));
    }
    if store.is_sealed() {
        summary.dangling_edges = store.dangling_edges()?.count();
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};
    use crate::storage::MemoryStore;

    #[test]
    fn observe_counts_every_category_label() {
        let mut summary = GraphSummary::new();
        summary.observe(&Node::new("a", "biolink:Gene").with_category("biolink:Protein").into());
        summary.observe(&Node::new("b", "biolink:Gene").into());
        summary.observe(&Edge::new("a", "biolink:interacts_with", "b").into());

        assert_eq!(summary.node_count, 2);
        assert_eq!(summary.category("biolink:Gene"), 2);
        assert_eq!(summary.category("biolink:Protein"), 1);
        assert_eq!(summary.predicate("biolink:interacts_with"), 1);
    }

    #[test]
    fn summarize_counts_store_contents_and_dangling() {
        let store = MemoryStore::new();
        store.upsert_node(Node::new("a", "biolink:Gene").with_attribute("name", "A")).unwrap();
        store.upsert_node(Node::new("a", "biolink:Gene").with_attribute("name", "B")).unwrap();
        store.upsert_edge(Edge::new("a", "biolink:related_to", "missing")).unwrap();

        let before = summarize(&store).unwrap();
        assert_eq!(before.dangling_edges, 0);

        store.seal().unwrap();
        let after = summarize(&store).unwrap();
        assert_eq!(after.node_count, 1);
        assert_eq!(after.edge_count, 1);
        assert_eq!(after.merge_conflicts, 1);
        assert_eq!(after.dangling_edges, 1);
    }
}
