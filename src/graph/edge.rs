//! Directed, predicate-labeled edges and deterministic edge keys

use super::node::{NodeId, Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Namespace for derived edge identifiers. Changing it changes every derived key.
const EDGE_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x67, 0x77, 0x65, 0x61, 0x76, 0x45, 0x1e, 0x9d, 0x3a, 0x2f, 0x52, 0x1c, 0x07, 0xe4, 0x88,
]);

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Derive the storage key of an edge from its logical identity.
///
/// Fields are joined with the ASCII unit separator before hashing, so ids
/// that contain dashes or colons cannot collide. Re-ingesting the same edge
/// from another source yields the same key.
pub fn derive_edge_id(
    subject: &NodeId,
    predicate: &str,
    object: &NodeId,
    provenance: Option<&str>,
) -> EdgeId {
    let mut key = String::with_capacity(
        subject.as_str().len() + predicate.len() + object.as_str().len() + 3,
    );
    key.push_str(subject.as_str());
    key.push('\u{1f}');
    key.push_str(predicate);
    key.push('\u{1f}');
    key.push_str(object.as_str());
    if let Some(provenance) = provenance {
        key.push('\u{1f}');
        key.push_str(provenance);
    }
    EdgeId(Uuid::new_v5(&EDGE_ID_NAMESPACE, key.as_bytes()).to_string())
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Storage key: explicit from the source, or derived
    pub id: EdgeId,
    pub subject: NodeId,
    /// Relation type (e.g., "biolink:interacts_with")
    pub predicate: String,
    pub object: NodeId,
    /// Knowledge source that asserted the edge, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    pub attributes: Properties,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicts: BTreeSet<String>,
}

impl Edge {
    /// Create an edge with a derived id and no provenance
    pub fn new(
        subject: impl Into<NodeId>,
        predicate: impl Into<String>,
        object: impl Into<NodeId>,
    ) -> Self {
        let subject = subject.into();
        let predicate = predicate.into();
        let object = object.into();
        let id = derive_edge_id(&subject, &predicate, &object, None);
        Self {
            id,
            subject,
            predicate,
            object,
            provenance: None,
            attributes: Properties::new(),
            conflicts: BTreeSet::new(),
        }
    }

    /// Set provenance and re-derive the key
    ///
    /// Only call this on edges whose id was derived, not supplied.
    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        let provenance = provenance.into();
        self.id = derive_edge_id(&self.subject, &self.predicate, &self.object, Some(&provenance));
        self.provenance = Some(provenance);
        self
    }

    /// Replace the key with one supplied by the source
    pub fn with_id(mut self, id: impl Into<EdgeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// True when the id is the one `derive_edge_id` would produce
    pub fn has_derived_id(&self) -> bool {
        self.id
            == derive_edge_id(
                &self.subject,
                &self.predicate,
                &self.object,
                self.provenance.as_deref(),
            )
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_is_stable() {
        let a = derive_edge_id(&"gene:1".into(), "interacts_with", &"gene:2".into(), None);
        let b = derive_edge_id(&"gene:1".into(), "interacts_with", &"gene:2".into(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn derived_id_depends_on_direction_and_predicate() {
        let forward = derive_edge_id(&"a".into(), "p", &"b".into(), None);
        let reverse = derive_edge_id(&"b".into(), "p", &"a".into(), None);
        let other = derive_edge_id(&"a".into(), "q", &"b".into(), None);
        assert_ne!(forward, reverse);
        assert_ne!(forward, other);
    }

    #[test]
    fn derived_id_is_not_fooled_by_delimiters() {
        // "a-b" + "c" vs "a" + "b-c" collide under naive dash-joining
        let left = derive_edge_id(&"a-b".into(), "c", &"d".into(), None);
        let right = derive_edge_id(&"a".into(), "b-c", &"d".into(), None);
        assert_ne!(left, right);
    }

    #[test]
    fn provenance_changes_the_key() {
        let plain = Edge::new("a", "p", "b");
        let sourced = Edge::new("a", "p", "b").with_provenance("infores:x");
        assert_ne!(plain.id, sourced.id);
        assert!(plain.has_derived_id());
        assert!(sourced.has_derived_id());
    }

    #[test]
    fn explicit_id_is_not_derived() {
        let edge = Edge::new("a", "p", "b").with_id("edge-7");
        assert_eq!(edge.id.as_str(), "edge-7");
        assert!(!edge.has_derived_id());
    }
}
