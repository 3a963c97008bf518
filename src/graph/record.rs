//! Records crossing the adapter boundary, and canonicalization of raw fields

use super::edge::{derive_edge_id, Edge, EdgeId};
use super::node::{Node, NodeId, Properties, PropertyValue, DEFAULT_NODE_CATEGORY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// Which half of the graph a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Node,
    Edge,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Edge => write!(f, "edge"),
        }
    }
}

/// A canonical record
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Node(Node),
    Edge(Edge),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Node(_) => RecordKind::Node,
            Self::Edge(_) => RecordKind::Edge,
        }
    }

    /// Node id or edge id, for reporting
    pub fn key(&self) -> &str {
        match self {
            Self::Node(n) => n.id.as_str(),
            Self::Edge(e) => e.id.as_str(),
        }
    }
}

impl From<Node> for Record {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Edge> for Record {
    fn from(edge: Edge) -> Self {
        Self::Edge(edge)
    }
}

/// Endpoint nodes of an edge as found in the graph (`None` when absent)
#[derive(Debug, Clone, Copy, Default)]
pub struct Endpoints<'a> {
    pub subject: Option<&'a Node>,
    pub object: Option<&'a Node>,
}

impl<'a> Endpoints<'a> {
    pub fn new(subject: Option<&'a Node>, object: Option<&'a Node>) -> Self {
        Self { subject, object }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// A raw record could not be turned into a canonical one
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanonicalizeError {
    #[error("{kind} record has no '{field}' field")]
    MissingField { kind: RecordKind, field: &'static str },

    #[error("{kind} record field '{field}' must be a string")]
    NotAString { kind: RecordKind, field: &'static str },
}

/// Format-level record before canonicalization: a kind plus a field mapping
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn node(fields: Map<String, Value>) -> Self {
        Self { kind: RecordKind::Node, fields }
    }

    pub fn edge(fields: Map<String, Value>) -> Self {
        Self { kind: RecordKind::Edge, fields }
    }

    pub fn canonicalize(self) -> Result<Record, CanonicalizeError> {
        match self.kind {
            RecordKind::Node => canonical_node(self.fields).map(Record::Node),
            RecordKind::Edge => canonical_edge(self.fields).map(Record::Edge),
        }
    }
}

fn take_string(
    fields: &mut Map<String, Value>,
    kind: RecordKind,
    field: &'static str,
) -> Result<Option<String>, CanonicalizeError> {
    match fields.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(CanonicalizeError::NotAString { kind, field }),
    }
}

fn require_string(
    fields: &mut Map<String, Value>,
    kind: RecordKind,
    field: &'static str,
) -> Result<String, CanonicalizeError> {
    take_string(fields, kind, field)?.ok_or(CanonicalizeError::MissingField { kind, field })
}

/// Trim labels, drop empties and duplicates; fall back to the default category.
fn normalize_categories(value: Option<Value>) -> Vec<String> {
    let labels: Vec<String> = match value {
        Some(Value::String(s)) => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut seen = BTreeSet::new();
    let mut categories = Vec::new();
    for label in labels {
        let label = label.trim();
        if !label.is_empty() && seen.insert(label.to_string()) {
            categories.push(label.to_string());
        }
    }

    if categories.is_empty() {
        categories.push(DEFAULT_NODE_CATEGORY.to_string());
    }
    categories
}

fn into_properties(fields: Map<String, Value>) -> Properties {
    fields
        .into_iter()
        .filter_map(|(k, v)| PropertyValue::from_json(v).map(|v| (k, v)))
        .collect()
}

fn canonical_node(mut fields: Map<String, Value>) -> Result<Node, CanonicalizeError> {
    let id = require_string(&mut fields, RecordKind::Node, "id")?;
    let categories = normalize_categories(fields.remove("category"));

    Ok(Node {
        id: NodeId::from_string(id),
        categories,
        attributes: into_properties(fields),
        conflicts: BTreeSet::new(),
    })
}

fn canonical_edge(mut fields: Map<String, Value>) -> Result<Edge, CanonicalizeError> {
    let subject = NodeId::from_string(require_string(&mut fields, RecordKind::Edge, "subject")?);
    let predicate = require_string(&mut fields, RecordKind::Edge, "predicate")?;
    let object = NodeId::from_string(require_string(&mut fields, RecordKind::Edge, "object")?);
    let explicit_id = take_string(&mut fields, RecordKind::Edge, "id")?;
    let provenance = take_string(&mut fields, RecordKind::Edge, "provided_by")?;

    let id = match explicit_id {
        Some(id) => EdgeId::from_string(id),
        None => derive_edge_id(&subject, &predicate, &object, provenance.as_deref()),
    };

    Ok(Edge {
        id,
        subject,
        predicate,
        object,
        provenance,
        attributes: into_properties(fields),
        conflicts: BTreeSet::new(),
    })
}

/// Flatten a node back into the field mapping used by document formats
pub fn node_fields(node: &Node) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::String(node.id.to_string()));
    fields.insert(
        "category".to_string(),
        Value::Array(node.categories.iter().cloned().map(Value::String).collect()),
    );
    for (key, value) in &node.attributes {
        fields.insert(key.clone(), value.to_json());
    }
    fields
}

/// Flatten an edge back into the field mapping used by document formats.
///
/// Derived ids are left out so the reader re-derives them.
pub fn edge_fields(edge: &Edge) -> Map<String, Value> {
    let mut fields = Map::new();
    if !edge.has_derived_id() {
        fields.insert("id".to_string(), Value::String(edge.id.to_string()));
    }
    fields.insert("subject".to_string(), Value::String(edge.subject.to_string()));
    fields.insert("predicate".to_string(), Value::String(edge.predicate.clone()));
    fields.insert("object".to_string(), Value::String(edge.object.to_string()));
    if let Some(provenance) = &edge.provenance {
        fields.insert("provided_by".to_string(), Value::String(provenance.clone()));
    }
    for (key, value) in &edge.attributes {
        fields.insert(key.clone(), value.to_json());
    }
    fields
}
