//! Filter chain
//!
//! An ordered list of rules evaluated against one record at a time. Rules are
//! pure: they see the record, the endpoint nodes of an edge when the caller
//! has them, and the resolved schema. Evaluation stops at the first drop.
//! Attribute projections rewrite the record and later rules see the rewrite.

mod builder;

pub use builder::FilterSpec;

use crate::graph::{Endpoints, Node, Properties, Record, RecordKind};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which records a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTarget {
    Node,
    Edge,
}

impl FilterTarget {
    fn matches(self, kind: RecordKind) -> bool {
        matches!(
            (self, kind),
            (Self::Node, RecordKind::Node) | (Self::Edge, RecordKind::Edge)
        )
    }
}

/// Caller-supplied keep predicate
pub type CustomPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// One filtering rule
#[derive(Clone)]
pub enum FilterRule {
    /// Keep nodes with a category that is, or descends from, one of these
    IncludeCategories(BTreeSet<String>),
    /// Drop nodes with a category that is, or descends from, one of these
    ExcludeCategories(BTreeSet<String>),
    IncludePredicates(BTreeSet<String>),
    ExcludePredicates(BTreeSet<String>),
    /// Keep edges whose subject node falls under one of these categories
    SubjectCategories(BTreeSet<String>),
    /// Keep edges whose object node falls under one of these categories
    ObjectCategories(BTreeSet<String>),
    /// Keep edges whose provenance is one of these
    ProvidedBy(BTreeSet<String>),
    /// Retain only the named attributes
    ProjectAttributes {
        target: FilterTarget,
        keep: BTreeSet<String>,
    },
    /// Remove the named attributes
    DropAttributes {
        target: FilterTarget,
        names: BTreeSet<String>,
    },
    Custom {
        target: FilterTarget,
        name: String,
        keep: CustomPredicate,
    },
}

impl std::fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncludeCategories(s) => f.debug_tuple("IncludeCategories").field(s).finish(),
            Self::ExcludeCategories(s) => f.debug_tuple("ExcludeCategories").field(s).finish(),
            Self::IncludePredicates(s) => f.debug_tuple("IncludePredicates").field(s).finish(),
            Self::ExcludePredicates(s) => f.debug_tuple("ExcludePredicates").field(s).finish(),
            Self::SubjectCategories(s) => f.debug_tuple("SubjectCategories").field(s).finish(),
            Self::ObjectCategories(s) => f.debug_tuple("ObjectCategories").field(s).finish(),
            Self::ProvidedBy(s) => f.debug_tuple("ProvidedBy").field(s).finish(),
            Self::ProjectAttributes { target, keep } => f
                .debug_struct("ProjectAttributes")
                .field("target", target)
                .field("keep", keep)
                .finish(),
            Self::DropAttributes { target, names } => f
                .debug_struct("DropAttributes")
                .field("target", target)
                .field("names", names)
                .finish(),
            Self::Custom { target, name, .. } => f
                .debug_struct("Custom")
                .field("target", target)
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

impl FilterRule {
    pub fn custom(
        target: FilterTarget,
        name: impl Into<String>,
        keep: impl Fn(&Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            target,
            name: name.into(),
            keep: Arc::new(keep),
        }
    }

    pub fn target(&self) -> FilterTarget {
        match self {
            Self::IncludeCategories(_) | Self::ExcludeCategories(_) => FilterTarget::Node,
            Self::IncludePredicates(_)
            | Self::ExcludePredicates(_)
            | Self::SubjectCategories(_)
            | Self::ObjectCategories(_)
            | Self::ProvidedBy(_) => FilterTarget::Edge,
            Self::ProjectAttributes { target, .. }
            | Self::DropAttributes { target, .. }
            | Self::Custom { target, .. } => *target,
        }
    }

    fn is_transform(&self) -> bool {
        matches!(self, Self::ProjectAttributes { .. } | Self::DropAttributes { .. })
    }

    /// Evaluate a keep/drop rule. Transform rules always pass here.
    fn passes(&self, record: &Record, endpoints: Endpoints<'_>, schema: &Schema) -> bool {
        match (self, record) {
            (Self::IncludeCategories(set), Record::Node(node)) => {
                set.is_empty() || falls_under(node, set, schema)
            }
            (Self::ExcludeCategories(set), Record::Node(node)) => !falls_under(node, set, schema),
            (Self::IncludePredicates(set), Record::Edge(edge)) => {
                set.is_empty() || set.contains(&edge.predicate)
            }
            (Self::ExcludePredicates(set), Record::Edge(edge)) => !set.contains(&edge.predicate),
            // An absent endpoint cannot be judged here; dangling policy owns that case.
            (Self::SubjectCategories(set), Record::Edge(_)) => match endpoints.subject {
                Some(node) => set.is_empty() || falls_under(node, set, schema),
                None => true,
            },
            (Self::ObjectCategories(set), Record::Edge(_)) => match endpoints.object {
                Some(node) => set.is_empty() || falls_under(node, set, schema),
                None => true,
            },
            (Self::ProvidedBy(set), Record::Edge(edge)) => {
                set.is_empty()
                    || edge
                        .provenance
                        .as_ref()
                        .map_or(false, |source| set.contains(source))
            }
            (Self::Custom { keep, .. }, record) => keep(record),
            _ => true,
        }
    }

    /// Whether a transform rule lets `name` through
    fn retains(&self, name: &str) -> bool {
        match self {
            Self::ProjectAttributes { keep, .. } => keep.contains(name),
            Self::DropAttributes { names, .. } => !names.contains(name),
            _ => true,
        }
    }

    /// Apply a transform rule, returning the rewritten record if anything changed
    fn rewrite(&self, record: &Record) -> Option<Record> {
        let attributes = match record {
            Record::Node(node) => &node.attributes,
            Record::Edge(edge) => &edge.attributes,
        };
        if attributes.keys().all(|name| self.retains(name)) {
            return None;
        }

        let mut record = record.clone();
        let attributes: &mut Properties = match &mut record {
            Record::Node(node) => &mut node.attributes,
            Record::Edge(edge) => &mut edge.attributes,
        };
        attributes.retain(|name, _| self.retains(name));
        Some(record)
    }
}

fn falls_under(node: &Node, set: &BTreeSet<String>, schema: &Schema) -> bool {
    set.iter().any(|ancestor| schema.any_is_a(&node.categories, ancestor))
}

/// Result of running a record through the chain
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Keep,
    Drop,
    /// An edge that passed its own rules but lost an endpoint to the node rules
    DropEndpoint,
    Transformed(Record),
}

impl FilterDecision {
    pub fn is_kept(&self) -> bool {
        matches!(self, Self::Keep | Self::Transformed(_))
    }
}

/// Ordered rule list; stateless and reusable across runs
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    rules: Vec<FilterRule>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: FilterRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn push(&mut self, rule: FilterRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run `record` through every rule for its kind, in order.
    ///
    /// For edges, `endpoints` are the stored subject and object nodes. After
    /// the edge's own rules pass, each present endpoint is checked against
    /// the node keep/drop rules.
    pub fn apply(&self, record: &Record, endpoints: Endpoints<'_>, schema: &Schema) -> FilterDecision {
        let kind = record.kind();
        let mut rewritten: Option<Record> = None;

        for rule in self.rules.iter().filter(|r| r.target().matches(kind)) {
            let current = rewritten.as_ref().unwrap_or(record);
            if rule.is_transform() {
                if let Some(next) = rule.rewrite(current) {
                    rewritten = Some(next);
                }
            } else if !rule.passes(current, endpoints, schema) {
                return FilterDecision::Drop;
            }
        }

        if kind == RecordKind::Edge {
            let lost = [endpoints.subject, endpoints.object]
                .into_iter()
                .flatten()
                .any(|node| !self.node_passes(node, schema));
            if lost {
                return FilterDecision::DropEndpoint;
            }
        }

        match rewritten {
            Some(record) => FilterDecision::Transformed(record),
            None => FilterDecision::Keep,
        }
    }

    /// Whether a node survives the node keep/drop rules
    pub fn node_passes(&self, node: &Node, schema: &Schema) -> bool {
        let mut node_rules = self
            .rules
            .iter()
            .filter(|r| r.target() == FilterTarget::Node && !r.is_transform())
            .peekable();
        if node_rules.peek().is_none() {
            return true;
        }
        let record = Record::Node(node.clone());
        node_rules.all(|rule| rule.passes(&record, Endpoints::none(), schema))
    }
}
