//! Schema validation of canonical records
//!
//! Validation never mutates a record and never stops a run: every problem
//! becomes a `ValidationIssue`. Whether an issue kind is fatal is decided by
//! the caller's policy.

use crate::graph::{Edge, Endpoints, Node, Record, RecordKind};
use crate::schema::{ResolvedPredicate, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kinds of problem the validator reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    UnknownCategory,
    UnknownPredicate,
    DisallowedAttribute,
    PredicateDomainViolation,
    PredicateRangeViolation,
    DanglingEndpoint,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// One problem found on one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub record: RecordKind,
    /// Node id or edge id
    pub key: String,
    pub message: String,
}

impl ValidationIssue {
    fn node(node: &Node, kind: IssueKind, message: String) -> Self {
        Self {
            kind,
            record: RecordKind::Node,
            key: node.id.to_string(),
            message,
        }
    }

    fn edge(edge: &Edge, kind: IssueKind, message: String) -> Self {
        Self {
            kind,
            record: RecordKind::Edge,
            key: edge.id.to_string(),
            message,
        }
    }

    /// Issue for an edge endpoint missing from the graph
    pub fn dangling(edge: &Edge, missing: &str) -> Self {
        Self::edge(
            edge,
            IssueKind::DanglingEndpoint,
            format!(
                "edge {} -[{}]-> {} references absent node {}",
                edge.subject, edge.predicate, edge.object, missing
            ),
        )
    }
}

/// Outcome of validating one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Validate any record. `endpoints` is ignored for nodes.
pub fn validate(record: &Record, endpoints: Endpoints<'_>, schema: &Schema) -> ValidationResult {
    match record {
        Record::Node(node) => validate_node(node, schema),
        Record::Edge(edge) => validate_edge(edge, endpoints, schema),
    }
}

pub fn validate_node(node: &Node, schema: &Schema) -> ValidationResult {
    let mut result = ValidationResult::default();

    for category in &node.categories {
        if !schema.is_known_category(category) {
            result.issues.push(ValidationIssue::node(
                node,
                IssueKind::UnknownCategory,
                format!("category '{}' is not in the schema", category),
            ));
        }
    }

    for attribute in node.attributes.keys() {
        if !schema.node_attribute_permitted(&node.categories, attribute) {
            result.issues.push(ValidationIssue::node(
                node,
                IssueKind::DisallowedAttribute,
                format!(
                    "attribute '{}' is not permitted for categories [{}]",
                    attribute,
                    node.categories.join(", ")
                ),
            ));
        }
    }

    result
}

pub fn validate_edge(edge: &Edge, endpoints: Endpoints<'_>, schema: &Schema) -> ValidationResult {
    let mut result = ValidationResult::default();

    if endpoints.subject.is_none() {
        result.issues.push(ValidationIssue::dangling(edge, edge.subject.as_str()));
    }
    if endpoints.object.is_none() {
        result.issues.push(ValidationIssue::dangling(edge, edge.object.as_str()));
    }

    match schema.predicate(&edge.predicate) {
        None => result.issues.push(ValidationIssue::edge(
            edge,
            IssueKind::UnknownPredicate,
            format!("predicate '{}' is not in the schema", edge.predicate),
        )),
        Some(predicate) => check_domain_and_range(edge, predicate, endpoints, schema, &mut result),
    }

    for attribute in edge.attributes.keys() {
        if !schema.edge_attribute_permitted(&edge.predicate, attribute) {
            result.issues.push(ValidationIssue::edge(
                edge,
                IssueKind::DisallowedAttribute,
                format!(
                    "attribute '{}' is not permitted on '{}' edges",
                    attribute, edge.predicate
                ),
            ));
        }
    }

    result
}

fn check_domain_and_range(
    edge: &Edge,
    predicate: &ResolvedPredicate,
    endpoints: Endpoints<'_>,
    schema: &Schema,
    result: &mut ValidationResult,
) {
    if let (Some(domain), Some(subject)) = (&predicate.domain, endpoints.subject) {
        if !schema.any_is_a(&subject.categories, domain) {
            result.issues.push(ValidationIssue::edge(
                edge,
                IssueKind::PredicateDomainViolation,
                format!(
                    "subject {} [{}] is outside the domain '{}' of '{}'",
                    subject.id,
                    subject.categories.join(", "),
                    domain,
                    edge.predicate
                ),
            ));
        }
    }

    if let (Some(range), Some(object)) = (&predicate.range, endpoints.object) {
        if !schema.any_is_a(&object.categories, range) {
            result.issues.push(ValidationIssue::edge(
                edge,
                IssueKind::PredicateRangeViolation,
                format!(
                    "object {} [{}] is outside the range '{}' of '{}'",
                    object.id,
                    object.categories.join(", "),
                    range,
                    edge.predicate
                ),
            ));
        }
    }
}

/// Accumulates issues across a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueLog {
    pub issues: Vec<ValidationIssue>,
    pub counts: BTreeMap<IssueKind, usize>,
}

impl IssueLog {
    pub fn push(&mut self, issue: ValidationIssue) {
        *self.counts.entry(issue.kind).or_insert(0) += 1;
        self.issues.push(issue);
    }

    pub fn extend(&mut self, result: ValidationResult) {
        for issue in result.issues {
            self.push(issue);
        }
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDocument;

    fn schema() -> Schema {
        SchemaDocument::new()
            .with_category("biolink:NamedThing", &[])
            .with_category("biolink:Gene", &["biolink:NamedThing"])
            .with_category("biolink:Disease", &["biolink:NamedThing"])
            .with_node_attribute("name")
            .with_edge_attribute("publications")
            .with_predicate("interacts_with", Some("biolink:Gene"), Some("biolink:Gene"))
            .resolve()
            .unwrap()
    }

    #[test]
    fn valid_node_has_no_issues() {
        let node = Node::new("gene:1", "biolink:Gene").with_attribute("name", "TBX4");
        assert!(validate_node(&node, &schema()).is_ok());
    }

    #[test]
    fn unknown_category_and_attribute_are_both_reported() {
        let node = Node::new("x", "biolink:Spaceship").with_attribute("nosuch", 1);
        let result = validate_node(&node, &schema());
        assert!(result.has(IssueKind::UnknownCategory));
        assert!(result.has(IssueKind::DisallowedAttribute));
        assert_eq!(result.issues.len(), 2);
    }

    #[test]
    fn range_violation_is_reported_once() {
        let gene = Node::new("gene:1", "biolink:Gene");
        let disease = Node::new("mondo:1", "biolink:Disease");
        let edge = Edge::new("gene:1", "interacts_with", "mondo:1");

        let result = validate_edge(&edge, Endpoints::new(Some(&gene), Some(&disease)), &schema());

        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, IssueKind::PredicateRangeViolation);
    }

    #[test]
    fn domain_violation_is_reported() {
        let gene = Node::new("gene:1", "biolink:Gene");
        let disease = Node::new("mondo:1", "biolink:Disease");
        let edge = Edge::new("mondo:1", "interacts_with", "gene:1");

        let result = validate_edge(&edge, Endpoints::new(Some(&disease), Some(&gene)), &schema());

        assert!(result.has(IssueKind::PredicateDomainViolation));
        assert!(!result.has(IssueKind::PredicateRangeViolation));
    }

    #[test]
    fn missing_endpoint_is_dangling_not_a_range_violation() {
        let gene = Node::new("gene:1", "biolink:Gene");
        let edge = Edge::new("gene:1", "interacts_with", "gene:404");

        let result = validate_edge(&edge, Endpoints::new(Some(&gene), None), &schema());

        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, IssueKind::DanglingEndpoint);
    }

    #[test]
    fn unknown_predicate_skips_domain_and_range() {
        let gene = Node::new("gene:1", "biolink:Gene");
        let edge = Edge::new("gene:1", "teleports_to", "gene:1").with_attribute("publications", "PMID:1");

        let result = validate_edge(&edge, Endpoints::new(Some(&gene), Some(&gene)), &schema());

        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, IssueKind::UnknownPredicate);
    }

    #[test]
    fn issue_log_counts_by_kind() {
        let mut log = IssueLog::default();
        let node = Node::new("x", "biolink:Spaceship").with_attribute("nosuch", 1);
        log.extend(validate_node(&node, &schema()));
        assert_eq!(log.count(IssueKind::UnknownCategory), 1);
        assert_eq!(log.count(IssueKind::DisallowedAttribute), 1);
        assert_eq!(log.count(IssueKind::DanglingEndpoint), 0);
    }
}
