//! Merge rules for records that share a key
//!
//! - Categories: union, existing order first
//! - Lists: order-preserving union
//! - Mappings: merged recursively
//! - Disagreeing scalars (or mismatched value kinds): incoming wins, and the
//!   attribute name (dotted path for nested keys) is recorded as a conflict

use super::edge::Edge;
use super::node::{Node, Properties, PropertyValue};

/// Attribute names that disagreed during one merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub conflicts: Vec<String>,
}

impl MergeReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Merge `incoming` into `existing`. The node id is never changed.
pub fn merge_node(existing: &Node, incoming: Node) -> (Node, MergeReport) {
    let mut merged = existing.clone();
    for category in incoming.categories {
        merged.add_category(category);
    }

    let mut report = MergeReport::default();
    merge_properties(&mut merged.attributes, incoming.attributes, "", &mut report);
    merged.conflicts.extend(incoming.conflicts);
    merged.conflicts.extend(report.conflicts.iter().cloned());
    (merged, report)
}

/// Merge two edges that share a key.
///
/// Endpoints and predicate come from `existing`: records only share a key
/// when those agree, or when the source supplied the same explicit id.
pub fn merge_edge(existing: &Edge, incoming: Edge) -> (Edge, MergeReport) {
    let mut merged = existing.clone();
    if merged.provenance.is_none() {
        merged.provenance = incoming.provenance;
    }

    let mut report = MergeReport::default();
    merge_properties(&mut merged.attributes, incoming.attributes, "", &mut report);
    merged.conflicts.extend(incoming.conflicts);
    merged.conflicts.extend(report.conflicts.iter().cloned());
    (merged, report)
}

fn merge_properties(
    target: &mut Properties,
    incoming: Properties,
    prefix: &str,
    report: &mut MergeReport,
) {
    for (key, value) in incoming {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
            }
            Some(current) => merge_value(current, value, &path, report),
        }
    }
}

fn merge_value(current: &mut PropertyValue, incoming: PropertyValue, path: &str, report: &mut MergeReport) {
    match (current, incoming) {
        (PropertyValue::Array(items), PropertyValue::Array(new_items)) => {
            for item in new_items {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
        }
        (PropertyValue::Object(map), PropertyValue::Object(new_map)) => {
            merge_properties(map, new_map, path, report);
        }
        (current, incoming) => {
            if *current != incoming {
                report.conflicts.push(path.to_string());
                *current = incoming;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn disjoint_attributes_are_unioned() {
        let a = Node::new("gene:1", "biolink:Gene").with_attribute("name", "BRCA1");
        let b = Node::new("gene:1", "biolink:GenomicEntity").with_attribute("taxon", "NCBITaxon:9606");

        let (merged, report) = merge_node(&a, b);

        assert!(!report.has_conflicts());
        assert_eq!(merged.categories, vec!["biolink:Gene", "biolink:GenomicEntity"]);
        assert_eq!(merged.attributes.len(), 2);
        assert!(merged.conflicts.is_empty());
    }

    #[test]
    fn conflicting_scalar_is_last_write_wins() {
        let a = Node::new("gene:1", "biolink:Gene").with_attribute("name", "BRCA1");
        let b = Node::new("gene:1", "biolink:Gene").with_attribute("name", "BRCA-1");

        let (merged, report) = merge_node(&a, b);

        assert_eq!(report.conflicts, vec!["name"]);
        assert_eq!(merged.attributes["name"], PropertyValue::from("BRCA-1"));
        assert!(merged.conflicts.contains("name"));
    }

    #[test]
    fn equal_scalars_do_not_conflict() {
        let a = Node::new("n", "C").with_attribute("x", 1);
        let b = Node::new("n", "C").with_attribute("x", 1);
        let (_, report) = merge_node(&a, b);
        assert!(!report.has_conflicts());
    }

    #[test]
    fn lists_are_unioned_in_order() {
        let a = Node::new("n", "C").with_attribute(
            "xref",
            PropertyValue::Array(vec!["a".into(), "b".into()]),
        );
        let b = Node::new("n", "C").with_attribute(
            "xref",
            PropertyValue::Array(vec!["b".into(), "c".into()]),
        );

        let (merged, report) = merge_node(&a, b);

        assert!(!report.has_conflicts());
        assert_eq!(
            merged.attributes["xref"],
            PropertyValue::Array(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn nested_conflicts_use_dotted_paths() {
        let mut left = BTreeMap::new();
        left.insert("source".to_string(), PropertyValue::from("x"));
        left.insert("rank".to_string(), PropertyValue::Int(1));
        let mut right = BTreeMap::new();
        right.insert("source".to_string(), PropertyValue::from("y"));

        let a = Node::new("n", "C").with_attribute("meta", PropertyValue::Object(left));
        let b = Node::new("n", "C").with_attribute("meta", PropertyValue::Object(right));

        let (merged, report) = merge_node(&a, b);

        assert_eq!(report.conflicts, vec!["meta.source"]);
        let PropertyValue::Object(meta) = &merged.attributes["meta"] else {
            panic!("meta should stay a mapping");
        };
        assert_eq!(meta["source"], PropertyValue::from("y"));
        assert_eq!(meta["rank"], PropertyValue::Int(1));
    }

    #[test]
    fn kind_mismatch_is_a_conflict() {
        let a = Node::new("n", "C").with_attribute("x", "scalar");
        let b = Node::new("n", "C").with_attribute("x", PropertyValue::Array(vec!["a".into()]));
        let (merged, report) = merge_node(&a, b);
        assert_eq!(report.conflicts, vec!["x"]);
        assert!(matches!(merged.attributes["x"], PropertyValue::Array(_)));
    }

    #[test]
    fn edge_merge_unions_attributes_and_keeps_key() {
        let a = Edge::new("a", "p", "b").with_attribute("score", 1);
        let b = Edge::new("a", "p", "b").with_attribute("publications", "PMID:1");

        let (merged, report) = merge_edge(&a, b);

        assert!(!report.has_conflicts());
        assert_eq!(merged.id, a.id);
        assert_eq!(merged.attributes.len(), 2);
    }
}
