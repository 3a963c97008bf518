//! Shared fixtures for kgweave integration tests
//!
//! A small gene/disease schema, a sample graph that exercises every value
//! type, and helpers for reading a source back into sorted node and edge
//! lists.

#![allow(dead_code)]

use kgweave::{Edge, Node, PropertyValue, Record, SchemaDocument, SourceAdapter};
use std::path::{Path, PathBuf};

pub const SCHEMA_YAML: &str = r#"
categories:
  biolink:NamedThing: {}
  biolink:BiologicalEntity:
    is_a: [biolink:NamedThing]
  biolink:Gene:
    is_a: [biolink:BiologicalEntity]
    attributes: [symbol]
  biolink:Protein:
    is_a: [biolink:BiologicalEntity]
  biolink:Disease:
    is_a: [biolink:NamedThing]
predicates:
  biolink:related_to: {}
  biolink:interacts_with:
    is_a: [biolink:related_to]
    domain: biolink:Gene
    range: biolink:Gene
  biolink:gene_associated_with_condition:
    is_a: [biolink:related_to]
    domain: biolink:Gene
    range: biolink:Disease
node_attributes: [name]
edge_attributes: [publications]
"#;

pub fn schema() -> SchemaDocument {
    match serde_yaml::from_str(SCHEMA_YAML) {
        Ok(doc) => doc,
        Err(e) => panic!("fixture schema does not parse: {}", e),
    }
}

/// Write the fixture schema into `dir` and return its path
pub fn write_schema(dir: &Path) -> PathBuf {
    let path = dir.join("schema.yaml");
    std::fs::write(&path, SCHEMA_YAML).unwrap();
    path
}

pub fn gene(id: &str, name: &str) -> Node {
    Node::new(id, "biolink:Gene").with_attribute("name", name)
}

pub fn disease(id: &str, name: &str) -> Node {
    Node::new(id, "biolink:Disease").with_attribute("name", name)
}

pub fn interacts(subject: &str, object: &str) -> Edge {
    Edge::new(subject, "biolink:interacts_with", object)
}

/// A graph using every attribute value type, provenance and explicit ids
pub fn sample_graph() -> (Vec<Node>, Vec<Edge>) {
    let nodes = vec![
        gene("HGNC:1100", "BRCA1")
            .with_category("biolink:Protein")
            .with_attribute("symbol", "BRCA1")
            .with_attribute("synonyms", vec![PropertyValue::from("RNF53"), PropertyValue::from("BRCC1")])
            .with_attribute("exon_count", 24)
            .with_attribute("score", 0.75)
            .with_attribute("curated", true),
        gene("HGNC:11998", "TP53"),
        disease("MONDO:0007254", "breast cancer"),
    ];
    let edges = vec![
        interacts("HGNC:1100", "HGNC:11998"),
        Edge::new("HGNC:1100", "biolink:gene_associated_with_condition", "MONDO:0007254")
            .with_provenance("infores:clinvar")
            .with_attribute("publications", vec![PropertyValue::from("PMID:123"), PropertyValue::from("PMID:456")]),
        Edge::new("HGNC:11998", "biolink:gene_associated_with_condition", "MONDO:0007254")
            .with_id("edge:tp53-bc"),
    ];
    (nodes, edges)
}

pub fn records(nodes: &[Node], edges: &[Edge]) -> Vec<Record> {
    nodes
        .iter()
        .cloned()
        .map(Record::from)
        .chain(edges.iter().cloned().map(Record::from))
        .collect()
}

/// Split records into nodes sorted by id and edges sorted by key
pub fn split(records: impl IntoIterator<Item = Record>) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for record in records {
        match record {
            Record::Node(node) => nodes.push(node),
            Record::Edge(edge) => edges.push(edge),
        }
    }
    nodes.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    edges.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    (nodes, edges)
}

/// Read every record from a source, panicking on any error
pub fn read_all(mut source: impl SourceAdapter) -> (Vec<Node>, Vec<Edge>) {
    let records: Vec<Record> = source
        .read()
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    source.close().unwrap();
    split(records)
}
