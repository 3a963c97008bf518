//! End-to-end transform scenarios: configuration in, files and a report out.

mod common;

use common::{disease, gene, interacts, read_all, schema, write_schema};
use kgweave::adapter::{DebugSink, RecordStream};
use kgweave::{
    open_source, AdapterError, AdapterResult, Edge, FilterSpec, IssueKind, MemorySink, MemorySource, Node, Policy,
    Record, ResourceDescriptor, SourceAdapter, TransformConfig, TransformError,
    TransformState, Transformer,
};
use std::path::Path;

fn write_tabular(dir: &Path, nodes: &str, edges: &str) -> ResourceDescriptor {
    let node_path = dir.join("nodes.tsv");
    let edge_path = dir.join("edges.tsv");
    std::fs::write(&node_path, nodes).unwrap();
    std::fs::write(&edge_path, edges).unwrap();
    ResourceDescriptor::tabular(node_path, Some(&edge_path))
}

fn memory_transformer(records: Vec<Record>) -> (Transformer, MemorySink) {
    let sink = MemorySink::new();
    let mut transformer = Transformer::new().with_schema(schema());
    transformer.add_source(MemorySource::new("fixture", records)).unwrap();
    transformer.add_sink(sink.clone()).unwrap();
    (transformer, sink)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn gene_interaction_from_config() {
    let dir = tempfile::tempdir().unwrap();
    write_schema(dir.path());
    write_tabular(
        dir.path(),
        "id\tcategory\tname\ngene:1\tbiolink:Gene\tBRCA1\ngene:2\tbiolink:Gene\tTP53\n",
        "subject\tpredicate\tobject\ngene:1\tbiolink:interacts_with\tgene:2\n",
    );
    let config_path = dir.path().join("run.yaml");
    std::fs::write(
        &config_path,
        r#"
sources:
  - kind: tabular
    nodes: nodes.tsv
    edges: edges.tsv
sinks:
  - kind: json_graph
    path: out/graph.json
schema: schema.yaml
"#,
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("out")).unwrap();

    let config = TransformConfig::from_yaml_file(&config_path).unwrap();
    let mut transformer = Transformer::from_config(&config).unwrap();
    let report = transformer.run().await.unwrap();

    assert_eq!(report.state, TransformState::Done, "{:?}", report.error);
    assert_eq!(report.summary.category("biolink:Gene"), 2);
    assert_eq!(report.summary.predicate("biolink:interacts_with"), 1);
    assert_eq!(report.summary.dangling_edges, 0);
    assert_eq!(report.summary.merge_conflicts, 0);
    assert!(report.issues.is_empty());
    assert!(report.finished_at >= report.started_at);

    let output = open_source(&ResourceDescriptor::json_graph(dir.path().join("out/graph.json"))).unwrap();
    let (nodes, edges) = read_all(output);
    assert_eq!(nodes, vec![gene("gene:1", "BRCA1"), gene("gene:2", "TP53")]);
    assert_eq!(edges, vec![interacts("gene:1", "gene:2")]);
}

#[tokio::test]
async fn range_violation_is_reported_and_the_edge_still_written() {
    let (mut transformer, sink) = memory_transformer(vec![
        gene("gene:1", "BRCA1").into(),
        disease("mondo:1", "breast cancer").into(),
        interacts("gene:1", "mondo:1").into(),
    ]);

    let report = transformer.run().await.unwrap();

    assert_eq!(report.state, TransformState::Done);
    assert_eq!(report.issues.count(IssueKind::PredicateRangeViolation), 1);
    assert_eq!(report.issues.issues.len(), 1);
    assert_eq!(report.summary.issue_count(IssueKind::PredicateRangeViolation), 1);
    assert_eq!(report.summary.edge_count, 1);
    assert!(sink.records().contains(&interacts("gene:1", "mondo:1").into()));
}

#[tokio::test]
async fn drop_invalid_removes_records_with_issues() {
    let (transformer, sink) = memory_transformer(vec![
        gene("gene:1", "BRCA1").into(),
        disease("mondo:1", "breast cancer").into(),
        interacts("gene:1", "mondo:1").into(),
        Node::new("x:1", "biolink:Unknown").into(),
    ]);
    let mut transformer = transformer.with_policy(Policy {
        drop_invalid: true,
        ..Policy::default()
    });

    let report = transformer.run().await.unwrap();

    assert_eq!(report.state, TransformState::Done);
    assert_eq!(report.summary.invalid_dropped, 2);
    assert_eq!(report.issues.count(IssueKind::UnknownCategory), 1);
    assert_eq!(sink.records().len(), 2);
}

#[tokio::test]
async fn dangling_edges_are_written_unless_dropped() {
    let records: Vec<Record> = vec![gene("gene:1", "BRCA1").into(), interacts("gene:1", "gene:404").into()];

    let (mut keep, kept) = memory_transformer(records.clone());
    let report = keep.run().await.unwrap();
    assert_eq!(report.summary.dangling_edges, 1);
    assert_eq!(report.issues.count(IssueKind::DanglingEndpoint), 1);
    assert_eq!(kept.records().len(), 2);

    let (dropping, dropped) = memory_transformer(records);
    let mut dropping = dropping.with_policy(Policy {
        drop_dangling: true,
        ..Policy::default()
    });
    let report = dropping.run().await.unwrap();
    assert_eq!(report.state, TransformState::Done);
    assert_eq!(report.summary.dangling_edges, 1);
    assert_eq!(report.summary.dangling_dropped, 1);
    assert_eq!(report.issues.count(IssueKind::DanglingEndpoint), 1);
    assert_eq!(dropped.records(), vec![Record::from(gene("gene:1", "BRCA1"))]);
}

#[tokio::test]
async fn duplicates_across_sources_merge() {
    let sink = MemorySink::new();
    let mut transformer = Transformer::new();
    transformer
        .add_source(MemorySource::new(
            "left",
            vec![
                Node::new("gene:1", "biolink:Gene").with_attribute("name", "BRCA1").into(),
                interacts("gene:1", "gene:2").into(),
            ],
        ))
        .unwrap();
    transformer
        .add_source(MemorySource::new(
            "right",
            vec![
                Node::new("gene:1", "biolink:Protein").with_attribute("symbol", "BRCA1").into(),
                Node::new("gene:2", "biolink:Gene").into(),
                interacts("gene:1", "gene:2").into(),
            ],
        ))
        .unwrap();
    transformer.add_sink(sink.clone()).unwrap();

    let report = transformer.run().await.unwrap();

    assert_eq!(report.state, TransformState::Done);
    assert_eq!(report.summary.node_count, 2);
    assert_eq!(report.summary.edge_count, 1);
    assert_eq!(report.summary.merge_conflicts, 0);
    let merged = sink
        .records()
        .into_iter()
        .find_map(|r| match r {
            Record::Node(n) if n.id.as_str() == "gene:1" => Some(n),
            _ => None,
        })
        .unwrap();
    assert_eq!(merged.categories.len(), 2);
    assert_eq!(merged.attributes.len(), 2);
}

#[tokio::test]
async fn second_source_extends_a_gene_and_adds_the_interaction() {
    let sink = MemorySink::new();
    let mut transformer = Transformer::new().with_schema(schema());
    transformer
        .add_source(MemorySource::new(
            "a",
            vec![
                Node::new("gene:1", "biolink:Gene").into(),
                Node::new("gene:2", "biolink:Gene").into(),
            ],
        ))
        .unwrap();
    transformer
        .add_source(MemorySource::new(
            "b",
            vec![
                interacts("gene:1", "gene:2").into(),
                Node::new("gene:1", "biolink:Gene").with_attribute("taxon", 9606).into(),
            ],
        ))
        .unwrap();
    transformer.add_sink(sink.clone()).unwrap();

    let report = transformer.run().await.unwrap();

    assert_eq!(report.state, TransformState::Done, "{:?}", report.error);
    assert_eq!(report.summary.category("biolink:Gene"), 2);
    assert_eq!(report.summary.predicate("biolink:interacts_with"), 1);
    assert_eq!(report.summary.dangling_edges, 0);
    assert_eq!(report.summary.merge_conflicts, 0);

    let (nodes, edges) = common::split(sink.records());
    assert_eq!(nodes.len(), 2);
    assert_eq!(edges.len(), 1);
    assert_eq!(nodes[0].id.as_str(), "gene:1");
    assert_eq!(nodes[0].attributes.get("taxon"), Some(&kgweave::PropertyValue::Int(9606)));
}

#[tokio::test]
async fn conflicting_attributes_are_counted() {
    let (mut transformer, _sink) = memory_transformer(vec![
        gene("gene:1", "BRCA1").into(),
        gene("gene:1", "RNF53").into(),
    ]);
    let report = transformer.run().await.unwrap();
    assert_eq!(report.summary.node_count, 1);
    assert_eq!(report.summary.merge_conflicts, 1);
}

#[tokio::test]
async fn category_filter_drops_nodes_and_their_edges() {
    let (transformer, sink) = memory_transformer(vec![
        gene("gene:1", "BRCA1").into(),
        gene("gene:2", "TP53").into(),
        disease("mondo:1", "breast cancer").into(),
        interacts("gene:1", "gene:2").into(),
        Edge::new("gene:1", "biolink:gene_associated_with_condition", "mondo:1").into(),
    ]);
    let mut transformer =
        transformer.with_filters(FilterSpec::new().with_node_category("biolink:Gene").build());

    let report = transformer.run().await.unwrap();

    assert_eq!(report.summary.node_count, 2);
    assert_eq!(report.summary.edge_count, 1);
    assert_eq!(report.summary.filtered.nodes, 1);
    assert_eq!(report.summary.filtered.total(), 2);
    assert_eq!(sink.records().len(), 3);
}

// ============================================================================
// Failure, cancellation and lifecycle
// ============================================================================

#[tokio::test]
async fn unavailable_source_fails_the_run_unless_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_tabular(dir.path(), "id\tcategory\ngene:1\tbiolink:Gene\n", "subject\tpredicate\tobject\n");
    let missing = ResourceDescriptor::json_graph(dir.path().join("missing.json"));

    let mut config = TransformConfig::new(vec![good, missing]);
    let report = Transformer::from_config(&config).unwrap().run().await.unwrap();
    assert_eq!(report.state, TransformState::Failed);
    assert_eq!(report.fatal_failures().count(), 1);

    config.policy.tolerate_unavailable_sources = true;
    let report = Transformer::from_config(&config).unwrap().run().await.unwrap();
    assert_eq!(report.state, TransformState::Done, "{:?}", report.error);
    assert_eq!(report.failures.len(), 1);
    assert!(!report.failures[0].fatal);
    assert_eq!(report.summary.node_count, 1);
}

/// Yields its records, then fails as if the connection dropped
struct FailsMidRead {
    records: Vec<Record>,
}

impl SourceAdapter for FailsMidRead {
    fn name(&self) -> &str {
        "flaky"
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        let records = std::mem::take(&mut self.records);
        let failure = AdapterError::unavailable("flaky", "connection reset");
        Ok(Box::new(records.into_iter().map(Ok).chain(std::iter::once(Err(failure)))))
    }
}

#[tokio::test]
async fn tolerated_mid_read_failure_keeps_records_already_read() {
    let mut policy = Policy::default();
    policy.tolerate_unavailable_sources = true;
    let sink = MemorySink::new();
    let mut transformer = Transformer::new().with_policy(policy);
    transformer
        .add_source(FailsMidRead {
            records: vec![gene("gene:1", "BRCA1").into(), gene("gene:2", "TP53").into()],
        })
        .unwrap();
    transformer
        .add_source(MemorySource::new("steady", vec![gene("gene:3", "APC").into()]))
        .unwrap();
    transformer.add_sink(sink.clone()).unwrap();

    let report = transformer.run().await.unwrap();
    assert_eq!(report.state, TransformState::Done, "{:?}", report.error);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].adapter, "flaky");
    assert!(!report.failures[0].fatal);

    let (nodes, _) = common::split(sink.records());
    let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["gene:1", "gene:2", "gene:3"]);
}

#[tokio::test]
async fn no_healthy_source_left_is_fatal_even_when_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TransformConfig::new(vec![ResourceDescriptor::triples(dir.path().join("none.nt"))]);
    config.policy.tolerate_unavailable_sources = true;

    let report = Transformer::from_config(&config).unwrap().run().await.unwrap();
    assert_eq!(report.state, TransformState::Failed);
    assert!(report.error.unwrap().contains("none.nt"));
}

#[tokio::test]
async fn malformed_rows_are_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_tabular(
        dir.path(),
        "id\tcategory\tname\ngene:1\tbiolink:Gene\tBRCA1\nbroken\n",
        "subject\tpredicate\tobject\n",
    );
    let report = Transformer::from_config(&TransformConfig::new(vec![source]))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, TransformState::Done);
    assert_eq!(report.summary.node_count, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(!report.failures[0].fatal);
}

#[tokio::test]
async fn failing_sink_fails_the_run() {
    let mut transformer = Transformer::new();
    transformer
        .add_source(MemorySource::new(
            "genes",
            vec![gene("gene:1", "A").into(), gene("gene:2", "B").into()],
        ))
        .unwrap();
    transformer.add_sink(DebugSink::new(Some(1))).unwrap();

    let report = transformer.run().await.unwrap();
    assert_eq!(report.state, TransformState::Failed);
    assert_eq!(report.fatal_failures().count(), 1);
    assert!(report.error.unwrap().contains("limit"));
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
    let (mut transformer, sink) = memory_transformer(vec![gene("gene:1", "BRCA1").into()]);
    transformer.cancellation_token().cancel();

    let report = transformer.run().await.unwrap();
    assert_eq!(report.state, TransformState::Cancelled);
    assert!(report.error.is_none());
    assert!(sink.records().is_empty());
    assert_eq!(transformer.state(), TransformState::Cancelled);
}

#[tokio::test]
async fn a_finished_transformer_rejects_more_work() {
    let (mut transformer, _sink) = memory_transformer(vec![gene("gene:1", "BRCA1").into()]);
    transformer.run().await.unwrap();

    assert!(matches!(
        transformer.run().await,
        Err(TransformError::InvalidState { state: TransformState::Done, .. })
    ));
    assert!(matches!(
        transformer.add_source(MemorySource::new("late", Vec::new())),
        Err(TransformError::InvalidState { .. })
    ));
}

#[test]
fn reading_a_source_twice_is_rejected() {
    let mut source = MemorySource::new("once", vec![gene("gene:1", "BRCA1").into()]);
    assert_eq!(source.read().unwrap().count(), 1);
    assert!(matches!(source.read().err(), Some(AdapterError::AlreadyConsumed(_))));
}

#[tokio::test]
async fn report_serializes_for_the_cli() {
    let (mut transformer, _sink) = memory_transformer(vec![interacts("gene:1", "gene:2").into()]);
    let report = transformer.run().await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["state"], "Done");
    assert_eq!(json["summary"]["dangling_edges"], 1);
    assert_eq!(json["issues"]["counts"]["DanglingEndpoint"], 2);
}
