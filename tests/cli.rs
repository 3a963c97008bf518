//! The kgweave binary: exit codes, console summary and report file.

mod common;

use std::path::{Path, PathBuf};
use std::process::Command;

fn kgweave() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_kgweave"));
    command.env("RUST_LOG", "warn");
    command
}

fn write_run(dir: &Path) -> PathBuf {
    common::write_schema(dir);
    std::fs::write(
        dir.join("nodes.tsv"),
        "id\tcategory\tname\ngene:1\tbiolink:Gene\tBRCA1\ngene:2\tbiolink:Gene\tTP53\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("edges.tsv"),
        "subject\tpredicate\tobject\ngene:1\tbiolink:interacts_with\tgene:2\n",
    )
    .unwrap();
    let config = dir.join("run.yaml");
    std::fs::write(
        &config,
        r#"
sources:
  - kind: tabular
    nodes: nodes.tsv
    edges: edges.tsv
sinks:
  - kind: triples
    path: graph.nt
schema: schema.yaml
"#,
    )
    .unwrap();
    config
}

#[test]
fn validate_reports_the_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_run(dir.path());

    let output = kgweave().arg("validate").arg("--config").arg(&config).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Schema: 5 categories, 3 predicates"), "{}", stdout);
    assert!(stdout.contains("Configuration OK"));
    assert!(!dir.path().join("graph.nt").exists());
}

#[test]
fn run_writes_the_sink_and_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_run(dir.path());
    let report = dir.path().join("report.json");

    let output = kgweave()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--report")
        .arg(&report)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("2 nodes, 1 edges"), "{}", stdout);
    assert!(dir.path().join("graph.nt").exists());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["state"], "Done");
    assert_eq!(json["summary"]["node_count"], 2);
}

#[test]
fn malformed_config_exits_with_code_two() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("run.yaml");
    std::fs::write(&config, "sources: []\n").unwrap();

    let output = kgweave().arg("run").arg("--config").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn failed_run_exits_with_code_one() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("run.yaml");
    std::fs::write(
        &config,
        r#"
sources:
  - kind: json_graph
    path: missing.json
sinks:
  - kind: triples
    path: graph.nt
"#,
    )
    .unwrap();

    let output = kgweave().arg("run").arg("--config").arg(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}
