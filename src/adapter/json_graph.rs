//! JSON graph documents: `{"nodes": [...], "edges": [...]}`

use super::{AdapterError, AdapterResult, RecordStream, SinkAdapter, SourceAdapter, WriteMode};
use crate::graph::{edge_fields, node_fields, RawRecord, Record, RecordKind};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Parses the document on open and yields its records lazily, nodes first
pub struct JsonGraphSource {
    name: String,
    nodes: Option<Vec<Value>>,
    edges: Option<Vec<Value>>,
}

fn take_array(doc: &mut serde_json::Map<String, Value>, key: &str) -> Option<Result<Vec<Value>, String>> {
    match doc.remove(key)? {
        Value::Array(items) => Some(Ok(items)),
        Value::Null => None,
        _ => Some(Err(format!("'{}' must be an array", key))),
    }
}

impl JsonGraphSource {
    pub fn open(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let path = path.as_ref();
        let name = format!("json_graph:{}", path.display());
        let file = File::open(path).map_err(|e| AdapterError::unavailable(&name, e))?;
        let doc: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AdapterError::unavailable(&name, e))?;
        Self::from_value(name, doc)
    }

    /// Build from an already-parsed document
    pub fn from_value(name: impl Into<String>, doc: Value) -> AdapterResult<Self> {
        let name = name.into();
        let Value::Object(mut doc) = doc else {
            return Err(AdapterError::unavailable(&name, "document is not an object"));
        };
        let nodes = take_array(&mut doc, "nodes")
            .transpose()
            .map_err(|e| AdapterError::unavailable(&name, e))?
            .unwrap_or_default();
        let edges = take_array(&mut doc, "edges")
            .transpose()
            .map_err(|e| AdapterError::unavailable(&name, e))?
            .unwrap_or_default();

        Ok(Self {
            name,
            nodes: Some(nodes),
            edges: Some(edges),
        })
    }
}

fn to_record(name: &str, kind: RecordKind, index: usize, item: Value) -> AdapterResult<Record> {
    let resource = format!("{} {}[{}]", name, kind, index);
    let Value::Object(fields) = item else {
        return Err(AdapterError::malformed(resource, "record is not an object"));
    };
    RawRecord { kind, fields }
        .canonicalize()
        .map_err(|e| AdapterError::canonicalize(&resource, e))
}

impl SourceAdapter for JsonGraphSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        let (Some(nodes), Some(edges)) = (self.nodes.take(), self.edges.take()) else {
            return Err(AdapterError::AlreadyConsumed(self.name.clone()));
        };
        let name = self.name.as_str();
        let nodes = nodes
            .into_iter()
            .enumerate()
            .map(move |(i, item)| to_record(name, RecordKind::Node, i, item));
        let edges = edges
            .into_iter()
            .enumerate()
            .map(move |(i, item)| to_record(name, RecordKind::Edge, i, item));
        Ok(Box::new(nodes.chain(edges)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Nodes,
    Edges,
    Closed,
}

/// Streams a JSON graph document. Nodes must be written before edges.
pub struct JsonGraphSink {
    name: String,
    out: BufWriter<File>,
    section: Section,
    first_in_section: bool,
}

impl JsonGraphSink {
    pub fn open(path: impl AsRef<Path>, mode: WriteMode) -> AdapterResult<Self> {
        let path = path.as_ref();
        let name = format!("json_graph:{}", path.display());
        if mode == WriteMode::Append {
            return Err(AdapterError::Unsupported(format!(
                "{} cannot be appended to",
                name
            )));
        }
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(b"{\"nodes\":[")?;
        Ok(Self {
            name,
            out,
            section: Section::Nodes,
            first_in_section: true,
        })
    }

    fn enter_edges(&mut self) -> AdapterResult<()> {
        self.out.write_all(b"\n],\"edges\":[")?;
        self.section = Section::Edges;
        self.first_in_section = true;
        Ok(())
    }

    fn write_item(&mut self, fields: &serde_json::Map<String, Value>) -> AdapterResult<()> {
        if !self.first_in_section {
            self.out.write_all(b",")?;
        }
        self.out.write_all(b"\n")?;
        serde_json::to_writer(&mut self.out, fields)?;
        self.first_in_section = false;
        Ok(())
    }
}

impl SinkAdapter for JsonGraphSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        for record in batch {
            match (record, self.section) {
                (_, Section::Closed) => {
                    return Err(AdapterError::Unsupported(format!("{} is closed", self.name)))
                }
                (Record::Node(node), Section::Nodes) => self.write_item(&node_fields(node))?,
                (Record::Node(node), Section::Edges) => {
                    return Err(AdapterError::OutOfOrder {
                        resource: self.name.clone(),
                        reason: format!("node {} written after edges", node.id),
                    })
                }
                (Record::Edge(edge), section) => {
                    if section == Section::Nodes {
                        self.enter_edges()?;
                    }
                    self.write_item(&edge_fields(edge))?;
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> AdapterResult<()> {
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()> {
        match self.section {
            Section::Closed => return Ok(()),
            Section::Nodes => self.enter_edges()?,
            Section::Edges => {}
        }
        self.out.write_all(b"\n]}\n")?;
        self.out.flush()?;
        self.section = Section::Closed;
        Ok(())
    }
}
