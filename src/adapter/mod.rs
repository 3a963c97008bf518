//! Source and sink adapters
//!
//! Each serialized format gets a source type and a sink type implementing
//! `SourceAdapter` / `SinkAdapter`. A `ResourceDescriptor` names a resource
//! and its format; `open_source` and `open_sink` pick the implementation.

mod cancel;
pub mod json_graph;
mod memory;
pub mod property_graph;
mod sink;
pub mod tabular;
mod traits;
pub mod triples;

pub use cancel::CancellationToken;
pub use json_graph::{JsonGraphSink, JsonGraphSource};
pub use memory::{MemorySink, MemorySource};
pub use property_graph::{
    PgNode, PgRelationship, PropertyGraphClient, PropertyGraphSink, PropertyGraphSource,
    SqlitePropertyGraph, DEFAULT_PAGE_SIZE,
};
pub use sink::{DebugSink, ProgressSink, DEFAULT_LOG_EVERY};
pub use tabular::{TsvSink, TsvSource};
pub use traits::{RecordStream, SinkAdapter, SourceAdapter, WriteMode};
pub use triples::{NTriplesSink, NTriplesSource};

use crate::graph::CanonicalizeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("resource unavailable: {resource}: {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    #[error("malformed record in {resource}: {reason}")]
    MalformedRecord { resource: String, reason: String },

    #[error("{0} has already been read")]
    AlreadyConsumed(String),

    #[error("out of order write to {resource}: {reason}")]
    OutOfOrder { resource: String, reason: String },

    #[error("{resource}: record limit of {limit} exceeded")]
    LimitExceeded { resource: String, limit: usize },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl AdapterError {
    pub fn unavailable(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedRecord {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn canonicalize(resource: &str, err: CanonicalizeError) -> Self {
        Self::malformed(resource, err)
    }

    /// Errors that affect one record only; the stream continues past them
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}

/// Names a resource and its format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDescriptor {
    /// Node file plus optional edge file, tab-separated
    Tabular {
        nodes: PathBuf,
        #[serde(default)]
        edges: Option<PathBuf>,
    },
    JsonGraph { path: PathBuf },
    Triples { path: PathBuf },
    /// Embedded property-graph database file
    PropertyGraph {
        path: PathBuf,
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    /// Logs records at debug level; write-only
    Debug {
        #[serde(default)]
        limit: Option<usize>,
    },
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl ResourceDescriptor {
    pub fn tabular(nodes: impl AsRef<Path>, edges: Option<&Path>) -> Self {
        Self::Tabular {
            nodes: nodes.as_ref().to_path_buf(),
            edges: edges.map(Path::to_path_buf),
        }
    }

    pub fn json_graph(path: impl AsRef<Path>) -> Self {
        Self::JsonGraph {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn triples(path: impl AsRef<Path>) -> Self {
        Self::Triples {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn property_graph(path: impl AsRef<Path>) -> Self {
        Self::PropertyGraph {
            path: path.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Short label for logs and reports
    pub fn label(&self) -> String {
        match self {
            Self::Tabular { nodes, .. } => format!("tabular:{}", nodes.display()),
            Self::JsonGraph { path } => format!("json_graph:{}", path.display()),
            Self::Triples { path } => format!("triples:{}", path.display()),
            Self::PropertyGraph { path, .. } => format!("property_graph:{}", path.display()),
            Self::Debug { .. } => "debug".to_string(),
        }
    }
}

/// Open a source for `descriptor`, reading headers or documents eagerly
pub fn open_source(descriptor: &ResourceDescriptor) -> AdapterResult<Box<dyn SourceAdapter>> {
    let source: Box<dyn SourceAdapter> = match descriptor {
        ResourceDescriptor::Tabular { nodes, edges } => {
            Box::new(TsvSource::open(nodes, edges.as_deref())?)
        }
        ResourceDescriptor::JsonGraph { path } => Box::new(JsonGraphSource::open(path)?),
        ResourceDescriptor::Triples { path } => Box::new(NTriplesSource::open(path)?),
        ResourceDescriptor::PropertyGraph { path, page_size } => {
            let client = SqlitePropertyGraph::open_existing(path)?;
            Box::new(PropertyGraphSource::new(client, *page_size))
        }
        ResourceDescriptor::Debug { .. } => {
            return Err(AdapterError::Unsupported(
                "debug resources can only be written".to_string(),
            ))
        }
    };
    tracing::info!(source = source.name(), "source opened");
    Ok(source)
}

/// Open a sink for `descriptor`
pub fn open_sink(
    descriptor: &ResourceDescriptor,
    mode: WriteMode,
) -> AdapterResult<Box<dyn SinkAdapter>> {
    let sink: Box<dyn SinkAdapter> = match descriptor {
        ResourceDescriptor::Tabular { nodes, edges } => {
            Box::new(TsvSink::open(nodes, edges.as_deref(), mode)?)
        }
        ResourceDescriptor::JsonGraph { path } => Box::new(JsonGraphSink::open(path, mode)?),
        ResourceDescriptor::Triples { path } => Box::new(NTriplesSink::open(path, mode)?),
        ResourceDescriptor::PropertyGraph { path, .. } => {
            let client = SqlitePropertyGraph::open(path)?;
            if mode == WriteMode::Create {
                client.clear()?;
            }
            Box::new(PropertyGraphSink::new(client))
        }
        ResourceDescriptor::Debug { limit } => Box::new(DebugSink::new(*limit)),
    };
    tracing::info!(sink = sink.name(), ?mode, "sink opened");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_tagged_by_kind() {
        let yaml = "kind: tabular\nnodes: graph_nodes.tsv\nedges: graph_edges.tsv\n";
        let descriptor: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            descriptor,
            ResourceDescriptor::tabular("graph_nodes.tsv", Some(Path::new("graph_edges.tsv")))
        );

        let pg: ResourceDescriptor = serde_yaml::from_str("kind: property_graph\npath: kg.db\n").unwrap();
        assert_eq!(pg, ResourceDescriptor::property_graph("kg.db"));
    }

    #[test]
    fn missing_source_is_unavailable() {
        let err = open_source(&ResourceDescriptor::json_graph("/nonexistent/graph.json"))
            .err()
            .unwrap();
        assert!(matches!(err, AdapterError::ResourceUnavailable { .. }));
    }

    #[test]
    fn debug_descriptor_cannot_be_read() {
        let err = open_source(&ResourceDescriptor::Debug { limit: None }).err().unwrap();
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }
}
