//! kgweave: knowledge graph exchange engine
//!
//! Streams nodes and edges out of heterogeneous graph serializations, merges
//! them into one deduplicated graph, filters and validates it against a
//! resolved schema, and writes it back out in any supported format.
//!
//! # Core Concepts
//!
//! - **Records**: `Node` and `Edge` are the only types that cross the
//!   boundary between the engine and its adapters
//! - **Adapters**: one source and one sink type per format (tabular, JSON
//!   graph, N-Triples, embedded property graph)
//! - **Store**: deduplicates by node id and edge key; all nodes merge before
//!   any edge
//! - **Transformer**: drives one run from sources to sinks and reports what
//!   happened
//!
//! # Example
//!
//! ```
//! use kgweave::{MemorySink, MemorySource, Node, Edge, Transformer, TransformState};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let sink = MemorySink::new();
//! let mut transformer = Transformer::new();
//! transformer.add_source(MemorySource::new("demo", vec![
//!     Node::new("gene:1", "biolink:Gene").into(),
//!     Node::new("gene:2", "biolink:Gene").into(),
//!     Edge::new("gene:1", "biolink:interacts_with", "gene:2").into(),
//! ])).unwrap();
//! transformer.add_sink(sink.clone()).unwrap();
//!
//! let report = transformer.run().await.unwrap();
//! assert_eq!(report.state, TransformState::Done);
//! assert_eq!(report.summary.category("biolink:Gene"), 2);
//! # });
//! ```

pub mod adapter;
pub mod config;
pub mod filter;
mod graph;
pub mod schema;
pub mod storage;
pub mod summary;
pub mod transform;
pub mod validate;

pub use adapter::{
    open_sink, open_source, AdapterError, AdapterResult, CancellationToken, MemorySink,
    MemorySource, ResourceDescriptor, SinkAdapter, SourceAdapter, WriteMode,
};
pub use config::{ConfigError, Policy, SinkConfig, TransformConfig};
pub use filter::{FilterChain, FilterDecision, FilterRule, FilterSpec, FilterTarget};
pub use graph::{
    derive_edge_id, edge_fields, merge_edge, merge_node, node_fields, CanonicalizeError, Edge,
    EdgeId, Endpoints, MergeReport, Node, NodeId, Properties, PropertyValue, RawRecord, Record,
    RecordKind, DEFAULT_NODE_CATEGORY,
};
pub use schema::{Schema, SchemaDocument, SchemaError, SchemaResolver, YamlSchemaResolver};
pub use storage::{open_store, GraphStore, MemoryStore, SpillStore, StorageError, StorageResult, StoreConfig};
pub use summary::{summarize, FilterCounts, GraphSummary};
pub use transform::{
    AdapterFailure, TransformError, TransformReport, TransformResult, TransformState, Transformer,
};
pub use validate::{validate, IssueKind, IssueLog, ValidationIssue, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
