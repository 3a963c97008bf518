//! Canonical graph records and their merge rules

mod edge;
mod merge;
mod node;
mod record;


pub use edge::{derive_edge_id, Edge, EdgeId};
pub use merge::{merge_edge, merge_node, MergeReport};
pub use node::{Node, NodeId, Properties, PropertyValue, DEFAULT_NODE_CATEGORY};
pub use record::{edge_fields, node_fields, CanonicalizeError, Endpoints, RawRecord, Record, RecordKind};
