//! Transform orchestration
//!
//! A `Transformer` reads every source, merges the records into a graph store
//! (all nodes first, then all edges), seals the store, then filters and
//! validates each stored record on its way to the sinks.

mod phase;
mod pipeline;
mod report;
mod spool;
mod state;

pub use phase::{EdgePhase, MergeStats, NodePhase};
pub use pipeline::Transformer;
pub use report::{AdapterFailure, AdapterRole, TransformReport};
pub use spool::{EdgeSpool, DEFAULT_SPOOL_THRESHOLD};
pub use state::TransformState;

use crate::adapter::AdapterError;
use crate::config::ConfigError;
use crate::schema::SchemaError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cannot {operation} while the transformer is {state}")]
    InvalidState {
        state: TransformState,
        operation: &'static str,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type TransformResult<T> = Result<T, TransformError>;
