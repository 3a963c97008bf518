//! Run configuration
//!
//! A run is described by one YAML document:
//!
//! ```yaml
//! sources:
//!   - kind: tabular
//!     nodes: data/nodes.tsv
//!     edges: data/edges.tsv
//! sinks:
//!   - kind: json_graph
//!     path: out/graph.json
//! schema: schema.yaml
//! filters:
//!   node_categories: [biolink:Gene]
//! policy:
//!   drop_dangling: true
//!   fail_on: [PredicateRangeViolation]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use crate::adapter::{ResourceDescriptor, WriteMode};
use crate::filter::FilterSpec;
use crate::storage::StoreConfig;
use crate::validate::IssueKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What to do with records that have problems
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Leave records with validation issues out of the output
    pub drop_invalid: bool,
    /// Leave edges with a missing endpoint out of the output
    pub drop_dangling: bool,
    /// Issue kinds that fail the run
    pub fail_on: BTreeSet<IssueKind>,
    /// Keep going when a source fails, as long as another source remains
    pub tolerate_unavailable_sources: bool,
}

/// A sink descriptor plus its write mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(flatten)]
    pub resource: ResourceDescriptor,
    #[serde(default)]
    pub mode: WriteMode,
}

impl From<ResourceDescriptor> for SinkConfig {
    fn from(resource: ResourceDescriptor) -> Self {
        Self {
            resource,
            mode: WriteMode::Create,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub sources: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
    /// YAML schema file; an empty schema is used when absent
    #[serde(default)]
    pub schema: Option<PathBuf>,
    #[serde(default)]
    pub filters: FilterSpec,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Log sink progress every N nodes or edges
    #[serde(default)]
    pub progress_every: Option<usize>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn rebase(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn rebase_descriptor(base: &Path, descriptor: &mut ResourceDescriptor) {
    match descriptor {
        ResourceDescriptor::Tabular { nodes, edges } => {
            rebase(base, nodes);
            if let Some(edges) = edges {
                rebase(base, edges);
            }
        }
        ResourceDescriptor::JsonGraph { path }
        | ResourceDescriptor::Triples { path }
        | ResourceDescriptor::PropertyGraph { path, .. } => rebase(base, path),
        ResourceDescriptor::Debug { .. } => {}
    }
}

impl TransformConfig {
    /// A config with the given sources and defaults for everything else
    pub fn new(sources: Vec<ResourceDescriptor>) -> Self {
        Self {
            sources,
            sinks: Vec::new(),
            schema: None,
            filters: FilterSpec::default(),
            policy: Policy::default(),
            store: StoreConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            progress_every: None,
        }
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, resolving relative paths against its directory
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        tracing::debug!(
            path = %path.display(),
            sources = config.sources.len(),
            sinks = config.sinks.len(),
            "config loaded"
        );
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for source in &mut self.sources {
            rebase_descriptor(base, source);
        }
        for sink in &mut self.sinks {
            rebase_descriptor(base, &mut sink.resource);
        }
        if let Some(schema) = &mut self.schema {
            rebase(base, schema);
        }
        if let Some(spill) = &mut self.store.spill_path {
            rebase(base, spill);
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one source is required".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be positive".into()));
        }
        if self
            .sources
            .iter()
            .any(|s| matches!(s, ResourceDescriptor::Debug { .. }))
        {
            return Err(ConfigError::Invalid("debug resources can only be sinks".into()));
        }
        Ok(())
    }
}
