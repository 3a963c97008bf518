//! The transform run
//!
//! Stages and the tasks that run them:
//!
//! ```text
//! source ─┐                                      ┌─> sink writer
//! source ─┼─> mpsc ─> node merge ─> edge merge ─> screen ─┼─> sink writer
//! source ─┘          (edges spooled)   (seal)            └─> sink writer
//! ```
//!
//! Every adapter call runs on a blocking task. Queues are bounded by the
//! configured depth, so a slow stage holds back the ones feeding it.

use super::phase::{MergeStats, NodePhase};
use super::report::{AdapterFailure, TransformReport};
use super::spool::{EdgeSpool, DEFAULT_SPOOL_THRESHOLD};
use super::state::TransformState;
use super::{TransformError, TransformResult};
use crate::adapter::{
    open_sink, open_source, AdapterError, AdapterResult, CancellationToken, ProgressSink,
    ResourceDescriptor, SinkAdapter, SourceAdapter,
};
use crate::config::{Policy, SinkConfig, TransformConfig, DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_DEPTH};
use crate::filter::{FilterChain, FilterDecision};
use crate::graph::{Endpoints, Record, RecordKind};
use crate::schema::{Schema, SchemaError, SchemaResolver, YamlSchemaResolver};
use crate::storage::{open_store, GraphStore, StorageError, StoreConfig};
use crate::summary::GraphSummary;
use crate::validate::{validate, IssueKind, IssueLog, ValidationIssue, ValidationResult};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Why a run stopped early
#[derive(Debug)]
enum Halt {
    Cancelled,
    Failed(String),
    /// A sink writer went away; its own result carries the reason
    SinkClosed,
}

impl From<StorageError> for Halt {
    fn from(err: StorageError) -> Self {
        Halt::Failed(TransformError::from(err).to_string())
    }
}

impl From<SchemaError> for Halt {
    fn from(err: SchemaError) -> Self {
        Halt::Failed(TransformError::from(err).to_string())
    }
}

impl From<tokio::task::JoinError> for Halt {
    fn from(err: tokio::task::JoinError) -> Self {
        Halt::Failed(TransformError::from(err).to_string())
    }
}

/// What a run accumulates for its report
#[derive(Default)]
struct RunLog {
    summary: GraphSummary,
    issues: IssueLog,
    failures: Vec<AdapterFailure>,
}

/// Moves records from sources to sinks through a graph store.
///
/// A transformer runs once. Sources and sinks are added before `run`, either
/// directly or through `from_config`, which opens them at run time after the
/// schema has been resolved.
pub struct Transformer {
    sources: Vec<Box<dyn SourceAdapter>>,
    source_descriptors: Vec<ResourceDescriptor>,
    sinks: Vec<Box<dyn SinkAdapter>>,
    sink_configs: Vec<SinkConfig>,
    schema: Option<Arc<dyn SchemaResolver>>,
    filters: FilterChain,
    policy: Policy,
    store: StoreConfig,
    batch_size: usize,
    queue_depth: usize,
    progress_every: Option<usize>,
    cancel: CancellationToken,
    state: TransformState,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            source_descriptors: Vec::new(),
            sinks: Vec::new(),
            sink_configs: Vec::new(),
            schema: None,
            filters: FilterChain::new(),
            policy: Policy::default(),
            store: StoreConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            progress_every: None,
            cancel: CancellationToken::new(),
            state: TransformState::Idle,
        }
    }

    /// Build a transformer from a run configuration. Resources are opened
    /// when the run starts.
    pub fn from_config(config: &TransformConfig) -> TransformResult<Self> {
        config.validate()?;
        let mut transformer = Self::new()
            .with_filters(config.filters.build())
            .with_policy(config.policy.clone())
            .with_store(config.store.clone())
            .with_batch_size(config.batch_size)
            .with_queue_depth(config.queue_depth);
        if let Some(path) = &config.schema {
            transformer = transformer.with_schema(YamlSchemaResolver::new(path));
        }
        transformer.source_descriptors = config.sources.clone();
        transformer.sink_configs = config.sinks.clone();
        transformer.progress_every = config.progress_every;
        Ok(transformer)
    }

    /// Validate against a schema. Without one, only dangling endpoints are
    /// reported.
    pub fn with_schema(mut self, resolver: impl SchemaResolver + 'static) -> Self {
        self.schema = Some(Arc::new(resolver));
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(1);
        self
    }

    pub fn add_source(&mut self, source: impl SourceAdapter + 'static) -> TransformResult<()> {
        self.ensure_idle("add a source")?;
        self.sources.push(Box::new(source));
        Ok(())
    }

    pub fn add_sink(&mut self, sink: impl SinkAdapter + 'static) -> TransformResult<()> {
        self.ensure_idle("add a sink")?;
        self.sinks.push(Box::new(sink));
        Ok(())
    }

    /// A handle that cancels this run from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    fn ensure_idle(&self, operation: &'static str) -> TransformResult<()> {
        if self.state == TransformState::Idle {
            Ok(())
        } else {
            Err(TransformError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    fn advance(&mut self, next: TransformState) {
        if self.state.can_advance_to(next) {
            tracing::info!(from = %self.state, to = %next, "transform state");
            self.state = next;
        }
    }

    /// Run the transform to a terminal state.
    ///
    /// Failures and cancellation are reported in the returned report; the
    /// only error is calling `run` on a transformer that has already run.
    pub async fn run(&mut self) -> TransformResult<TransformReport> {
        self.ensure_idle("run")?;
        let started_at = Utc::now();
        let mut log = RunLog::default();

        let (state, error) = match self.execute(&mut log).await {
            Ok(()) => (TransformState::Done, None),
            Err(Halt::Cancelled) => (TransformState::Cancelled, None),
            Err(Halt::Failed(message)) => (TransformState::Failed, Some(message)),
            Err(Halt::SinkClosed) => (
                TransformState::Failed,
                Some("a sink stopped accepting records".to_string()),
            ),
        };
        self.advance(state);
        if let Some(error) = &error {
            tracing::error!(error = %error, "transform failed");
        }

        log.summary.issues = log.issues.counts.clone();
        if state == TransformState::Done {
            log.summary.log();
        }
        Ok(TransformReport {
            state,
            error,
            summary: log.summary,
            issues: log.issues,
            failures: log.failures,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn execute(&mut self, log: &mut RunLog) -> Result<(), Halt> {
        let schema = match &self.schema {
            Some(resolver) => Some(Arc::new(resolver.resolve()?)),
            None => None,
        };
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        self.advance(TransformState::Reading);
        self.open_resources(log).await?;
        let store = open_store(&self.store)?;
        let nodes = NodePhase::new(Arc::clone(&store));
        let spool = EdgeSpool::new(self.store.spill_threshold.unwrap_or(DEFAULT_SPOOL_THRESHOLD));
        let (nodes, spool) = self.read_pass(nodes, spool, log).await?;

        self.advance(TransformState::Merging);
        let stats = self.merge_pass(nodes, spool).await?;
        log.summary.merge_conflicts = stats.conflicts;
        log.summary.dangling_edges = stats.dangling;

        self.advance(TransformState::Validating);
        self.write_pass(store, schema, log).await
    }

    /// Open the resources named by the configuration. Sources that fail to
    /// open fall under the same tolerance rule as sources that fail later.
    async fn open_resources(&mut self, log: &mut RunLog) -> Result<(), Halt> {
        let descriptors = std::mem::take(&mut self.source_descriptors);
        let opened = tokio::task::spawn_blocking(move || {
            descriptors
                .iter()
                .map(|d| (d.label(), open_source(d)))
                .collect::<Vec<_>>()
        })
        .await?;

        let mut unavailable = Vec::new();
        for (label, result) in opened {
            match result {
                Ok(source) => self.sources.push(source),
                Err(err) => unavailable.push((label, err)),
            }
        }
        let tolerated = self.policy.tolerate_unavailable_sources && !self.sources.is_empty();
        let mut first = None;
        for (label, err) in unavailable {
            tracing::warn!(source = %label, error = %err, tolerated, "source failed to open");
            if !tolerated && first.is_none() {
                first = Some(format!("source {} failed: {}", label, err));
            }
            log.failures.push(AdapterFailure::source(label, err, !tolerated));
        }
        if let Some(message) = first {
            return Err(Halt::Failed(message));
        }

        let configs = std::mem::take(&mut self.sink_configs);
        let progress = self.progress_every;
        let opened = tokio::task::spawn_blocking(move || {
            configs
                .iter()
                .map(|c| (c.resource.label(), open_sink(&c.resource, c.mode)))
                .collect::<Vec<_>>()
        })
        .await?;
        for (label, result) in opened {
            match result {
                Ok(sink) => match progress {
                    Some(every) => self.sinks.push(Box::new(ProgressSink::new(sink, every))),
                    None => self.sinks.push(sink),
                },
                Err(err) => {
                    let message = format!("sink {} failed: {}", label, err);
                    log.failures.push(AdapterFailure::sink(label, err));
                    return Err(Halt::Failed(message));
                }
            }
        }
        Ok(())
    }

    /// Stream every source into the node phase, spooling edges
    async fn read_pass(
        &mut self,
        nodes: NodePhase,
        spool: EdgeSpool,
        log: &mut RunLog,
    ) -> Result<(NodePhase, EdgeSpool), Halt> {
        let sources = std::mem::take(&mut self.sources);
        let names: Vec<String> = sources.iter().map(|s| s.name().to_string()).collect();
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let mut readers = Vec::with_capacity(sources.len());
        for (index, source) in sources.into_iter().enumerate() {
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            let batch_size = self.batch_size;
            readers.push(tokio::task::spawn_blocking(move || {
                read_source(index, source, tx, batch_size, cancel)
            }));
        }
        drop(tx);

        let consumer = NodeConsumer {
            names,
            tolerate: self.policy.tolerate_unavailable_sources,
            cancel: self.cancel.clone(),
        };
        let merged = tokio::task::spawn_blocking(move || consumer.run(rx, nodes, spool)).await;

        let mut halt = None;
        for reader in readers {
            if let Err(err) = reader.await {
                halt.get_or_insert(Halt::from(err));
            }
        }
        let pass = merged?;
        log.failures.extend(pass.failures);
        if let Some(halt) = pass.halt.or(halt) {
            return Err(halt);
        }
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        tracing::info!(
            nodes_created = pass.nodes.stats().nodes_created,
            nodes_merged = pass.nodes.stats().nodes_merged,
            edges_spooled = pass.spool.len(),
            "sources read"
        );
        Ok((pass.nodes, pass.spool))
    }

    /// Cross the barrier, merge the spooled edges and seal the store
    async fn merge_pass(&self, nodes: NodePhase, spool: EdgeSpool) -> Result<MergeStats, Halt> {
        let cancel = self.cancel.clone();
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || -> Result<MergeStats, Halt> {
            let mut edges = nodes.complete();
            for (i, edge) in spool.drain().enumerate() {
                if i % batch_size == 0 && cancel.is_cancelled() {
                    return Err(Halt::Cancelled);
                }
                edges.merge_edge(edge?)?;
            }
            let (_, stats) = edges.finish()?;
            tracing::info!(
                edges_created = stats.edges_created,
                edges_merged = stats.edges_merged,
                conflicts = stats.conflicts,
                dangling = stats.dangling,
                "graph merged"
            );
            Ok(stats)
        })
        .await?
    }

    /// Filter and validate the sealed store, fanning kept records out to
    /// every sink
    async fn write_pass(
        &mut self,
        store: Arc<dyn GraphStore>,
        schema: Option<Arc<Schema>>,
        log: &mut RunLog,
    ) -> Result<(), Halt> {
        let sinks = std::mem::take(&mut self.sinks);
        let mut senders = Vec::with_capacity(sinks.len());
        let mut writers = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let (tx, rx) = mpsc::channel::<Arc<Vec<Record>>>(self.queue_depth);
            let cancel = self.cancel.clone();
            senders.push(tx);
            writers.push(tokio::task::spawn_blocking(move || write_sink(sink, rx, cancel)));
        }

        let screen = Screen {
            schema,
            filters: self.filters.clone(),
            policy: self.policy.clone(),
            summary: std::mem::take(&mut log.summary),
            issues: IssueLog::default(),
        };
        let cancel = self.cancel.clone();
        let batch_size = self.batch_size;
        let screened = tokio::task::spawn_blocking(move || {
            screen.run(store.as_ref(), &senders, batch_size, &cancel)
        })
        .await;

        let mut halt = match screened {
            Ok(pass) => {
                log.summary = pass.summary;
                log.issues = pass.issues;
                pass.halt
            }
            Err(err) => Some(Halt::from(err)),
        };
        if halt.is_none() {
            self.advance(TransformState::Writing);
        }

        let mut sink_error = None;
        for writer in writers {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => {
                    sink_error.get_or_insert_with(|| {
                        format!("sink {} failed: {}", failure.adapter, failure.message)
                    });
                    log.failures.push(failure);
                }
                Err(err) => {
                    sink_error.get_or_insert_with(|| TransformError::from(err).to_string());
                }
            }
        }
        if let Some(message) = sink_error {
            if matches!(halt, None | Some(Halt::SinkClosed)) {
                halt = Some(Halt::Failed(message));
            }
        }
        match halt {
            Some(halt) => Err(halt),
            None => Ok(()),
        }
    }
}

enum SourceEvent {
    Batch { index: usize, records: Vec<Record> },
    /// A record-level problem; the source keeps going
    Rejected { index: usize, message: String },
    Finished { index: usize },
    Failed { index: usize, error: AdapterError },
}

enum Flow {
    Finished,
    Stopped,
}

fn read_source(
    index: usize,
    mut source: Box<dyn SourceAdapter>,
    tx: mpsc::Sender<SourceEvent>,
    batch_size: usize,
    cancel: CancellationToken,
) {
    let streamed = stream_source(index, source.as_mut(), &tx, batch_size, &cancel);
    let closed = source.close();
    let event = match (streamed, closed) {
        (Ok(Flow::Stopped), _) => return,
        (Ok(Flow::Finished), Ok(())) => SourceEvent::Finished { index },
        (Err(error), _) | (Ok(Flow::Finished), Err(error)) => SourceEvent::Failed { index, error },
    };
    // The consumer may already be gone
    let _ = tx.blocking_send(event);
}

fn stream_source(
    index: usize,
    source: &mut dyn SourceAdapter,
    tx: &mpsc::Sender<SourceEvent>,
    batch_size: usize,
    cancel: &CancellationToken,
) -> AdapterResult<Flow> {
    let name = source.name().to_string();
    let stream = source.read()?;
    let mut batch = Vec::with_capacity(batch_size);

    for item in stream {
        match item {
            Ok(record) => {
                batch.push(record);
                if batch.len() >= batch_size {
                    if cancel.is_cancelled() {
                        return Ok(Flow::Stopped);
                    }
                    let records = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    if tx.blocking_send(SourceEvent::Batch { index, records }).is_err() {
                        return Ok(Flow::Stopped);
                    }
                }
            }
            Err(err) if err.is_record_level() => {
                tracing::warn!(source = %name, error = %err, "skipping record");
                let message = err.to_string();
                if tx.blocking_send(SourceEvent::Rejected { index, message }).is_err() {
                    return Ok(Flow::Stopped);
                }
            }
            Err(err) => {
                if !batch.is_empty() {
                    let _ = tx.blocking_send(SourceEvent::Batch { index, records: batch });
                }
                return Err(err);
            }
        }
    }

    if !batch.is_empty() && tx.blocking_send(SourceEvent::Batch { index, records: batch }).is_err() {
        return Ok(Flow::Stopped);
    }
    Ok(Flow::Finished)
}

struct ReadPass {
    nodes: NodePhase,
    spool: EdgeSpool,
    failures: Vec<AdapterFailure>,
    halt: Option<Halt>,
}

/// Single consumer of the source queue: merges nodes in arrival order and
/// spools edges
struct NodeConsumer {
    names: Vec<String>,
    tolerate: bool,
    cancel: CancellationToken,
}

impl NodeConsumer {
    fn run(self, mut rx: mpsc::Receiver<SourceEvent>, mut nodes: NodePhase, mut spool: EdgeSpool) -> ReadPass {
        let mut failures = Vec::new();
        let mut healthy = self.names.len();
        let mut halt = None;

        while let Some(event) = rx.blocking_recv() {
            if self.cancel.is_cancelled() {
                halt = Some(Halt::Cancelled);
                break;
            }
            match event {
                SourceEvent::Batch { index, records } => {
                    let count = records.len();
                    if let Err(err) = merge_batch(&mut nodes, &mut spool, records) {
                        halt = Some(Halt::from(err));
                        break;
                    }
                    tracing::debug!(source = %self.names[index], records = count, "batch merged");
                }
                SourceEvent::Rejected { index, message } => {
                    failures.push(AdapterFailure::source(self.names[index].clone(), message, false));
                }
                SourceEvent::Finished { index } => {
                    tracing::info!(source = %self.names[index], "source finished");
                }
                SourceEvent::Failed { index, error } => {
                    let name = &self.names[index];
                    // Batches this source delivered before failing stay merged
                    healthy -= 1;
                    let tolerated = self.tolerate && healthy > 0;
                    tracing::warn!(source = %name, error = %error, tolerated, "source failed");
                    failures.push(AdapterFailure::source(name.clone(), &error, !tolerated));
                    if !tolerated {
                        halt = Some(Halt::Failed(format!("source {} failed: {}", name, error)));
                        break;
                    }
                }
            }
        }

        ReadPass {
            nodes,
            spool,
            failures,
            halt,
        }
    }
}

fn merge_batch(nodes: &mut NodePhase, spool: &mut EdgeSpool, records: Vec<Record>) -> Result<(), StorageError> {
    for record in records {
        match record {
            Record::Node(node) => {
                nodes.merge_node(node)?;
            }
            Record::Edge(edge) => spool.push(edge)?,
        }
    }
    Ok(())
}

/// Writes batches to one sink until the queue closes
fn write_sink(
    mut sink: Box<dyn SinkAdapter>,
    mut rx: mpsc::Receiver<Arc<Vec<Record>>>,
    cancel: CancellationToken,
) -> Result<(), AdapterFailure> {
    let name = sink.name().to_string();
    let fail = |err: AdapterError| {
        tracing::warn!(sink = %name, error = %err, "sink failed");
        AdapterFailure::sink(name.clone(), err)
    };

    while let Some(batch) = rx.blocking_recv() {
        if cancel.is_cancelled() {
            tracing::debug!(sink = %name, "sink stopped by cancellation");
            return Ok(());
        }
        sink.write(&batch).map_err(&fail)?;
        tracing::debug!(sink = %name, records = batch.len(), "batch written");
    }
    if cancel.is_cancelled() {
        return Ok(());
    }
    sink.flush().map_err(&fail)?;
    sink.close().map_err(&fail)?;
    Ok(())
}

struct ScreenPass {
    summary: GraphSummary,
    issues: IssueLog,
    halt: Option<Halt>,
}

/// Filters, validates and applies policy to each stored record
struct Screen {
    schema: Option<Arc<Schema>>,
    filters: FilterChain,
    policy: Policy,
    summary: GraphSummary,
    issues: IssueLog,
}

impl Screen {
    fn run(
        mut self,
        store: &dyn GraphStore,
        sinks: &[mpsc::Sender<Arc<Vec<Record>>>],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> ScreenPass {
        let halt = self.stream(store, sinks, batch_size, cancel).err();
        ScreenPass {
            summary: self.summary,
            issues: self.issues,
            halt,
        }
    }

    fn stream(
        &mut self,
        store: &dyn GraphStore,
        sinks: &[mpsc::Sender<Arc<Vec<Record>>>],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let empty = Schema::empty();
        let schema = self.schema.clone();
        let schema = schema.as_deref().unwrap_or(&empty);
        let mut out = Fanout::new(sinks, batch_size, cancel);

        for node in store.nodes()? {
            let record = Record::Node(node?);
            if let Some(record) = self.screen(record, Endpoints::none(), schema)? {
                out.push(record)?;
            }
        }
        for edge in store.edges()? {
            let edge = edge?;
            let subject = store.get_node(&edge.subject)?;
            let object = store.get_node(&edge.object)?;
            let endpoints = Endpoints::new(subject.as_ref(), object.as_ref());
            if let Some(record) = self.screen(Record::Edge(edge), endpoints, schema)? {
                out.push(record)?;
            }
        }
        out.finish()
    }

    fn screen(&mut self, record: Record, endpoints: Endpoints<'_>, schema: &Schema) -> Result<Option<Record>, Halt> {
        let kind = record.kind();
        let record = match self.filters.apply(&record, endpoints, schema) {
            FilterDecision::Keep => record,
            FilterDecision::Transformed(rewritten) => rewritten,
            FilterDecision::Drop => {
                match kind {
                    RecordKind::Node => self.summary.filtered.nodes += 1,
                    RecordKind::Edge => self.summary.filtered.edges += 1,
                }
                return Ok(None);
            }
            FilterDecision::DropEndpoint => {
                self.summary.filtered.edge_endpoints += 1;
                return Ok(None);
            }
        };

        let result = match &self.schema {
            Some(_) => validate(&record, endpoints, schema),
            None => endpoint_issues(&record, endpoints),
        };
        let escalated = result
            .issues
            .iter()
            .find(|issue| self.policy.fail_on.contains(&issue.kind))
            .map(|issue| format!("{} on {} {}: {}", issue.kind, issue.record, issue.key, issue.message));
        let dangling = result.has(IssueKind::DanglingEndpoint);
        let invalid = result.issues.iter().any(|i| i.kind != IssueKind::DanglingEndpoint);
        self.issues.extend(result);

        if let Some(message) = escalated {
            tracing::warn!(issue = %message, "validation issue escalated");
            return Err(Halt::Failed(message));
        }
        if dangling && self.policy.drop_dangling {
            self.summary.dangling_dropped += 1;
            return Ok(None);
        }
        if invalid && self.policy.drop_invalid {
            self.summary.invalid_dropped += 1;
            return Ok(None);
        }
        self.summary.observe(&record);
        Ok(Some(record))
    }
}

/// Dangling endpoint issues only, for runs without a schema
fn endpoint_issues(record: &Record, endpoints: Endpoints<'_>) -> ValidationResult {
    let mut result = ValidationResult::default();
    if let Record::Edge(edge) = record {
        if endpoints.subject.is_none() {
            result.issues.push(ValidationIssue::dangling(edge, edge.subject.as_str()));
        }
        if endpoints.object.is_none() {
            result.issues.push(ValidationIssue::dangling(edge, edge.object.as_str()));
        }
    }
    result
}

/// Batches records and hands each batch to every sink queue
struct Fanout<'a> {
    sinks: &'a [mpsc::Sender<Arc<Vec<Record>>>],
    batch: Vec<Record>,
    batch_size: usize,
    cancel: &'a CancellationToken,
}

impl<'a> Fanout<'a> {
    fn new(sinks: &'a [mpsc::Sender<Arc<Vec<Record>>>], batch_size: usize, cancel: &'a CancellationToken) -> Self {
        Self {
            sinks,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            cancel,
        }
    }

    fn push(&mut self, record: Record) -> Result<(), Halt> {
        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            self.send()?;
        }
        Ok(())
    }

    fn send(&mut self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        let batch = Arc::new(std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size)));
        for sink in self.sinks {
            sink.blocking_send(Arc::clone(&batch)).map_err(|_| Halt::SinkClosed)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), Halt> {
        if !self.batch.is_empty() {
            self.send()?;
        }
        Ok(())
    }
}
