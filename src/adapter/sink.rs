//! Sink decorators: progress logging and debug output

use super::{AdapterError, AdapterResult, SinkAdapter};
use crate::graph::Record;

/// Default number of records of one kind between progress lines
pub const DEFAULT_LOG_EVERY: usize = 1000;

/// Wraps a sink and logs every `every` nodes or edges written
pub struct ProgressSink<S> {
    inner: S,
    every: usize,
    nodes: usize,
    edges: usize,
}

impl<S: SinkAdapter> ProgressSink<S> {
    pub fn new(inner: S, every: usize) -> Self {
        Self {
            inner,
            every: every.max(1),
            nodes: 0,
            edges: 0,
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.nodes, self.edges)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: SinkAdapter> SinkAdapter for ProgressSink<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        self.inner.write(batch)?;
        for record in batch {
            let count = match record {
                Record::Node(_) => {
                    self.nodes += 1;
                    self.nodes
                }
                Record::Edge(_) => {
                    self.edges += 1;
                    self.edges
                }
            };
            if count % self.every == 0 {
                tracing::info!(
                    sink = self.inner.name(),
                    kind = %record.kind(),
                    count,
                    "progress"
                );
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> AdapterResult<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> AdapterResult<()> {
        tracing::info!(
            sink = self.inner.name(),
            nodes = self.nodes,
            edges = self.edges,
            "sink finished"
        );
        self.inner.close()
    }
}

/// Logs each record at debug level and writes nothing.
///
/// With a limit, the write that would take the total past it fails with
/// `LimitExceeded`; records up to the limit are still logged.
pub struct DebugSink {
    limit: Option<usize>,
    seen: usize,
}

impl DebugSink {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, seen: 0 }
    }
}

impl SinkAdapter for DebugSink {
    fn name(&self) -> &str {
        "debug"
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        for record in batch {
            if let Some(limit) = self.limit {
                if self.seen >= limit {
                    return Err(AdapterError::LimitExceeded {
                        resource: "debug".to_string(),
                        limit,
                    });
                }
            }
            self.seen += 1;
            tracing::debug!(kind = %record.kind(), key = record.key(), record = ?record, "record");
        }
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()> {
        tracing::debug!(records = self.seen, "debug sink closed");
        Ok(())
    }
}
