//! In-process sources and sinks, for embedding and tests

use super::{AdapterError, AdapterResult, RecordStream, SinkAdapter, SourceAdapter};
use crate::graph::Record;
use std::sync::{Arc, Mutex, PoisonError};

/// Yields a fixed list of records once
pub struct MemorySource {
    name: String,
    records: Option<Vec<Record>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records: Some(records),
        }
    }
}

impl SourceAdapter for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        match self.records.take() {
            Some(records) => Ok(Box::new(records.into_iter().map(Ok))),
            None => Err(AdapterError::AlreadyConsumed(self.name.clone())),
        }
    }
}

/// Collects written records. Clones share the same buffer, so a caller can
/// keep one clone and hand the other to a transformer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SinkAdapter for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch);
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()> {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }
}
