//! Source and sink contracts
//!
//! Adapters are synchronous; the transformer drives each one from its own
//! blocking task. Only canonical `Record`s cross this boundary.

use super::AdapterResult;
use crate::graph::Record;
use serde::{Deserialize, Serialize};

/// Lazy, single-pass sequence of canonical records.
///
/// A per-record `MalformedRecord` error does not end the stream; any other
/// error does.
pub type RecordStream<'a> = Box<dyn Iterator<Item = AdapterResult<Record>> + Send + 'a>;

/// Reads canonical records from one resource
pub trait SourceAdapter: Send {
    /// Human-readable resource name for logs and reports
    fn name(&self) -> &str;

    /// Start reading. A second call fails with `AlreadyConsumed`.
    fn read(&mut self) -> AdapterResult<RecordStream<'_>>;

    fn close(&mut self) -> AdapterResult<()> {
        Ok(())
    }
}

/// How a sink treats an existing resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Create,
    Append,
}

/// Writes canonical records to one resource.
///
/// `write` is called with many small batches. Writing the same batch twice
/// must not corrupt the output; duplicates are allowed.
pub trait SinkAdapter: Send {
    fn name(&self) -> &str;

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()>;

    fn flush(&mut self) -> AdapterResult<()> {
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()>;
}

impl<S: SourceAdapter + ?Sized> SourceAdapter for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        (**self).read()
    }

    fn close(&mut self) -> AdapterResult<()> {
        (**self).close()
    }
}

impl<S: SinkAdapter + ?Sized> SinkAdapter for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        (**self).write(batch)
    }

    fn flush(&mut self) -> AdapterResult<()> {
        (**self).flush()
    }

    fn close(&mut self) -> AdapterResult<()> {
        (**self).close()
    }
}
