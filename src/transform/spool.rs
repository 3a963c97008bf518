//! Holding area for edges read before the node pass completes
//!
//! Edges stay in memory until `threshold` of them are buffered, then the
//! buffer is appended to a scratch SQLite file. `drain` replays every edge in
//! arrival order.

use crate::graph::Edge;
use crate::storage::{StorageError, StorageResult};
use rusqlite::{params, Connection};
use std::collections::VecDeque;

/// Edges buffered before a spill when no threshold is configured
pub const DEFAULT_SPOOL_THRESHOLD: usize = 100_000;

const PAGE_SIZE: i64 = 1_000;

struct SpoolFile {
    conn: Connection,
    _dir: tempfile::TempDir,
}

impl SpoolFile {
    fn create() -> StorageResult<Self> {
        let dir = tempfile::tempdir()?;
        let conn = Connection::open(dir.path().join("edges.db"))?;
        conn.execute_batch(
            r#"
            CREATE TABLE spool (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL
            );
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = OFF;
            "#,
        )?;
        Ok(Self { conn, _dir: dir })
    }

    fn append(&mut self, edges: &[Edge]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("INSERT INTO spool (payload) VALUES (?1)")?;
            for edge in edges {
                stmt.execute(params![serde_json::to_string(edge)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn page(&self, after: i64) -> StorageResult<Vec<(i64, Edge)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT seq, payload FROM spool WHERE seq > ?1 ORDER BY seq LIMIT ?2")?;
        let rows = stmt.query_map(params![after, PAGE_SIZE], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut page = Vec::new();
        for row in rows {
            let (seq, payload) = row?;
            page.push((seq, serde_json::from_str(&payload)?));
        }
        Ok(page)
    }
}

pub struct EdgeSpool {
    threshold: usize,
    buffer: Vec<Edge>,
    file: Option<SpoolFile>,
    len: usize,
}

impl EdgeSpool {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: Vec::new(),
            file: None,
            len: 0,
        }
    }

    pub fn push(&mut self, edge: Edge) -> StorageResult<()> {
        self.buffer.push(edge);
        self.len += 1;
        if self.buffer.len() >= self.threshold {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> StorageResult<()> {
        if self.file.is_none() {
            self.file = Some(SpoolFile::create()?);
        }
        if let Some(file) = &mut self.file {
            file.append(&self.buffer)?;
        }
        tracing::debug!(edges = self.buffer.len(), total = self.len, "edge spool spilled");
        self.buffer.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once any edge has been written to disk
    pub fn has_spilled(&self) -> bool {
        self.file.is_some()
    }

    /// Replay every spooled edge in the order it was pushed
    pub fn drain(self) -> Drain {
        Drain {
            file: self.file,
            after: 0,
            page: VecDeque::new(),
            disk_done: false,
            buffer: self.buffer.into_iter(),
        }
    }
}

/// Iterator returned by `EdgeSpool::drain`
pub struct Drain {
    file: Option<SpoolFile>,
    after: i64,
    page: VecDeque<Edge>,
    disk_done: bool,
    buffer: std::vec::IntoIter<Edge>,
}

impl Drain {
    fn next_from_disk(&mut self) -> Option<StorageResult<Edge>> {
        if let Some(edge) = self.page.pop_front() {
            return Some(Ok(edge));
        }
        if self.disk_done {
            return None;
        }
        let file = match &self.file {
            Some(file) => file,
            None => {
                self.disk_done = true;
                return None;
            }
        };
        match file.page(self.after) {
            Ok(rows) if rows.is_empty() => {
                self.disk_done = true;
                None
            }
            Ok(rows) => {
                for (seq, edge) in rows {
                    self.after = seq;
                    self.page.push_back(edge);
                }
                self.page.pop_front().map(Ok)
            }
            Err(err) => {
                self.disk_done = true;
                Some(Err(err))
            }
        }
    }
}

impl Iterator for Drain {
    type Item = Result<Edge, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.next_from_disk() {
            return Some(item);
        }
        self.buffer.next().map(Ok)
    }
}
