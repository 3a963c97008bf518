//! Spilling graph store: a DashMap hot tier over a SQLite cold tier

use super::traits::{GraphStore, RecordIter, StorageError, StorageResult, UpsertOutcome};
use crate::graph::{merge_edge, merge_node, Edge, MergeReport, Node, NodeId};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

const LOCK_STRIPES: usize = 64;
const PAGE_SIZE: usize = 1_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records the spill store knows how to persist
trait Stored: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn key(&self) -> &str;

    fn merge(existing: &Self, incoming: Self) -> (Self, MergeReport);

    fn write_row(conn: &Connection, record: &Self) -> StorageResult<()>;
}

impl Stored for Node {
    const TABLE: &'static str = "nodes";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn merge(existing: &Self, incoming: Self) -> (Self, MergeReport) {
        merge_node(existing, incoming)
    }

    fn write_row(conn: &Connection, node: &Self) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO nodes (id, payload) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET payload = excluded.payload
            "#,
            params![node.id.as_str(), serde_json::to_string(node)?],
        )?;
        Ok(())
    }
}

impl Stored for Edge {
    const TABLE: &'static str = "edges";

    fn key(&self) -> &str {
        self.id.as_str()
    }

    fn merge(existing: &Self, incoming: Self) -> (Self, MergeReport) {
        merge_edge(existing, incoming)
    }

    fn write_row(conn: &Connection, edge: &Self) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO edges (id, subject, object, payload) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET payload = excluded.payload
            "#,
            params![
                edge.id.as_str(),
                edge.subject.as_str(),
                edge.object.as_str(),
                serde_json::to_string(edge)?,
            ],
        )?;
        Ok(())
    }
}

/// Graph store for graphs larger than memory.
///
/// New records land in a DashMap hot tier. Once the hot tier holds more than
/// `threshold` records it is written to SQLite in a single transaction and
/// cleared. A key lives in exactly one tier at a time, so a record upserted
/// earlier in the run is found by later merges wherever it is.
///
/// Locking: upserts hold the tier gate shared plus the stripe lock of their
/// key; spills hold the gate exclusively. The SQLite connection has its own
/// mutex, held only for the duration of one statement or transaction.
pub struct SpillStore {
    conn: Mutex<Connection>,
    hot_nodes: DashMap<String, Node>,
    hot_edges: DashMap<String, Edge>,
    threshold: usize,
    stripes: Vec<Mutex<()>>,
    gate: RwLock<()>,
    spills: AtomicUsize,
    sealed: AtomicBool,
    /// Keeps a scratch database alive for the life of the store
    _scratch: Option<tempfile::TempDir>,
}

impl SpillStore {
    /// Open (or create) a spill database at `path`
    pub fn open(path: impl AsRef<Path>, threshold: usize) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, threshold, None)
    }

    /// Spill into a scratch database removed when the store is dropped
    pub fn temporary(threshold: usize) -> StorageResult<Self> {
        let dir = tempfile::tempdir()?;
        let conn = Connection::open(dir.path().join("spill.db"))?;
        Self::with_connection(conn, threshold, Some(dir))
    }

    fn with_connection(
        conn: Connection,
        threshold: usize,
        scratch: Option<tempfile::TempDir>,
    ) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            hot_nodes: DashMap::new(),
            hot_edges: DashMap::new(),
            threshold: threshold.max(1),
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            gate: RwLock::new(()),
            spills: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
            _scratch: scratch,
        })
    }

    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                object TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS dangling (
                id TEXT PRIMARY KEY
            );

            DELETE FROM nodes;
            DELETE FROM edges;
            DELETE FROM dangling;

            -- Scratch data: durability is not needed
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = OFF;
            "#,
        )?;
        Ok(())
    }

    /// Number of times the hot tier has been written to SQLite
    pub fn spill_count(&self) -> usize {
        self.spills.load(Ordering::Acquire)
    }

    fn stripe(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        lock(&self.stripes[(hasher.finish() as usize) % self.stripes.len()])
    }

    fn hot_len(&self) -> usize {
        self.hot_nodes.len() + self.hot_edges.len()
    }

    fn load_cold<T: Stored>(&self, key: &str) -> StorageResult<Option<T>> {
        if self.spills.load(Ordering::Acquire) == 0 {
            return Ok(None);
        }
        let conn = lock(&self.conn);
        let payload: Option<String> = conn
            .query_row(
                &format!("SELECT payload FROM {} WHERE id = ?1", T::TABLE),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StorageError::from))
            .transpose()
    }

    fn upsert<T: Stored>(&self, hot: &DashMap<String, T>, record: T) -> StorageResult<UpsertOutcome> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(StorageError::Sealed);
        }

        let outcome = {
            let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
            let key = record.key().to_string();
            let _stripe = self.stripe(&key);

            if let Some(mut existing) = hot.get_mut(&key) {
                let (merged, report) = T::merge(existing.value(), record);
                *existing.value_mut() = merged;
                UpsertOutcome::merged(report.conflicts)
            } else if let Some(existing) = self.load_cold::<T>(&key)? {
                let (merged, report) = T::merge(&existing, record);
                T::write_row(&lock(&self.conn), &merged)?;
                UpsertOutcome::merged(report.conflicts)
            } else {
                hot.insert(key, record);
                UpsertOutcome::created()
            }
        };

        if self.hot_len() > self.threshold {
            self.spill()?;
        }
        Ok(outcome)
    }

    /// Move every hot record into SQLite
    fn spill(&self) -> StorageResult<()> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have spilled while we waited for the gate
        if self.hot_len() == 0 {
            return Ok(());
        }

        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let moved = self.hot_len();
        for entry in self.hot_nodes.iter() {
            Node::write_row(&tx, entry.value())?;
        }
        for entry in self.hot_edges.iter() {
            Edge::write_row(&tx, entry.value())?;
        }
        tx.commit()?;

        // Readers outside the gate must see the cold tier before hot is cleared
        let spills = self.spills.fetch_add(1, Ordering::AcqRel) + 1;
        self.hot_nodes.clear();
        self.hot_edges.clear();
        tracing::debug!(moved, spills, "spilled hot tier to sqlite");
        Ok(())
    }

    fn count(&self, table: &str) -> StorageResult<usize> {
        let conn = lock(&self.conn);
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    /// Iterate a query of shape `SELECT id, payload ... WHERE id > ?1 ORDER BY id LIMIT ?2`
    fn paged<T: Stored>(&self, sql: &'static str) -> RecordIter<'_, T> {
        Box::new(PagedRows {
            store: self,
            sql,
            after: String::new(),
            buffer: VecDeque::new(),
            done: false,
        })
    }

    fn fetch_page<T: Stored>(&self, sql: &str, after: &str) -> StorageResult<Vec<(String, T)>> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![after, PAGE_SIZE as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut page = Vec::with_capacity(PAGE_SIZE);
        for row in rows {
            let (id, payload) = row?;
            page.push((id, serde_json::from_str(&payload)?));
        }
        Ok(page)
    }
}

/// Keyset-paginated cursor; each page takes the connection lock briefly
struct PagedRows<'a, T> {
    store: &'a SpillStore,
    sql: &'static str,
    after: String,
    buffer: VecDeque<T>,
    done: bool,
}

impl<T: Stored> Iterator for PagedRows<'_, T> {
    type Item = StorageResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.store.fetch_page::<T>(self.sql, &self.after) {
                Ok(page) => {
                    if page.len() < PAGE_SIZE {
                        self.done = true;
                    }
                    if let Some((last, _)) = page.last() {
                        self.after = last.clone();
                    }
                    self.buffer.extend(page.into_iter().map(|(_, record)| record));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl GraphStore for SpillStore {
    fn upsert_node(&self, node: Node) -> StorageResult<UpsertOutcome> {
        self.upsert(&self.hot_nodes, node)
    }

    fn upsert_edge(&self, edge: Edge) -> StorageResult<UpsertOutcome> {
        self.upsert(&self.hot_edges, edge)
    }

    fn seal(&self) -> StorageResult<usize> {
        // Everything goes cold so the dangling set is one SQL statement
        self.spill()?;
        self.sealed.store(true, Ordering::Release);

        let conn = lock(&self.conn);
        conn.execute("DELETE FROM dangling", [])?;
        let dangling = conn.execute(
            r#"
            INSERT INTO dangling (id)
            SELECT e.id FROM edges e
            WHERE NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.subject)
               OR NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.object)
            "#,
            [],
        )?;
        Ok(dangling)
    }

    fn has_node(&self, id: &NodeId) -> StorageResult<bool> {
        if self.hot_nodes.contains_key(id.as_str()) {
            return Ok(true);
        }
        Ok(self.load_cold::<Node>(id.as_str())?.is_some())
    }

    fn get_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        if let Some(node) = self.hot_nodes.get(id.as_str()) {
            return Ok(Some(node.value().clone()));
        }
        self.load_cold(id.as_str())
    }

    fn node_count(&self) -> StorageResult<usize> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self.hot_nodes.len() + self.count("nodes")?)
    }

    fn edge_count(&self) -> StorageResult<usize> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self.hot_edges.len() + self.count("edges")?)
    }

    fn nodes(&self) -> StorageResult<RecordIter<'_, Node>> {
        self.spill()?;
        Ok(self.paged(
            "SELECT id, payload FROM nodes WHERE id > ?1 ORDER BY id LIMIT ?2",
        ))
    }

    fn edges(&self) -> StorageResult<RecordIter<'_, Edge>> {
        self.spill()?;
        Ok(self.paged(
            "SELECT id, payload FROM edges WHERE id > ?1 ORDER BY id LIMIT ?2",
        ))
    }

    fn dangling_edges(&self) -> StorageResult<RecordIter<'_, Edge>> {
        if !self.is_sealed() {
            return Err(StorageError::NotSealed);
        }
        Ok(self.paged(
            r#"
            SELECT e.id, e.payload FROM edges e
            JOIN dangling d ON d.id = e.id
            WHERE e.id > ?1 ORDER BY e.id LIMIT ?2
            "#,
        ))
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}
