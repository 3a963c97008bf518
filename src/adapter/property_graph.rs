//! Property-graph databases
//!
//! Sources page through a `PropertyGraphClient`: all nodes, then all
//! relationships. Node labels stand in for a missing `category` property and
//! the relationship type for a missing `predicate`. Nodes without an `id`
//! property are skipped.
//!
//! `SqlitePropertyGraph` is the bundled client, an embedded database with
//! labelled nodes and typed relationships. Networked drivers plug in by
//! implementing `PropertyGraphClient`.

use super::{AdapterError, AdapterResult, RecordStream, SinkAdapter, SourceAdapter};
use crate::graph::{edge_fields, node_fields, RawRecord, Record};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_PAGE_SIZE: usize = 50_000;

/// A node as the database stores it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PgNode {
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

/// A relationship between two nodes, addressed by their `id` properties
#[derive(Debug, Clone, PartialEq)]
pub struct PgRelationship {
    pub rel_type: String,
    pub start: String,
    pub end: String,
    pub properties: Map<String, Value>,
}

/// Access to a property-graph database
pub trait PropertyGraphClient: Send + Sync {
    fn describe(&self) -> String;

    /// Nodes in a stable order, `limit` at most, after skipping `skip`
    fn nodes_page(&self, skip: usize, limit: usize) -> AdapterResult<Vec<PgNode>>;

    fn relationships_page(&self, skip: usize, limit: usize) -> AdapterResult<Vec<PgRelationship>>;

    /// Create or replace nodes keyed by their `id` property
    fn merge_nodes(&self, nodes: &[PgNode]) -> AdapterResult<()>;

    /// Create or replace relationships keyed by their `id` property
    fn merge_relationships(&self, relationships: &[PgRelationship]) -> AdapterResult<()>;
}

fn id_property(properties: &Map<String, Value>) -> Option<&str> {
    properties
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

/// Embedded property-graph database on SQLite
pub struct SqlitePropertyGraph {
    conn: Mutex<Connection>,
    name: String,
}

impl SqlitePropertyGraph {
    /// Open or create a database file
    pub fn open(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::with_connection(conn, format!("property_graph:{}", path.display()))
    }

    /// Open a database that must already exist
    pub fn open_existing(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let path = path.as_ref();
        let name = format!("property_graph:{}", path.display());
        if !path.exists() {
            return Err(AdapterError::unavailable(name, "database file does not exist"));
        }
        let conn = Connection::open(path).map_err(|e| AdapterError::unavailable(&name, e))?;
        Self::with_connection(conn, name)
    }

    pub fn open_in_memory() -> AdapterResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, "property_graph:memory".to_string())
    }

    fn with_connection(conn: Connection, name: String) -> AdapterResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pg_nodes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE,
                labels TEXT NOT NULL,
                properties TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pg_relationships (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE,
                rel_type TEXT NOT NULL,
                start_id TEXT NOT NULL,
                end_id TEXT NOT NULL,
                properties TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pg_rel_start ON pg_relationships(start_id);
            CREATE INDEX IF NOT EXISTS idx_pg_rel_end ON pg_relationships(end_id);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            name,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove every node and relationship
    pub fn clear(&self) -> AdapterResult<()> {
        self.conn()
            .execute_batch("DELETE FROM pg_relationships; DELETE FROM pg_nodes;")?;
        Ok(())
    }

    pub fn node_count(&self) -> AdapterResult<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM pg_nodes", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn relationship_count(&self) -> AdapterResult<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM pg_relationships", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Labels of the node with the given `id` property
    pub fn labels_of(&self, id: &str) -> AdapterResult<Option<Vec<String>>> {
        let labels: Option<String> = self
            .conn()
            .query_row("SELECT labels FROM pg_nodes WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        labels
            .map(|text| serde_json::from_str(&text).map_err(AdapterError::from))
            .transpose()
    }
}

impl PropertyGraphClient for SqlitePropertyGraph {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn nodes_page(&self, skip: usize, limit: usize) -> AdapterResult<Vec<PgNode>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT labels, properties FROM pg_nodes ORDER BY seq LIMIT ?1 OFFSET ?2")?;
        let rows = stmt.query_map(params![limit as i64, skip as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut page = Vec::new();
        for row in rows {
            let (labels, properties) = row?;
            page.push(PgNode {
                labels: serde_json::from_str(&labels)?,
                properties: serde_json::from_str(&properties)?,
            });
        }
        Ok(page)
    }

    fn relationships_page(&self, skip: usize, limit: usize) -> AdapterResult<Vec<PgRelationship>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT rel_type, start_id, end_id, properties FROM pg_relationships \
             ORDER BY seq LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, skip as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut page = Vec::new();
        for row in rows {
            let (rel_type, start, end, properties) = row?;
            page.push(PgRelationship {
                rel_type,
                start,
                end,
                properties: serde_json::from_str(&properties)?,
            });
        }
        Ok(page)
    }

    fn merge_nodes(&self, nodes: &[PgNode]) -> AdapterResult<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO pg_nodes (id, labels, properties) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(id) DO UPDATE SET labels = excluded.labels, properties = excluded.properties",
            )?;
            for node in nodes {
                stmt.execute(params![
                    id_property(&node.properties),
                    serde_json::to_string(&node.labels)?,
                    serde_json::to_string(&node.properties)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn merge_relationships(&self, relationships: &[PgRelationship]) -> AdapterResult<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO pg_relationships (id, rel_type, start_id, end_id, properties) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET rel_type = excluded.rel_type, \
                 start_id = excluded.start_id, end_id = excluded.end_id, \
                 properties = excluded.properties",
            )?;
            for rel in relationships {
                stmt.execute(params![
                    id_property(&rel.properties),
                    rel.rel_type,
                    rel.start,
                    rel.end,
                    serde_json::to_string(&rel.properties)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Nodes,
    Relationships,
    Done,
}

/// Pages nodes, then relationships, converting each page to records
struct Pages<'a, C> {
    client: &'a C,
    name: &'a str,
    page_size: usize,
    phase: Phase,
    skip: usize,
    buffer: VecDeque<AdapterResult<Record>>,
    skipped: usize,
}

impl<C: PropertyGraphClient> Pages<'_, C> {
    fn node_record(&mut self, node: PgNode) -> Option<AdapterResult<Record>> {
        let mut fields = node.properties;
        if id_property(&fields).is_none() {
            if self.skipped == 0 {
                tracing::warn!(source = self.name, "skipping nodes without an 'id' property");
            }
            self.skipped += 1;
            return None;
        }
        let has_category = fields.get("category").map_or(false, |v| !v.is_null());
        if !has_category {
            fields.insert(
                "category".to_string(),
                Value::Array(node.labels.into_iter().map(Value::String).collect()),
            );
        }
        Some(
            RawRecord::node(fields)
                .canonicalize()
                .map_err(|e| AdapterError::canonicalize(self.name, e)),
        )
    }

    fn relationship_record(&self, rel: PgRelationship) -> AdapterResult<Record> {
        let mut fields = rel.properties;
        for (key, fallback) in [
            ("subject", rel.start),
            ("predicate", rel.rel_type),
            ("object", rel.end),
        ] {
            if fields.get(key).map_or(true, Value::is_null) {
                fields.insert(key.to_string(), Value::String(fallback));
            }
        }
        RawRecord::edge(fields)
            .canonicalize()
            .map_err(|e| AdapterError::canonicalize(self.name, e))
    }

    /// Fetch the next page into the buffer, advancing the phase when a page comes back short
    fn fill(&mut self) -> AdapterResult<()> {
        match self.phase {
            Phase::Done => {}
            Phase::Nodes => {
                let page = self.client.nodes_page(self.skip, self.page_size)?;
                let full = page.len() == self.page_size;
                self.skip += page.len();
                for node in page {
                    if let Some(record) = self.node_record(node) {
                        self.buffer.push_back(record);
                    }
                }
                if !full {
                    self.phase = Phase::Relationships;
                    self.skip = 0;
                }
            }
            Phase::Relationships => {
                let page = self.client.relationships_page(self.skip, self.page_size)?;
                let full = page.len() == self.page_size;
                self.skip += page.len();
                for rel in page {
                    let record = self.relationship_record(rel);
                    self.buffer.push_back(record);
                }
                if !full {
                    self.phase = Phase::Done;
                    if self.skipped > 0 {
                        tracing::warn!(source = self.name, skipped = self.skipped, "nodes without an id were skipped");
                    }
                }
            }
        }
        Ok(())
    }
}

impl<C: PropertyGraphClient> Iterator for Pages<'_, C> {
    type Item = AdapterResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.phase == Phase::Done {
                return None;
            }
            if let Err(e) = self.fill() {
                self.phase = Phase::Done;
                return Some(Err(e));
            }
        }
    }
}

pub struct PropertyGraphSource<C> {
    name: String,
    client: C,
    page_size: usize,
    consumed: bool,
}

impl<C: PropertyGraphClient> PropertyGraphSource<C> {
    pub fn new(client: C, page_size: usize) -> Self {
        Self {
            name: client.describe(),
            client,
            page_size: page_size.max(1),
            consumed: false,
        }
    }
}

impl<C: PropertyGraphClient> SourceAdapter for PropertyGraphSource<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        if self.consumed {
            return Err(AdapterError::AlreadyConsumed(self.name.clone()));
        }
        self.consumed = true;
        Ok(Box::new(Pages {
            client: &self.client,
            name: &self.name,
            page_size: self.page_size,
            phase: Phase::Nodes,
            skip: 0,
            buffer: VecDeque::new(),
            skipped: 0,
        }))
    }
}

/// Writes records with create-or-replace semantics keyed by id
pub struct PropertyGraphSink<C> {
    name: String,
    client: C,
}

impl<C: PropertyGraphClient> PropertyGraphSink<C> {
    pub fn new(client: C) -> Self {
        Self {
            name: client.describe(),
            client,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: PropertyGraphClient> SinkAdapter for PropertyGraphSink<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        let mut nodes = Vec::new();
        let mut relationships = Vec::new();
        for record in batch {
            match record {
                Record::Node(node) => nodes.push(PgNode {
                    labels: node.categories.clone(),
                    properties: node_fields(node),
                }),
                Record::Edge(edge) => {
                    let mut properties = edge_fields(edge);
                    properties.insert("id".to_string(), Value::String(edge.id.to_string()));
                    relationships.push(PgRelationship {
                        rel_type: edge.predicate.clone(),
                        start: edge.subject.to_string(),
                        end: edge.object.to_string(),
                        properties,
                    });
                }
            }
        }
        if !nodes.is_empty() {
            self.client.merge_nodes(&nodes)?;
        }
        if !relationships.is_empty() {
            self.client.merge_relationships(&relationships)?;
        }
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn labels_and_rel_type_fill_missing_fields() {
        let db = SqlitePropertyGraph::open_in_memory().unwrap();
        db.merge_nodes(&[PgNode {
            labels: vec!["biolink:Gene".into()],
            properties: props(json!({"id": "gene:1", "name": "TBX4"})),
        }])
        .unwrap();
        db.merge_relationships(&[PgRelationship {
            rel_type: "biolink:interacts_with".into(),
            start: "gene:1".into(),
            end: "gene:1".into(),
            properties: props(json!({})),
        }])
        .unwrap();

        let mut source = PropertyGraphSource::new(db, DEFAULT_PAGE_SIZE);
        let records: Vec<Record> = source.read().unwrap().map(|r| r.unwrap()).collect();

        let Record::Node(node) = &records[0] else { panic!("expected node") };
        assert_eq!(node.categories, vec!["biolink:Gene"]);
        let Record::Edge(edge) = &records[1] else { panic!("expected edge") };
        assert_eq!(edge.predicate, "biolink:interacts_with");
        assert_eq!(edge.subject.as_str(), "gene:1");
    }

    #[test]
    fn nodes_without_id_are_skipped() {
        let db = SqlitePropertyGraph::open_in_memory().unwrap();
        db.merge_nodes(&[
            PgNode {
                labels: vec!["biolink:Gene".into()],
                properties: props(json!({"name": "anonymous"})),
            },
            PgNode {
                labels: vec![],
                properties: props(json!({"id": "x:1"})),
            },
        ])
        .unwrap();

        let mut source = PropertyGraphSource::new(db, 10);
        let ids: Vec<String> = source
            .read()
            .unwrap()
            .map(|r| r.unwrap().key().to_string())
            .collect();
        assert_eq!(ids, vec!["x:1"]);
    }

    #[test]
    fn paging_visits_every_record() {
        let db = SqlitePropertyGraph::open_in_memory().unwrap();
        let mut sink = PropertyGraphSink::new(db);
        let batch: Vec<Record> = (0..5)
            .map(|i| Node::new(format!("n:{}", i), "biolink:Gene").into())
            .chain((0..4).map(|i| {
                Edge::new(format!("n:{}", i), "biolink:related_to", format!("n:{}", i + 1)).into()
            }))
            .collect();
        sink.write(&batch).unwrap();

        let db = sink.client;
        let mut source = PropertyGraphSource::new(db, 2);
        let records: Vec<Record> = source.read().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records, batch);
    }

    #[test]
    fn rewriting_a_batch_is_idempotent() {
        let db = SqlitePropertyGraph::open_in_memory().unwrap();
        let mut sink = PropertyGraphSink::new(db);
        let batch: Vec<Record> = vec![
            Node::new("a", "biolink:Gene").into(),
            Node::new("b", "biolink:Gene").into(),
            Edge::new("a", "biolink:related_to", "b").into(),
        ];
        sink.write(&batch).unwrap();
        sink.write(&batch).unwrap();

        assert_eq!(sink.client().node_count().unwrap(), 2);
        assert_eq!(sink.client().relationship_count().unwrap(), 1);
        assert_eq!(
            sink.client().labels_of("a").unwrap(),
            Some(vec!["biolink:Gene".to_string()])
        );
    }

    #[test]
    fn missing_database_is_unavailable() {
        let err = SqlitePropertyGraph::open_existing("/nonexistent/kg.db").err().unwrap();
        assert!(matches!(err, AdapterError::ResourceUnavailable { .. }));
    }
}
