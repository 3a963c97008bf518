//! Tab-separated node and edge files
//!
//! A graph is a node file (`id`, `category`, attribute columns) and an
//! optional edge file (`id`, `subject`, `predicate`, `object`, `provided_by`,
//! attribute columns). Cells use a small codec:
//!
//! - `a|b|c` is a list; a trailing separator (`a|`) marks a one-item list
//! - `true`, `false`, integers and floats are typed scalars
//! - a cell starting with `{`, `[` or `"` that parses as JSON is that value
//! - `\t \n \r \\ \|` are escapes; an empty cell is an absent attribute
//!
//! The writer falls back to JSON for any value the plain forms would read
//! back differently, so a string `"42"`, an empty string and an empty list
//! all survive. Identifier columns and header names carry escapes only.

use super::{AdapterError, AdapterResult, RecordStream, SinkAdapter, SourceAdapter, WriteMode};
use crate::graph::{edge_fields, node_fields, RawRecord, Record, RecordKind};
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const SEPARATOR: char = '|';
const NODE_COLUMNS: &[&str] = &["id", "category"];
const EDGE_COLUMNS: &[&str] = &["id", "subject", "predicate", "object", "provided_by"];
const VERBATIM_COLUMNS: &[&str] = &["id", "subject", "predicate", "object", "provided_by"];

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            SEPARATOR => out.push_str("\\|"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split on unescaped separators, leaving escapes in place
fn split_list(cell: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in cell.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            SEPARATOR => {
                pieces.push(&cell[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&cell[start..]);
    pieces
}

fn looks_numeric(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

fn coerce(text: String) -> Value {
    match text.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    if looks_numeric(&text) {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text)
}

/// A string that reads back as itself without quoting
fn is_plain(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with(['{', '[', '"'])
        && matches!(coerce(text.to_string()), Value::String(_))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if is_plain(s) => Some(escape(s)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Encode one attribute value as a cell; `None` for an empty cell
pub fn encode_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(items) if !items.is_empty() => {
            match items.iter().map(scalar_text).collect::<Option<Vec<_>>>() {
                Some(texts) => {
                    let mut cell = texts.join("|");
                    if texts.len() == 1 {
                        cell.push(SEPARATOR);
                    }
                    Some(cell)
                }
                None => Some(value.to_string()),
            }
        }
        other => Some(scalar_text(other).unwrap_or_else(|| other.to_string())),
    }
}

/// Decode one cell; `None` for an empty cell
pub fn decode_cell(cell: &str) -> Option<Value> {
    if cell.is_empty() {
        return None;
    }
    if cell.starts_with(['{', '[', '"']) {
        if let Ok(value) = serde_json::from_str::<Value>(cell) {
            return Some(value);
        }
    }

    let mut pieces = split_list(cell);
    if pieces.len() > 1 {
        if pieces.last().map_or(false, |p| p.is_empty()) {
            pieces.pop();
        }
        let items = pieces.into_iter().map(|p| coerce(unescape(p))).collect();
        return Some(Value::Array(items));
    }
    Some(coerce(unescape(cell)))
}

fn encode_column(column: &str, value: &Value) -> Option<String> {
    match value {
        Value::String(s) if VERBATIM_COLUMNS.contains(&column) => Some(escape(s)),
        other => encode_cell(other),
    }
}

fn decode_column(column: &str, cell: &str) -> Option<Value> {
    if VERBATIM_COLUMNS.contains(&column) {
        (!cell.is_empty()).then(|| Value::String(unescape(cell)))
    } else {
        decode_cell(cell)
    }
}

/// Rows of one table after its header
struct TsvRows {
    resource: String,
    kind: RecordKind,
    header: Vec<String>,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl TsvRows {
    fn open(path: &Path, kind: RecordKind, required: &[&str]) -> AdapterResult<Self> {
        let resource = path.display().to_string();
        let file = File::open(path).map_err(|e| AdapterError::unavailable(&resource, e))?;
        let mut lines = BufReader::new(file).lines();
        let header_line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(AdapterError::unavailable(&resource, e)),
            None => return Err(AdapterError::unavailable(&resource, "missing header row")),
        };
        let header: Vec<String> = header_line
            .trim_end_matches('\r')
            .split('\t')
            .map(|h| unescape(h.trim()))
            .collect();
        for column in required {
            if !header.iter().any(|h| h == column) {
                return Err(AdapterError::unavailable(
                    &resource,
                    format!("header has no '{}' column", column),
                ));
            }
        }

        Ok(Self {
            resource,
            kind,
            header,
            lines,
            line_no: 1,
        })
    }

    /// Next row as a raw field mapping
    fn next_fields(&mut self) -> Option<AdapterResult<Map<String, Value>>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.trim().is_empty() {
                continue;
            }

            let cells: Vec<&str> = line.split('\t').collect();
            if cells.len() != self.header.len() {
                return Some(Err(AdapterError::malformed(
                    format!("{}:{}", self.resource, self.line_no),
                    format!("expected {} cells, found {}", self.header.len(), cells.len()),
                )));
            }

            let fields = self
                .header
                .iter()
                .zip(cells)
                .filter_map(|(column, cell)| {
                    decode_column(column, cell).map(|value| (column.clone(), value))
                })
                .collect();
            return Some(Ok(fields));
        }
    }
}

impl Iterator for TsvRows {
    type Item = AdapterResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let fields = match self.next_fields()? {
            Ok(fields) => fields,
            Err(e) => return Some(Err(e)),
        };
        let raw = RawRecord {
            kind: self.kind,
            fields,
        };
        Some(raw.canonicalize().map_err(|e| {
            AdapterError::canonicalize(&format!("{}:{}", self.resource, self.line_no), e)
        }))
    }
}

/// Reads a node file and an optional edge file, nodes first
pub struct TsvSource {
    name: String,
    nodes: Option<TsvRows>,
    edges: Option<TsvRows>,
    consumed: bool,
}

impl TsvSource {
    /// Open both files and validate their headers
    pub fn open(nodes: impl AsRef<Path>, edges: Option<&Path>) -> AdapterResult<Self> {
        let nodes = nodes.as_ref();
        let node_rows = TsvRows::open(nodes, RecordKind::Node, &["id"])?;
        let edge_rows = edges
            .map(|path| TsvRows::open(path, RecordKind::Edge, &["subject", "predicate", "object"]))
            .transpose()?;

        Ok(Self {
            name: format!("tabular:{}", nodes.display()),
            nodes: Some(node_rows),
            edges: edge_rows,
            consumed: false,
        })
    }
}

impl SourceAdapter for TsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        if self.consumed {
            return Err(AdapterError::AlreadyConsumed(self.name.clone()));
        }
        self.consumed = true;
        let nodes = self.nodes.take().into_iter().flatten();
        let edges = self.edges.take().into_iter().flatten();
        Ok(Box::new(nodes.chain(edges)))
    }
}

/// One output table, spooled so the header can cover every column seen
struct Table {
    path: PathBuf,
    kind: RecordKind,
    core: &'static [&'static str],
    columns: BTreeSet<String>,
    spool: BufWriter<File>,
    rows: usize,
}

impl Table {
    fn new(path: &Path, kind: RecordKind, core: &'static [&'static str], mode: WriteMode) -> AdapterResult<Self> {
        let mut table = Self {
            path: path.to_path_buf(),
            kind,
            core,
            columns: BTreeSet::new(),
            spool: BufWriter::new(tempfile::tempfile()?),
            rows: 0,
        };

        if mode == WriteMode::Append && path.exists() {
            let mut existing = TsvRows::open(path, kind, &[])?;
            while let Some(fields) = existing.next_fields() {
                table.push(&fields?)?;
            }
            tracing::debug!(path = %path.display(), rows = table.rows, "appending to existing table");
        }
        Ok(table)
    }

    fn push(&mut self, fields: &Map<String, Value>) -> AdapterResult<()> {
        for column in fields.keys() {
            if !self.columns.contains(column) {
                self.columns.insert(column.clone());
            }
        }
        serde_json::to_writer(&mut self.spool, fields)?;
        self.spool.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn header(&self) -> Vec<String> {
        let always: &[&str] = match self.kind {
            RecordKind::Node => &["id", "category"],
            RecordKind::Edge => &["subject", "predicate", "object"],
        };
        let mut header: Vec<String> = self
            .core
            .iter()
            .filter(|c| always.contains(*c) || self.columns.contains(**c))
            .map(|c| c.to_string())
            .collect();
        header.extend(
            self.columns
                .iter()
                .filter(|c| !self.core.contains(&c.as_str()))
                .cloned(),
        );
        header
    }

    /// Write the header and every spooled row to the target file
    fn finish(self) -> AdapterResult<usize> {
        let header = self.header();
        let mut spool = self.spool.into_inner().map_err(|e| e.into_error())?;
        spool.seek(SeekFrom::Start(0))?;

        let mut out = BufWriter::new(File::create(&self.path)?);
        let names: Vec<String> = header.iter().map(|h| escape(h)).collect();
        writeln!(out, "{}", names.join("\t"))?;
        for line in BufReader::new(spool).lines() {
            let fields: Map<String, Value> = serde_json::from_str(&line?)?;
            let cells: Vec<String> = header
                .iter()
                .map(|column| {
                    fields
                        .get(column)
                        .and_then(|value| encode_column(column, value))
                        .unwrap_or_default()
                })
                .collect();
            writeln!(out, "{}", cells.join("\t"))?;
        }
        out.flush()?;
        Ok(self.rows)
    }
}

/// Writes a node file and an optional edge file
pub struct TsvSink {
    name: String,
    nodes: Option<Table>,
    edges: Option<Table>,
}

impl TsvSink {
    pub fn open(nodes: impl AsRef<Path>, edges: Option<&Path>, mode: WriteMode) -> AdapterResult<Self> {
        let nodes = nodes.as_ref();
        Ok(Self {
            name: format!("tabular:{}", nodes.display()),
            nodes: Some(Table::new(nodes, RecordKind::Node, NODE_COLUMNS, mode)?),
            edges: edges
                .map(|path| Table::new(path, RecordKind::Edge, EDGE_COLUMNS, mode))
                .transpose()?,
        })
    }

    fn closed(&self) -> AdapterError {
        AdapterError::Unsupported(format!("{} is closed", self.name))
    }
}

impl SinkAdapter for TsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        for record in batch {
            match record {
                Record::Node(node) => match self.nodes.as_mut() {
                    Some(table) => table.push(&node_fields(node))?,
                    None => return Err(self.closed()),
                },
                Record::Edge(edge) => match self.edges.as_mut() {
                    Some(table) => table.push(&edge_fields(edge))?,
                    None if self.nodes.is_none() => return Err(self.closed()),
                    None => {
                        return Err(AdapterError::Unsupported(format!(
                            "{} has no edge file",
                            self.name
                        )))
                    }
                },
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> AdapterResult<()> {
        for table in self.nodes.iter_mut().chain(self.edges.iter_mut()) {
            table.spool.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()> {
        if let Some(table) = self.nodes.take() {
            let rows = table.finish()?;
            tracing::debug!(sink = %self.name, rows, "node table written");
        }
        if let Some(table) = self.edges.take() {
            let rows = table.finish()?;
            tracing::debug!(sink = %self.name, rows, "edge table written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, PropertyValue};
    use serde_json::json;

    #[test]
    fn cell_codec_handles_lists_and_scalars() {
        assert_eq!(decode_cell("a|b"), Some(json!(["a", "b"])));
        assert_eq!(decode_cell("a|"), Some(json!(["a"])));
        assert_eq!(decode_cell("42"), Some(json!(42)));
        assert_eq!(decode_cell("0.5"), Some(json!(0.5)));
        assert_eq!(decode_cell("false"), Some(json!(false)));
        assert_eq!(decode_cell("a\\|b"), Some(json!("a|b")));
        assert_eq!(decode_cell("{\"k\": [1, 2]}"), Some(json!({"k": [1, 2]})));
        assert_eq!(decode_cell(""), None);
    }

    #[test]
    fn encoded_cells_decode_to_the_same_value() {
        for value in [
            json!("tab\there|pipe\\slash"),
            json!(["only"]),
            json!(["x", 2, true]),
            json!({"nested": {"k": "v"}}),
            json!(-7),
            json!(2.25),
            json!(3.0),
            json!("42"),
            json!("true"),
            json!(""),
            json!([]),
            json!({}),
            json!("{\"k\": 1}"),
            json!("\"quoted\""),
            json!(["", "a|b"]),
            json!(["1", 1]),
        ] {
            let cell = encode_cell(&value).unwrap();
            assert!(!cell.contains('\t'), "cell {:?} contains a raw tab", cell);
            assert_eq!(decode_cell(&cell), Some(value));
        }
    }

    #[test]
    fn numeric_and_empty_strings_keep_their_type() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.tsv");
        let node = Node::new("x:1", "biolink:Gene")
            .with_attribute("symbol", "42")
            .with_attribute("flag", "true")
            .with_attribute("note", "")
            .with_attribute("aliases", PropertyValue::Array(vec![]))
            .with_attribute("rank", 42);

        let mut sink = TsvSink::open(&nodes, None, WriteMode::Create).unwrap();
        sink.write(&[node.clone().into()]).unwrap();
        sink.close().unwrap();

        let mut source = TsvSource::open(&nodes, None).unwrap();
        let records: Vec<Record> = source.read().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![Record::Node(node)]);
    }

    #[test]
    fn identifier_columns_and_headers_are_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.tsv");
        let node = Node::new("42", "biolink:Gene").with_attribute("odd\tname|x", "v");

        let mut sink = TsvSink::open(&nodes, None, WriteMode::Create).unwrap();
        sink.write(&[node.clone().into()]).unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(&nodes).unwrap();
        assert!(text.lines().next().unwrap().ends_with("\todd\\tname\\|x"));
        let mut source = TsvSource::open(&nodes, None).unwrap();
        let records: Vec<Record> = source.read().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![Record::Node(node)]);
    }

    #[test]
    fn missing_required_column_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.tsv");
        std::fs::write(&path, "name\tcategory\nx\ty\n").unwrap();
        let err = TsvSource::open(&path, None).err().unwrap();
        assert!(matches!(err, AdapterError::ResourceUnavailable { .. }));
    }

    #[test]
    fn short_row_is_malformed_and_reading_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.tsv");
        std::fs::write(&path, "id\tcategory\tname\nx:1\tbiolink:Gene\n\nx:2\tbiolink:Gene\tTwo\n").unwrap();

        let mut source = TsvSource::open(&path, None).unwrap();
        let results: Vec<_> = source.read().unwrap().collect();

        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], Err(e) if e.is_record_level()));
        let Ok(Record::Node(node)) = &results[1] else { panic!("expected node") };
        assert_eq!(node.attributes["name"], PropertyValue::from("Two"));
    }

    #[test]
    fn second_read_is_already_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.tsv");
        std::fs::write(&path, "id\n").unwrap();
        let mut source = TsvSource::open(&path, None).unwrap();
        assert_eq!(source.read().unwrap().count(), 0);
        assert!(matches!(source.read().err(), Some(AdapterError::AlreadyConsumed(_))));
    }

    #[test]
    fn sink_header_is_the_union_of_columns() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("out_nodes.tsv");
        let edges = dir.path().join("out_edges.tsv");

        let mut sink = TsvSink::open(&nodes, Some(&edges), WriteMode::Create).unwrap();
        sink.write(&[
            Node::new("a", "biolink:Gene").with_attribute("name", "A").into(),
            Node::new("b", "biolink:Gene").with_attribute("symbol", "B").into(),
        ])
        .unwrap();
        sink.write(&[Edge::new("a", "biolink:interacts_with", "b").into()]).unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(&nodes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id\tcategory\tname\tsymbol"));
        assert_eq!(lines.next(), Some("a\tbiolink:Gene|\tA\t"));

        let edge_text = std::fs::read_to_string(&edges).unwrap();
        assert!(edge_text.starts_with("subject\tpredicate\tobject\n"));
    }

    #[test]
    fn append_merges_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.tsv");

        let mut first = TsvSink::open(&nodes, None, WriteMode::Create).unwrap();
        first.write(&[Node::new("a", "biolink:Gene").into()]).unwrap();
        first.close().unwrap();

        let mut second = TsvSink::open(&nodes, None, WriteMode::Append).unwrap();
        second
            .write(&[Node::new("b", "biolink:Disease").with_attribute("name", "B").into()])
            .unwrap();
        second.close().unwrap();

        let mut source = TsvSource::open(&nodes, None).unwrap();
        let ids: Vec<String> = source
            .read()
            .unwrap()
            .map(|r| r.unwrap().key().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn edge_without_edge_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TsvSink::open(dir.path().join("n.tsv"), None, WriteMode::Create).unwrap();
        let err = sink.write(&[Edge::new("a", "p", "b").into()]).unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }
}
