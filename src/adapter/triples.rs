//! N-Triples
//!
//! Node categories are `rdf:type` triples and node attributes are
//! literal-valued triples. An edge with no attributes, no provenance and a
//! derived id is a single IRI-to-IRI triple; every other edge is a reified
//! `rdf:Statement` blank node carrying its id, provenance and attributes.
//!
//! Identifiers, categories, predicates and attribute names all go through
//! one reversible mapping:
//!
//! - `biolink:X` becomes `https://w3id.org/biolink/vocab/X`
//! - any other CURIE `p:x` becomes `https://identifiers.org/p:x`
//! - absolute IRIs outside those namespaces pass through
//! - everything else is minted under `urn:kgweave:`
//!
//! Local parts are percent-encoded, so `contract(expand(t)) == t` for every
//! token. On a reified statement `biolink:id` and `biolink:provided_by` hold
//! the edge id and provenance.
//!
//! Reified statements can appear anywhere in a file, so the source buffers the
//! whole file before yielding records.

use super::{AdapterError, AdapterResult, RecordStream, SinkAdapter, SourceAdapter, WriteMode};
use crate::graph::{Edge, Node, PropertyValue, RawRecord, Record};
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, NamedNodeRef, Subject, Term, Triple};
use oxttl::{NTriplesParser, NTriplesSerializer, TurtleParseError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use uuid::Uuid;

pub const BIOLINK_VOCAB: &str = "https://w3id.org/biolink/vocab/";
pub const CURIE_BASE: &str = "https://identifiers.org/";
pub const LOCAL_BASE: &str = "urn:kgweave:";

const RDF_JSON: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#JSON");

/// Blank node labels are derived from edge ids in this namespace
const STATEMENT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x2c, 0x8e, 0x41, 0x57, 0x0b, 0x9a, 0x4d, 0x1f, 0x93, 0x6a, 0x5e, 0x21, 0xc7, 0x04, 0xb8, 0x3d,
]);

fn is_reserved(iri: &str) -> bool {
    [BIOLINK_VOCAB, CURIE_BASE, LOCAL_BASE]
        .iter()
        .any(|base| iri.starts_with(base))
}

/// Split `prefix:local` when the prefix is a plain name
fn split_curie(token: &str) -> Option<(&str, &str)> {
    let (prefix, local) = token.split_once(':')?;
    let mut chars = prefix.chars();
    let leads = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    (leads && rest_ok).then_some((prefix, local))
}

/// Map an identifier, CURIE or IRI to a full IRI
pub fn expand(token: &str) -> String {
    if let Some(local) = token.strip_prefix("biolink:") {
        return format!("{}{}", BIOLINK_VOCAB, urlencoding::encode(local));
    }
    let absolute = token.contains("://") || token.starts_with("urn:");
    if absolute && !is_reserved(token) && NamedNode::new(token).is_ok() {
        return token.to_string();
    }
    match split_curie(token) {
        Some((prefix, local)) => format!("{}{}:{}", CURIE_BASE, prefix, urlencoding::encode(local)),
        None => format!("{}{}", LOCAL_BASE, urlencoding::encode(token)),
    }
}

/// Inverse of [`expand`]; IRIs from other namespaces come back unchanged
pub fn contract(iri: &str) -> String {
    let decoded = |local: &str| urlencoding::decode(local).ok().map(|s| s.into_owned());
    let contracted = if let Some(local) = iri.strip_prefix(BIOLINK_VOCAB) {
        decoded(local).map(|local| format!("biolink:{}", local))
    } else if let Some(curie) = iri.strip_prefix(CURIE_BASE) {
        curie
            .split_once(':')
            .and_then(|(prefix, local)| decoded(local).map(|local| format!("{}:{}", prefix, local)))
    } else if let Some(local) = iri.strip_prefix(LOCAL_BASE) {
        decoded(local)
    } else {
        None
    };
    contracted.unwrap_or_else(|| iri.to_string())
}

fn named(token: &str) -> NamedNode {
    NamedNode::new_unchecked(expand(token))
}

fn literal(value: &PropertyValue) -> Literal {
    match value {
        PropertyValue::String(s) => Literal::new_simple_literal(s.as_str()),
        PropertyValue::Int(i) => Literal::new_typed_literal(i.to_string(), xsd::INTEGER.into_owned()),
        PropertyValue::Float(f) => Literal::new_typed_literal(f.to_string(), xsd::DOUBLE.into_owned()),
        PropertyValue::Bool(b) => Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN.into_owned()),
        PropertyValue::Array(_) | PropertyValue::Object(_) => {
            Literal::new_typed_literal(value.to_json().to_string(), RDF_JSON.into_owned())
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    let lexical = literal.value();
    let datatype = literal.datatype();
    let parsed = if datatype == xsd::INTEGER || datatype == xsd::INT || datatype == xsd::LONG {
        lexical.parse::<i64>().ok().map(Value::from)
    } else if datatype == xsd::DOUBLE || datatype == xsd::FLOAT || datatype == xsd::DECIMAL {
        lexical
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    } else if datatype == xsd::BOOLEAN {
        match lexical {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        }
    } else if datatype == RDF_JSON {
        serde_json::from_str(lexical).ok()
    } else {
        None
    };
    parsed.unwrap_or_else(|| Value::String(lexical.to_string()))
}

fn term_value(term: &Term) -> Value {
    match term {
        Term::NamedNode(node) => Value::String(contract(node.as_str())),
        Term::BlankNode(node) => Value::String(format!("_:{}", node.as_str())),
        Term::Literal(literal) => literal_value(literal),
        #[allow(unreachable_patterns)]
        other => Value::String(other.to_string()),
    }
}

#[derive(Default)]
struct PendingNode {
    categories: Vec<Value>,
    attributes: Map<String, Value>,
}

/// Add a value under `key`, turning repeated keys into a list
fn add_value(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        None => {
            fields.insert(key, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Key a reified statement's predicate maps to
fn statement_key(predicate: &NamedNode) -> String {
    let predicate = predicate.as_ref();
    if predicate == rdf::SUBJECT {
        "subject".to_string()
    } else if predicate == rdf::PREDICATE {
        "predicate".to_string()
    } else if predicate == rdf::OBJECT {
        "object".to_string()
    } else {
        match contract(predicate.as_str()).as_str() {
            "biolink:id" => "id".to_string(),
            "biolink:provided_by" => "provided_by".to_string(),
            other => other.to_string(),
        }
    }
}

/// Buffers a whole N-Triples file, then yields nodes and edges
pub struct NTriplesSource {
    name: String,
    records: Option<Vec<AdapterResult<Record>>>,
}

impl NTriplesSource {
    pub fn open(path: impl AsRef<Path>) -> AdapterResult<Self> {
        let path = path.as_ref();
        let name = format!("triples:{}", path.display());
        let file = File::open(path).map_err(|e| AdapterError::unavailable(&name, e))?;
        let records = Self::collect(&name, BufReader::new(file))?;
        Ok(Self {
            name,
            records: Some(records),
        })
    }

    fn collect(name: &str, reader: impl Read) -> AdapterResult<Vec<AdapterResult<Record>>> {
        let mut records = Vec::new();
        let mut nodes: BTreeMap<String, PendingNode> = BTreeMap::new();
        let mut statements: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        let mut plain_edges: Vec<Map<String, Value>> = Vec::new();

        for parsed in NTriplesParser::new().for_reader(reader) {
            let Triple {
                subject,
                predicate,
                object,
            } = match parsed {
                Ok(triple) => triple,
                Err(TurtleParseError::Io(e)) => return Err(e.into()),
                Err(syntax) => {
                    records.push(Err(AdapterError::malformed(name, syntax)));
                    continue;
                }
            };

            match subject {
                Subject::BlankNode(label) => {
                    let fields = statements.entry(label.as_str().to_string()).or_default();
                    let is_marker = predicate.as_ref() == rdf::TYPE
                        && matches!(&object, Term::NamedNode(n) if n.as_ref() == rdf::STATEMENT);
                    if !is_marker {
                        add_value(fields, statement_key(&predicate), term_value(&object));
                    }
                }
                Subject::NamedNode(iri) => match object {
                    Term::NamedNode(target) if predicate.as_ref() == rdf::TYPE => {
                        nodes
                            .entry(iri.into_string())
                            .or_default()
                            .categories
                            .push(Value::String(contract(target.as_str())));
                    }
                    Term::Literal(literal) => {
                        let node = nodes.entry(iri.into_string()).or_default();
                        add_value(
                            &mut node.attributes,
                            contract(predicate.as_str()),
                            literal_value(&literal),
                        );
                    }
                    target => {
                        let mut fields = Map::new();
                        fields.insert("subject".to_string(), Value::String(contract(iri.as_str())));
                        fields.insert(
                            "predicate".to_string(),
                            Value::String(contract(predicate.as_str())),
                        );
                        fields.insert("object".to_string(), term_value(&target));
                        plain_edges.push(fields);
                    }
                },
                #[allow(unreachable_patterns)]
                other => records.push(Err(AdapterError::malformed(
                    name,
                    format!("unsupported subject {}", other),
                ))),
            }
        }

        for (iri, pending) in nodes {
            let mut fields = pending.attributes;
            fields.insert("id".to_string(), Value::String(contract(&iri)));
            fields.insert("category".to_string(), Value::Array(pending.categories));
            records.push(
                RawRecord::node(fields)
                    .canonicalize()
                    .map_err(|e| AdapterError::canonicalize(name, e)),
            );
        }
        for fields in plain_edges.into_iter().chain(statements.into_values()) {
            records.push(
                RawRecord::edge(fields)
                    .canonicalize()
                    .map_err(|e| AdapterError::canonicalize(name, e)),
            );
        }

        tracing::debug!(source = name, records = records.len(), "triples buffered");
        Ok(records)
    }
}

impl SourceAdapter for NTriplesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> AdapterResult<RecordStream<'_>> {
        match self.records.take() {
            Some(records) => Ok(Box::new(records.into_iter())),
            None => Err(AdapterError::AlreadyConsumed(self.name.clone())),
        }
    }
}

fn node_triples(node: &Node) -> Vec<Triple> {
    let subject = named(node.id.as_str());
    let categories = node
        .categories
        .iter()
        .map(|category| Triple::new(subject.clone(), rdf::TYPE.into_owned(), named(category)));
    let attributes = node
        .attributes
        .iter()
        .map(|(name, value)| Triple::new(subject.clone(), named(name), literal(value)));
    categories.chain(attributes).collect()
}

fn edge_triples(edge: &Edge) -> Vec<Triple> {
    let (subject, predicate, object) = (
        named(edge.subject.as_str()),
        named(&edge.predicate),
        named(edge.object.as_str()),
    );
    if edge.attributes.is_empty() && edge.provenance.is_none() && edge.has_derived_id() {
        return vec![Triple::new(subject, predicate, object)];
    }

    let label = Uuid::new_v5(&STATEMENT_NAMESPACE, edge.id.as_str().as_bytes()).simple();
    let statement = BlankNode::new_unchecked(format!("e{}", label));
    let mut triples = vec![
        Triple::new(statement.clone(), rdf::TYPE.into_owned(), rdf::STATEMENT.into_owned()),
        Triple::new(statement.clone(), rdf::SUBJECT.into_owned(), subject),
        Triple::new(statement.clone(), rdf::PREDICATE.into_owned(), predicate),
        Triple::new(statement.clone(), rdf::OBJECT.into_owned(), object),
    ];
    if !edge.has_derived_id() {
        triples.push(Triple::new(
            statement.clone(),
            named("biolink:id"),
            Literal::new_simple_literal(edge.id.as_str()),
        ));
    }
    if let Some(provenance) = &edge.provenance {
        triples.push(Triple::new(
            statement.clone(),
            named("biolink:provided_by"),
            Literal::new_simple_literal(provenance.as_str()),
        ));
    }
    for (name, value) in &edge.attributes {
        triples.push(Triple::new(statement.clone(), named(name), literal(value)));
    }
    triples
}

/// Serialize one batch of records as N-Triples
fn write_records(out: impl Write, batch: &[Record]) -> io::Result<()> {
    let mut serializer = NTriplesSerializer::new().for_writer(out);
    for record in batch {
        let triples = match record {
            Record::Node(node) => node_triples(node),
            Record::Edge(edge) => edge_triples(edge),
        };
        for triple in &triples {
            serializer.serialize_triple(triple)?;
        }
    }
    serializer.finish();
    Ok(())
}

/// Writes N-Triples; appending adds triples to an existing file
pub struct NTriplesSink {
    name: String,
    out: BufWriter<File>,
}

impl NTriplesSink {
    pub fn open(path: impl AsRef<Path>, mode: WriteMode) -> AdapterResult<Self> {
        let path = path.as_ref();
        let file = match mode {
            WriteMode::Create => File::create(path)?,
            WriteMode::Append => OpenOptions::new().create(true).append(true).open(path)?,
        };
        Ok(Self {
            name: format!("triples:{}", path.display()),
            out: BufWriter::new(file),
        })
    }
}

impl SinkAdapter for NTriplesSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, batch: &[Record]) -> AdapterResult<()> {
        write_records(&mut self.out, batch)?;
        Ok(())
    }

    fn flush(&mut self) -> AdapterResult<()> {
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> AdapterResult<()> {
        self.flush()
    }
}
