//! Schema resolution
//!
//! The engine does not implement a schema language. It asks a
//! `SchemaResolver` once per run for a resolved `Schema` (category hierarchy,
//! predicate domain/range table, permitted attributes) and passes that value
//! explicitly to filters and the validator.

mod model;

pub use model::{CategoryDef, PredicateDef, ResolvedPredicate, Schema, SchemaDocument};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema unresolvable: {0}")]
    Unresolvable(String),

    #[error("schema unresolvable: cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema unresolvable: cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Supplies the resolved schema for a run
pub trait SchemaResolver: Send + Sync {
    fn resolve(&self) -> SchemaResult<Schema>;
}

impl SchemaResolver for SchemaDocument {
    fn resolve(&self) -> SchemaResult<Schema> {
        Schema::from_document(self.clone())
    }
}

impl SchemaResolver for Schema {
    fn resolve(&self) -> SchemaResult<Schema> {
        Ok(self.clone())
    }
}

/// Reads a `SchemaDocument` from a YAML file on every `resolve`
#[derive(Debug, Clone)]
pub struct YamlSchemaResolver {
    path: PathBuf,
}

impl YamlSchemaResolver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SchemaResolver for YamlSchemaResolver {
    fn resolve(&self) -> SchemaResult<Schema> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| SchemaError::Io {
            path: self.path.clone(),
            source,
        })?;
        let doc: SchemaDocument = serde_yaml::from_str(&text).map_err(|source| SchemaError::Parse {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(
            path = %self.path.display(),
            categories = doc.categories.len(),
            predicates = doc.predicates.len(),
            "schema loaded"
        );
        Schema::from_document(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn yaml_schema_resolves() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
categories:
  biolink:NamedThing: {{}}
  biolink:Gene:
    is_a: [biolink:NamedThing]
    attributes: [symbol]
predicates:
  biolink:interacts_with:
    domain: biolink:Gene
    range: biolink:Gene
node_attributes: [name]
edge_attributes: [publications]
"#
        )
        .unwrap();

        let schema = YamlSchemaResolver::new(file.path()).resolve().unwrap();

        assert!(schema.is_a("biolink:Gene", "biolink:NamedThing"));
        assert!(schema.node_attribute_permitted(&["biolink:Gene"], "symbol"));
        assert!(schema.edge_attribute_permitted("biolink:interacts_with", "publications"));
        assert_eq!(
            schema.predicate("biolink:interacts_with").unwrap().range.as_deref(),
            Some("biolink:Gene")
        );
    }

    #[test]
    fn missing_file_is_unresolvable() {
        let err = YamlSchemaResolver::new("/nonexistent/schema.yaml")
            .resolve()
            .unwrap_err();
        assert!(err.to_string().starts_with("schema unresolvable"));
    }
}
