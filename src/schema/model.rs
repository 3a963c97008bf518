//! Schema document and its resolved, hierarchy-aware form

use super::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A category declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryDef {
    /// Parent categories
    pub is_a: Vec<String>,
    /// Attributes permitted on nodes of this category and its descendants
    pub attributes: Vec<String>,
}

/// A predicate declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredicateDef {
    pub is_a: Vec<String>,
    /// Category the subject must be (or descend from)
    pub domain: Option<String>,
    /// Category the object must be (or descend from)
    pub range: Option<String>,
    /// Attributes permitted on edges with this predicate
    pub attributes: Vec<String>,
}

/// Schema as written in a schema file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDocument {
    pub categories: BTreeMap<String, CategoryDef>,
    pub predicates: BTreeMap<String, PredicateDef>,
    /// Attributes permitted on every node
    pub node_attributes: BTreeSet<String>,
    /// Attributes permitted on every edge
    pub edge_attributes: BTreeSet<String>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, name: impl Into<String>, parents: &[&str]) -> Self {
        self.categories.insert(
            name.into(),
            CategoryDef {
                is_a: parents.iter().map(|p| p.to_string()).collect(),
                attributes: Vec::new(),
            },
        );
        self
    }

    pub fn with_category_attributes(mut self, name: &str, attributes: &[&str]) -> Self {
        let def = self.categories.entry(name.to_string()).or_default();
        def.attributes.extend(attributes.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_predicate(
        mut self,
        name: impl Into<String>,
        domain: Option<&str>,
        range: Option<&str>,
    ) -> Self {
        self.predicates.insert(
            name.into(),
            PredicateDef {
                domain: domain.map(str::to_string),
                range: range.map(str::to_string),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_node_attribute(mut self, name: impl Into<String>) -> Self {
        self.node_attributes.insert(name.into());
        self
    }

    pub fn with_edge_attribute(mut self, name: impl Into<String>) -> Self {
        self.edge_attributes.insert(name.into());
        self
    }

    /// Resolve hierarchies into an immutable schema
    pub fn resolve(self) -> SchemaResult<Schema> {
        Schema::from_document(self)
    }
}

/// Resolved predicate: inherited domain, range and attributes filled in
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPredicate {
    pub domain: Option<String>,
    pub range: Option<String>,
    pub attributes: BTreeSet<String>,
}

/// Immutable, resolved schema for one run
///
/// Every category maps to its ancestor closure (itself included), so
/// hierarchy checks are set lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    ancestors: BTreeMap<String, BTreeSet<String>>,
    category_attributes: BTreeMap<String, BTreeSet<String>>,
    predicates: BTreeMap<String, ResolvedPredicate>,
    node_attributes: BTreeSet<String>,
    edge_attributes: BTreeSet<String>,
}

impl Schema {
    /// A schema that knows no categories: hierarchy checks degrade to equality
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_document(doc: SchemaDocument) -> SchemaResult<Self> {
        let parents: BTreeMap<&str, Vec<&str>> = doc
            .categories
            .iter()
            .map(|(name, def)| (name.as_str(), def.is_a.iter().map(String::as_str).collect()))
            .collect();
        let ancestors = closure(&parents, "category")?;

        let mut category_attributes = BTreeMap::new();
        for name in doc.categories.keys() {
            let mut permitted = BTreeSet::new();
            for ancestor in &ancestors[name] {
                if let Some(def) = doc.categories.get(ancestor) {
                    permitted.extend(def.attributes.iter().cloned());
                }
            }
            category_attributes.insert(name.clone(), permitted);
        }

        let predicate_parents: BTreeMap<&str, Vec<&str>> = doc
            .predicates
            .iter()
            .map(|(name, def)| (name.as_str(), def.is_a.iter().map(String::as_str).collect()))
            .collect();
        let predicate_ancestors = closure(&predicate_parents, "predicate")?;

        let mut predicates = BTreeMap::new();
        for (name, def) in &doc.predicates {
            for bound in [&def.domain, &def.range].into_iter().flatten() {
                if !doc.categories.is_empty() && !doc.categories.contains_key(bound) {
                    return Err(SchemaError::Unresolvable(format!(
                        "predicate '{}' refers to undeclared category '{}'",
                        name, bound
                    )));
                }
            }

            let lineage = ordered_lineage(name, &predicate_parents);
            let domain = lineage
                .iter()
                .find_map(|p| doc.predicates.get(*p).and_then(|d| d.domain.clone()));
            let range = lineage
                .iter()
                .find_map(|p| doc.predicates.get(*p).and_then(|d| d.range.clone()));
            let mut attributes = BTreeSet::new();
            for ancestor in &predicate_ancestors[name] {
                if let Some(def) = doc.predicates.get(ancestor) {
                    attributes.extend(def.attributes.iter().cloned());
                }
            }

            predicates.insert(
                name.clone(),
                ResolvedPredicate {
                    domain,
                    range,
                    attributes,
                },
            );
        }

        Ok(Self {
            ancestors,
            category_attributes,
            predicates,
            node_attributes: doc.node_attributes,
            edge_attributes: doc.edge_attributes,
        })
    }

    pub fn is_known_category(&self, category: &str) -> bool {
        self.ancestors.contains_key(category)
    }

    /// True if `category` is `ancestor` or descends from it
    pub fn is_a(&self, category: &str, ancestor: &str) -> bool {
        category == ancestor
            || self
                .ancestors
                .get(category)
                .is_some_and(|set| set.contains(ancestor))
    }

    /// True if any of `categories` is `ancestor` or descends from it
    pub fn any_is_a<S: AsRef<str>>(&self, categories: &[S], ancestor: &str) -> bool {
        categories.iter().any(|c| self.is_a(c.as_ref(), ancestor))
    }

    /// Categories plus all their known ancestors
    pub fn expand<S: AsRef<str>>(&self, categories: &[S]) -> BTreeSet<String> {
        let mut expanded = BTreeSet::new();
        for category in categories {
            let category = category.as_ref();
            expanded.insert(category.to_string());
            if let Some(set) = self.ancestors.get(category) {
                expanded.extend(set.iter().cloned());
            }
        }
        expanded
    }

    pub fn predicate(&self, name: &str) -> Option<&ResolvedPredicate> {
        self.predicates.get(name)
    }

    pub fn is_known_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Is `attribute` permitted on a node carrying `categories`?
    pub fn node_attribute_permitted<S: AsRef<str>>(&self, categories: &[S], attribute: &str) -> bool {
        self.node_attributes.contains(attribute)
            || categories.iter().any(|c| {
                self.category_attributes
                    .get(c.as_ref())
                    .is_some_and(|set| set.contains(attribute))
            })
    }

    /// Is `attribute` permitted on an edge with `predicate`?
    pub fn edge_attribute_permitted(&self, predicate: &str, attribute: &str) -> bool {
        self.edge_attributes.contains(attribute)
            || self
                .predicates
                .get(predicate)
                .is_some_and(|p| p.attributes.contains(attribute))
    }

    pub fn category_count(&self) -> usize {
        self.ancestors.len()
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }
}

/// Ancestor closure (self included) for every declared name
fn closure(
    parents: &BTreeMap<&str, Vec<&str>>,
    what: &str,
) -> SchemaResult<BTreeMap<String, BTreeSet<String>>> {
    for (name, ps) in parents {
        for parent in ps {
            if !parents.contains_key(parent) {
                return Err(SchemaError::Unresolvable(format!(
                    "{} '{}' has undeclared parent '{}'",
                    what, name, parent
                )));
            }
        }
    }

    let mut result = BTreeMap::new();
    for name in parents.keys() {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = parents[name].clone();
        while let Some(current) = stack.pop() {
            if current == *name {
                return Err(SchemaError::Unresolvable(format!(
                    "{} hierarchy has a cycle through '{}'",
                    what, name
                )));
            }
            if seen.insert(current.to_string()) {
                stack.extend(parents[current].iter().copied());
            }
        }
        seen.insert(name.to_string());
        result.insert(name.to_string(), seen);
    }
    Ok(result)
}

/// Self first, then ancestors breadth-first (nearest wins for inheritance)
fn ordered_lineage<'a>(name: &'a str, parents: &BTreeMap<&'a str, Vec<&'a str>>) -> Vec<&'a str> {
    let mut order = vec![name];
    let mut i = 0;
    while i < order.len() {
        if let Some(ps) = parents.get(order[i]) {
            for p in ps {
                if !order.contains(p) {
                    order.push(p);
                }
            }
        }
        i += 1;
    }
    order
}
