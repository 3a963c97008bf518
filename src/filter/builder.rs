//! Declarative filter configuration
//!
//! Node category includes and edge endpoint category constraints are coupled:
//! restricting nodes to a category also restricts edge subjects and objects
//! to it, and constraining an edge endpoint admits that category as a node.

use super::{FilterChain, FilterRule, FilterTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub node_categories: BTreeSet<String>,
    pub exclude_node_categories: BTreeSet<String>,
    pub predicates: BTreeSet<String>,
    pub exclude_predicates: BTreeSet<String>,
    pub subject_categories: BTreeSet<String>,
    pub object_categories: BTreeSet<String>,
    pub provided_by: BTreeSet<String>,
    /// When set, nodes keep only these attributes
    pub node_attributes: Option<BTreeSet<String>>,
    /// When set, edges keep only these attributes
    pub edge_attributes: Option<BTreeSet<String>>,
    pub drop_node_attributes: BTreeSet<String>,
    pub drop_edge_attributes: BTreeSet<String>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.subject_categories.insert(category.clone());
        self.object_categories.insert(category.clone());
        self.node_categories.insert(category);
        self
    }

    pub fn without_node_category(mut self, category: impl Into<String>) -> Self {
        self.exclude_node_categories.insert(category.into());
        self
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicates.insert(predicate.into());
        self
    }

    pub fn without_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.exclude_predicates.insert(predicate.into());
        self
    }

    pub fn with_subject_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.node_categories.insert(category.clone());
        self.subject_categories.insert(category);
        self
    }

    pub fn with_object_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.node_categories.insert(category.clone());
        self.object_categories.insert(category);
        self
    }

    pub fn with_provided_by(mut self, source: impl Into<String>) -> Self {
        self.provided_by.insert(source.into());
        self
    }

    pub fn project_node_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_attributes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn project_edge_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_attributes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Apply category coupling to a spec that was deserialized rather than built
    fn coupled(&self) -> Self {
        let mut spec = self.clone();
        for category in &self.node_categories {
            spec.subject_categories.insert(category.clone());
            spec.object_categories.insert(category.clone());
        }
        for category in self.subject_categories.iter().chain(&self.object_categories) {
            spec.node_categories.insert(category.clone());
        }
        spec
    }

    /// Compile into an ordered chain: node rules, then edge rules, then projections
    pub fn build(&self) -> FilterChain {
        let spec = self.coupled();
        let mut chain = FilterChain::new();

        if !spec.node_categories.is_empty() {
            chain.push(FilterRule::IncludeCategories(spec.node_categories));
        }
        if !spec.exclude_node_categories.is_empty() {
            chain.push(FilterRule::ExcludeCategories(spec.exclude_node_categories));
        }
        if !spec.predicates.is_empty() {
            chain.push(FilterRule::IncludePredicates(spec.predicates));
        }
        if !spec.exclude_predicates.is_empty() {
            chain.push(FilterRule::ExcludePredicates(spec.exclude_predicates));
        }
        if !spec.subject_categories.is_empty() {
            chain.push(FilterRule::SubjectCategories(spec.subject_categories));
        }
        if !spec.object_categories.is_empty() {
            chain.push(FilterRule::ObjectCategories(spec.object_categories));
        }
        if !spec.provided_by.is_empty() {
            chain.push(FilterRule::ProvidedBy(spec.provided_by));
        }
        if let Some(keep) = spec.node_attributes {
            chain.push(FilterRule::ProjectAttributes {
                target: FilterTarget::Node,
                keep,
            });
        }
        if let Some(keep) = spec.edge_attributes {
            chain.push(FilterRule::ProjectAttributes {
                target: FilterTarget::Edge,
                keep,
            });
        }
        if !spec.drop_node_attributes.is_empty() {
            chain.push(FilterRule::DropAttributes {
                target: FilterTarget::Node,
                names: spec.drop_node_attributes,
            });
        }
        if !spec.drop_edge_attributes.is_empty() {
            chain.push(FilterRule::DropAttributes {
                target: FilterTarget::Edge,
                names: spec.drop_edge_attributes,
            });
        }

        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_category_couples_to_endpoints() {
        let spec = FilterSpec::new().with_node_category("biolink:Gene");
        assert!(spec.subject_categories.contains("biolink:Gene"));
        assert!(spec.object_categories.contains("biolink:Gene"));
    }

    #[test]
    fn endpoint_category_couples_to_nodes() {
        let spec = FilterSpec::new().with_subject_category("biolink:Drug");
        assert!(spec.node_categories.contains("biolink:Drug"));
        assert!(spec.object_categories.is_empty());
    }

    #[test]
    fn deserialized_spec_is_coupled_on_build() {
        let spec: FilterSpec = serde_yaml::from_str("node_categories: [biolink:Gene]\n").unwrap();
        let chain = spec.build();
        let kinds: Vec<String> = chain
            .rules()
            .iter()
            .map(|r| format!("{:?}", r).split('(').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            kinds,
            vec!["IncludeCategories", "SubjectCategories", "ObjectCategories"]
        );
    }

    #[test]
    fn empty_spec_builds_an_empty_chain() {
        assert!(FilterSpec::default().build().is_empty());
    }
}
