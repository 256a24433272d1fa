//! A single field-selecting query.

use indexmap::IndexMap;
use sage_core::Arguments;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Selection of attributes, an optional act and nested links on one entity.
///
/// Immutable once built. Nested link queries may omit `type`; it then
/// defaults to the link's target entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "type", alias = "typ", default, skip_serializing_if = "Option::is_none")]
    type_name: Option<String>,
    #[serde(alias = "atr", default)]
    attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    act: Option<String>,
    #[serde(alias = "arg", default)]
    arguments: Arguments,
    #[serde(alias = "lnk", default)]
    links: IndexMap<String, Arc<Query>>,
}

impl Query {
    /// Start building a query on `type_name`
    #[must_use]
    pub fn builder(type_name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new().with_type(type_name)
    }

    /// Start building a nested query that takes its type from the link
    #[must_use]
    pub fn nested() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Target entity name, if given
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Requested act
    #[must_use]
    pub fn act(&self) -> Option<&str> {
        self.act.as_deref()
    }

    /// Requested attributes, in request order
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Check if an attribute is requested
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Argument value by name
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Check if an argument is supplied
    #[must_use]
    pub fn has_argument(&self, name: &str) -> bool {
        self.arguments.contains_key(name)
    }

    /// All supplied arguments
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Nested query for a link
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&Arc<Query>> {
        self.links.get(name)
    }

    /// Check if a link is requested
    #[must_use]
    pub fn has_link(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    /// All requested links, in request order
    #[must_use]
    pub fn links(&self) -> &IndexMap<String, Arc<Query>> {
        &self.links
    }
}

/// Builder for [`Query`]
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target entity
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.query.type_name = Some(type_name.into());
        self
    }

    /// Request an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.query.attributes.push(name.into());
        self
    }

    /// Request several attributes
    #[must_use]
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Request an act
    #[must_use]
    pub fn act(mut self, name: impl Into<String>) -> Self {
        self.query.act = Some(name.into());
        self
    }

    /// Supply an argument
    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.arguments.insert(name.into(), value.into());
        self
    }

    /// Request a link with its nested query
    #[must_use]
    pub fn link(mut self, name: impl Into<String>, query: Query) -> Self {
        self.query.links.insert(name.into(), Arc::new(query));
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> Query {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let query = Query::builder("User")
            .attributes(["name", "email"])
            .argument("id", 1)
            .act("follow")
            .link("org", Query::nested().attribute("title").build())
            .build();

        assert_eq!(query.type_name(), Some("User"));
        assert!(query.has_attribute("email"));
        assert!(!query.has_attribute("age"));
        assert_eq!(query.argument("id"), Some(&json!(1)));
        assert!(query.has_argument("id"));
        assert!(query.argument("missing").is_none());
        assert_eq!(query.act(), Some("follow"));
        assert!(query.has_link("org"));
        assert!(query.link("org").unwrap().type_name().is_none());
        assert!(query.link("nope").is_none());
    }

    #[test]
    fn test_deserialize_short_keys() {
        let query: Query = serde_json::from_value(json!({
            "typ": "User",
            "atr": ["name"],
            "arg": {"id": 1},
            "lnk": {"org": {"atr": ["title"]}}
        }))
        .unwrap();
        assert_eq!(query.type_name(), Some("User"));
        assert_eq!(query.attributes(), ["name".to_string()]);
        assert_eq!(query.link("org").unwrap().attributes(), ["title".to_string()]);
    }

    #[test]
    fn test_deserialize_long_keys_and_defaults() {
        let query: Query = serde_json::from_value(json!({"type": "User"})).unwrap();
        assert!(query.attributes().is_empty());
        assert!(query.act().is_none());
        assert!(query.arguments().is_empty());
        assert!(query.links().is_empty());
    }

    #[test]
    fn test_link_order_is_request_order() {
        let query = Query::builder("User")
            .link("b", Query::default())
            .link("a", Query::default())
            .build();
        let names: Vec<_> = query.links().keys().cloned().collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
