//! Named queries submitted together.

use crate::query::Query;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Ordered collection of named queries.
///
/// Repeated names are kept (and reported by validation); lookups return the
/// first query with a name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    queries: Vec<(String, Arc<Query>)>,
}

impl Document {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Document::add_query`]
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, query: Query) -> Self {
        self.add_query(name, query);
        self
    }

    /// First query with `name`
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&Arc<Query>> {
        self.queries.iter().find(|(n, _)| n == name).map(|(_, q)| q)
    }

    /// Append a query
    pub fn add_query(&mut self, name: impl Into<String>, query: Query) {
        self.queries.push((name.into(), Arc::new(query)));
    }

    /// Remove every query named `name`
    pub fn remove_query(&mut self, name: &str) {
        self.queries.retain(|(n, _)| n != name);
    }

    /// All queries in submission order
    #[must_use]
    pub fn queries(&self) -> &[(String, Arc<Query>)] {
        &self.queries
    }

    /// Number of queries
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Check if there are no queries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.queries.len()))?;
        for (name, query) in &self.queries {
            map.serialize_entry(name, query.as_ref())?;
        }
        map.end()
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = Document;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of query names to queries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Document, A::Error> {
        let mut document = Document::new();
        while let Some((name, query)) = access.next_entry::<String, Query>()? {
            document.add_query(name, query);
        }
        Ok(document)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DocumentVisitor)
    }
}
