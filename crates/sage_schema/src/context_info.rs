//! Per-invocation resolution info handed to attribute and link resolvers.

use crate::definition::artifact::{ArtifactKind, ArtifactRef};
use crate::definition::entity::Entity;
use crate::schema::Schema;
use sage_core::{Arguments, Context};
use sage_promise::SyncPromiseAdapter;
use sage_query::Query;
use std::fmt;
use std::sync::Arc;

/// Immutable bundle describing what is being resolved.
///
/// Fields are only readable; a resolver cannot alter what its siblings see.
#[derive(Clone)]
pub struct ContextInfo {
    artifact: Option<(ArtifactKind, String)>,
    entity: Arc<Entity>,
    schema: Schema,
    query: Arc<Query>,
    query_name: String,
    path: Vec<String>,
    arguments: Arguments,
    context: Arc<Context>,
    adapter: SyncPromiseAdapter,
}

impl ContextInfo {
    /// Info for resolving `query` (named `query_name` in the document) on `entity`
    #[must_use]
    pub fn new(
        entity: Arc<Entity>,
        schema: Schema,
        query: Arc<Query>,
        query_name: impl Into<String>,
        context: Arc<Context>,
        adapter: SyncPromiseAdapter,
    ) -> Self {
        let arguments = query.arguments().clone();
        Self {
            artifact: None,
            entity,
            schema,
            query,
            query_name: query_name.into(),
            path: Vec::new(),
            arguments,
            context,
            adapter,
        }
    }

    /// Same info focused on one artifact
    #[must_use]
    pub fn for_artifact(&self, kind: ArtifactKind, name: impl Into<String>) -> Self {
        Self {
            artifact: Some((kind, name.into())),
            ..self.clone()
        }
    }

    /// Same info one link deeper: new entity, nested query, extended path
    #[must_use]
    pub fn descend(&self, link: &str, entity: Arc<Entity>, query: Arc<Query>, arguments: Arguments) -> Self {
        let mut path = self.path.clone();
        path.push(link.to_string());
        Self {
            artifact: None,
            entity,
            query,
            path,
            arguments,
            ..self.clone()
        }
    }

    /// Replace the effective arguments (declared defaults applied)
    #[must_use]
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// Artifact being resolved, if any
    #[must_use]
    pub fn artifact(&self) -> Option<ArtifactRef<'_>> {
        let (kind, name) = self.artifact.as_ref()?;
        self.entity.artifact(*kind, name)
    }

    /// Name of the artifact being resolved
    #[must_use]
    pub fn artifact_name(&self) -> Option<&str> {
        self.artifact.as_ref().map(|(_, name)| name.as_str())
    }

    /// Entity owning the artifact
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Schema being executed against
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Query (or nested link query) being resolved
    #[must_use]
    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    /// Document-level query name
    #[must_use]
    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    /// Link path from the document-level query to the current entity
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Dotted path of `field` below the current entity
    #[must_use]
    pub fn field_path(&self, field: &str) -> String {
        let mut parts: Vec<&str> = self.path.iter().map(String::as_str).collect();
        parts.push(field);
        parts.join(".")
    }

    /// Effective arguments of the current query
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Request context
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Adapter of the running execution, for resolvers returning promises
    #[must_use]
    pub fn adapter(&self) -> &SyncPromiseAdapter {
        &self.adapter
    }
}

impl fmt::Debug for ContextInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextInfo")
            .field("entity", &self.entity.name())
            .field("artifact", &self.artifact)
            .field("query_name", &self.query_name)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::artifact::Attribute;
    use sage_promise::Thenable;
    use serde_json::json;

    fn info() -> ContextInfo {
        let entity = Entity::builder("User")
            .resolve(|_, _| Ok(Thenable::value(json!({}))))
            .attribute(Attribute::property("name"))
            .build()
            .unwrap();
        ContextInfo::new(
            Arc::new(entity),
            Schema::builder().build().unwrap(),
            Arc::new(Query::builder("User").argument("id", 1).build()),
            "u",
            Arc::new(Context::new().with_value("viewer", 9)),
            SyncPromiseAdapter::new(),
        )
    }

    #[test]
    fn test_accessors() {
        let info = info();
        assert_eq!(info.entity().name(), "User");
        assert_eq!(info.query_name(), "u");
        assert_eq!(info.arguments()["id"], json!(1));
        assert_eq!(info.context().get("viewer"), Some(&json!(9)));
        assert!(info.artifact().is_none());
        assert!(info.path().is_empty());
    }

    #[test]
    fn test_for_artifact() {
        let info = info().for_artifact(ArtifactKind::Attribute, "name");
        assert_eq!(info.artifact_name(), Some("name"));
        assert_eq!(info.artifact().map(|a| a.kind()), Some(ArtifactKind::Attribute));
        assert_eq!(info.field_path("name"), "name");
    }

    #[test]
    fn test_descend_extends_path() {
        let base = info();
        let entity = Arc::clone(base.entity());
        let nested = base
            .descend("org", entity, Arc::new(Query::default()), Arguments::new())
            .descend("owner", Arc::clone(base.entity()), Arc::new(Query::default()), Arguments::new());
        assert_eq!(nested.path(), ["org".to_string(), "owner".to_string()]);
        assert_eq!(nested.field_path("title"), "org.owner.title");
        assert_eq!(nested.query_name(), "u");
        assert!(nested.arguments().is_empty());
    }
}
