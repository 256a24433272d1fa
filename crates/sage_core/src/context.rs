//! Value aliases and the request-scoped context handed to resolvers.

use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Arguments of a query or act, by name
pub type Arguments = Map<String, Value>;

/// Value produced by an entity or link resolver and fed to its artifacts
pub type ReferenceValue = Value;

/// Request-scoped context passed to every resolver.
///
/// Holds plain JSON values plus one optional shared extension for
/// application dependencies (connection pools, auth state, ...).
#[derive(Clone, Default)]
pub struct Context {
    values: Map<String, Value>,
    extension: Option<Arc<dyn Any + Send + Sync>>,
}

impl Context {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Attach the typed extension
    #[must_use]
    pub fn with_extension<T: Any + Send + Sync>(mut self, extension: T) -> Self {
        self.extension = Some(Arc::new(extension));
        self
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All values
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Typed extension, if one of type `T` is attached
    #[must_use]
    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extension.as_deref().and_then(|e| e.downcast_ref::<T>())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values)
            .field("extension", &self.extension.is_some())
            .finish()
    }
}
