//! Core error types for Sage.
//!
//! Every failure that can reach a client is an [`Error`]. It carries the
//! locations it applies to, a [`Category`], and a client-safety flag that
//! decides whether the message may be shown to the client.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::Arc;

static FRAME_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+: (.+)$").unwrap_or_else(|e| panic!("frame pattern: {}", e))
});

/// Symbols of frames that belong to the engine rather than to resolvers
const INTERNAL_FRAMES: &[&str] = &[
    "std::backtrace",
    "sage_core::error",
    "sage_promise::",
    "sage_runtime::executor",
];

/// Core result type
pub type CoreResult<T> = Result<T, Error>;

/// Error category reported under `meta.category`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Raised by the engine itself (validation, coercion, located errors)
    Sage,
    /// Unexpected failure; never shown to clients unless debugging
    Internal,
    /// Raised deliberately by application code for the client
    User,
}

impl Category {
    /// Wire name of the category
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sage => "sage",
            Self::Internal => "internal",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know whether their message is safe for clients.
pub trait ClientAware {
    /// Whether the message may be returned to the client verbatim
    fn is_client_safe(&self) -> bool;

    /// Category reported to the client
    fn category(&self) -> Category;
}

/// Error raised by application code with a message meant for the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UserError {
    message: String,
}

impl UserError {
    /// Create a new user error
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ClientAware for UserError {
    fn is_client_safe(&self) -> bool {
        true
    }

    fn category(&self) -> Category {
        Category::User
    }
}

/// Broken internal invariant. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invariant violation: {0}")]
pub struct InvariantViolation(pub String);

/// Where in a document an error applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLocation {
    /// Document-level query name
    pub query: String,
    /// Field path inside the query (dotted for nested links)
    pub field: Option<String>,
    /// Extra location details (e.g. artifact kind)
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ErrorLocation {
    /// Location of a whole query
    #[must_use]
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            field: None,
            meta: Map::new(),
        }
    }

    /// Location of a field inside a query
    #[must_use]
    pub fn field(query: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            field: Some(field.into()),
            meta: Map::new(),
        }
    }

    /// Attach a meta entry
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}", self.query, field),
            None => f.write_str(&self.query),
        }
    }
}

/// Client-facing error
///
/// Created by the engine for validation and coercion failures (category
/// `sage`, safe), from [`UserError`] (category `user`, safe), or from any
/// other failure via [`Error::internal`] (category `internal`, unsafe).
#[derive(Clone)]
pub struct Error {
    message: String,
    locations: Vec<ErrorLocation>,
    category: Category,
    client_safe: bool,
    meta: Map<String, Value>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    backtrace: Arc<Backtrace>,
}

impl Error {
    /// Create an engine error. Client-safe, category `sage`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::build(message.into(), Category::Sage, true, None)
    }

    /// Create a client-safe error of category `user`
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::build(message.into(), Category::User, true, None)
    }

    /// Wrap an unexpected failure. Unsafe, category `internal`.
    #[must_use]
    pub fn internal<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = source.to_string();
        Self::build(message, Category::Internal, false, Some(Arc::new(source)))
    }

    /// Create an error caused by `previous`, inheriting its category and safety.
    #[must_use]
    pub fn caused_by(message: impl Into<String>, previous: Error) -> Self {
        let category = previous.category;
        let client_safe = previous.client_safe;
        Self::build(message.into(), category, client_safe, Some(Arc::new(previous)))
    }

    /// Convert a panic payload caught around a resolver
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::build(
            format!("Resolver panicked: {}", detail),
            Category::Internal,
            false,
            None,
        )
    }

    /// Re-wrap an error with locations. Category and safety are preserved.
    ///
    /// Locations already attached to `error` are kept.
    #[must_use]
    pub fn located(error: Error, locations: Vec<ErrorLocation>) -> Self {
        if !error.locations.is_empty() {
            return error;
        }
        Self { locations, ..error }
    }

    fn build(
        message: String,
        category: Category,
        client_safe: bool,
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message,
            locations: Vec::new(),
            category,
            client_safe,
            meta: Map::new(),
            source,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Attach locations
    #[must_use]
    pub fn with_locations(mut self, locations: Vec<ErrorLocation>) -> Self {
        self.locations = locations;
        self
    }

    /// Attach a meta entry
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Internal message (always the real one)
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Locations this error applies to
    #[must_use]
    pub fn locations(&self) -> &[ErrorLocation] {
        &self.locations
    }

    /// Extra metadata
    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Underlying cause, if any
    #[must_use]
    pub fn previous(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Backtrace lines captured at construction, empty when capture is disabled
    #[must_use]
    pub fn trace(&self) -> Vec<String> {
        if self.backtrace.status() != BacktraceStatus::Captured {
            return Vec::new();
        }
        strip_internal_frames(&self.backtrace.to_string())
    }

    /// JSON shape: `{message, location?, meta?}` with the real message.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("message".to_string(), Value::String(self.message.clone()));
        if !self.locations.is_empty() {
            out.insert(
                "location".to_string(),
                serde_json::to_value(&self.locations).unwrap_or(Value::Null),
            );
        }
        if !self.meta.is_empty() {
            out.insert("meta".to_string(), Value::Object(self.meta.clone()));
        }
        Value::Object(out)
    }
}

/// Drop whole frames (symbol line plus its `at` lines) whose symbol is internal.
fn strip_internal_frames(backtrace: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut keep = true;
    for line in backtrace.lines() {
        if let Some(caps) = FRAME_HEADER.captures(line) {
            let symbol = caps.get(1).map_or("", |m| m.as_str());
            keep = !INTERNAL_FRAMES.iter().any(|internal| symbol.contains(internal));
        }
        let line = line.trim();
        if keep && !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

impl ClientAware for Error {
    fn is_client_safe(&self) -> bool {
        self.client_safe
    }

    fn category(&self) -> Category {
        self.category
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("message", &self.message)
            .field("locations", &self.locations)
            .field("category", &self.category)
            .field("client_safe", &self.client_safe)
            .field("meta", &self.meta)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<UserError> for Error {
    fn from(err: UserError) -> Self {
        Self::build(err.message.clone(), Category::User, true, Some(Arc::new(err)))
    }
}

impl From<InvariantViolation> for Error {
    fn from(err: InvariantViolation) -> Self {
        Self::internal(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err)
    }
}
