//! Execution result and its wire shape.

use crate::monitor::Metrics;
use sage_core::{Error, ErrorFormatter};
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Outcome of executing a document.
///
/// `data` is `None` when validation failed. Errors are kept unformatted;
/// the attached [`ErrorFormatter`] decides what reaches the client.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Query name to result map
    pub data: Option<Map<String, Value>>,
    /// Validation or resolution errors
    pub errors: Vec<Error>,
    /// Execution metrics (not serialized)
    pub metrics: Metrics,
    formatter: ErrorFormatter,
}

impl ExecutionResult {
    /// Create a result
    #[must_use]
    pub fn new(data: Option<Map<String, Value>>, errors: Vec<Error>) -> Self {
        Self {
            data,
            errors,
            metrics: Metrics::default(),
            formatter: ErrorFormatter::default(),
        }
    }

    /// Attach metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the formatter used for serialization
    #[must_use]
    pub fn with_formatter(mut self, formatter: ErrorFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Formatter used for serialization
    #[must_use]
    pub fn formatter(&self) -> &ErrorFormatter {
        &self.formatter
    }

    /// Check if any error was collected
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Data of one query
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&Value> {
        self.data.as_ref()?.get(name)
    }

    /// Client-facing JSON: `{"data": ..., "errors": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns the original error when the formatter's rethrow flags apply
    pub fn to_json(&self) -> Result<Value, Error> {
        let mut out = Map::new();
        out.insert(
            "data".to_string(),
            self.data.clone().map_or(Value::Null, Value::Object),
        );
        out.insert(
            "errors".to_string(),
            Value::Array(self.formatter.format_all(&self.errors)?),
        );
        Ok(Value::Object(out))
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let errors = self
            .formatter
            .format_all(&self.errors)
            .map_err(|e| S::Error::custom(e.message()))?;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("data", &self.data)?;
        map.serialize_entry("errors", &errors)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_core::{DebugFlag, ErrorLocation};
    use serde_json::json;

    #[test]
    fn test_data_only() {
        let mut data = Map::new();
        data.insert("u".to_string(), json!({"name": "Doruk"}));
        let result = ExecutionResult::new(Some(data), Vec::new());
        assert_eq!(
            result.to_json().unwrap(),
            json!({"data": {"u": {"name": "Doruk"}}, "errors": []})
        );
        assert_eq!(serde_json::to_value(&result).unwrap(), result.to_json().unwrap());
        assert_eq!(result.query("u"), Some(&json!({"name": "Doruk"})));
    }

    #[test]
    fn test_validation_failure_shape() {
        let error = Error::new("Unknown type \"Ghost\"")
            .with_locations(vec![ErrorLocation::query("a")]);
        let result = ExecutionResult::new(None, vec![error]);
        let out = result.to_json().unwrap();
        assert_eq!(out["data"], Value::Null);
        assert_eq!(out["errors"][0]["message"], json!("Unknown type \"Ghost\""));
        assert_eq!(out["errors"][0]["location"][0]["query"], json!("a"));
        assert!(result.has_errors());
    }

    #[test]
    fn test_internal_errors_masked() {
        let error = Error::internal(std::io::Error::other("db down"));
        let result = ExecutionResult::new(None, vec![error]);
        assert_eq!(result.to_json().unwrap()["errors"][0]["message"], json!("Internal server error"));
    }

    #[test]
    fn test_rethrow_fails_serialization() {
        let error = Error::internal(std::io::Error::other("db down"));
        let result = ExecutionResult::new(None, vec![error])
            .with_formatter(ErrorFormatter::new().with_debug(DebugFlag::RETHROW_INTERNAL));
        assert_eq!(result.to_json().unwrap_err().message(), "db down");
        assert!(serde_json::to_value(&result).is_err());
    }
}
