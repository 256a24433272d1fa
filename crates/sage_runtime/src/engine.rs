//! Execution facade.
//!
//! Validates a document, runs it on a promise adapter and hands back the
//! result. Validation failures produce a result with `data: null`; broken
//! schemas and stalled promises are returned as [`SageError`].

use crate::executor::Executor;
use crate::result::ExecutionResult;
use sage_core::{Context, DebugFlag, Error, ErrorFormatter, InvariantViolation};
use sage_promise::{Promise, SyncPromiseAdapter, WaitError};
use sage_query::Document;
use sage_schema::{Schema, SchemaError};
use sage_validate::DocumentValidator;
use serde::{Deserialize, Serialize};

/// Execution options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Debug flags for error formatting
    pub debug: DebugFlag,
    /// Message shown in place of unsafe errors
    pub internal_error_message: Option<String>,
    /// Execute without validating the document first
    pub skip_validation: bool,
}

impl ExecutionOptions {
    /// Default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set debug flags
    #[must_use]
    pub fn with_debug(mut self, debug: DebugFlag) -> Self {
        self.debug = debug;
        self
    }

    /// Override the internal error message
    #[must_use]
    pub fn with_internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = Some(message.into());
        self
    }

    /// Skip document validation
    #[must_use]
    pub fn with_skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    /// Formatter configured from these options
    #[must_use]
    pub fn formatter(&self) -> ErrorFormatter {
        let formatter = ErrorFormatter::new().with_debug(self.debug);
        match &self.internal_error_message {
            Some(message) => formatter.with_internal_error_message(message.clone()),
            None => formatter,
        }
    }
}

/// Fatal execution error
#[derive(Debug, Clone, thiserror::Error)]
pub enum SageError {
    /// Broken schema
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Broken engine invariant
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    /// Execution rejected for any other reason
    #[error("{0}")]
    Internal(Error),
}

impl SageError {
    /// Classify the error an execution promise was rejected with
    #[must_use]
    pub fn from_rejection(error: Error) -> Self {
        let schema = error
            .previous()
            .and_then(|cause| cause.downcast_ref::<SchemaError>())
            .cloned();
        match schema {
            Some(schema) => Self::Schema(schema),
            None => Self::Internal(error),
        }
    }
}

impl From<WaitError> for SageError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Rejected(error) => Self::from_rejection(error),
            WaitError::Stalled => {
                Self::Invariant(InvariantViolation("Could not resolve promise".to_string()))
            }
        }
    }
}

/// Sage result type
pub type SageResult<T> = Result<T, SageError>;

/// Entry point for executing documents
pub struct Sage;

impl Sage {
    /// Validate and execute `document`, blocking until the result is ready.
    ///
    /// # Errors
    ///
    /// Returns error if the schema is broken or the execution stalls
    pub fn execute(
        schema: &Schema,
        document: &Document,
        context: Context,
        options: &ExecutionOptions,
    ) -> SageResult<ExecutionResult> {
        let adapter = SyncPromiseAdapter::new();
        let promise = Self::promise_to_execute(&adapter, schema, document, context, options);
        Ok(adapter.wait(&promise)?)
    }

    /// Validate `document` and return a promise of its result on `adapter`.
    ///
    /// The promise is fulfilled with a `data: null` result when validation
    /// fails. It is rejected with an internal error wrapping the
    /// [`SchemaError`] when the schema turns out to be broken.
    pub fn promise_to_execute(
        adapter: &SyncPromiseAdapter,
        schema: &Schema,
        document: &Document,
        context: Context,
        options: &ExecutionOptions,
    ) -> Promise<ExecutionResult> {
        let formatter = options.formatter();

        if !options.skip_validation {
            match DocumentValidator::new().validate(schema, document) {
                Ok(errors) if !errors.is_empty() => {
                    tracing::debug!(errors = errors.len(), "document rejected by validation");
                    return adapter
                        .create_fulfilled(ExecutionResult::new(None, errors).with_formatter(formatter));
                }
                Ok(_) => {}
                Err(err) => return adapter.create_rejected(Error::internal(err)),
            }
        }

        Executor::new(adapter.clone(), schema.clone(), context)
            .execute(document)
            .then(move |result| Ok(result.with_formatter(formatter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_promise::Thenable;
    use sage_query::Query;
    use sage_schema::{Argument, Attribute, Entity, LoadedType, Type};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn schema(calls: Arc<AtomicUsize>) -> Schema {
        let failing = Arc::clone(&calls);
        let user = Entity::builder("User")
            .argument(Argument::new("id", Type::non_null(Type::id()).unwrap()))
            .resolve(move |args, context| {
                calls.fetch_add(1, Ordering::SeqCst);
                let viewer = context.get("viewer").cloned().unwrap_or_default();
                Ok(Thenable::value(json!({"id": args["id"], "name": "Doruk", "viewer": viewer})))
            })
            .attribute(Attribute::property("name").with_type(Type::string()))
            .attribute(Attribute::property("viewer"))
            .attribute(Attribute::new("secret", move |_, _| {
                failing.fetch_add(1, Ordering::SeqCst);
                Err(Error::internal(std::io::Error::other("db down")))
            }))
            .build()
            .unwrap();
        Schema::builder().add_type(Type::entity(user)).build().unwrap()
    }

    fn user_query() -> sage_query::QueryBuilder {
        Query::builder("User").argument("id", 1)
    }

    #[test]
    fn test_execute_round_trip() {
        let schema = schema(Arc::new(AtomicUsize::new(0)));
        let document = Document::new().with_query("u", user_query().attribute("name").attribute("viewer").build());
        let context = Context::new().with_value("viewer", "ada");
        let result = Sage::execute(&schema, &document, context, &ExecutionOptions::new()).unwrap();
        assert_eq!(
            result.to_json().unwrap(),
            json!({"data": {"u": {"name": "Doruk", "viewer": "ada"}}, "errors": []})
        );
    }

    #[test]
    fn test_validation_gates_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = schema(Arc::clone(&calls));
        let document = Document::new()
            .with_query("u", Query::builder("User").attribute("name").build())
            .with_query("v", user_query().attribute("nope").build());
        let result = Sage::execute(&schema, &document, Context::new(), &ExecutionOptions::new()).unwrap();
        assert!(result.data.is_none());
        assert_eq!(result.errors.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.to_json().unwrap()["data"], serde_json::Value::Null);
    }

    #[test]
    fn test_skip_validation_runs_resolvers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = schema(Arc::clone(&calls));
        let document = Document::new().with_query("u", user_query().attribute("nope").build());
        let options = ExecutionOptions::new().with_skip_validation(true);
        let result = Sage::execute(&schema, &document, Context::new(), &options).unwrap();
        assert_eq!(result.query("u"), Some(&json!({"nope": null})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_internal_errors_are_masked_unless_debugging() {
        let schema = schema(Arc::new(AtomicUsize::new(0)));
        let document = Document::new().with_query("u", user_query().attribute("secret").build());

        let result = Sage::execute(&schema, &document, Context::new(), &ExecutionOptions::new()).unwrap();
        let out = result.to_json().unwrap();
        assert_eq!(out["data"], json!({"u": {"secret": null}}));
        assert_eq!(out["errors"][0]["message"], json!("Internal server error"));
        assert_eq!(out["errors"][0]["meta"]["category"], json!("internal"));

        let options = ExecutionOptions::new().with_debug(DebugFlag::INCLUDE_DEBUG_MESSAGE);
        let result = Sage::execute(&schema, &document, Context::new(), &options).unwrap();
        let out = result.to_json().unwrap();
        let first_key = out["errors"][0].as_object().unwrap().keys().next().cloned();
        assert_eq!(first_key.as_deref(), Some("debugMessage"));
        assert_eq!(out["errors"][0]["debugMessage"], json!("db down"));

        let options = ExecutionOptions::new().with_internal_error_message("Oops");
        let result = Sage::execute(&schema, &document, Context::new(), &options).unwrap();
        assert_eq!(result.to_json().unwrap()["errors"][0]["message"], json!("Oops"));
    }

    #[test]
    fn test_schema_errors_are_fatal() {
        let schema = Schema::builder()
            .type_loader(|_| {
                let org = Entity::builder("Org")
                    .resolve(|_, _| Ok(Thenable::value(json!({}))))
                    .build()
                    .ok()?;
                Some(LoadedType::from(Type::entity(org)))
            })
            .build()
            .unwrap();
        let document = Document::new().with_query("u", Query::builder("User").build());
        let result = Sage::execute(&schema, &document, Context::new(), &ExecutionOptions::new());
        assert!(matches!(
            result,
            Err(SageError::Schema(SchemaError::TypeNameMismatch { .. }))
        ));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ExecutionOptions = serde_json::from_value(json!({"debug": 3})).unwrap();
        assert_eq!(
            options,
            ExecutionOptions::new().with_debug(DebugFlag::INCLUDE_DEBUG_MESSAGE | DebugFlag::INCLUDE_TRACE)
        );
        assert!(!options.skip_validation);
    }

    #[test]
    fn test_stalled_wait_maps_to_invariant() {
        let err = SageError::from(WaitError::Stalled);
        assert_eq!(err.to_string(), "Invariant violation: Could not resolve promise");
    }
}
