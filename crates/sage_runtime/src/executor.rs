//! Promise-driven document executor.
//!
//! Every query resolves its entity first, then all requested attributes,
//! the act and the links independently, combined with `all`. Failures are
//! caught per field: the error is located and recorded, the slot becomes
//! null and siblings carry on. Schema errors met on the way are fatal and
//! reject the whole execution.

use crate::monitor::Metrics;
use crate::result::ExecutionResult;
use sage_core::{Context, Error, ErrorLocation};
use sage_promise::{Promise, SyncPromiseAdapter, Thenable};
use sage_query::{Document, Query};
use sage_schema::definition::apply_defaults;
use sage_schema::{ArtifactKind, ContextInfo, Entity, Schema, SchemaError, Type};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

struct ExecutionState {
    schema: Schema,
    context: Arc<Context>,
    adapter: SyncPromiseAdapter,
    errors: RefCell<Vec<Error>>,
    fatal: RefCell<Option<SchemaError>>,
    metrics: RefCell<Metrics>,
}

/// Executes one document on one adapter
#[derive(Clone)]
pub struct Executor {
    state: Rc<ExecutionState>,
}

impl Executor {
    /// Create an executor. Promises are created on `adapter`'s queue.
    #[must_use]
    pub fn new(adapter: SyncPromiseAdapter, schema: Schema, context: Context) -> Self {
        Self {
            state: Rc::new(ExecutionState {
                schema,
                context: Arc::new(context),
                adapter,
                errors: RefCell::new(Vec::new()),
                fatal: RefCell::new(None),
                metrics: RefCell::new(Metrics::new()),
            }),
        }
    }

    /// Execute `document` without validating it.
    ///
    /// The promise fulfills with the result, or rejects with an internal
    /// error wrapping the [`SchemaError`] that stopped execution.
    pub fn execute(&self, document: &Document) -> Promise<ExecutionResult> {
        tracing::debug!(queries = document.len(), "execution started");
        let ticks_before = self.state.adapter.queue().ticks();

        let names: Vec<String> = document.queries().iter().map(|(name, _)| name.clone()).collect();
        let items = document
            .queries()
            .iter()
            .map(|(name, query)| Thenable::Promise(self.execute_query(name, query)))
            .collect();

        let state = Rc::clone(&self.state);
        self.state.adapter.all(items).then(move |values| {
            if let Some(fatal) = state.fatal.borrow_mut().take() {
                tracing::debug!(error = %fatal, "execution aborted");
                return Err(Error::internal(fatal));
            }
            let mut data = Map::new();
            for (name, value) in names.into_iter().zip(values) {
                data.insert(name, value);
            }
            let errors: Vec<Error> = state.errors.borrow_mut().drain(..).collect();
            let mut metrics = state.metrics.borrow().clone();
            metrics.record_ticks(state.adapter.queue().ticks() - ticks_before);
            tracing::debug!(
                queries = metrics.queries_executed,
                fields = metrics.fields_executed,
                failed = metrics.fields_failed,
                failure_rate = metrics.failure_rate(),
                ticks = metrics.total_ticks,
                "execution finished"
            );
            Ok(ExecutionResult::new(Some(data), errors).with_metrics(metrics))
        })
    }

    fn schema(&self) -> &Schema {
        &self.state.schema
    }

    fn adapter(&self) -> &SyncPromiseAdapter {
        &self.state.adapter
    }

    fn null(&self) -> Promise<Value> {
        self.adapter().create_fulfilled(Value::Null)
    }

    /// Record a fatal schema error; the returned error nulls the current slot.
    fn fatal(&self, err: SchemaError) -> Error {
        let error = Error::internal(err.clone());
        let mut fatal = self.state.fatal.borrow_mut();
        if fatal.is_none() {
            *fatal = Some(err);
        }
        error
    }

    fn fail(&self, error: Error, location: ErrorLocation) {
        tracing::debug!(location = %location, error = %error.message(), "resolution failed");
        self.state.errors.borrow_mut().push(Error::located(error, vec![location]));
    }

    fn execute_query(&self, name: &str, query: &Arc<Query>) -> Promise<Value> {
        self.state.metrics.borrow_mut().record_query();
        let location = ErrorLocation::query(name);

        let entity = match self.root_entity(query) {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                let type_name = query.type_name().unwrap_or_default();
                self.fail(Error::new(format!("Unknown entity type \"{}\"", type_name)), location);
                return self.null();
            }
            Err(err) => {
                self.fatal(err);
                return self.null();
            }
        };

        let arguments = apply_defaults(entity.arguments(), query.arguments());
        let info = ContextInfo::new(
            Arc::clone(&entity),
            self.schema().clone(),
            Arc::clone(query),
            name,
            Arc::clone(&self.state.context),
            self.adapter().clone(),
        )
        .with_arguments(arguments);

        let resolved = guarded(|| entity.resolve(query.arguments(), &self.state.context));
        let reference = match resolved {
            Ok(thenable) => self.adapter().adopt(guard_deferred(thenable)),
            Err(error) => self.adapter().create_rejected(error),
        };

        let exec = self.clone();
        let on_error = self.clone();
        reference
            .and_then(move |reference| Ok(Thenable::Promise(exec.complete_entity(info, reference))))
            .catch(move |error| {
                on_error.fail(error, location);
                Ok(Value::Null)
            })
    }

    fn root_entity(&self, query: &Query) -> Result<Option<Arc<Entity>>, SchemaError> {
        let Some(type_name) = query.type_name() else {
            return Ok(None);
        };
        Ok(match self.schema().get_type(type_name)? {
            Some(Type::Entity(entity)) => Some(entity),
            _ => None,
        })
    }

    /// Resolve every requested artifact of `info`'s query on `reference`.
    fn complete_entity(&self, info: ContextInfo, reference: Value) -> Promise<Value> {
        let query = Arc::clone(info.query());
        let mut keys: Vec<String> = Vec::new();
        let mut items: Vec<Thenable<Value>> = Vec::new();

        for name in query.attributes() {
            keys.push(name.clone());
            items.push(Thenable::Promise(self.resolve_attribute(&info, name, &reference)));
        }
        if let Some(name) = query.act() {
            keys.push(name.to_string());
            items.push(Thenable::Promise(self.perform_act(&info, name, &reference)));
        }
        for (name, nested) in query.links() {
            keys.push(name.clone());
            items.push(Thenable::Promise(self.resolve_link(&info, name, nested, &reference)));
        }

        self.adapter()
            .all(items)
            .then(move |values| Ok(Value::Object(keys.into_iter().zip(values).collect())))
    }

    fn resolve_attribute(&self, info: &ContextInfo, name: &str, reference: &Value) -> Promise<Value> {
        let location = field_location(info, name, ArtifactKind::Attribute);
        let Some(attribute) = info.entity().attribute(name).cloned() else {
            let message = format!("Entity \"{}\" has no attribute \"{}\"", info.entity().name(), name);
            self.fail(Error::new(message), location);
            return self.null();
        };

        let field_info = info.for_artifact(ArtifactKind::Attribute, name);
        let resolved = guarded(|| attribute.resolve(reference, &field_info));
        let exec = self.clone();
        self.settle_field(location, resolved, move |value| {
            let value = match attribute.type_ref() {
                Some(type_ref) => {
                    let output = type_ref.resolve(exec.schema()).map_err(|e| exec.fatal(e))?;
                    output
                        .serialize_value(&value, exec.schema())
                        .map_err(|e| exec.fatal(e))??
                }
                None => value,
            };
            attribute.check_rule(&value)?;
            Ok(Thenable::value(value))
        })
    }

    fn perform_act(&self, info: &ContextInfo, name: &str, reference: &Value) -> Promise<Value> {
        let location = field_location(info, name, ArtifactKind::Act);
        let Some(act) = info.entity().act(name) else {
            let message = format!("Entity \"{}\" has no act \"{}\"", info.entity().name(), name);
            self.fail(Error::new(message), location);
            return self.null();
        };

        let resolved = guarded(|| act.perform(reference, info.query().arguments()));
        self.settle_field(location, resolved, |value| Ok(Thenable::value(value)))
    }

    fn resolve_link(
        &self,
        info: &ContextInfo,
        name: &str,
        nested: &Arc<Query>,
        reference: &Value,
    ) -> Promise<Value> {
        let location = field_location(info, name, ArtifactKind::Link);
        let entity = info.entity();
        let Some(link) = entity.link(name) else {
            let message = format!("Entity \"{}\" has no link \"{}\"", entity.name(), name);
            self.fail(Error::new(message), location);
            return self.null();
        };
        let target = match link.links_to(entity.name(), self.schema()) {
            Ok(Type::Entity(target)) => target,
            Ok(_) => return self.null(),
            Err(err) => {
                self.fatal(err);
                return self.null();
            }
        };

        let arguments = apply_defaults(link.arguments(), nested.arguments());
        let field_info = info
            .for_artifact(ArtifactKind::Link, name)
            .with_arguments(arguments.clone());
        let nested_info = info.descend(name, target, Arc::clone(nested), arguments);

        let resolved = guarded(|| link.resolve(reference, &field_info));
        let exec = self.clone();
        self.settle_field(location, resolved, move |linked| Ok(exec.complete_linked(nested_info, linked)))
    }

    /// A linked reference may be null, a single reference or a list of them.
    fn complete_linked(&self, info: ContextInfo, linked: Value) -> Thenable<Value> {
        match linked {
            Value::Null => Thenable::value(Value::Null),
            Value::Array(references) => {
                let items = references
                    .into_iter()
                    .map(|reference| Thenable::Promise(self.complete_entity(info.clone(), reference)))
                    .collect();
                Thenable::Promise(self.adapter().all(items).then(|values| Ok(Value::Array(values))))
            }
            reference => Thenable::Promise(self.complete_entity(info, reference)),
        }
    }

    /// Adopt a resolver's outcome, complete it, and turn any failure into a
    /// located error with a null slot.
    fn settle_field<F>(
        &self,
        location: ErrorLocation,
        resolved: Result<Thenable<Value>, Error>,
        complete: F,
    ) -> Promise<Value>
    where
        F: FnOnce(Value) -> Result<Thenable<Value>, Error> + 'static,
    {
        self.state.metrics.borrow_mut().record_execution();
        let promise = match resolved {
            Ok(thenable) => self.adapter().adopt(guard_deferred(thenable)),
            Err(error) => self.adapter().create_rejected(error),
        };

        let on_success = self.clone();
        let on_failure = self.clone();
        promise
            .and_then(move |value| guarded(move || complete(value)))
            .then_or_else(
                move |value| {
                    on_success.state.metrics.borrow_mut().record_completion();
                    Ok(value)
                },
                move |error| {
                    on_failure.state.metrics.borrow_mut().record_failure();
                    on_failure.fail(error, location);
                    Ok(Value::Null)
                },
            )
    }
}

fn field_location(info: &ContextInfo, name: &str, kind: ArtifactKind) -> ErrorLocation {
    ErrorLocation::field(info.query_name(), info.field_path(name)).with_meta("kind", kind.as_str())
}

/// Run a resolver, converting a panic into an internal error
fn guarded<T>(f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Error::from_panic(payload.as_ref())),
    }
}

fn guard_deferred<T: 'static>(thenable: Thenable<T>) -> Thenable<T> {
    match thenable {
        Thenable::Deferred(compute) => Thenable::deferred(move || guarded(compute)),
        other => other,
    }
}
