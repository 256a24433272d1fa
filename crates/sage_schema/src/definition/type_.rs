//! Type handles, lazy references and wrapping types.

use crate::definition::entity::Entity;
use crate::definition::scalar::{self, ScalarType};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::Schema;
use once_cell::sync::{Lazy, OnceCell};
use sage_core::Error;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

static STRING: Lazy<Type> = Lazy::new(|| Type::Scalar(Arc::new(ScalarType::string())));
static INT: Lazy<Type> = Lazy::new(|| Type::Scalar(Arc::new(ScalarType::int())));
static FLOAT: Lazy<Type> = Lazy::new(|| Type::Scalar(Arc::new(ScalarType::float())));
static BOOLEAN: Lazy<Type> = Lazy::new(|| Type::Scalar(Arc::new(ScalarType::boolean())));
static ID: Lazy<Type> = Lazy::new(|| Type::Scalar(Arc::new(ScalarType::id())));

/// Result of a value coercion: the coerced value or a located-later error
pub type Coercion = Result<Value, Error>;

/// Shared handle to a type definition.
///
/// Cloning is cheap; two handles are the same type iff [`Type::is_same`].
#[derive(Clone)]
pub enum Type {
    /// Leaf value
    Scalar(Arc<ScalarType>),
    /// Composite type with attributes, acts and links
    Entity(Arc<Entity>),
    /// Non-nullable wrapper
    NonNull(Arc<NonNull>),
    /// List wrapper
    ListOf(Arc<ListOf>),
}

impl Type {
    /// Built-in `String`
    #[must_use]
    pub fn string() -> Type {
        STRING.clone()
    }

    /// Built-in `Int`
    #[must_use]
    pub fn int() -> Type {
        INT.clone()
    }

    /// Built-in `Float`
    #[must_use]
    pub fn float() -> Type {
        FLOAT.clone()
    }

    /// Built-in `Boolean`
    #[must_use]
    pub fn boolean() -> Type {
        BOOLEAN.clone()
    }

    /// Built-in `ID`
    #[must_use]
    pub fn id() -> Type {
        ID.clone()
    }

    /// All built-in scalars
    #[must_use]
    pub fn standard_types() -> Vec<Type> {
        vec![Self::string(), Self::int(), Self::float(), Self::boolean(), Self::id()]
    }

    /// Check if `name` is a built-in scalar name
    #[must_use]
    pub fn is_standard_name(name: &str) -> bool {
        matches!(
            name,
            scalar::STRING | scalar::INT | scalar::FLOAT | scalar::BOOLEAN | scalar::ID
        )
    }

    /// Wrap a custom scalar
    #[must_use]
    pub fn scalar(scalar: ScalarType) -> Type {
        Type::Scalar(Arc::new(scalar))
    }

    /// Wrap an entity
    #[must_use]
    pub fn entity(entity: Entity) -> Type {
        Type::Entity(Arc::new(entity))
    }

    /// Non-null wrapper.
    ///
    /// # Errors
    ///
    /// Returns error if `of_type` is already non-null
    pub fn non_null(of_type: impl Into<TypeRef>) -> SchemaResult<Type> {
        NonNull::new(of_type).map(|n| Type::NonNull(Arc::new(n)))
    }

    /// List wrapper
    #[must_use]
    pub fn list_of(of_type: impl Into<TypeRef>) -> Type {
        Type::ListOf(Arc::new(ListOf::new(of_type)))
    }

    /// Name of a named type; `None` for wrappers
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s.name()),
            Self::Entity(e) => Some(e.name()),
            Self::NonNull(_) | Self::ListOf(_) => None,
        }
    }

    /// Identity comparison
    #[must_use]
    pub fn is_same(&self, other: &Type) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Arc::ptr_eq(a, b),
            (Self::Entity(a), Self::Entity(b)) => Arc::ptr_eq(a, b),
            (Self::NonNull(a), Self::NonNull(b)) => Arc::ptr_eq(a, b),
            (Self::ListOf(a), Self::ListOf(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Entity behind this handle, if it is one
    #[must_use]
    pub fn as_entity(&self) -> Option<&Arc<Entity>> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// Scalar behind this handle, if it is one
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Arc<ScalarType>> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this is a wrapper
    #[must_use]
    pub fn is_wrapping(&self) -> bool {
        matches!(self, Self::NonNull(_) | Self::ListOf(_))
    }

    /// Strip every wrapper.
    ///
    /// # Errors
    ///
    /// Returns error if a lazy inner type cannot be resolved
    pub fn named_type(&self, schema: &Schema) -> SchemaResult<Type> {
        match self {
            Self::NonNull(n) => n.of_type(schema)?.named_type(schema),
            Self::ListOf(l) => l.of_type(schema)?.named_type(schema),
            _ => Ok(self.clone()),
        }
    }

    /// Complete a resolved value for output: non-null check, list mapping
    /// and scalar serialization. Entities pass values through.
    ///
    /// # Errors
    ///
    /// Returns error if a lazy inner type cannot be resolved
    pub fn serialize_value(&self, value: &Value, schema: &Schema) -> SchemaResult<Coercion> {
        match self {
            Self::NonNull(n) => {
                if value.is_null() {
                    return Ok(Err(Error::new(format!(
                        "Cannot return null for non-nullable type {}",
                        self
                    ))));
                }
                n.of_type(schema)?.serialize_value(value, schema)
            }
            _ if value.is_null() => Ok(Ok(Value::Null)),
            Self::ListOf(l) => {
                let Value::Array(items) = value else {
                    return Ok(Err(Error::new(format!(
                        "Expected a list for type {} but got: {}",
                        self, value
                    ))));
                };
                let inner = l.of_type(schema)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match inner.serialize_value(item, schema)? {
                        Ok(v) => out.push(v),
                        Err(e) => return Ok(Err(e)),
                    }
                }
                Ok(Ok(Value::Array(out)))
            }
            Self::Scalar(s) => Ok(s.serialize(value)),
            Self::Entity(_) => Ok(Ok(value.clone())),
        }
    }

    /// Coerce a client-supplied value for input.
    ///
    /// # Errors
    ///
    /// Returns error if a lazy inner type cannot be resolved
    pub fn parse_value(&self, value: &Value, schema: &Schema) -> SchemaResult<Coercion> {
        match self {
            Self::NonNull(n) => {
                if value.is_null() {
                    return Ok(Err(Error::new(format!(
                        "Expected non-nullable type {} not to be null",
                        self
                    ))));
                }
                n.of_type(schema)?.parse_value(value, schema)
            }
            _ if value.is_null() => Ok(Ok(Value::Null)),
            Self::ListOf(l) => {
                let inner = l.of_type(schema)?;
                // A single item is accepted where a list is expected.
                let Value::Array(items) = value else {
                    return Ok(inner
                        .parse_value(value, schema)?
                        .map(|v| Value::Array(vec![v])));
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match inner.parse_value(item, schema)? {
                        Ok(v) => out.push(v),
                        Err(e) => return Ok(Err(e)),
                    }
                }
                Ok(Ok(Value::Array(out)))
            }
            Self::Scalar(s) => Ok(s.parse_value(value)),
            Self::Entity(e) => Ok(Err(Error::new(format!(
                "Entity {} cannot be used as an input type",
                e.name()
            )))),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s.name()),
            Self::Entity(e) => f.write_str(e.name()),
            Self::NonNull(n) => write!(f, "{}!", n.of_type_ref()),
            Self::ListOf(l) => write!(f, "[{}]", l.of_type_ref()),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self)
    }
}

/// Thunk producing a type on first use
pub struct LazyType {
    thunk: Box<dyn Fn() -> Type + Send + Sync>,
    resolved: OnceCell<Type>,
}

impl LazyType {
    /// Resolve, invoking the thunk at most once
    #[must_use]
    pub fn get(&self) -> &Type {
        self.resolved.get_or_init(|| (self.thunk)())
    }
}

/// Reference to a type: direct, by name, or through a lazy thunk.
///
/// Named and lazy references let entities refer to each other cyclically.
#[derive(Clone)]
pub enum TypeRef {
    /// Direct handle
    Type(Type),
    /// Looked up in the schema on use
    Named(String),
    /// Produced by a thunk on first use
    Lazy(Arc<LazyType>),
}

impl TypeRef {
    /// Lazy reference
    #[must_use]
    pub fn lazy<F>(thunk: F) -> Self
    where
        F: Fn() -> Type + Send + Sync + 'static,
    {
        Self::Lazy(Arc::new(LazyType {
            thunk: Box::new(thunk),
            resolved: OnceCell::new(),
        }))
    }

    /// Named reference
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Resolve to a type handle.
    ///
    /// # Errors
    ///
    /// Returns error if a named reference is unknown to the schema
    pub fn resolve(&self, schema: &Schema) -> SchemaResult<Type> {
        match self {
            Self::Type(t) => Ok(t.clone()),
            Self::Named(name) => schema
                .get_type(name)?
                .ok_or_else(|| SchemaError::UnknownType { name: name.clone() }),
            Self::Lazy(lazy) => Ok(lazy.get().clone()),
        }
    }

    /// Handle if it is available without a schema lookup
    #[must_use]
    pub fn resolved(&self) -> Option<Type> {
        match self {
            Self::Type(t) => Some(t.clone()),
            Self::Named(_) => None,
            Self::Lazy(lazy) => lazy.resolved.get().cloned(),
        }
    }
}

impl From<Type> for TypeRef {
    fn from(t: Type) -> Self {
        Self::Type(t)
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => write!(f, "{}", t),
            Self::Named(name) => f.write_str(name),
            Self::Lazy(lazy) => match lazy.resolved.get() {
                Some(t) => write!(f, "{}", t),
                None => f.write_str("<lazy>"),
            },
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self)
    }
}

/// Non-nullable wrapper. Never wraps another `NonNull`.
pub struct NonNull {
    of_type: TypeRef,
}

impl NonNull {
    /// Wrap a type.
    ///
    /// # Errors
    ///
    /// Returns error if the wrapped type is already non-null
    pub fn new(of_type: impl Into<TypeRef>) -> SchemaResult<Self> {
        let of_type = of_type.into();
        if let Some(t @ Type::NonNull(_)) = of_type.resolved() {
            return Err(SchemaError::DoubleNonNull {
                found: t.to_string(),
            });
        }
        Ok(Self { of_type })
    }

    /// Wrapped type.
    ///
    /// # Errors
    ///
    /// Returns error if it cannot be resolved or turns out to be non-null
    pub fn of_type(&self, schema: &Schema) -> SchemaResult<Type> {
        let inner = self.of_type.resolve(schema)?;
        if let Type::NonNull(_) = inner {
            return Err(SchemaError::DoubleNonNull {
                found: inner.to_string(),
            });
        }
        Ok(inner)
    }

    /// Unresolved wrapped reference
    #[must_use]
    pub fn of_type_ref(&self) -> &TypeRef {
        &self.of_type
    }
}

/// List wrapper
pub struct ListOf {
    of_type: TypeRef,
}

impl ListOf {
    /// Wrap a type
    #[must_use]
    pub fn new(of_type: impl Into<TypeRef>) -> Self {
        Self {
            of_type: of_type.into(),
        }
    }

    /// Item type.
    ///
    /// # Errors
    ///
    /// Returns error if it cannot be resolved
    pub fn of_type(&self, schema: &Schema) -> SchemaResult<Type> {
        self.of_type.resolve(schema)
    }

    /// Unresolved item reference
    #[must_use]
    pub fn of_type_ref(&self) -> &TypeRef {
        &self.of_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema() -> Schema {
        Schema::builder().build().unwrap()
    }

    #[test]
    fn test_standard_types_are_singletons() {
        assert!(Type::string().is_same(&Type::string()));
        assert!(!Type::string().is_same(&Type::int()));
        assert_eq!(Type::standard_types().len(), 5);
        assert!(Type::is_standard_name("ID"));
        assert!(!Type::is_standard_name("User"));
    }

    #[test]
    fn test_double_non_null_rejected() {
        let nn = Type::non_null(Type::int()).unwrap();
        assert!(matches!(
            Type::non_null(nn),
            Err(SchemaError::DoubleNonNull { .. })
        ));
    }

    #[test]
    fn test_lazy_double_non_null_rejected_on_resolve() {
        let wrapped = NonNull::new(TypeRef::lazy(|| Type::non_null(Type::int()).unwrap())).unwrap();
        assert!(matches!(
            wrapped.of_type(&schema()),
            Err(SchemaError::DoubleNonNull { .. })
        ));
    }

    #[test]
    fn test_display() {
        let t = Type::non_null(Type::list_of(Type::non_null(Type::string()).unwrap())).unwrap();
        assert_eq!(t.to_string(), "[String!]!");
        assert_eq!(Type::list_of("User").to_string(), "[User]");
    }

    #[test]
    fn test_lazy_thunk_runs_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let lazy = TypeRef::lazy(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Type::int()
        });
        assert!(lazy.resolved().is_none());
        let schema = schema();
        let a = lazy.resolve(&schema).unwrap();
        let b = lazy.resolve(&schema).unwrap();
        assert!(a.is_same(&b));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_named_ref_resolves_through_schema() {
        let schema = schema();
        assert!(TypeRef::named("Int").resolve(&schema).unwrap().is_same(&Type::int()));
        assert!(matches!(
            TypeRef::named("Nope").resolve(&schema),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_serialize_value_wrappers() {
        let schema = schema();
        let t = Type::list_of(Type::non_null(Type::int()).unwrap());
        assert_eq!(
            t.serialize_value(&json!([1, "2"]), &schema).unwrap().unwrap(),
            json!([1, 2])
        );
        assert!(t.serialize_value(&json!([1, null]), &schema).unwrap().is_err());
        assert!(t.serialize_value(&json!(1), &schema).unwrap().is_err());
        assert_eq!(t.serialize_value(&json!(null), &schema).unwrap().unwrap(), json!(null));
    }

    #[test]
    fn test_parse_value_wrappers() {
        let schema = schema();
        let t = Type::non_null(Type::list_of(Type::int())).unwrap();
        assert!(t.parse_value(&json!(null), &schema).unwrap().is_err());
        assert_eq!(t.parse_value(&json!(3), &schema).unwrap().unwrap(), json!([3]));
        assert!(t.parse_value(&json!(["x"]), &schema).unwrap().is_err());
    }

    #[test]
    fn test_named_type_strips_wrappers() {
        let schema = schema();
        let t = Type::non_null(Type::list_of("String")).unwrap();
        assert!(t.named_type(&schema).unwrap().is_same(&Type::string()));
        assert!(t.name().is_none());
        assert!(t.is_wrapping());
    }
}
