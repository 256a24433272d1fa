//! Scalar types and their value coercion.

use sage_core::{Error, InvariantViolation};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Coercion callback of a custom scalar
pub type CoerceFn = Arc<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>;

/// Name of the built-in `String` scalar
pub const STRING: &str = "String";
/// Name of the built-in `Int` scalar
pub const INT: &str = "Int";
/// Name of the built-in `Float` scalar
pub const FLOAT: &str = "Float";
/// Name of the built-in `Boolean` scalar
pub const BOOLEAN: &str = "Boolean";
/// Name of the built-in `ID` scalar
pub const ID: &str = "ID";

#[derive(Clone)]
enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
    Id,
    Custom {
        serialize: CoerceFn,
        parse_value: Option<CoerceFn>,
    },
}

/// Leaf type with output (`serialize`) and input (`parse_value`) coercion.
#[derive(Clone)]
pub struct ScalarType {
    name: String,
    description: Option<String>,
    kind: ScalarKind,
}

impl ScalarType {
    pub(crate) fn string() -> Self {
        Self::standard(
            STRING,
            "The `String` scalar type represents textual data, represented as UTF-8 character sequences.",
            ScalarKind::String,
        )
    }

    pub(crate) fn int() -> Self {
        Self::standard(
            INT,
            "The `Int` scalar type represents non-fractional signed whole numeric values between -(2^31) and 2^31 - 1.",
            ScalarKind::Int,
        )
    }

    pub(crate) fn float() -> Self {
        Self::standard(
            FLOAT,
            "The `Float` scalar type represents signed double-precision fractional values as specified by IEEE 754.",
            ScalarKind::Float,
        )
    }

    pub(crate) fn boolean() -> Self {
        Self::standard(
            BOOLEAN,
            "The `Boolean` scalar type represents `true` or `false`.",
            ScalarKind::Boolean,
        )
    }

    pub(crate) fn id() -> Self {
        Self::standard(
            ID,
            "The `ID` scalar type represents a unique identifier. It appears in a JSON response as a String.",
            ScalarKind::Id,
        )
    }

    fn standard(name: &str, description: &str, kind: ScalarKind) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            kind,
        }
    }

    /// Custom scalar with a mandatory serializer
    #[must_use]
    pub fn custom<F>(name: impl Into<String>, serialize: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            kind: ScalarKind::Custom {
                serialize: Arc::new(serialize),
                parse_value: None,
            },
        }
    }

    /// Input coercion for a custom scalar; without it inputs pass through
    #[must_use]
    pub fn with_parse_value<F>(mut self, parse: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        if let ScalarKind::Custom { parse_value, .. } = &mut self.kind {
            *parse_value = Some(Arc::new(parse));
        }
        self
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Scalar name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Check if this is one of the five built-in scalars
    #[must_use]
    pub fn is_standard(&self) -> bool {
        !matches!(self.kind, ScalarKind::Custom { .. })
    }

    /// Coerce a resolved value for output.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the value cannot be represented
    pub fn serialize(&self, value: &Value) -> Result<Value, Error> {
        match &self.kind {
            ScalarKind::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(if *b { "1" } else { "" }.to_string())),
                Value::Null => Ok(Value::String(String::new())),
                _ => Err(output_error(format!("String cannot represent value: {}", value))),
            },
            ScalarKind::Int => coerce_int(value, true).ok_or_else(|| {
                output_error(format!("Int cannot represent non 32-bit signed integer value: {}", value))
            }),
            ScalarKind::Float => {
                let float = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                float
                    .filter(|f| f.is_finite())
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        output_error(format!("Float cannot represent non numeric value: {}", value))
                    })
            }
            ScalarKind::Boolean => Ok(Value::Bool(truthy(value))),
            ScalarKind::Id => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
                _ => Err(output_error(format!("ID cannot represent value: {}", value))),
            },
            ScalarKind::Custom { serialize, .. } => serialize(value),
        }
    }

    /// Coerce a client-supplied value for input.
    ///
    /// # Errors
    ///
    /// Returns a client-safe error if the value is not acceptable
    pub fn parse_value(&self, value: &Value) -> Result<Value, Error> {
        match &self.kind {
            ScalarKind::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(Error::new(format!(
                    "String cannot represent a non string value: {}",
                    value
                ))),
            },
            ScalarKind::Int => coerce_int(value, false).ok_or_else(|| {
                Error::new(format!("Int cannot represent non-integer value: {}", value))
            }),
            ScalarKind::Float => match value {
                Value::Number(n) if n.as_f64().is_some_and(f64::is_finite) => Ok(value.clone()),
                _ => Err(Error::new(format!(
                    "Float cannot represent non numeric value: {}",
                    value
                ))),
            },
            ScalarKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(Error::new(format!(
                    "Boolean cannot represent a non boolean value: {}",
                    value
                ))),
            },
            ScalarKind::Id => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
                _ => Err(Error::new(format!("ID cannot represent value: {}", value))),
            },
            ScalarKind::Custom { parse_value, .. } => match parse_value {
                Some(parse) => parse(value),
                None => Ok(value.clone()),
            },
        }
    }
}

fn output_error(message: String) -> Error {
    InvariantViolation(message).into()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Integral value within 32-bit range. Output also accepts integral floats,
/// numeric strings and booleans.
fn coerce_int(value: &Value, lenient: bool) -> Option<Value> {
    let int = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None if lenient => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64),
            None => None,
        },
        Value::Bool(b) if lenient => Some(i64::from(*b)),
        Value::String(s) if lenient => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    i32::try_from(int).ok().map(Value::from)
}

impl fmt::Debug for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarType")
            .field("name", &self.name)
            .field("standard", &self.is_standard())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sage_core::{Category, ClientAware};
    use serde_json::json;

    #[test]
    fn test_string_coercion() {
        let string = ScalarType::string();
        assert_eq!(string.serialize(&json!(12)).unwrap(), json!("12"));
        assert_eq!(string.serialize(&json!(true)).unwrap(), json!("1"));
        assert!(string.serialize(&json!({"a": 1})).is_err());
        assert!(string.parse_value(&json!(12)).is_err());
        assert_eq!(string.parse_value(&json!("x")).unwrap(), json!("x"));
    }

    #[test]
    fn test_output_errors_are_internal() {
        let err = ScalarType::string().serialize(&json!([1])).unwrap_err();
        assert_eq!(err.category(), Category::Internal);
        assert!(!err.is_client_safe());
    }

    #[test]
    fn test_input_errors_are_safe() {
        let err = ScalarType::boolean().parse_value(&json!(1)).unwrap_err();
        assert!(err.is_client_safe());
        assert_eq!(err.message(), "Boolean cannot represent a non boolean value: 1");
    }

    #[test]
    fn test_int_coercion() {
        let int = ScalarType::int();
        assert_eq!(int.serialize(&json!(3.0)).unwrap(), json!(3));
        assert_eq!(int.serialize(&json!("42")).unwrap(), json!(42));
        assert!(int.serialize(&json!(3.5)).is_err());
        assert!(int.serialize(&json!(i64::from(i32::MAX) + 1)).is_err());
        assert!(int.parse_value(&json!(3.0)).is_err());
        assert_eq!(int.parse_value(&json!(-7)).unwrap(), json!(-7));
    }

    #[test]
    fn test_float_coercion() {
        let float = ScalarType::float();
        assert_eq!(float.serialize(&json!(true)).unwrap(), json!(1.0));
        assert_eq!(float.serialize(&json!(2)).unwrap(), json!(2.0));
        assert!(float.serialize(&json!("abc")).is_err());
        assert!(float.parse_value(&json!("1.5")).is_err());
        assert_eq!(float.parse_value(&json!(2)).unwrap(), json!(2));
    }

    #[test]
    fn test_boolean_and_id_coercion() {
        let boolean = ScalarType::boolean();
        assert_eq!(boolean.serialize(&json!(0)).unwrap(), json!(false));
        assert_eq!(boolean.serialize(&json!("yes")).unwrap(), json!(true));

        let id = ScalarType::id();
        assert_eq!(id.serialize(&json!(5)).unwrap(), json!("5"));
        assert_eq!(id.parse_value(&json!(5)).unwrap(), json!("5"));
        assert!(id.serialize(&json!(1.5)).is_err());
        assert!(id.parse_value(&json!(true)).is_err());
    }

    #[test]
    fn test_custom_scalar() {
        let upper = ScalarType::custom("Upper", |v| {
            v.as_str()
                .map(|s| Value::String(s.to_uppercase()))
                .ok_or_else(|| Error::new("Upper expects a string"))
        });
        assert!(!upper.is_standard());
        assert_eq!(upper.serialize(&json!("abc")).unwrap(), json!("ABC"));
        assert_eq!(upper.parse_value(&json!(1)).unwrap(), json!(1));

        let strict = upper.with_parse_value(|v| {
            if v.is_string() {
                Ok(v.clone())
            } else {
                Err(Error::new("Upper expects a string"))
            }
        });
        assert!(strict.parse_value(&json!(1)).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_int_accepts_all_i32(n: i32) {
            prop_assert_eq!(ScalarType::int().parse_value(&json!(n)).unwrap(), json!(n));
            prop_assert_eq!(ScalarType::int().serialize(&json!(n)).unwrap(), json!(n));
        }
    }
}
