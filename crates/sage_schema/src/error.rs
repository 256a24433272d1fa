//! Schema configuration errors.
//!
//! These are fatal: they describe a broken schema, not a bad request.

use sage_core::NameError;

/// Schema result type
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Name violates the identifier grammar
    #[error("{owner}: {source}")]
    InvalidName {
        /// Where the name was declared
        owner: String,
        /// Grammar violation
        #[source]
        source: NameError,
    },
    /// Entity built without a resolve callback
    #[error("{entity} - Entity resolver must be a function returning a reference value")]
    MissingResolver {
        /// Entity name
        entity: String,
    },
    /// Same name used twice among an entity's attributes, acts and links
    #[error("{entity}.{name} - Artifact names must be unique within an entity")]
    DuplicateArtifact {
        /// Entity name
        entity: String,
        /// Repeated name
        name: String,
    },
    /// Same argument declared twice
    #[error("{owner}({name}:) - Argument names must be unique")]
    DuplicateArgument {
        /// Declaring entity, act or link
        owner: String,
        /// Repeated name
        name: String,
    },
    /// Attribute type does not unwrap to a scalar
    #[error("{entity}.{attribute} - Attribute type must be a Scalar but got: {found}")]
    InvalidAttributeType {
        /// Entity name
        entity: String,
        /// Attribute name
        attribute: String,
        /// Offending type
        found: String,
    },
    /// Link target is not an entity
    #[error("{entity}.{link} - Link type must be Entity but got: {found}")]
    InvalidLinkType {
        /// Entity name
        entity: String,
        /// Link name
        link: String,
        /// Offending type
        found: String,
    },
    /// Argument type does not unwrap to a scalar
    #[error("{owner}({argument}:) - Argument type must be a Scalar but got: {found}")]
    InvalidArgumentType {
        /// Declaring entity, act or link
        owner: String,
        /// Argument name
        argument: String,
        /// Offending type
        found: String,
    },
    /// NonNull wrapping another NonNull
    #[error("NonNull cannot wrap another NonNull: {found}")]
    DoubleNonNull {
        /// Inner type
        found: String,
    },
    /// A named type reference could not be resolved
    #[error("Unknown type \"{name}\"")]
    UnknownType {
        /// Referenced name
        name: String,
    },
    /// Loader returned a type under another name
    #[error("Type loader is expected to return type \"{expected}\", but it returned \"{found}\"")]
    TypeNameMismatch {
        /// Requested name
        expected: String,
        /// Returned name
        found: String,
    },
    /// Loader returned a wrapping type
    #[error("Type loader is expected to return a named type \"{name}\", but it returned {found}")]
    NotANamedType {
        /// Requested name
        name: String,
        /// Returned type
        found: String,
    },
    /// Two different instances registered under one name
    #[error("Schema must contain unique named types but contains multiple types named \"{name}\"")]
    DuplicateType {
        /// Type name
        name: String,
    },
    /// Loader re-entered for a name it is still loading
    #[error("Type \"{name}\" was requested while it is still being loaded")]
    CyclicLoad {
        /// Type name
        name: String,
    },
    /// Loader returned a different instance than the one referenced in the graph
    #[error("Type loader returns different instance for {name} than field/argument definitions. Make sure you always return the same instance for the same type name.")]
    LoaderInstanceMismatch {
        /// Type name
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::InvalidLinkType {
            entity: "User".to_string(),
            link: "org".to_string(),
            found: "Int".to_string(),
        };
        assert_eq!(err.to_string(), "User.org - Link type must be Entity but got: Int");

        let err = SchemaError::TypeNameMismatch {
            expected: "User".to_string(),
            found: "Org".to_string(),
        };
        assert!(err.to_string().contains("\"User\""));
        assert!(err.to_string().contains("\"Org\""));
    }

    #[test]
    fn test_invalid_name_source() {
        let err = SchemaError::InvalidName {
            owner: "Entity".to_string(),
            source: NameError::Empty,
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
