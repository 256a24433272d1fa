//! Attributes, acts, links and their arguments.

use crate::context_info::ContextInfo;
use crate::definition::type_::{Type, TypeRef};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::Schema;
use indexmap::IndexMap;
use sage_core::{Arguments, Error, ReferenceValue};
use sage_promise::Thenable;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Attribute resolver: `(reference value, info) -> value`
pub type AttributeResolveFn =
    Arc<dyn Fn(&ReferenceValue, &ContextInfo) -> Result<Thenable<Value>, Error> + Send + Sync>;

/// Act callback: `(reference value, arguments) -> value`
pub type ActPerformFn =
    Arc<dyn Fn(&ReferenceValue, &Arguments) -> Result<Thenable<Value>, Error> + Send + Sync>;

/// Link resolver: `(reference value, info) -> linked reference value`
pub type LinkResolveFn = Arc<
    dyn Fn(&ReferenceValue, &ContextInfo) -> Result<Thenable<ReferenceValue>, Error> + Send + Sync,
>;

/// Output constraint checked on an attribute's resolved value
pub type RuleFn = Arc<dyn Fn(&Value) -> Result<(), Error> + Send + Sync>;

/// Kind of artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Leaf data field
    Attribute,
    /// Side-effecting operation
    Act,
    /// Edge to another entity
    Link,
}

impl ArtifactKind {
    /// Wire name, used in error location meta
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Attribute => "attribute",
            Self::Act => "act",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name, description and deprecation shared by every artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    /// Name, unique within the owning entity
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Deprecated flag
    pub deprecated: bool,
    /// Deprecation reason
    pub deprecation_reason: Option<String>,
}

impl ArtifactMeta {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            deprecated: false,
            deprecation_reason: None,
        }
    }
}

macro_rules! artifact_meta_builders {
    ($ty:ty) => {
        impl $ty {
            /// Artifact name
            #[must_use]
            pub fn name(&self) -> &str {
                &self.meta.name
            }

            /// Shared artifact metadata
            #[must_use]
            pub fn meta(&self) -> &ArtifactMeta {
                &self.meta
            }

            /// Set description
            #[must_use]
            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.meta.description = Some(description.into());
                self
            }

            /// Deprecate with a reason
            #[must_use]
            pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
                self.meta.deprecated = true;
                self.meta.deprecation_reason = Some(reason.into());
                self
            }

            /// Set the deprecated flag explicitly
            #[must_use]
            pub fn with_deprecated(mut self, deprecated: bool) -> Self {
                self.meta.deprecated = deprecated;
                self
            }

            /// Check if deprecated
            #[must_use]
            pub fn is_deprecated(&self) -> bool {
                self.meta.deprecated
            }
        }
    };
}

/// Input argument of an entity, act or link
#[derive(Clone)]
pub struct Argument {
    name: String,
    type_ref: TypeRef,
    description: Option<String>,
    default_value: Option<Value>,
}

impl Argument {
    /// Declare an argument
    #[must_use]
    pub fn new(name: impl Into<String>, type_ref: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            type_ref: type_ref.into(),
            description: None,
            default_value: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Value used when the argument is omitted
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Argument name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    #[must_use]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Description
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Default value
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Non-null without a default.
    ///
    /// # Errors
    ///
    /// Returns error if the declared type cannot be resolved
    pub fn is_required(&self, schema: &Schema) -> SchemaResult<bool> {
        if self.default_value.is_some() {
            return Ok(false);
        }
        Ok(matches!(self.type_ref.resolve(schema)?, Type::NonNull(_)))
    }

    pub(crate) fn assert_valid(&self, owner: &str, schema: &Schema) -> SchemaResult<()> {
        let named = self.type_ref.resolve(schema)?.named_type(schema)?;
        if named.as_scalar().is_none() {
            return Err(SchemaError::InvalidArgumentType {
                owner: owner.to_string(),
                argument: self.name.clone(),
                found: named.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("type", &self.type_ref)
            .field("default_value", &self.default_value)
            .finish()
    }
}

/// Ordered argument declarations
pub type ArgumentMap = IndexMap<String, Argument>;

/// Fill omitted arguments with their declared defaults
#[must_use]
pub fn apply_defaults(declared: &ArgumentMap, supplied: &Arguments) -> Arguments {
    let mut arguments = supplied.clone();
    for (name, argument) in declared {
        if let (false, Some(default)) = (arguments.contains_key(name), argument.default_value()) {
            arguments.insert(name.clone(), default.clone());
        }
    }
    arguments
}

fn declare_argument(arguments: &mut ArgumentMap, repeated: &mut Vec<String>, argument: Argument) {
    if arguments.contains_key(argument.name()) {
        repeated.push(argument.name().to_string());
    } else {
        arguments.insert(argument.name().to_string(), argument);
    }
}

/// Leaf data field of an entity
#[derive(Clone)]
pub struct Attribute {
    meta: ArtifactMeta,
    type_ref: Option<TypeRef>,
    resolve: AttributeResolveFn,
    rule: Option<RuleFn>,
}

impl Attribute {
    /// Declare an attribute with its resolver
    #[must_use]
    pub fn new<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&ReferenceValue, &ContextInfo) -> Result<Thenable<Value>, Error> + Send + Sync + 'static,
    {
        Self {
            meta: ArtifactMeta::new(name),
            type_ref: None,
            resolve: Arc::new(resolve),
            rule: None,
        }
    }

    /// Attribute reading `reference[name]` from an object reference value
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = name.clone();
        Self::new(name, move |reference, _| {
            Ok(Thenable::value(reference.get(&key).cloned().unwrap_or(Value::Null)))
        })
    }

    /// Declare the output type (must unwrap to a scalar)
    #[must_use]
    pub fn with_type(mut self, type_ref: impl Into<TypeRef>) -> Self {
        self.type_ref = Some(type_ref.into());
        self
    }

    /// Constrain resolved values
    #[must_use]
    pub fn with_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Value) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.rule = Some(Arc::new(rule));
        self
    }

    /// Declared output type
    #[must_use]
    pub fn type_ref(&self) -> Option<&TypeRef> {
        self.type_ref.as_ref()
    }

    /// Run the resolver.
    ///
    /// # Errors
    ///
    /// Returns whatever the resolver fails with
    pub fn resolve(&self, reference: &ReferenceValue, info: &ContextInfo) -> Result<Thenable<Value>, Error> {
        (self.resolve)(reference, info)
    }

    /// Check a resolved value against the rule, if any.
    ///
    /// # Errors
    ///
    /// Returns the rule's error
    pub fn check_rule(&self, value: &Value) -> Result<(), Error> {
        match &self.rule {
            Some(rule) => rule(value),
            None => Ok(()),
        }
    }

    pub(crate) fn assert_valid(&self, entity: &str, schema: &Schema) -> SchemaResult<()> {
        let Some(type_ref) = &self.type_ref else {
            return Ok(());
        };
        let named = type_ref.resolve(schema)?.named_type(schema)?;
        if named.as_scalar().is_none() {
            return Err(SchemaError::InvalidAttributeType {
                entity: entity.to_string(),
                attribute: self.meta.name.clone(),
                found: named.to_string(),
            });
        }
        Ok(())
    }
}

artifact_meta_builders!(Attribute);

/// Side-effecting operation on an entity
#[derive(Clone)]
pub struct Act {
    meta: ArtifactMeta,
    perform: ActPerformFn,
    arguments: ArgumentMap,
    repeated: Vec<String>,
}

impl Act {
    /// Declare an act with its callback
    #[must_use]
    pub fn new<F>(name: impl Into<String>, perform: F) -> Self
    where
        F: Fn(&ReferenceValue, &Arguments) -> Result<Thenable<Value>, Error> + Send + Sync + 'static,
    {
        Self {
            meta: ArtifactMeta::new(name),
            perform: Arc::new(perform),
            arguments: ArgumentMap::new(),
            repeated: Vec::new(),
        }
    }

    /// Declare an accepted argument.
    ///
    /// A repeated name keeps the first declaration and fails the entity build.
    #[must_use]
    pub fn with_argument(mut self, argument: Argument) -> Self {
        declare_argument(&mut self.arguments, &mut self.repeated, argument);
        self
    }

    /// Declared arguments
    #[must_use]
    pub fn arguments(&self) -> &ArgumentMap {
        &self.arguments
    }

    pub(crate) fn repeated_arguments(&self) -> &[String] {
        &self.repeated
    }

    /// Run the act.
    ///
    /// # Errors
    ///
    /// Returns whatever the callback fails with
    pub fn perform(&self, reference: &ReferenceValue, arguments: &Arguments) -> Result<Thenable<Value>, Error> {
        (self.perform)(reference, &apply_defaults(&self.arguments, arguments))
    }
}

artifact_meta_builders!(Act);

/// Edge from an entity to another entity
#[derive(Clone)]
pub struct Link {
    meta: ArtifactMeta,
    links_to: TypeRef,
    resolve: LinkResolveFn,
    arguments: ArgumentMap,
    repeated: Vec<String>,
}

impl Link {
    /// Declare a link to `links_to` with its resolver
    #[must_use]
    pub fn new<F>(name: impl Into<String>, links_to: impl Into<TypeRef>, resolve: F) -> Self
    where
        F: Fn(&ReferenceValue, &ContextInfo) -> Result<Thenable<ReferenceValue>, Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            meta: ArtifactMeta::new(name),
            links_to: links_to.into(),
            resolve: Arc::new(resolve),
            arguments: ArgumentMap::new(),
            repeated: Vec::new(),
        }
    }

    /// Declare an argument the nested query may carry
    #[must_use]
    pub fn with_argument(mut self, argument: Argument) -> Self {
        declare_argument(&mut self.arguments, &mut self.repeated, argument);
        self
    }

    /// Declared arguments
    #[must_use]
    pub fn arguments(&self) -> &ArgumentMap {
        &self.arguments
    }

    pub(crate) fn repeated_arguments(&self) -> &[String] {
        &self.repeated
    }

    /// Unresolved target reference
    #[must_use]
    pub fn links_to_ref(&self) -> &TypeRef {
        &self.links_to
    }

    /// Target entity.
    ///
    /// # Errors
    ///
    /// Returns error if the target cannot be resolved or is not an entity
    pub fn links_to(&self, entity: &str, schema: &Schema) -> SchemaResult<Type> {
        let target = self.links_to.resolve(schema)?;
        if target.as_entity().is_none() {
            return Err(SchemaError::InvalidLinkType {
                entity: entity.to_string(),
                link: self.meta.name.clone(),
                found: target.to_string(),
            });
        }
        Ok(target)
    }

    /// Run the resolver.
    ///
    /// # Errors
    ///
    /// Returns whatever the resolver fails with
    pub fn resolve(
        &self,
        reference: &ReferenceValue,
        info: &ContextInfo,
    ) -> Result<Thenable<ReferenceValue>, Error> {
        (self.resolve)(reference, info)
    }
}

artifact_meta_builders!(Link);

/// Borrowed view of any artifact
#[derive(Clone, Copy)]
pub enum ArtifactRef<'a> {
    /// Attribute
    Attribute(&'a Attribute),
    /// Act
    Act(&'a Act),
    /// Link
    Link(&'a Link),
}

impl ArtifactRef<'_> {
    /// Kind of artifact
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Attribute(_) => ArtifactKind::Attribute,
            Self::Act(_) => ArtifactKind::Act,
            Self::Link(_) => ArtifactKind::Link,
        }
    }

    /// Shared metadata
    #[must_use]
    pub fn meta(&self) -> &ArtifactMeta {
        match self {
            Self::Attribute(a) => a.meta(),
            Self::Act(a) => a.meta(),
            Self::Link(l) => l.meta(),
        }
    }
}
