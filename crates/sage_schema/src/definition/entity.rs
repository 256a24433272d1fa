//! Composite entity types.

use crate::definition::artifact::{
    apply_defaults, Act, Argument, ArgumentMap, ArtifactKind, ArtifactRef, Attribute, Link,
};
use crate::error::{SchemaError, SchemaResult};
use crate::schema::Schema;
use indexmap::IndexMap;
use sage_core::{assert_valid_name, Arguments, Context, Error, ReferenceValue};
use sage_promise::Thenable;
use std::fmt;
use std::sync::Arc;

/// Entity resolver: `(arguments, context) -> reference value`
pub type EntityResolveFn =
    Arc<dyn Fn(&Arguments, &Context) -> Result<Thenable<ReferenceValue>, Error> + Send + Sync>;

/// Named composite type.
///
/// Attribute, act and link names share one key space (the result map), so
/// they are unique across all three. Built through [`EntityBuilder`], which
/// guarantees a resolver is present.
pub struct Entity {
    name: String,
    description: Option<String>,
    deprecated: bool,
    deprecation_reason: Option<String>,
    resolve: EntityResolveFn,
    attributes: IndexMap<String, Attribute>,
    acts: IndexMap<String, Act>,
    links: IndexMap<String, Link>,
    arguments: ArgumentMap,
}

impl Entity {
    /// Start building an entity
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder::new(name)
    }

    /// Entity name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Check if deprecated
    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    /// Deprecation reason
    #[must_use]
    pub fn deprecation_reason(&self) -> Option<&str> {
        self.deprecation_reason.as_deref()
    }

    /// Attribute by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Check if an attribute exists
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Act by name
    #[must_use]
    pub fn act(&self, name: &str) -> Option<&Act> {
        self.acts.get(name)
    }

    /// Check if an act exists
    #[must_use]
    pub fn has_act(&self, name: &str) -> bool {
        self.acts.contains_key(name)
    }

    /// Link by name
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    /// Check if a link exists
    #[must_use]
    pub fn has_link(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    /// Artifact of a given kind by name
    #[must_use]
    pub fn artifact(&self, kind: ArtifactKind, name: &str) -> Option<ArtifactRef<'_>> {
        match kind {
            ArtifactKind::Attribute => self.attribute(name).map(ArtifactRef::Attribute),
            ArtifactKind::Act => self.act(name).map(ArtifactRef::Act),
            ArtifactKind::Link => self.link(name).map(ArtifactRef::Link),
        }
    }

    /// All attributes
    #[must_use]
    pub fn attributes(&self) -> &IndexMap<String, Attribute> {
        &self.attributes
    }

    /// All acts
    #[must_use]
    pub fn acts(&self) -> &IndexMap<String, Act> {
        &self.acts
    }

    /// All links
    #[must_use]
    pub fn links(&self) -> &IndexMap<String, Link> {
        &self.links
    }

    /// Arguments accepted by `resolve`
    #[must_use]
    pub fn arguments(&self) -> &ArgumentMap {
        &self.arguments
    }

    /// Run the resolver with declared defaults applied.
    ///
    /// # Errors
    ///
    /// Returns whatever the resolver fails with
    pub fn resolve(
        &self,
        arguments: &Arguments,
        context: &Context,
    ) -> Result<Thenable<ReferenceValue>, Error> {
        (self.resolve)(&apply_defaults(&self.arguments, arguments), context)
    }

    /// Check every type this entity references.
    ///
    /// # Errors
    ///
    /// Returns the first invalid attribute, link or argument type
    pub fn assert_valid(&self, schema: &Schema) -> SchemaResult<()> {
        for argument in self.arguments.values() {
            argument.assert_valid(&self.name, schema)?;
        }
        for attribute in self.attributes.values() {
            attribute.assert_valid(&self.name, schema)?;
        }
        for act in self.acts.values() {
            let owner = format!("{}.{}", self.name, act.name());
            for argument in act.arguments().values() {
                argument.assert_valid(&owner, schema)?;
            }
        }
        for link in self.links.values() {
            link.links_to(&self.name, schema)?;
            let owner = format!("{}.{}", self.name, link.name());
            for argument in link.arguments().values() {
                argument.assert_valid(&owner, schema)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("acts", &self.acts.keys().collect::<Vec<_>>())
            .field("links", &self.links.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Entity`]
pub struct EntityBuilder {
    name: String,
    description: Option<String>,
    deprecated: Option<bool>,
    deprecation_reason: Option<String>,
    resolve: Option<EntityResolveFn>,
    attributes: Vec<Attribute>,
    acts: Vec<Act>,
    links: Vec<Link>,
    arguments: Vec<Argument>,
}

impl EntityBuilder {
    /// Builder for an entity called `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            deprecated: None,
            deprecation_reason: None,
            resolve: None,
            attributes: Vec::new(),
            acts: Vec::new(),
            links: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Set description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Deprecate with a reason
    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation_reason = Some(reason.into());
        self
    }

    /// Set the deprecated flag explicitly
    #[must_use]
    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = Some(deprecated);
        self
    }

    /// Set the resolver
    #[must_use]
    pub fn resolve<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&Arguments, &Context) -> Result<Thenable<ReferenceValue>, Error>
            + Send
            + Sync
            + 'static,
    {
        self.resolve = Some(Arc::new(resolve));
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add an act
    #[must_use]
    pub fn act(mut self, act: Act) -> Self {
        self.acts.push(act);
        self
    }

    /// Add a link
    #[must_use]
    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Declare an argument of the resolver
    #[must_use]
    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Validate names and build.
    ///
    /// # Errors
    ///
    /// Returns error if a name is malformed or repeated, or no resolver was set
    pub fn build(self) -> SchemaResult<Entity> {
        check_name("Entity", &self.name)?;
        let resolve = self.resolve.ok_or_else(|| SchemaError::MissingResolver {
            entity: self.name.clone(),
        })?;

        let entity_name = self.name.clone();
        let mut taken: Vec<String> = Vec::new();
        let mut claim = |name: &str| -> SchemaResult<()> {
            check_name(&format!("{}.{}", entity_name, name), name)?;
            if taken.iter().any(|t| t == name) {
                return Err(SchemaError::DuplicateArtifact {
                    entity: entity_name.clone(),
                    name: name.to_string(),
                });
            }
            taken.push(name.to_string());
            Ok(())
        };

        let mut attributes = IndexMap::new();
        for attribute in self.attributes {
            claim(attribute.name())?;
            attributes.insert(attribute.name().to_string(), attribute);
        }
        let mut acts = IndexMap::new();
        for act in self.acts {
            claim(act.name())?;
            check_arguments(
                &format!("{}.{}", self.name, act.name()),
                act.arguments().values(),
                act.repeated_arguments(),
            )?;
            acts.insert(act.name().to_string(), act);
        }
        let mut links = IndexMap::new();
        for link in self.links {
            claim(link.name())?;
            check_arguments(
                &format!("{}.{}", self.name, link.name()),
                link.arguments().values(),
                link.repeated_arguments(),
            )?;
            links.insert(link.name().to_string(), link);
        }

        let mut arguments = ArgumentMap::new();
        for argument in self.arguments {
            check_name(&self.name, argument.name())?;
            if arguments.contains_key(argument.name()) {
                return Err(SchemaError::DuplicateArgument {
                    owner: self.name.clone(),
                    name: argument.name().to_string(),
                });
            }
            arguments.insert(argument.name().to_string(), argument);
        }

        let deprecated = self
            .deprecated
            .unwrap_or(self.deprecation_reason.is_some());

        Ok(Entity {
            name: self.name,
            description: self.description,
            deprecated,
            deprecation_reason: self.deprecation_reason,
            resolve,
            attributes,
            acts,
            links,
            arguments,
        })
    }
}

fn check_name(owner: &str, name: &str) -> SchemaResult<()> {
    assert_valid_name(name).map_err(|source| SchemaError::InvalidName {
        owner: owner.to_string(),
        source,
    })
}

fn check_arguments<'a>(
    owner: &str,
    arguments: impl Iterator<Item = &'a Argument>,
    repeated: &[String],
) -> SchemaResult<()> {
    for argument in arguments {
        check_name(owner, argument.name())?;
    }
    if let Some(name) = repeated.first() {
        return Err(SchemaError::DuplicateArgument {
            owner: owner.to_string(),
            name: name.clone(),
        });
    }
    Ok(())
}
