//! Type definitions: scalars, entities, artifacts and wrappers.

pub mod artifact;
pub mod entity;
pub mod scalar;
pub mod type_;

pub use artifact::{
    apply_defaults, Act, ActPerformFn, Argument, ArgumentMap, ArtifactKind, ArtifactMeta,
    ArtifactRef, Attribute, AttributeResolveFn, Link, LinkResolveFn, RuleFn,
};
pub use entity::{Entity, EntityBuilder, EntityResolveFn};
pub use scalar::{CoerceFn, ScalarType};
pub use type_::{Coercion, LazyType, ListOf, NonNull, Type, TypeRef};
