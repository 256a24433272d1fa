//! Sage Schema
//!
//! The type system of the engine: entities with their attributes, acts and
//! links, scalar and wrapping types, and the schema registry that hands out
//! one instance per type name, loading types lazily when a loader is set.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context_info;
pub mod definition;
pub mod error;
pub mod schema;

// Re-exports
pub use context_info::ContextInfo;
pub use definition::{
    Act, Argument, ArgumentMap, ArtifactKind, ArtifactMeta, ArtifactRef, Attribute, Coercion,
    Entity, EntityBuilder, Link, ListOf, NonNull, ScalarType, Type, TypeRef,
};
pub use error::{SchemaError, SchemaResult};
pub use schema::{LoadedType, Schema, SchemaBuilder, TypeLoader};
