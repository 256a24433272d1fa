//! Sage Request Model
//!
//! Structured queries and the documents that group them. Pure data with no
//! validation logic; see `sage_validate` for that.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod query;

// Re-exports
pub use document::Document;
pub use query::{Query, QueryBuilder};
