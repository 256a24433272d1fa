//! Sage Document Validation
//!
//! Read-only checks of a query document against a schema, run before any
//! resolver is invoked. Every enabled rule runs and reports all of its
//! findings as client-safe, located errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod rule;
pub mod validator;

// Re-exports
pub use rule::DocumentRule;
pub use validator::DocumentValidator;
