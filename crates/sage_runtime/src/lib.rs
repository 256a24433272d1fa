//! Sage Runtime
//!
//! Executes query documents against a schema. [`Sage`] validates the
//! document and drives the promise-based [`Executor`] to a result, which
//! carries the data tree, the collected errors and execution metrics.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod executor;
pub mod monitor;
pub mod result;

// Re-exports
pub use engine::{ExecutionOptions, Sage, SageError, SageResult};
pub use executor::Executor;
pub use monitor::Metrics;
pub use result::ExecutionResult;
