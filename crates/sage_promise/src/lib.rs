//! Sage Promise Engine
//!
//! Deferred resolution without threads: promises settle once, their
//! reactions run from a FIFO task queue, and [`SyncPromiseAdapter::wait`]
//! drains that queue until the awaited promise settles.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod promise;
pub mod queue;

// Re-exports
pub use adapter::{SyncPromiseAdapter, WaitError};
pub use promise::{Promise, PromiseState, Resolver, Thenable};
pub use queue::{Task, TaskQueue};
