//! Sage Core Types
//!
//! Errors and their client-facing formatting, the warning channel,
//! identifier rules and the request context shared by every other crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod format;
pub mod name;
pub mod warning;

// Re-exports
pub use context::{Arguments, Context, ReferenceValue};
pub use error::{Category, ClientAware, CoreResult, Error, ErrorLocation, InvariantViolation, UserError};
pub use format::{DebugFlag, ErrorFormatter, FormattedError, DEFAULT_INTERNAL_ERROR_MESSAGE};
pub use name::{assert_valid_name, is_valid_name, NameError};
pub use warning::{Warning, WarningHandler, WarningId};
