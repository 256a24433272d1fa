//! Client-facing error formatting.

use crate::error::{Category, ClientAware, Error};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::{BitOr, BitOrAssign};
use std::sync::{PoisonError, RwLock};

/// Message shown in place of unsafe errors
pub const DEFAULT_INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

static INTERNAL_ERROR_MESSAGE: Lazy<RwLock<String>> =
    Lazy::new(|| RwLock::new(DEFAULT_INTERNAL_ERROR_MESSAGE.to_string()));

/// Debug flags controlling how much detail reaches the client.
///
/// Flags are independent bits and combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugFlag(u8);

impl DebugFlag {
    /// No debug output
    pub const NONE: Self = Self(0);
    /// Add `debugMessage` with the real message of unsafe errors
    pub const INCLUDE_DEBUG_MESSAGE: Self = Self(1);
    /// Add the captured backtrace as `trace`
    pub const INCLUDE_TRACE: Self = Self(2);
    /// Hand internal errors back to the caller instead of formatting them
    pub const RETHROW_INTERNAL: Self = Self(4);
    /// Hand unsafe errors back to the caller instead of formatting them
    pub const RETHROW_UNSAFE: Self = Self(8);

    /// Create from raw bits
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check whether every bit of `other` is set
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugFlag {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DebugFlag {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Formats [`Error`]s into the client-facing map shape.
#[derive(Debug, Clone, Default)]
pub struct ErrorFormatter {
    debug: DebugFlag,
    internal_error_message: Option<String>,
}

impl ErrorFormatter {
    /// Formatter with no debug flags
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set debug flags
    #[must_use]
    pub fn with_debug(mut self, debug: DebugFlag) -> Self {
        self.debug = debug;
        self
    }

    /// Override the message shown for unsafe errors
    #[must_use]
    pub fn with_internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = Some(message.into());
        self
    }

    /// Active debug flags
    #[must_use]
    pub fn debug(&self) -> DebugFlag {
        self.debug
    }

    /// Format one error.
    ///
    /// # Errors
    ///
    /// Returns the error itself when a rethrow flag applies to it.
    pub fn format(&self, error: &Error) -> Result<Map<String, Value>, Error> {
        if self.debug.contains(DebugFlag::RETHROW_INTERNAL)
            && error.category() == Category::Internal
        {
            return Err(error.clone());
        }
        if self.debug.contains(DebugFlag::RETHROW_UNSAFE) && !error.is_client_safe() {
            return Err(error.clone());
        }

        let message = if error.is_client_safe() {
            error.message().to_string()
        } else {
            self.internal_error_message
                .clone()
                .unwrap_or_else(FormattedError::internal_error_message)
        };

        let mut formatted = Map::new();
        if self.debug.contains(DebugFlag::INCLUDE_DEBUG_MESSAGE) && !error.is_client_safe() {
            formatted.insert(
                "debugMessage".to_string(),
                Value::String(error.message().to_string()),
            );
        }
        formatted.insert("message".to_string(), Value::String(message));
        if !error.locations().is_empty() {
            formatted.insert(
                "location".to_string(),
                serde_json::to_value(error.locations())?,
            );
        }
        let mut meta = error.meta().clone();
        meta.insert(
            "category".to_string(),
            Value::String(error.category().as_str().to_string()),
        );
        formatted.insert("meta".to_string(), Value::Object(meta));

        if self.debug.contains(DebugFlag::INCLUDE_TRACE) {
            let trace = error.trace();
            if !trace.is_empty() {
                formatted.insert(
                    "trace".to_string(),
                    Value::Array(trace.into_iter().map(Value::String).collect()),
                );
            }
        }

        Ok(formatted)
    }

    /// Format a list of errors, stopping at the first rethrow.
    ///
    /// # Errors
    ///
    /// Returns the first error a rethrow flag applies to.
    pub fn format_all(&self, errors: &[Error]) -> Result<Vec<Value>, Error> {
        errors
            .iter()
            .map(|e| self.format(e).map(Value::Object))
            .collect()
    }
}

/// Process-wide formatting helpers.
pub struct FormattedError;

impl FormattedError {
    /// Replace the process-wide message used for unsafe errors
    pub fn set_internal_error_message(message: impl Into<String>) {
        let mut guard = INTERNAL_ERROR_MESSAGE
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = message.into();
    }

    /// Current process-wide message used for unsafe errors
    #[must_use]
    pub fn internal_error_message() -> String {
        INTERNAL_ERROR_MESSAGE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Format with the default formatter and the given flags.
    ///
    /// # Errors
    ///
    /// Returns the error itself when a rethrow flag applies to it.
    pub fn create(error: &Error, debug: DebugFlag) -> Result<Map<String, Value>, Error> {
        ErrorFormatter::new().with_debug(debug).format(error)
    }

    /// Human-readable rendering for logs: message plus its locations.
    #[must_use]
    pub fn print(error: &Error) -> String {
        let mut out = error.message().to_string();
        for location in error.locations() {
            out.push_str("\n  at ");
            out.push_str(&location.to_string());
            if let Some(kind) = location.meta.get("kind").and_then(Value::as_str) {
                out.push_str(&format!(" ({})", kind));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorLocation, UserError};

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct IoFailure;

    #[test]
    fn test_safe_error_shows_message() {
        let formatted = ErrorFormatter::new().format(&Error::new("Unknown type Foo")).unwrap();
        assert_eq!(formatted["message"], "Unknown type Foo");
        assert_eq!(formatted["meta"]["category"], "sage");
        assert!(!formatted.contains_key("location"));
    }

    #[test]
    fn test_unsafe_error_is_masked() {
        let formatted = ErrorFormatter::new().format(&Error::internal(IoFailure)).unwrap();
        assert_eq!(formatted["message"], DEFAULT_INTERNAL_ERROR_MESSAGE);
        assert_eq!(formatted["meta"]["category"], "internal");
        assert!(!formatted.contains_key("debugMessage"));

        // the only test touching the process-wide message
        FormattedError::set_internal_error_message("Something broke");
        let formatted = ErrorFormatter::new().format(&Error::internal(IoFailure)).unwrap();
        FormattedError::set_internal_error_message(DEFAULT_INTERNAL_ERROR_MESSAGE);
        assert_eq!(formatted["message"], "Something broke");
        assert_eq!(FormattedError::internal_error_message(), DEFAULT_INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_create_uses_given_flags() {
        let formatted = FormattedError::create(&Error::new("bad"), DebugFlag::NONE).unwrap();
        assert_eq!(formatted["message"], "bad");

        let formatted =
            FormattedError::create(&Error::internal(IoFailure), DebugFlag::INCLUDE_DEBUG_MESSAGE).unwrap();
        assert_eq!(formatted["debugMessage"], "disk on fire");

        let err = FormattedError::create(&Error::internal(IoFailure), DebugFlag::RETHROW_INTERNAL).unwrap_err();
        assert_eq!(err.message(), "disk on fire");
    }

    #[test]
    fn test_custom_internal_message() {
        let formatted = ErrorFormatter::new()
            .with_internal_error_message("Oops")
            .format(&Error::internal(IoFailure))
            .unwrap();
        assert_eq!(formatted["message"], "Oops");
    }

    #[test]
    fn test_debug_message_is_first_key() {
        let formatted = ErrorFormatter::new()
            .with_debug(DebugFlag::INCLUDE_DEBUG_MESSAGE)
            .format(&Error::internal(IoFailure))
            .unwrap();
        let first = formatted.keys().next().unwrap();
        assert_eq!(first, "debugMessage");
        assert_eq!(formatted["debugMessage"], "disk on fire");
    }

    #[test]
    fn test_debug_message_skipped_for_safe_errors() {
        let formatted = ErrorFormatter::new()
            .with_debug(DebugFlag::INCLUDE_DEBUG_MESSAGE)
            .format(&UserError::new("Forbidden").into())
            .unwrap();
        assert!(!formatted.contains_key("debugMessage"));
        assert_eq!(formatted["meta"]["category"], "user");
    }

    #[test]
    fn test_rethrow_flags() {
        let internal = Error::internal(IoFailure);
        let safe = Error::new("fine");

        let formatter = ErrorFormatter::new().with_debug(DebugFlag::RETHROW_INTERNAL);
        assert!(formatter.format(&internal).is_err());
        assert!(formatter.format(&safe).is_ok());

        let formatter = ErrorFormatter::new().with_debug(DebugFlag::RETHROW_UNSAFE);
        let err = formatter.format(&internal).unwrap_err();
        assert_eq!(err.message(), "disk on fire");
    }

    #[test]
    fn test_location_and_meta_rendered() {
        let err = Error::new("bad")
            .with_locations(vec![ErrorLocation::field("q", "name")])
            .with_meta("hint", "check spelling");
        let formatted = ErrorFormatter::new().format(&err).unwrap();
        assert_eq!(formatted["location"][0]["query"], "q");
        assert_eq!(formatted["location"][0]["field"], "name");
        assert_eq!(formatted["meta"]["hint"], "check spelling");
        assert_eq!(formatted["meta"]["category"], "sage");
    }

    #[test]
    fn test_flag_combination() {
        let flags = DebugFlag::INCLUDE_DEBUG_MESSAGE | DebugFlag::INCLUDE_TRACE;
        assert!(flags.contains(DebugFlag::INCLUDE_TRACE));
        assert!(flags.contains(DebugFlag::INCLUDE_DEBUG_MESSAGE));
        assert!(!flags.contains(DebugFlag::RETHROW_UNSAFE));
        assert_eq!(DebugFlag::from_bits(0xff).bits(), 15);
    }

    #[test]
    fn test_print_lists_locations() {
        let err = Error::new("bad").with_locations(vec![
            ErrorLocation::field("q", "org.title").with_meta("kind", "attribute"),
        ]);
        assert_eq!(FormattedError::print(&err), "bad\n  at q.org.title (attribute)");
    }

    #[test]
    fn test_format_all_stops_on_rethrow() {
        let formatter = ErrorFormatter::new().with_debug(DebugFlag::RETHROW_UNSAFE);
        let errors = vec![Error::new("a"), Error::internal(IoFailure)];
        assert!(formatter.format_all(&errors).is_err());
        assert_eq!(ErrorFormatter::new().format_all(&errors).unwrap().len(), 2);
    }
}
