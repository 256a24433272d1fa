//! Identifier grammar shared by types, artifacts and arguments.

use once_cell::sync::Lazy;
use regex::Regex;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]*$").unwrap_or_else(|e| panic!("name pattern: {}", e))
});

/// Invalid identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Empty name
    #[error("Name must not be empty")]
    Empty,
    /// Name does not match `[_a-zA-Z][_a-zA-Z0-9]*`
    #[error("Names must match /^[_a-zA-Z][_a-zA-Z0-9]*$/ but \"{name}\" does not")]
    Malformed {
        /// Offending name
        name: String,
    },
}

/// Check a name against the identifier grammar
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Assert that a name matches the identifier grammar
///
/// # Errors
///
/// Returns error if the name is empty or malformed
pub fn assert_valid_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if !is_valid_name(name) {
        return Err(NameError::Malformed {
            name: name.to_string(),
        });
    }
    Ok(())
}
