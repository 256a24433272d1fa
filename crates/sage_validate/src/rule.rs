//! Validation rules.

use std::fmt;

/// Document validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentRule {
    /// No query name is used twice
    UniqueQueryNames,
    /// Query types exist, are entities and match their link's target
    KnownEntityTypes,
    /// Requested attributes, acts and links exist
    KnownArtifacts,
    /// Supplied arguments are declared
    KnownArgumentNames,
    /// Required arguments are supplied
    ProvidedRequiredArguments,
    /// Supplied values coerce to the declared input type
    ArgumentsOfCorrectType,
}

impl DocumentRule {
    /// Every rule, in execution order
    pub const ALL: [DocumentRule; 6] = [
        Self::UniqueQueryNames,
        Self::KnownEntityTypes,
        Self::KnownArtifacts,
        Self::KnownArgumentNames,
        Self::ProvidedRequiredArguments,
        Self::ArgumentsOfCorrectType,
    ];

    /// Rule name, reported in error meta
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UniqueQueryNames => "UniqueQueryNames",
            Self::KnownEntityTypes => "KnownEntityTypes",
            Self::KnownArtifacts => "KnownArtifacts",
            Self::KnownArgumentNames => "KnownArgumentNames",
            Self::ProvidedRequiredArguments => "ProvidedRequiredArguments",
            Self::ArgumentsOfCorrectType => "ArgumentsOfCorrectType",
        }
    }
}

impl fmt::Display for DocumentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
