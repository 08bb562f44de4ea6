use std::fmt;

use serde::Serialize;

/// Name-level matching key: lower-cased, trimmed first and last name.
///
/// The parts are stored separately, so no delimiter can collide with a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NameKey {
    pub first: String,
    pub last: String,
}

impl NameKey {
    /// Both parts empty. Blank keys never match anything, including each other.
    pub fn is_blank(&self) -> bool {
        self.first.is_empty() && self.last.is_empty()
    }

    /// Name-level identity: equal keys, neither blank.
    pub fn matches(&self, other: &NameKey) -> bool {
        !self.is_blank() && self == other
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.first, self.last)
    }
}

/// Canonicalize a (first, last) pair into a matching key.
pub fn normalize(first: &str, last: &str) -> NameKey {
    NameKey {
        first: first.trim().to_lowercase(),
        last: last.trim().to_lowercase(),
    }
}
