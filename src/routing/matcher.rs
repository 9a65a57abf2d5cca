//! Route matching logic.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A pattern matches the exact path or any path it prefixes
//! - The query string is ignored when matching
//! - No regex to guarantee O(n) matching

/// Matches the request path against a rule pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
    pattern: String,
}

impl PathMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True if `path` (query string allowed) equals or starts with the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        path == self.pattern || path.starts_with(&self.pattern)
    }
}
