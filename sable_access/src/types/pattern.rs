//! IRC-style glob matching.
//!
//! Permitted wildcards are * (match zero or more characters) and ? (match exactly one character)

use std::fmt::Display;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use wildmatch::WildMatch;

/// A wildcard pattern.
///
/// The pattern text is casefolded on construction, and subjects are casefolded
/// before matching, so matching is always case-insensitive.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Pattern(String);

impl Deref for Pattern {
    type Target = String;

    fn deref(&self) -> &String {
        &self.0
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq<str> for Pattern {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Pattern {
    /// Construct a `Pattern`
    pub fn new(s: &str) -> Self {
        Self(s.to_ascii_lowercase())
    }

    /// Whether this is the bare `*` pattern, matching everything
    pub fn is_wildcard_only(&self) -> bool {
        self.0 == "*"
    }

    /// Whether the pattern contains any wildcard character at all
    pub fn has_wildcards(&self) -> bool {
        self.0.contains(['*', '?'])
    }

    /// Test whether the given string matches this pattern
    pub fn matches(&self, s: &str) -> bool {
        self.matches_folded(&s.to_ascii_lowercase())
    }

    /// Test a subject that the caller has already casefolded
    pub fn matches_folded(&self, folded: &str) -> bool {
        if self.is_wildcard_only() {
            return true;
        }
        if !self.has_wildcards() {
            return self.0 == folded;
        }
        WildMatch::new(&self.0).matches(folded)
    }
}
