// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A dotted module name (`Qt.widgets`, `cpp`, `moduleProviders.pkgconfig`), the fundamental
//! identifier used throughout the loader to name modules, properties and overrides.

use std::fmt;

/// A `.`-separated sequence of identifiers, e.g. `Qt.widgets`.
///
/// Stored as a small vector of owned segments rather than a single interned string: the loader
/// routinely needs to address a prefix (`Qt`) or a suffix (`widgets`) of a name, most visibly when
/// the module provider loader tries successive suffixes of a missing module's name.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QualifiedId(Vec<String>);

impl QualifiedId {
    /// Parses a dotted string into a qualified id. An empty string produces an empty id.
    pub fn from_dotted(s: &str) -> Self {
        if s.is_empty() {
            return Self::default();
        }
        Self(s.split('.').map(|part| part.to_string()).collect())
    }

    /// Builds a qualified id from already-split segments.
    pub fn from_segments(segments: impl IntoIterator<Item = String>) -> Self {
        Self(segments.into_iter().collect())
    }

    /// Returns the segments making up this id.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns true if this id has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends further segments (used when a `Depends.submodules` entry is appended to a base
    /// name, e.g. `Qt` + `widgets` -> `Qt.widgets`).
    pub fn push_segments(&mut self, segments: impl IntoIterator<Item = String>) {
        self.0.extend(segments);
    }

    /// Returns every non-empty suffix of this id, longest first, used by the module provider
    /// loader's "scoped" lookup mode (`moduleProviders/a/b/provider.qbs`, then
    /// `moduleProviders/b/provider.qbs`).
    pub fn suffixes(&self) -> impl Iterator<Item = QualifiedId> + '_ {
        (0..self.0.len()).map(move |start| QualifiedId(self.0[start..].to_vec()))
    }

    /// Joins the segments with `.`.
    pub fn to_dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted())
    }
}

impl From<&str> for QualifiedId {
    fn from(s: &str) -> Self {
        Self::from_dotted(s)
    }
}

impl From<String> for QualifiedId {
    fn from(s: String) -> Self {
        Self::from_dotted(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_are_longest_first() {
        let id = QualifiedId::from_dotted("a.b.c");
        let suffixes: Vec<_> = id.suffixes().map(|s| s.to_dotted()).collect();
        assert_eq!(suffixes, vec!["a.b.c", "b.c", "c"]);
    }

    #[test]
    fn round_trips_through_dotted_string() {
        let id = QualifiedId::from_dotted("Qt.widgets");
        assert_eq!(id.segments(), &["Qt", "widgets"]);
        assert_eq!(id.to_dotted(), "Qt.widgets");
    }
}
