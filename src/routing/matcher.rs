//! Path pattern matching.
//!
//! # Responsibilities
//! - Match a request path against a fixed shape (exact, prefix, anything)
//! - Optionally require a leading `/{moniker}` segment naming a known origin
//! - Report what the pattern captured so the router can build a resolution
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching
//! - An unknown moniker is a non-match, so unscoped rules get their turn

use std::collections::HashSet;

/// Shape of the path (after any moniker segment) a pattern accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathShape {
    /// Path equals the string.
    Exact(String),
    /// Path starts with the string.
    Prefix(String),
    /// Any path.
    Any,
}

impl PathShape {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathShape::Exact(expected) => path == expected,
            PathShape::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathShape::Any => true,
        }
    }
}

/// A path pattern, optionally scoped under a `/{moniker}` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    scoped: bool,
    shape: PathShape,
}

/// What a successful match captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Captures<'a> {
    /// Moniker from the first segment, for scoped patterns.
    pub moniker: Option<&'a str>,
    /// Path following the moniker segment (the whole path when unscoped).
    pub rest: &'a str,
}

impl PathPattern {
    /// `/ping`, `/api/v1/query`, ...
    pub fn exact(path: impl Into<String>) -> Self {
        Self {
            scoped: false,
            shape: PathShape::Exact(path.into()),
        }
    }

    /// `/api/v1/...`
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            scoped: false,
            shape: PathShape::Prefix(prefix.into()),
        }
    }

    /// Matches every path.
    pub fn any() -> Self {
        Self {
            scoped: false,
            shape: PathShape::Any,
        }
    }

    /// `/{moniker}` followed by exactly `suffix`.
    pub fn scoped_exact(suffix: impl Into<String>) -> Self {
        Self {
            scoped: true,
            shape: PathShape::Exact(suffix.into()),
        }
    }

    /// `/{moniker}` followed by anything starting with `prefix`.
    pub fn scoped_prefix(prefix: impl Into<String>) -> Self {
        Self {
            scoped: true,
            shape: PathShape::Prefix(prefix.into()),
        }
    }

    /// Whether the pattern requires a moniker segment.
    pub fn is_scoped(&self) -> bool {
        self.scoped
    }

    /// Match `path`, accepting only monikers present in `monikers`.
    pub fn matches<'a>(&self, path: &'a str, monikers: &HashSet<String>) -> Option<Captures<'a>> {
        if !self.scoped {
            return self.shape.matches(path).then_some(Captures {
                moniker: None,
                rest: path,
            });
        }

        let (moniker, rest) = split_moniker(path)?;
        if !monikers.contains(moniker) || !self.shape.matches(rest) {
            return None;
        }
        Some(Captures {
            moniker: Some(moniker),
            rest,
        })
    }
}

/// Split `/{segment}/rest` into (`segment`, `/rest`).
fn split_moniker(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let slash = trimmed.find('/')?;
    let (moniker, rest) = trimmed.split_at(slash);
    (!moniker.is_empty()).then_some((moniker, rest))
}
