//! Path exclusion matching.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Marks a pattern as a prefix match when it's the last character.
pub const WILDCARD: char = '*';

/// An ordered set of path patterns exempt from authentication.
///
/// A pattern matches a path when both are equal once a trailing slash is
/// appended to each, so `/status` and `/status/` are interchangeable. A
/// pattern ending in [`WILDCARD`] matches every path starting with the
/// literal prefix before it.
///
/// ```rust
/// use axum_auth_strategy::ExclusionList;
///
/// let exclusions = ExclusionList::new(["/api/v1/status/", "/public/*"]);
///
/// assert!(!exclusions.requires_auth(Some("/api/v1/status")));
/// assert!(!exclusions.requires_auth(Some("/public/logo.png")));
/// assert!(exclusions.requires_auth(Some("/api/v1/users")));
/// assert!(exclusions.requires_auth(None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionList(Vec<String>);

impl ExclusionList {
    /// Creates a list from the given patterns, in order.
    pub fn new<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    /// Parses a comma separated list of patterns. Blank entries are skipped.
    pub fn parse(patterns: &str) -> Self {
        Self(
            patterns
                .split(',')
                .map(str::trim)
                .filter(|pattern| !pattern.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Returns the patterns in order.
    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if no pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `false` only when `path` explicitly matches a pattern.
    pub fn requires_auth(&self, path: Option<&str>) -> bool {
        requires_auth(path, &self.0)
    }
}

impl<P: Into<String>> FromIterator<P> for ExclusionList {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Decides whether `path` requires authentication given `exclusions`.
///
/// Fails closed: a missing path or an empty exclusion list always requires
/// authentication.
pub fn requires_auth<P: AsRef<str>>(path: Option<&str>, exclusions: &[P]) -> bool {
    let Some(path) = path else {
        return true;
    };

    let path = with_trailing_slash(path);

    !exclusions
        .iter()
        .any(|pattern| is_match(pattern.as_ref(), &path))
}

fn is_match(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => path.starts_with(prefix),
        None => with_trailing_slash(pattern) == path,
    }
}

fn with_trailing_slash(path: &str) -> Cow<'_, str> {
    if path.ends_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("{path}/"))
    }
}
