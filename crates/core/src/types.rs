use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::ops::Deref;

use crate::errors::{Error, Result};

/// A repository-relative, forward-slash path of a changed file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Normalize and validate a path reported by a change source.
    ///
    /// Backslashes become forward slashes, leading `./` segments and repeated
    /// separators are dropped. Absolute paths and paths escaping the
    /// repository root are rejected.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref().replace('\\', "/");
        if raw.starts_with('/') {
            return Err(Error::configuration(format!(
                "changed path '{raw}' must be relative to the repository root"
            )));
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::configuration(format!(
                        "changed path '{raw}' escapes the repository root"
                    )))
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(Error::configuration("changed path cannot be empty"));
        }

        Ok(RepoPath(segments.join("/")))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Lowercased extension of the final segment, if any.
    ///
    /// Dotfiles such as `.env` have no extension.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) if idx + 1 < name.len() => Some(name[idx + 1..].to_ascii_lowercase()),
            Some(_) => None,
        }
    }

    /// Whether this path equals `prefix` or lies underneath it
    pub fn is_within(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        self.0 == prefix
            || (self.0.starts_with(prefix) && self.0.as_bytes().get(prefix.len()) == Some(&b'/'))
    }
}

impl Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for RepoPath {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for RepoPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RepoPath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

/// Variables available to the planned operations, as supplied by an
/// inventory or host-data collaborator.
///
/// A name bound to `null` counts as undefined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailableVariables(BTreeMap<String, serde_json::Value>);

impl AvailableVariables {
    /// Create a new empty variable set
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create from an existing map
    #[must_use]
    pub fn from_map(map: BTreeMap<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// Insert a variable, returning the previous value if any
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Get a variable by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Whether the variable is present with a non-null value
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(value) if !value.is_null())
    }

    /// Merge another set into this one; values in `other` win
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Number of variables, including null ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for AvailableVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
