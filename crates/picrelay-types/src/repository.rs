use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of one backing content repository (the `repo` part of
/// `owner/repo`).
///
/// Accepts the character set GitHub allows in repository names: ASCII
/// letters, digits, `-`, `_` and `.`, excluding the reserved `.` and `..`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Validate and wrap a repository identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if raw.is_empty() || raw == "." || raw == ".." || raw.len() > 100 || !valid_chars {
            return Err(TypeError::InvalidRepository(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepositoryId({})", self.0)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryId> for String {
    fn from(id: RepositoryId) -> Self {
        id.0
    }
}

impl AsRef<str> for RepositoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The ordered rotation targets, fixed for the lifetime of the process.
///
/// Always holds at least one repository and never the same one twice, so
/// index `i` of the rotation maps to exactly one target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RepositoryId>", into = "Vec<RepositoryId>")]
pub struct RepositoryList(Vec<RepositoryId>);

impl RepositoryList {
    pub fn new(repositories: Vec<RepositoryId>) -> Result<Self, TypeError> {
        if repositories.is_empty() {
            return Err(TypeError::EmptyRepositoryList);
        }
        for (i, repo) in repositories.iter().enumerate() {
            if repositories[..i].contains(repo) {
                return Err(TypeError::DuplicateRepository(repo.to_string()));
            }
        }
        Ok(Self(repositories))
    }

    /// Parse a comma-separated list such as `"images-a, images-b"`.
    ///
    /// Surrounding whitespace and empty segments are ignored.
    pub fn parse_csv(raw: &str) -> Result<Self, TypeError> {
        let repositories = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(RepositoryId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(repositories)
    }

    /// Number of rotation targets (N).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// N as the modulus handed to the rotation counter.
    pub fn modulus(&self) -> NonZeroU64 {
        NonZeroU64::new(self.0.len() as u64).unwrap_or(NonZeroU64::MIN)
    }

    /// Repository at rotation index `index`, if in range.
    pub fn get(&self, index: u64) -> Option<&RepositoryId> {
        usize::try_from(index).ok().and_then(|i| self.0.get(i))
    }

    pub fn contains(&self, repository: &RepositoryId) -> bool {
        self.0.contains(repository)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepositoryId> {
        self.0.iter()
    }
}

impl TryFrom<Vec<RepositoryId>> for RepositoryList {
    type Error = TypeError;

    fn try_from(value: Vec<RepositoryId>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryList> for Vec<RepositoryId> {
    fn from(list: RepositoryList) -> Self {
        list.0
    }
}

impl fmt::Display for RepositoryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(RepositoryId::as_str).collect();
        f.write_str(&names.join(","))
    }
}
