use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// `chrono` format of the timestamp prefix: second resolution, UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Width of the rendered timestamp prefix.
pub const TIMESTAMP_LEN: usize = 14;

const MAX_FILE_NAME_LEN: usize = 200;

/// Reduce a client-supplied file name to a single safe path segment.
///
/// Directory components (either separator) are dropped, control characters
/// become `_`, surrounding whitespace is trimmed. Names that are empty,
/// `.`/`..`, or longer than 200 bytes after cleaning are rejected.
pub fn sanitize_file_name(raw: &str) -> Result<String, TypeError> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .trim()
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." || cleaned.len() > MAX_FILE_NAME_LEN {
        return Err(TypeError::InvalidFileName(raw.to_string()));
    }
    Ok(cleaned)
}

/// Name an upload is stored under in its backing repository.
///
/// Layout: `{YYYYMMDDHHMMSS}_{original}` or, with a nonce,
/// `{YYYYMMDDHHMMSS}_{nonce:08x}_{original}`. The timestamp alone only
/// separates uploads of the same file more than a second apart; the nonce
/// covers concurrent uploads inside one second.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName(String);

impl ObjectName {
    /// Derive the stored name for `original` uploaded at `at`.
    pub fn derive(original: &str, at: DateTime<Utc>, nonce: Option<u32>) -> Result<Self, TypeError> {
        let original = sanitize_file_name(original)?;
        let stamp = at.format(TIMESTAMP_FORMAT);
        let name = match nonce {
            Some(n) => format!("{stamp}_{n:08x}_{original}"),
            None => format!("{stamp}_{original}"),
        };
        Ok(Self(name))
    }

    /// The leading 14-digit timestamp.
    pub fn timestamp_prefix(&self) -> &str {
        self.0.get(..TIMESTAMP_LEN).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ObjectName {
    type Error = TypeError;

    /// Accept a name previously produced by [`ObjectName::derive`].
    fn try_from(raw: String) -> Result<Self, TypeError> {
        let valid = raw
            .get(..TIMESTAMP_LEN)
            .is_some_and(|stamp| stamp.bytes().all(|b| b.is_ascii_digit()))
            && raw[TIMESTAMP_LEN..]
                .strip_prefix('_')
                .is_some_and(|rest| sanitize_file_name(rest).is_ok_and(|clean| clean == rest));
        if valid {
            Ok(Self(raw))
        } else {
            Err(TypeError::InvalidObjectName(raw))
        }
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> Self {
        name.0
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectName({})", self.0)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
