//! Validated shared memory names

use crate::{LinkError, Result, DEFAULT_LINK_NAME};
use std::fmt;
use std::str::FromStr;

/// Longest name accepted on any platform (POSIX `NAME_MAX`)
pub const MAX_NAME_LEN: usize = 255;

/// A name that is valid as a platform shared memory object name.
///
/// Names live in a platform-global namespace. They must be non-empty,
/// at most [`MAX_NAME_LEN`] bytes, and free of NUL bytes and `/`. The POSIX
/// backend adds the single leading `/` itself. Windows namespace prefixes
/// such as `Local\` are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkName(String);

impl LinkName {
    /// Validate `name` without touching any OS resource
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name).map_err(|reason| LinkError::InvalidName {
            name: name.clone(),
            reason,
        })?;
        Ok(Self(name))
    }

    /// Generate a collision-free name with the given prefix.
    ///
    /// Only 16 hex digits of the uuid are used so short prefixes stay within
    /// the 31-byte limit some POSIX systems put on shared memory names.
    pub fn unique(prefix: &str) -> Result<Self> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::new(format!("{}_{}", prefix, &id[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn validate(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name is longer than 255 bytes");
    }
    if name.contains('\0') {
        return Err("name contains a NUL byte");
    }
    if name.contains('/') {
        return Err("name contains a path separator");
    }
    Ok(())
}

impl Default for LinkName {
    fn default() -> Self {
        Self(DEFAULT_LINK_NAME.to_string())
    }
}

impl fmt::Display for LinkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LinkName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for LinkName {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for LinkName {
    type Error = LinkError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for LinkName {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
