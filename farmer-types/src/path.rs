//! Farm paths.
//!
//! A farm is addressed by an absolute, `/`-separated path in the coordination
//! store. Entries live directly below it: `/services/db/10.0.0.7`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Immutable hierarchical path identifying a farm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FarmPath(String);

impl FarmPath {
    /// Parses and validates a farm path.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let invalid = |reason| Error::InvalidPath {
            path: path.clone(),
            reason,
        };

        if !path.starts_with('/') {
            return Err(invalid("must be absolute"));
        }
        if path.len() == 1 {
            return Err(invalid("must name at least one segment"));
        }
        if path.ends_with('/') {
            return Err(invalid("must not end with a slash"));
        }
        for segment in path[1..].split('/') {
            validate_segment(segment).map_err(|_| invalid("contains an empty or relative segment"))?;
        }

        Ok(Self(path))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments, root first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// Returns the full path of the node `name` directly below this farm.
    pub fn child(&self, name: &str) -> Result<String> {
        validate_segment(name)?;
        Ok(format!("{}/{}", self.0, name))
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
        return Err(Error::InvalidNodeName(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for FarmPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FarmPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for FarmPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FarmPath> for String {
    fn from(path: FarmPath) -> Self {
        path.0
    }
}

impl AsRef<str> for FarmPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
