//! Collection name validation

use crate::{Result, YieldbError};

/// Longest collection name accepted, in bytes
const MAX_NAME_BYTES: usize = 120;

/// Prefix the server keeps for its own collections
const RESERVED_PREFIX: &str = "system.";

/// A collection name that the server will accept as a namespace
///
/// Checked once by [`Database::col`](crate::Database::col); a
/// [`Collection`](crate::Collection) never holds an unchecked name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    pub fn new(name: &str) -> Result<Self> {
        if let Some(problem) = name_problem(name) {
            return Err(YieldbError::Validation(format!(
                "invalid collection name {:?}: {}",
                name, problem
            )));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn into_string(self) -> String {
        self.name
    }
}

fn name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_NAME_BYTES {
        Some("name is longer than 120 bytes")
    } else if name.starts_with(RESERVED_PREFIX) {
        Some("names starting with \"system.\" are reserved")
    } else if name.contains(|c: char| c == '\0' || c == '$') {
        Some("name contains a NUL or '$'")
    } else {
        None
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
