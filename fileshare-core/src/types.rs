// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// Maximum file name length accepted by the stores.
const MAX_FILE_NAME_LEN: usize = 255;

/// Validated file name.
/// Must be non-empty, a single path component, max 255 bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Create a new FileName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, StorageError> {
        let name = name.into();

        if name.is_empty() {
            return Err(StorageError::EmptyName);
        }

        // Path traversal: only a bare component is accepted
        let is_bare = !name.contains('/')
            && !name.contains('\\')
            && name != "."
            && name != ".."
            && !name.contains('\0');
        if !is_bare || name.len() > MAX_FILE_NAME_LEN {
            return Err(StorageError::InvalidName { name });
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FileName {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FileName> for String {
    fn from(name: FileName) -> Self {
        name.0
    }
}

/// Opaque token pairing one reply with the request that caused it.
///
/// Minted by the issuing client, one per outstanding request. The value has
/// no meaning beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Mint a fresh, globally unique token.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a token received from the wire.
    pub fn from_wire(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker queue address (request queue or reply channel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QueueName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_valid() {
        assert!(FileName::new("report.pdf").is_ok());
        assert!(FileName::new("test_10kb_3.dat").is_ok());
        assert!(FileName::new(".hidden").is_ok());
    }

    #[test]
    fn test_file_name_invalid() {
        assert!(matches!(FileName::new(""), Err(StorageError::EmptyName)));
        assert!(FileName::new("../etc/passwd").is_err());
        assert!(FileName::new("dir/file").is_err());
        assert!(FileName::new("..").is_err());
        assert!(FileName::new("a".repeat(256)).is_err());
    }

    #[test]
    fn test_correlation_tokens_are_unique() {
        let a = CorrelationToken::mint();
        let b = CorrelationToken::mint();
        assert_ne!(a, b);
        assert_eq!(CorrelationToken::from_wire(a.as_str()), a);
    }
}
