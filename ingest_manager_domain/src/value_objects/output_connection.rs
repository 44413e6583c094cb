// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Name of a downstream output connection. Bounded to `VARCHAR(32)` to match
//! the `ingeststatus` table column.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputConnectionName(String);

impl OutputConnectionName {
    pub fn new(name: impl Into<String>) -> Result<Self, IngestError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IngestError::validation("output connection name must not be empty"));
        }
        if name.len() > MAX_LEN {
            return Err(IngestError::validation(format!(
                "output connection name exceeds {MAX_LEN} characters: {name}"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputConnectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OutputConnectionName {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversize_names() {
        assert!(OutputConnectionName::new("x".repeat(MAX_LEN + 1)).is_err());
        assert!(OutputConnectionName::new("web").is_ok());
    }
}
