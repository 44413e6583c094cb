// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document Key Value Object
//!
//! A `DocKey` names a document within a repository connection's identifier
//! space: `"<identifier_class>:<identifier_hash>"`. It is the natural key a
//! connector uses to refer to a document across record/ingest/check/delete
//! calls, independent of whatever URI the document is eventually delivered
//! under.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a doc key, matching the `VARCHAR(73)` column in
/// `ingeststatus`.
pub const MAX_LEN: usize = 73;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey(String);

impl DocKey {
    /// Builds a doc key from an identifier class and identifier hash,
    /// joining them with `:`.
    pub fn new(identifier_class: &str, identifier_hash: &str) -> Result<Self, IngestError> {
        Self::from_string(format!("{identifier_class}:{identifier_hash}"))
    }

    /// Parses an already-joined `"<class>:<hash>"` string.
    pub fn from_string(s: impl Into<String>) -> Result<Self, IngestError> {
        let s = s.into();
        if s.is_empty() {
            return Err(IngestError::validation("doc key must not be empty"));
        }
        if s.len() > MAX_LEN {
            return Err(IngestError::validation(format!(
                "doc key exceeds {MAX_LEN} characters: {s}"
            )));
        }
        if !s.contains(':') {
            return Err(IngestError::validation(format!(
                "doc key must be of the form <class>:<hash>: {s}"
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits back into `(identifier_class, identifier_hash)`.
    pub fn split(&self) -> (&str, &str) {
        self.0.split_once(':').expect("validated at construction")
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocKey {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s.to_string())
    }
}
