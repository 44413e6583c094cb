// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! 40-hex-character hash of a delivered document's URI, used for the
//! non-unique `(uri_hash, output_connection)` lookup index. A hash lookup is
//! always followed by an exact string comparison against the stored URI to
//! defeat collisions (`IngestRecordStore::find_row_ids_by_uri_hashes`).

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UriHash(String);

impl UriHash {
    /// Computes the hash of a URI.
    pub fn of(uri: &str) -> Self {
        let digest = Sha1::digest(uri.as_bytes());
        Self(hex::encode(digest))
    }

    /// Wraps an already-computed hash read back from storage, skipping
    /// recomputation.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UriHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
