// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingest Record Entity
//!
//! One row of the `ingeststatus` table: the versioning state the manager
//! last recorded for a single `(output_connection, doc_key)` pair. Table
//! uniqueness (I1, I2) and timestamp/counter monotonicity (I3) are enforced
//! by the store, not by this type alone, since they are properties of the
//! whole table rather than of one row in isolation. This type enforces what
//! it can see locally: `uri_hash` presence mirrors `doc_uri` presence (I4).

use crate::error::IngestError;
use crate::value_objects::{DocKey, OutputConnectionName, UriHash};

/// A single row of the ingest-state table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRecord {
    pub id: i64,
    pub output_connection: OutputConnectionName,
    pub doc_key: DocKey,
    pub doc_uri: Option<String>,
    pub uri_hash: Option<UriHash>,
    pub last_version: Option<String>,
    pub last_output_version: Option<String>,
    pub last_transformation_version: Option<String>,
    pub forced_params: Option<String>,
    pub change_count: i64,
    pub first_ingest: i64,
    pub last_ingest: i64,
    pub authority_name: String,
}

impl IngestRecord {
    /// Builds the first row for a document that has never been ingested
    /// before. `change_count` starts at 1 and `first_ingest == last_ingest`
    /// per I3.
    #[allow(clippy::too_many_arguments)]
    pub fn new_first_ingest(
        id: i64,
        output_connection: OutputConnectionName,
        doc_key: DocKey,
        doc_uri: Option<String>,
        last_version: Option<String>,
        last_output_version: Option<String>,
        last_transformation_version: Option<String>,
        forced_params: Option<String>,
        authority_name: String,
        ingest_time_ms: i64,
    ) -> Result<Self, IngestError> {
        let uri_hash = doc_uri.as_deref().map(UriHash::of);
        let record = Self {
            id,
            output_connection,
            doc_key,
            doc_uri,
            uri_hash,
            last_version,
            last_output_version,
            last_transformation_version,
            forced_params,
            change_count: 1,
            first_ingest: ingest_time_ms,
            last_ingest: ingest_time_ms,
            authority_name,
        };
        record.validate()?;
        Ok(record)
    }

    /// Checks invariants that a single row can express on its own: I3
    /// (counters/timestamps) and I4 (`uri_hash` iff `doc_uri`).
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.change_count < 1 {
            return Err(IngestError::Invariant("change_count must be >= 1".into()));
        }
        if self.first_ingest > self.last_ingest {
            return Err(IngestError::Invariant("first_ingest must be <= last_ingest".into()));
        }
        match (&self.doc_uri, &self.uri_hash) {
            (Some(uri), Some(hash)) => {
                if *hash != UriHash::of(uri) {
                    return Err(IngestError::Invariant("uri_hash does not match doc_uri".into()));
                }
            }
            (None, None) => {}
            _ => {
                return Err(IngestError::Invariant(
                    "uri_hash must be present iff doc_uri is present".into(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the fields needed to reconstruct a `DocumentIngestStatus` for
    /// this row.
    pub fn authority(&self) -> &str {
        &self.authority_name
    }
}
