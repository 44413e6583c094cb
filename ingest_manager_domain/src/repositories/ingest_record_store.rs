// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingest Record Store
//!
//! Repository interface over the `ingeststatus` table. Implementations own
//! their own transaction boundaries and deadlock-retry behavior; callers see
//! a plain async API and never observe a partially-applied write.

use crate::entities::IngestRecord;
use crate::error::IngestError;
use crate::value_objects::{DocKey, OutputConnectionName, UriHash};
use async_trait::async_trait;
use std::collections::HashSet;

/// Fields written by [`IngestRecordStore::upsert_record`]. `doc_uri = None`
/// records a version without delivering anything (the connector chose "skip
/// indexing"); `last_version = None` marks the pre-ingest placeholder
/// described in the error-handling design (a crash mid-send still leaves a
/// row that a later pass will treat as "needs reindex").
#[derive(Debug, Clone, Default)]
pub struct UpsertFields {
    pub doc_uri: Option<String>,
    pub last_version: Option<String>,
    pub last_output_version: Option<String>,
    pub last_transformation_version: Option<String>,
    pub forced_params: Option<String>,
    pub authority_name: String,
}

/// Persistence interface for per-(output, document) ingest state.
///
/// Implementations must be thread-safe (`Send + Sync`) since the manager
/// invokes them from multiple concurrent coordinator calls.
#[async_trait]
pub trait IngestRecordStore: Send + Sync {
    /// Looks up the current row for `(output, doc_key)`, if any.
    async fn lookup_by_key(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
    ) -> Result<Option<IngestRecord>, IngestError>;

    /// Row ids for every `(output, doc_key)` pair present in `pairs`.
    async fn find_row_ids_by_doc_keys(
        &self,
        pairs: &[(OutputConnectionName, DocKey)],
    ) -> Result<HashSet<i64>, IngestError>;

    /// Row ids whose `uri_hash` matches one of `candidates` for the given
    /// output, filtered further by exact `doc_uri` equality to defeat hash
    /// collisions.
    async fn find_row_ids_by_uri_hashes(
        &self,
        output: &OutputConnectionName,
        candidates: &[(UriHash, String)],
    ) -> Result<HashSet<i64>, IngestError>;

    /// Deletes rows by id, chunked internally to respect the database's
    /// maximum `IN (...)` clause size.
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<(), IngestError>;

    /// Insert-then-update upsert: writes `fields` for `(output, doc_key)`,
    /// creating the row on first ingest (`change_count = 1`,
    /// `first_ingest = last_ingest`) or updating it and incrementing
    /// `change_count` otherwise. Retries internally on deadlock/serialization
    /// abort and on a concurrent insert racing this one.
    async fn upsert_record(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
        fields: UpsertFields,
        ingest_time_ms: i64,
    ) -> Result<IngestRecord, IngestError>;

    /// Bulk-updates `last_ingest` for the given row ids, chunked internally.
    async fn update_last_ingest(&self, ids: &[i64], check_time_ms: i64) -> Result<(), IngestError>;

    /// Atomically deletes any row for `output` (other than `keep_id`) whose
    /// `uri_hash` matches `uri_hash` and whose `doc_uri` equals `uri`
    /// exactly. Runs the lookup and the delete in one transaction so a
    /// concurrent insert racing the lookup cannot escape deletion.
    async fn delete_stale_uri(
        &self,
        output: &OutputConnectionName,
        uri_hash: &UriHash,
        uri: &str,
        keep_id: Option<i64>,
    ) -> Result<(), IngestError>;

    /// Atomically deletes any stale row matching `uri_hash`/`uri` (as
    /// [`delete_stale_uri`](Self::delete_stale_uri)) and then runs the
    /// insert-then-update upsert protocol for `(output, doc_key)`, all within
    /// one transaction. Used wherever a stale-row purge and the following
    /// write must be observed as a single atomic step.
    #[allow(clippy::too_many_arguments)]
    async fn delete_stale_uri_and_upsert(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
        uri_hash: &UriHash,
        uri: &str,
        keep_id: Option<i64>,
        fields: UpsertFields,
        ingest_time_ms: i64,
    ) -> Result<IngestRecord, IngestError>;

    /// Atomically resolves row ids for every `(output, doc_key)` pair in
    /// `pairs`, unions them with `extra_ids`, and deletes the whole set in
    /// one transaction. Because the lookup and the delete share a
    /// transaction, a concurrent insert for one of `pairs` cannot slip in
    /// between the lookup and the delete and survive it.
    async fn find_and_delete_by_doc_keys(
        &self,
        pairs: &[(OutputConnectionName, DocKey)],
        extra_ids: &[i64],
    ) -> Result<(), IngestError>;

    /// Blanks `last_version` for every row of `output`, forcing a resend on
    /// the next check.
    async fn reset_versions(&self, output: &OutputConnectionName) -> Result<(), IngestError>;

    /// Unconditionally deletes every row of `output`.
    async fn delete_by_output(&self, output: &OutputConnectionName) -> Result<(), IngestError>;
}
