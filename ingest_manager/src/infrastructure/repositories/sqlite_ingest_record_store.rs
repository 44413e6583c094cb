// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Ingest Record Store
//!
//! SQLite-backed implementation of [`IngestRecordStore`]. Implements the
//! insert-then-update upsert protocol: a concurrent writer racing the same
//! `(output, doc_key)` either loses the unique-index race on insert (retried
//! as an update) or the database reports a transient busy/locked condition
//! (retried after a randomized backoff).

use async_trait::async_trait;
use ingest_manager_domain::{
    DocKey, IngestError, IngestRecord, IngestRecordStore, OutputConnectionName, UpsertFields, UriHash,
};
use rand::Rng;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Maximum number of bound parameters per `IN (...)` clause. Kept
/// conservative relative to SQLite's default `SQLITE_MAX_VARIABLE_NUMBER`.
const MAX_CHUNK: usize = 400;

pub struct SqliteIngestRecordStore {
    pool: SqlitePool,
}

impl SqliteIngestRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<IngestRecord, IngestError> {
    let output_connection = OutputConnectionName::new(row.get::<String, _>("output_connection"))?;
    let doc_key = DocKey::from_string(row.get::<String, _>("doc_key"))?;
    let doc_uri: Option<String> = row.get("doc_uri");
    let uri_hash_str: Option<String> = row.get("uri_hash");
    let uri_hash = uri_hash_str.map(UriHash::from_stored);
    Ok(IngestRecord {
        id: row.get("id"),
        output_connection,
        doc_key,
        doc_uri,
        uri_hash,
        last_version: row.get("last_version"),
        last_output_version: row.get("last_output_version"),
        last_transformation_version: row.get("last_transformation_version"),
        forced_params: row.get("forced_params"),
        change_count: row.get("change_count"),
        first_ingest: row.get("first_ingest"),
        last_ingest: row.get("last_ingest"),
        authority_name: row.get("authority_name"),
    })
}

/// Classification of a `sqlx::Error` for retry purposes.
enum Classified {
    Unique,
    Transient,
    Other(IngestError),
}

fn classify(err: sqlx::Error) -> Classified {
    if let sqlx::Error::Database(ref db_err) = err {
        let message = db_err.message();
        if message.contains("UNIQUE constraint failed") {
            return Classified::Unique;
        }
        if message.contains("database is locked") || message.contains("database table is locked") {
            return Classified::Transient;
        }
    }
    Classified::Other(IngestError::database(err.to_string()))
}

async fn backoff(attempt: u32) {
    let base_ms = 10u64.saturating_mul(1 << attempt.min(6));
    let jitter_ms = rand::rng().random_range(0..=base_ms);
    debug!(attempt, jitter_ms, "retrying ingest store operation after backoff");
    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
}

fn chunks<T: Clone>(items: &[T], size: usize) -> impl Iterator<Item = Vec<T>> + '_ {
    items.chunks(size).map(|c| c.to_vec())
}

#[async_trait]
impl IngestRecordStore for SqliteIngestRecordStore {
    async fn lookup_by_key(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
    ) -> Result<Option<IngestRecord>, IngestError> {
        let row = sqlx::query("SELECT * FROM ingeststatus WHERE doc_key = ? AND output_connection = ?")
            .bind(doc_key.as_str())
            .bind(output.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IngestError::database(e.to_string()))?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_row_ids_by_doc_keys(
        &self,
        pairs: &[(OutputConnectionName, DocKey)],
    ) -> Result<HashSet<i64>, IngestError> {
        let mut ids = HashSet::new();
        for chunk in chunks(pairs, MAX_CHUNK / 2) {
            let clause = chunk.iter().map(|_| "(doc_key = ? AND output_connection = ?)").collect::<Vec<_>>().join(" OR ");
            let stmt = format!("SELECT id FROM ingeststatus WHERE {clause}");
            let mut query = sqlx::query(&stmt);
            for (output, doc_key) in &chunk {
                query = query.bind(doc_key.as_str()).bind(output.as_str());
            }
            let rows = query.fetch_all(&self.pool).await.map_err(|e| IngestError::database(e.to_string()))?;
            ids.extend(rows.into_iter().map(|r| r.get::<i64, _>("id")));
        }
        Ok(ids)
    }

    async fn find_row_ids_by_uri_hashes(
        &self,
        output: &OutputConnectionName,
        candidates: &[(UriHash, String)],
    ) -> Result<HashSet<i64>, IngestError> {
        let mut ids = HashSet::new();
        for chunk in chunks(candidates, MAX_CHUNK) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let stmt = format!(
                "SELECT id, uri_hash, doc_uri FROM ingeststatus WHERE output_connection = ? AND uri_hash IN ({placeholders})"
            );
            let mut query = sqlx::query(&stmt).bind(output.as_str());
            for (hash, _) in &chunk {
                query = query.bind(hash.as_str());
            }
            let rows = query.fetch_all(&self.pool).await.map_err(|e| IngestError::database(e.to_string()))?;
            for row in rows {
                let id: i64 = row.get("id");
                let hash: String = row.get("uri_hash");
                let uri: Option<String> = row.get("doc_uri");
                let matches = chunk
                    .iter()
                    .any(|(h, candidate_uri)| h.as_str() == hash && uri.as_deref() == Some(candidate_uri.as_str()));
                if matches {
                    ids.insert(id);
                }
            }
        }
        Ok(ids)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<(), IngestError> {
        for chunk in chunks(ids, MAX_CHUNK) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let stmt = format!("DELETE FROM ingeststatus WHERE id IN ({placeholders})");
            let mut query = sqlx::query(&stmt);
            for id in &chunk {
                query = query.bind(id);
            }
            query.execute(&self.pool).await.map_err(|e| IngestError::database(e.to_string()))?;
        }
        Ok(())
    }

    async fn delete_stale_uri(
        &self,
        output: &OutputConnectionName,
        uri_hash: &UriHash,
        uri: &str,
        keep_id: Option<i64>,
    ) -> Result<(), IngestError> {
        let mut attempt = 0u32;
        loop {
            let mut tx: Transaction<'_, Sqlite> =
                self.pool.begin().await.map_err(|e| IngestError::database(e.to_string()))?;
            match delete_stale_uri_tx(&mut tx, output, uri_hash, uri, keep_id).await {
                Ok(()) => {
                    tx.commit().await.map_err(|e| IngestError::database(e.to_string()))?;
                    return Ok(());
                }
                Err(Classified::Transient) => {
                    warn!(%output, attempt, "transient database error clearing stale uri, backing off");
                    backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(Classified::Unique) => unreachable!("delete-only operation cannot race a unique index"),
                Err(Classified::Other(e)) => return Err(e),
            }
        }
    }

    async fn delete_stale_uri_and_upsert(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
        uri_hash: &UriHash,
        uri: &str,
        keep_id: Option<i64>,
        fields: UpsertFields,
        ingest_time_ms: i64,
    ) -> Result<IngestRecord, IngestError> {
        let mut attempt = 0u32;
        loop {
            match self.try_delete_stale_and_upsert(output, doc_key, uri_hash, uri, keep_id, &fields, ingest_time_ms).await {
                Ok(record) => return Ok(record),
                Err(Classified::Unique) => {
                    debug!(%output, %doc_key, "concurrent insert detected, retrying as update");
                    continue;
                }
                Err(Classified::Transient) => {
                    warn!(%output, %doc_key, attempt, "transient database error during upsert, backing off");
                    backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(Classified::Other(e)) => return Err(e),
            }
        }
    }

    async fn find_and_delete_by_doc_keys(
        &self,
        pairs: &[(OutputConnectionName, DocKey)],
        extra_ids: &[i64],
    ) -> Result<(), IngestError> {
        let mut attempt = 0u32;
        loop {
            let mut tx: Transaction<'_, Sqlite> =
                self.pool.begin().await.map_err(|e| IngestError::database(e.to_string()))?;
            match find_and_delete_by_doc_keys_tx(&mut tx, pairs, extra_ids).await {
                Ok(()) => {
                    tx.commit().await.map_err(|e| IngestError::database(e.to_string()))?;
                    return Ok(());
                }
                Err(Classified::Transient) => {
                    warn!(attempt, "transient database error during find-and-delete, backing off");
                    backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(Classified::Unique) => unreachable!("delete-only operation cannot race a unique index"),
                Err(Classified::Other(e)) => return Err(e),
            }
        }
    }

    async fn upsert_record(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
        fields: UpsertFields,
        ingest_time_ms: i64,
    ) -> Result<IngestRecord, IngestError> {
        let mut attempt = 0u32;
        loop {
            match self.try_upsert(output, doc_key, &fields, ingest_time_ms).await {
                Ok(record) => return Ok(record),
                Err(Classified::Unique) => {
                    debug!(%output, %doc_key, "concurrent insert detected, retrying as update");
                    continue;
                }
                Err(Classified::Transient) => {
                    warn!(%output, %doc_key, attempt, "transient database error during upsert, backing off");
                    backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(Classified::Other(e)) => return Err(e),
            }
        }
    }

    async fn update_last_ingest(&self, ids: &[i64], check_time_ms: i64) -> Result<(), IngestError> {
        for chunk in chunks(ids, MAX_CHUNK) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let stmt = format!("UPDATE ingeststatus SET last_ingest = ? WHERE id IN ({placeholders})");
            let mut query = sqlx::query(&stmt).bind(check_time_ms);
            for id in &chunk {
                query = query.bind(id);
            }
            query.execute(&self.pool).await.map_err(|e| IngestError::database(e.to_string()))?;
        }
        Ok(())
    }

    async fn reset_versions(&self, output: &OutputConnectionName) -> Result<(), IngestError> {
        sqlx::query("UPDATE ingeststatus SET last_version = NULL WHERE output_connection = ?")
            .bind(output.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::database(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_output(&self, output: &OutputConnectionName) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM ingeststatus WHERE output_connection = ?")
            .bind(output.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::database(e.to_string()))?;
        Ok(())
    }
}

impl SqliteIngestRecordStore {
    async fn try_upsert(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
        fields: &UpsertFields,
        ingest_time_ms: i64,
    ) -> Result<IngestRecord, Classified> {
        let mut tx: Transaction<'_, Sqlite> =
            self.pool.begin().await.map_err(|e| Classified::Other(IngestError::database(e.to_string())))?;
        let record = upsert_body_tx(&mut tx, output, doc_key, fields, ingest_time_ms).await?;
        tx.commit().await.map_err(|e| Classified::Other(IngestError::database(e.to_string())))?;
        Ok(record)
    }

    /// Like [`try_upsert`](Self::try_upsert), but first deletes any row
    /// (other than `keep_id`) sharing `uri_hash`/`uri` within the same
    /// transaction, so the purge and the write are observed atomically.
    #[allow(clippy::too_many_arguments)]
    async fn try_delete_stale_and_upsert(
        &self,
        output: &OutputConnectionName,
        doc_key: &DocKey,
        uri_hash: &UriHash,
        uri: &str,
        keep_id: Option<i64>,
        fields: &UpsertFields,
        ingest_time_ms: i64,
    ) -> Result<IngestRecord, Classified> {
        let mut tx: Transaction<'_, Sqlite> =
            self.pool.begin().await.map_err(|e| Classified::Other(IngestError::database(e.to_string())))?;
        delete_stale_uri_tx(&mut tx, output, uri_hash, uri, keep_id).await?;
        let record = upsert_body_tx(&mut tx, output, doc_key, fields, ingest_time_ms).await?;
        tx.commit().await.map_err(|e| Classified::Other(IngestError::database(e.to_string())))?;
        Ok(record)
    }
}

/// Finds and deletes, within `tx`, any row for `output` (other than
/// `keep_id`) whose `uri_hash` matches `uri_hash` and `doc_uri` equals `uri`
/// exactly.
async fn delete_stale_uri_tx(
    tx: &mut Transaction<'_, Sqlite>,
    output: &OutputConnectionName,
    uri_hash: &UriHash,
    uri: &str,
    keep_id: Option<i64>,
) -> Result<(), Classified> {
    let rows = sqlx::query("SELECT id FROM ingeststatus WHERE output_connection = ? AND uri_hash = ? AND doc_uri = ?")
        .bind(output.as_str())
        .bind(uri_hash.as_str())
        .bind(uri)
        .fetch_all(&mut **tx)
        .await
        .map_err(classify)?;
    let ids: Vec<i64> = rows.into_iter().map(|r| r.get::<i64, _>("id")).filter(|id| Some(*id) != keep_id).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let stmt = format!("DELETE FROM ingeststatus WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&stmt);
    for id in &ids {
        query = query.bind(id);
    }
    query.execute(&mut **tx).await.map_err(classify)?;
    Ok(())
}

/// Finds, within `tx`, the row ids for every `(output, doc_key)` pair in
/// `pairs`, unions them with `extra_ids`, and deletes the whole set.
async fn find_and_delete_by_doc_keys_tx(
    tx: &mut Transaction<'_, Sqlite>,
    pairs: &[(OutputConnectionName, DocKey)],
    extra_ids: &[i64],
) -> Result<(), Classified> {
    let mut ids: HashSet<i64> = extra_ids.iter().copied().collect();
    for chunk in chunks(pairs, MAX_CHUNK / 2) {
        let clause = chunk.iter().map(|_| "(doc_key = ? AND output_connection = ?)").collect::<Vec<_>>().join(" OR ");
        let stmt = format!("SELECT id FROM ingeststatus WHERE {clause}");
        let mut query = sqlx::query(&stmt);
        for (output, doc_key) in &chunk {
            query = query.bind(doc_key.as_str()).bind(output.as_str());
        }
        let rows = query.fetch_all(&mut **tx).await.map_err(classify)?;
        ids.extend(rows.into_iter().map(|r| r.get::<i64, _>("id")));
    }
    if ids.is_empty() {
        return Ok(());
    }
    let id_list: Vec<i64> = ids.into_iter().collect();
    for chunk in chunks(&id_list, MAX_CHUNK) {
        let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let stmt = format!("DELETE FROM ingeststatus WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&stmt);
        for id in &chunk {
            query = query.bind(id);
        }
        query.execute(&mut **tx).await.map_err(classify)?;
    }
    Ok(())
}

/// Runs the insert-then-update upsert body within an already-open `tx`
/// (no begin/commit of its own), so callers can compose it with other
/// writes inside one transaction.
async fn upsert_body_tx(
    tx: &mut Transaction<'_, Sqlite>,
    output: &OutputConnectionName,
    doc_key: &DocKey,
    fields: &UpsertFields,
    ingest_time_ms: i64,
) -> Result<IngestRecord, Classified> {
    let existing = sqlx::query(
        "SELECT id, change_count, first_ingest FROM ingeststatus WHERE doc_key = ? AND output_connection = ?",
    )
    .bind(doc_key.as_str())
    .bind(output.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(classify)?;

    let uri_hash = fields.doc_uri.as_deref().map(UriHash::of);

    let record = if let Some(row) = existing {
        let id: i64 = row.get("id");
        let change_count: i64 = row.get("change_count");
        let first_ingest: i64 = row.get("first_ingest");
        sqlx::query(
            "UPDATE ingeststatus SET doc_uri = ?, uri_hash = ?, last_version = ?, last_output_version = ?, \
             last_transformation_version = ?, forced_params = ?, authority_name = ?, change_count = ?, \
             last_ingest = ? WHERE id = ?",
        )
        .bind(&fields.doc_uri)
        .bind(uri_hash.as_ref().map(UriHash::as_str))
        .bind(&fields.last_version)
        .bind(&fields.last_output_version)
        .bind(&fields.last_transformation_version)
        .bind(&fields.forced_params)
        .bind(&fields.authority_name)
        .bind(change_count + 1)
        .bind(ingest_time_ms)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(classify)?;

        IngestRecord {
            id,
            output_connection: output.clone(),
            doc_key: doc_key.clone(),
            doc_uri: fields.doc_uri.clone(),
            uri_hash,
            last_version: fields.last_version.clone(),
            last_output_version: fields.last_output_version.clone(),
            last_transformation_version: fields.last_transformation_version.clone(),
            forced_params: fields.forced_params.clone(),
            change_count: change_count + 1,
            first_ingest,
            last_ingest: ingest_time_ms,
            authority_name: fields.authority_name.clone(),
        }
    } else {
        let id: i64 = rand::rng().random_range(1..=i64::MAX);
        sqlx::query(
            "INSERT INTO ingeststatus (id, output_connection, doc_key, doc_uri, uri_hash, last_version, \
             last_output_version, last_transformation_version, forced_params, change_count, first_ingest, \
             last_ingest, authority_name) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(id)
        .bind(output.as_str())
        .bind(doc_key.as_str())
        .bind(&fields.doc_uri)
        .bind(uri_hash.as_ref().map(UriHash::as_str))
        .bind(&fields.last_version)
        .bind(&fields.last_output_version)
        .bind(&fields.last_transformation_version)
        .bind(&fields.forced_params)
        .bind(ingest_time_ms)
        .bind(ingest_time_ms)
        .bind(&fields.authority_name)
        .execute(&mut **tx)
        .await
        .map_err(classify)?;

        IngestRecord {
            id,
            output_connection: output.clone(),
            doc_key: doc_key.clone(),
            doc_uri: fields.doc_uri.clone(),
            uri_hash,
            last_version: fields.last_version.clone(),
            last_output_version: fields.last_output_version.clone(),
            last_transformation_version: fields.last_transformation_version.clone(),
            forced_params: fields.forced_params.clone(),
            change_count: 1,
            first_ingest: ingest_time_ms,
            last_ingest: ingest_time_ms,
            authority_name: fields.authority_name.clone(),
        }
    };

    Ok(record)
}
