// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema for the `ingeststatus` table.
//!
//! Unlike the rest of the crate, this is not a numbered migration-file
//! sequence: the target schema is fixed and versionless, owned entirely by
//! this crate. On every startup the live schema is introspected via
//! `PRAGMA table_info`/`PRAGMA index_list` and diffed against the target;
//! the diff is applied inside one transaction and is a no-op on a database
//! that already matches.

use sqlx::migrate::MigrateDatabase;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

pub const TABLE_NAME: &str = "ingeststatus";

struct ColumnDef {
    name: &'static str,
    sql_type: &'static str,
}

const TARGET_COLUMNS: &[ColumnDef] = &[
    ColumnDef { name: "id", sql_type: "BIGINT" },
    ColumnDef { name: "output_connection", sql_type: "VARCHAR(32)" },
    ColumnDef { name: "doc_key", sql_type: "VARCHAR(73)" },
    ColumnDef { name: "doc_uri", sql_type: "LONGTEXT" },
    ColumnDef { name: "uri_hash", sql_type: "VARCHAR(40)" },
    ColumnDef { name: "last_version", sql_type: "LONGTEXT" },
    ColumnDef { name: "last_output_version", sql_type: "LONGTEXT" },
    ColumnDef { name: "last_transformation_version", sql_type: "LONGTEXT" },
    ColumnDef { name: "forced_params", sql_type: "LONGTEXT" },
    ColumnDef { name: "change_count", sql_type: "BIGINT" },
    ColumnDef { name: "first_ingest", sql_type: "BIGINT" },
    ColumnDef { name: "last_ingest", sql_type: "BIGINT" },
    ColumnDef { name: "authority_name", sql_type: "VARCHAR(32)" },
];

struct IndexDef {
    name: &'static str,
    unique: bool,
    columns: &'static [&'static str],
}

const TARGET_INDEXES: &[IndexDef] = &[
    IndexDef { name: "idx_ingeststatus_dockey_output", unique: true, columns: &["doc_key", "output_connection"] },
    IndexDef { name: "idx_ingeststatus_urihash_output", unique: false, columns: &["uri_hash", "output_connection"] },
    IndexDef { name: "idx_ingeststatus_output", unique: false, columns: &["output_connection"] },
];

/// Applies the declarative diff described above against `pool`. Safe to call
/// on every startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("ensuring {TABLE_NAME} schema is up to date");

    let mut tx = pool.begin().await?;

    create_table_if_missing(&mut tx).await?;
    let existing_columns = introspect_columns(&mut tx).await?;
    for column in TARGET_COLUMNS {
        if !existing_columns.iter().any(|c| c == column.name) {
            debug!("adding missing column {}", column.name);
            let stmt = format!("ALTER TABLE {TABLE_NAME} ADD COLUMN {} {}", column.name, column.sql_type);
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
    }

    let existing_indexes = introspect_indexes(&mut tx).await?;
    for existing in &existing_indexes {
        if existing.starts_with("sqlite_autoindex_") {
            continue;
        }
        if !TARGET_INDEXES.iter().any(|i| i.name == existing) {
            debug!("dropping stale index {existing}");
            let stmt = format!("DROP INDEX IF EXISTS {existing}");
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
    }
    for index in TARGET_INDEXES {
        if !existing_indexes.iter().any(|i| i == index.name) {
            debug!("creating missing index {}", index.name);
            let unique = if index.unique { "UNIQUE " } else { "" };
            let stmt = format!(
                "CREATE {unique}INDEX {} ON {TABLE_NAME} ({})",
                index.name,
                index.columns.join(", ")
            );
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
    }

    tx.commit().await?;
    info!("{TABLE_NAME} schema is up to date");
    Ok(())
}

async fn create_table_if_missing(tx: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
    let columns_sql = TARGET_COLUMNS
        .iter()
        .map(|c| {
            if c.name == "id" {
                format!("{} {} PRIMARY KEY", c.name, c.sql_type)
            } else {
                format!("{} {}", c.name, c.sql_type)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let stmt = format!("CREATE TABLE IF NOT EXISTS {TABLE_NAME} ({columns_sql})");
    sqlx::query(&stmt).execute(&mut *tx).await?;
    Ok(())
}

async fn introspect_columns(tx: &mut sqlx::SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({TABLE_NAME})")).fetch_all(&mut *tx).await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>("name")).collect())
}

async fn introspect_indexes(tx: &mut sqlx::SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA index_list({TABLE_NAME})")).fetch_all(&mut *tx).await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>("name")).collect())
}

/// Creates the SQLite database file if it does not already exist.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    if !sqlx::Sqlite::database_exists(database_url).await? {
        debug!("database does not exist, creating: {database_url}");
        sqlx::Sqlite::create_database(database_url).await?;
        info!("created new SQLite database: {database_url}");
    } else {
        debug!("database already exists: {database_url}");
    }
    Ok(())
}

/// Convenience entry point: creates the database file if missing, connects,
/// and applies the schema diff.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    create_database_if_missing(database_url).await?;
    let pool = SqlitePool::connect(database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}
