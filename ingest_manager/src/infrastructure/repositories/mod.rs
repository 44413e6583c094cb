//! SQLite-backed implementation of the domain's `IngestRecordStore` port.

pub mod schema;
mod sqlite_ingest_record_store;

pub use sqlite_ingest_record_store::SqliteIngestRecordStore;
