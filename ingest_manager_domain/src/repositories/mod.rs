//! Async port traits implemented by the infrastructure layer.

mod connectors;
mod ingest_record_store;
mod uri_lock_registry;

pub use connectors::{
    ActivityLog, AddOutcome, ConnectorPool, OutputConnector, RepositoryDocument, TransformationConnector,
};
pub use ingest_record_store::{IngestRecordStore, UpsertFields};
pub use uri_lock_registry::UriLockRegistry;
