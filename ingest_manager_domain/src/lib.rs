// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Manager Domain
//!
//! Pure business logic for tracking what has been delivered to downstream
//! output indexes, deciding when a document needs to be resent, and
//! describing the transformation/output pipeline a document flows through.
//!
//! ## Layout
//!
//! - [`value_objects`] — small validated types (`DocKey`, `UriHash`, ...)
//! - [`entities`] — `IngestRecord`, `PipelineSpecification`, `PipelineTopology`
//! - [`services`] — `ChangeDecider`, the reindex-decision logic
//! - [`repositories`] — async traits implemented by the infrastructure layer
//!
//! This crate has no knowledge of SQLite, tokio's reactor, or `tracing`; it
//! depends only on `async-trait`/`futures` for the I/O-shaped port traits
//! that infrastructure implements.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::{IngestError, IngestResult};

pub use entities::{
    IngestRecord, PipelineSpecification, PipelineStageKind, PipelineTopology, StageDescriptor,
};
pub use repositories::{
    ActivityLog, AddOutcome, ConnectorPool, IngestRecordStore, OutputConnector, RepositoryDocument,
    TransformationConnector, UpsertFields, UriLockRegistry,
};
pub use services::ChangeDecider;
pub use value_objects::{
    DocKey, DocumentIngestStatus, OutputConnectionName, OutputKey, UriHash, VersionContext,
};
