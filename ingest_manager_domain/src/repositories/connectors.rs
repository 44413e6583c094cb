// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Connector Interfaces
//!
//! Ports consumed from the surrounding platform: connector pools, output and
//! transformation connectors, and the activity log each coordinator call
//! writes to. These are external collaborators (§6 of the ingest manager's
//! design) — this crate defines only the shape it needs from them.

use crate::error::IngestError;
use crate::value_objects::VersionContext;
use async_trait::async_trait;
use std::sync::Arc;

/// A document read from a repository connector, ready to flow through the
/// pipeline. `data` is reference-counted so a fan-out node can hand an
/// independent, cheaply-cloned view to each active sibling without copying
/// the underlying bytes.
#[derive(Debug, Clone)]
pub struct RepositoryDocument {
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub length: Option<u64>,
    pub data: Arc<Vec<u8>>,
}

impl RepositoryDocument {
    pub fn new(data: Vec<u8>) -> Self {
        Self { mime_type: None, file_name: None, length: Some(data.len() as u64), data: Arc::new(data) }
    }
}

/// Outcome of delivering a document to an output connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted,
    Rejected,
}

/// Per-call sink for activity records, qualified by stage connection name
/// when activity is forwarded from a transformation or output connector.
pub trait ActivityLog: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn record_activity(
        &self,
        start_time_ms: i64,
        activity_kind: &str,
        byte_count: Option<u64>,
        entity_uri: &str,
        result_code: &str,
        description: &str,
    );
}

/// Grab/release access to pooled connector handles, keyed by connection
/// name. A `None` handle signals "connector not installed" — callers must
/// surface this as [`IngestError::ConnectorAbsent`].
#[async_trait]
pub trait ConnectorPool<T: ?Sized + Send + Sync + 'static>: Send + Sync {
    async fn grab(&self, name: &str) -> Result<Option<Arc<T>>, IngestError>;

    async fn grab_multiple(&self, names: &[String]) -> Result<Vec<Option<Arc<T>>>, IngestError> {
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            handles.push(self.grab(name).await?);
        }
        Ok(handles)
    }

    async fn release(&self, name: &str, handle: Option<Arc<T>>);

    async fn release_multiple(&self, names: &[String], handles: Vec<Option<Arc<T>>>) {
        for (name, handle) in names.iter().zip(handles) {
            self.release(name, handle).await;
        }
    }
}

/// A downstream index endpoint.
#[async_trait]
pub trait OutputConnector: Send + Sync {
    async fn check_mime(&self, mime_type: Option<&str>) -> Result<bool, IngestError>;
    async fn check_file_name(&self, file_name: Option<&str>) -> Result<bool, IngestError>;
    async fn check_length(&self, length: Option<u64>) -> Result<bool, IngestError>;
    async fn check_url(&self, url: Option<&str>) -> Result<bool, IngestError>;

    async fn add_or_replace(
        &self,
        uri: &str,
        document: &RepositoryDocument,
        authority: &str,
        activities: &dyn ActivityLog,
    ) -> Result<AddOutcome, IngestError>;

    async fn remove(&self, uri: &str, output_version: &str, activities: &dyn ActivityLog) -> Result<(), IngestError>;

    /// Called when an entire output connection is removed, so the connector
    /// can drop any bookkeeping it kept outside the `ingeststatus` table.
    async fn note_all_records_removed(&self) -> Result<(), IngestError>;

    async fn get_pipeline_description(&self, spec_version: &str) -> Result<VersionContext, IngestError>;
}

/// An intermediate stage that rewrites or enriches a document before it
/// reaches an output connector.
#[async_trait]
pub trait TransformationConnector: Send + Sync {
    async fn check_mime(&self, mime_type: Option<&str>) -> Result<bool, IngestError>;
    async fn check_file_name(&self, file_name: Option<&str>) -> Result<bool, IngestError>;
    async fn check_length(&self, length: Option<u64>) -> Result<bool, IngestError>;
    async fn check_url(&self, url: Option<&str>) -> Result<bool, IngestError>;

    async fn transform(
        &self,
        document: RepositoryDocument,
        activities: &dyn ActivityLog,
    ) -> Result<RepositoryDocument, IngestError>;

    async fn get_pipeline_description(&self, spec_version: &str) -> Result<VersionContext, IngestError>;
}
