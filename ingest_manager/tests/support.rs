// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Test Support
//!
//! In-memory stand-ins for the external collaborators described in §6: a
//! single-output `OutputConnector` that records every call it receives, and
//! `ConnectorPool`s that hand out a fixed, pre-registered set of connectors
//! by name. Shared by every integration test module.

use async_trait::async_trait;
use ingest_manager_domain::{
    ActivityLog, AddOutcome, ConnectorPool, IngestError, OutputConnector, RepositoryDocument, TransformationConnector,
    VersionContext,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    AddOrReplace { uri: String },
    Remove { uri: String },
    NoteAllRecordsRemoved,
}

/// An output connector that always accepts and records the calls it saw, so
/// tests can assert on call order (e.g. `remove` before the replacement
/// `add_or_replace`).
pub struct RecordingOutputConnector {
    pub calls: Mutex<Vec<ConnectorCall>>,
    pub description: VersionContext,
}

impl RecordingOutputConnector {
    pub fn new(description: impl Into<String>) -> Self {
        Self { calls: Mutex::new(Vec::new()), description: VersionContext::new(description.into()) }
    }

    pub fn calls(&self) -> Vec<ConnectorCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl OutputConnector for RecordingOutputConnector {
    async fn check_mime(&self, _mime_type: Option<&str>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn check_file_name(&self, _file_name: Option<&str>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn check_length(&self, _length: Option<u64>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn check_url(&self, _url: Option<&str>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn add_or_replace(
        &self,
        uri: &str,
        _document: &RepositoryDocument,
        _authority: &str,
        _activities: &dyn ActivityLog,
    ) -> Result<AddOutcome, IngestError> {
        self.calls.lock().push(ConnectorCall::AddOrReplace { uri: uri.to_string() });
        Ok(AddOutcome::Accepted)
    }

    async fn remove(&self, uri: &str, _output_version: &str, _activities: &dyn ActivityLog) -> Result<(), IngestError> {
        self.calls.lock().push(ConnectorCall::Remove { uri: uri.to_string() });
        Ok(())
    }

    async fn note_all_records_removed(&self) -> Result<(), IngestError> {
        self.calls.lock().push(ConnectorCall::NoteAllRecordsRemoved);
        Ok(())
    }

    async fn get_pipeline_description(&self, _spec_version: &str) -> Result<VersionContext, IngestError> {
        Ok(self.description.clone())
    }
}

/// A transformation connector that passes the document through unchanged.
pub struct PassthroughTransformationConnector {
    pub description: VersionContext,
}

impl PassthroughTransformationConnector {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: VersionContext::new(description.into()) }
    }
}

#[async_trait]
impl TransformationConnector for PassthroughTransformationConnector {
    async fn check_mime(&self, _mime_type: Option<&str>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn check_file_name(&self, _file_name: Option<&str>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn check_length(&self, _length: Option<u64>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn check_url(&self, _url: Option<&str>) -> Result<bool, IngestError> {
        Ok(true)
    }

    async fn transform(&self, document: RepositoryDocument, _activities: &dyn ActivityLog) -> Result<RepositoryDocument, IngestError> {
        Ok(document)
    }

    async fn get_pipeline_description(&self, _spec_version: &str) -> Result<VersionContext, IngestError> {
        Ok(self.description.clone())
    }
}

/// A pool over a fixed, pre-registered map of connectors by connection name.
/// `grab`/`release` do no actual checkout bookkeeping (every test runs
/// single-threaded against its own pool instance) — only "is this name
/// installed" matters here.
pub struct FixedPool<T: ?Sized> {
    connectors: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> FixedPool<T> {
    pub fn new(connectors: HashMap<String, Arc<T>>) -> Self {
        Self { connectors }
    }
}

#[async_trait]
impl<T: ?Sized + Send + Sync + 'static> ConnectorPool<T> for FixedPool<T> {
    async fn grab(&self, name: &str) -> Result<Option<Arc<T>>, IngestError> {
        Ok(self.connectors.get(name).cloned())
    }

    async fn release(&self, _name: &str, _handle: Option<Arc<T>>) {}
}

pub struct NullActivityLog;

impl ActivityLog for NullActivityLog {
    fn record_activity(
        &self,
        _start_time_ms: i64,
        _activity_kind: &str,
        _byte_count: Option<u64>,
        _entity_uri: &str,
        _result_code: &str,
        _description: &str,
    ) {
    }
}
