// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Executor
//!
//! Runs a built pipeline tree against a document, either to answer "would
//! at least one output accept this?" (check) or to actually deliver bytes
//! (add). Check combines results with logical OR across active siblings; add
//! combines with "accepted if any active leaf accepted", cloning the
//! document's `Arc`-backed bytes once per extra active sibling.

use crate::application::pipeline_builder::{FanoutNode, OutputEntryPoint, PipelineEntryPoint};
use futures::future::{BoxFuture, FutureExt};
use ingest_manager_domain::{
    ActivityLog, AddOutcome, DocKey, IngestError, IngestRecordStore, OutputConnectionName, RepositoryDocument,
    UpsertFields, UriHash, UriLockRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;

/// One of the four cheap pre-flight checks a pipeline can answer without
/// touching document bytes.
pub enum CheckRequest<'a> {
    Mime(Option<&'a str>),
    FileName(Option<&'a str>),
    Length(Option<u64>),
    Url(Option<&'a str>),
}

impl<'a> CheckRequest<'a> {
    async fn run_output(&self, connector: &dyn ingest_manager_domain::OutputConnector) -> Result<bool, IngestError> {
        match self {
            Self::Mime(v) => connector.check_mime(*v).await,
            Self::FileName(v) => connector.check_file_name(*v).await,
            Self::Length(v) => connector.check_length(*v).await,
            Self::Url(v) => connector.check_url(*v).await,
        }
    }

    async fn run_transformation(
        &self,
        connector: &dyn ingest_manager_domain::TransformationConnector,
    ) -> Result<bool, IngestError> {
        match self {
            Self::Mime(v) => connector.check_mime(*v).await,
            Self::FileName(v) => connector.check_file_name(*v).await,
            Self::Length(v) => connector.check_length(*v).await,
            Self::Url(v) => connector.check_url(*v).await,
        }
    }
}

/// Everything the executor needs to complete an add that isn't carried by
/// the pipeline tree itself: the target URI, the fingerprints to persist per
/// output, and the output connection name for each output stage (the store
/// and lock registry index by name, the pipeline tree by stage number).
pub struct AddContext {
    pub doc_key: DocKey,
    pub new_version: String,
    pub param_version: String,
    pub authority: String,
    pub new_uri: Option<String>,
    pub ingest_time_ms: i64,
    pub connection_names: HashMap<usize, OutputConnectionName>,
    pub output_versions: HashMap<usize, String>,
    pub transformation_versions: HashMap<usize, String>,
}

pub struct PipelineExecutor {
    store: Arc<dyn IngestRecordStore>,
    locks: Arc<dyn UriLockRegistry>,
}

impl PipelineExecutor {
    pub fn new(store: Arc<dyn IngestRecordStore>, locks: Arc<dyn UriLockRegistry>) -> Self {
        Self { store, locks }
    }

    /// Runs a check pipeline, returning `true` iff at least one reachable
    /// output accepts.
    pub async fn check(&self, pipeline: &FanoutNode, request: &CheckRequest<'_>) -> Result<bool, IngestError> {
        self.check_fanout(pipeline, request).await
    }

    fn check_fanout<'a>(&'a self, node: &'a FanoutNode, request: &'a CheckRequest<'a>) -> BoxFuture<'a, Result<bool, IngestError>> {
        async move {
            let mut any = false;
            for child in &node.children {
                if self.check_entry(child, request).await? {
                    any = true;
                }
            }
            Ok(any)
        }
        .boxed()
    }

    fn check_entry<'a>(
        &'a self,
        entry: &'a PipelineEntryPoint,
        request: &'a CheckRequest<'a>,
    ) -> BoxFuture<'a, Result<bool, IngestError>> {
        async move {
            match entry {
                PipelineEntryPoint::Output(o) => request.run_output(&*o.connector).await,
                PipelineEntryPoint::Transformation(t) => {
                    if !request.run_transformation(&*t.connector).await? {
                        return Ok(false);
                    }
                    self.check_fanout(&t.fanout, request).await
                }
            }
        }
        .boxed()
    }

    /// Runs an add pipeline, returning `true` iff at least one active output
    /// accepted the document.
    pub async fn execute_add(
        &self,
        pipeline: &FanoutNode,
        ctx: &AddContext,
        document: RepositoryDocument,
        activities: &dyn ActivityLog,
    ) -> Result<bool, IngestError> {
        let outcome = self.add_fanout(pipeline, ctx, document, activities).await?;
        Ok(outcome == AddOutcome::Accepted)
    }

    fn add_fanout<'a>(
        &'a self,
        node: &'a FanoutNode,
        ctx: &'a AddContext,
        document: RepositoryDocument,
        activities: &'a dyn ActivityLog,
    ) -> BoxFuture<'a, Result<AddOutcome, IngestError>> {
        async move {
            let active: Vec<&PipelineEntryPoint> = node.children.iter().filter(|c| c.is_active()).collect();
            if active.is_empty() {
                return Ok(AddOutcome::Rejected);
            }
            let mut accepted = false;
            for child in active {
                // `RepositoryDocument::clone` is a cheap `Arc` bump, not a byte copy.
                if self.add_entry(child, ctx, document.clone(), activities).await? == AddOutcome::Accepted {
                    accepted = true;
                }
            }
            Ok(if accepted { AddOutcome::Accepted } else { AddOutcome::Rejected })
        }
        .boxed()
    }

    fn add_entry<'a>(
        &'a self,
        entry: &'a PipelineEntryPoint,
        ctx: &'a AddContext,
        document: RepositoryDocument,
        activities: &'a dyn ActivityLog,
    ) -> BoxFuture<'a, Result<AddOutcome, IngestError>> {
        async move {
            match entry {
                PipelineEntryPoint::Output(o) => self.output_add_entry_point(o, ctx, document, activities).await,
                PipelineEntryPoint::Transformation(t) => {
                    let transformed = t.connector.transform(document, activities).await?;
                    self.add_fanout(&t.fanout, ctx, transformed, activities).await
                }
            }
        }
        .boxed()
    }

    /// Implements the per-output add protocol: locate the prior row for this
    /// `(output, doc_key)`, lock the old and new URIs, clear any stale row
    /// sharing either URI, write a pre-send placeholder, hand the bytes to
    /// the connector, then finalize with the real fingerprints.
    async fn output_add_entry_point(
        &self,
        entry: &OutputEntryPoint,
        ctx: &AddContext,
        document: RepositoryDocument,
        activities: &dyn ActivityLog,
    ) -> Result<AddOutcome, IngestError> {
        let output = ctx
            .connection_names
            .get(&entry.stage)
            .ok_or_else(|| IngestError::internal(format!("no output connection name for stage {}", entry.stage)))?;

        let prior = self.store.lookup_by_key(output, &ctx.doc_key).await?;
        let old_uri = prior.as_ref().and_then(|r| r.doc_uri.clone());
        let old_output_version = prior.as_ref().and_then(|r| r.last_output_version.clone()).unwrap_or_default();
        let self_id = prior.as_ref().map(|r| r.id);

        let mut lock_names: Vec<String> = Vec::new();
        if let Some(ref u) = old_uri {
            lock_names.push(format!("{}:{u}", output.as_str()));
        }
        if let Some(ref u) = ctx.new_uri {
            if Some(u) != old_uri.as_ref() {
                lock_names.push(format!("{}:{u}", output.as_str()));
            }
        }
        lock_names.sort();
        lock_names.dedup();

        self.locks.acquire(&lock_names).await?;
        let result = self
            .output_add_locked(entry, output, ctx, old_uri.as_deref(), &old_output_version, self_id, document, activities)
            .await;
        self.locks.release(&lock_names).await;
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn output_add_locked(
        &self,
        entry: &OutputEntryPoint,
        output: &OutputConnectionName,
        ctx: &AddContext,
        old_uri: Option<&str>,
        old_output_version: &str,
        self_id: Option<i64>,
        document: RepositoryDocument,
        activities: &dyn ActivityLog,
    ) -> Result<AddOutcome, IngestError> {
        if let Some(old) = old_uri {
            if Some(old) != ctx.new_uri.as_deref() {
                self.store.delete_stale_uri(output, &UriHash::of(old), old, self_id).await?;
                entry.connector.remove(old, old_output_version, activities).await?;
            }
        }

        match ctx.new_uri.as_deref() {
            None => {
                let fields = UpsertFields {
                    doc_uri: None,
                    last_version: Some(ctx.new_version.clone()),
                    last_output_version: ctx.output_versions.get(&entry.stage).cloned(),
                    last_transformation_version: ctx.transformation_versions.get(&entry.stage).cloned(),
                    forced_params: Some(ctx.param_version.clone()),
                    authority_name: ctx.authority.clone(),
                };
                self.store.upsert_record(output, &ctx.doc_key, fields, ctx.ingest_time_ms).await?;
                Ok(AddOutcome::Rejected)
            }
            Some(new_uri) => {
                // Clear any stale row sharing `new_uri` and write the pre-send
                // placeholder atomically, closing the race between the two.
                let placeholder = UpsertFields {
                    doc_uri: Some(new_uri.to_string()),
                    last_version: None,
                    last_output_version: None,
                    last_transformation_version: None,
                    forced_params: None,
                    authority_name: ctx.authority.clone(),
                };
                self.store
                    .delete_stale_uri_and_upsert(
                        output,
                        &ctx.doc_key,
                        &UriHash::of(new_uri),
                        new_uri,
                        self_id,
                        placeholder,
                        ctx.ingest_time_ms,
                    )
                    .await?;

                let outcome = entry.connector.add_or_replace(new_uri, &document, &ctx.authority, activities).await?;

                if outcome == AddOutcome::Accepted {
                    let fields = UpsertFields {
                        doc_uri: Some(new_uri.to_string()),
                        last_version: Some(ctx.new_version.clone()),
                        last_output_version: ctx.output_versions.get(&entry.stage).cloned(),
                        last_transformation_version: ctx.transformation_versions.get(&entry.stage).cloned(),
                        forced_params: Some(ctx.param_version.clone()),
                        authority_name: ctx.authority.clone(),
                    };
                    self.store.upsert_record(output, &ctx.doc_key, fields, ctx.ingest_time_ms).await?;
                }
                Ok(outcome)
            }
        }
    }
}
