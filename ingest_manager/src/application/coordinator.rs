// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingest Coordinator
//!
//! The façade external callers use. Wires the pipeline topology/builder/
//! executor, the ingest record store, the URI lock registry, and the
//! connector pools together; owns connector grab/release scopes and the
//! per-output locking discipline described alongside the pipeline executor.

use crate::application::pipeline_builder::PipelineBuilder;
use crate::application::pipeline_executor::{AddContext, CheckRequest, PipelineExecutor};
use ingest_manager_domain::{
    ActivityLog, ChangeDecider, ConnectorPool, DocKey, DocumentIngestStatus, IngestError, OutputConnectionName,
    OutputConnector, OutputKey, PipelineSpecification, PipelineStageKind, PipelineTopology, RepositoryDocument,
    TransformationConnector, UpsertFields, UriHash, UriLockRegistry,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct IngestCoordinator {
    store: Arc<dyn ingest_manager_domain::IngestRecordStore>,
    locks: Arc<dyn UriLockRegistry>,
    output_pool: Arc<dyn ConnectorPool<dyn OutputConnector>>,
    transformation_pool: Arc<dyn ConnectorPool<dyn TransformationConnector>>,
    executor: PipelineExecutor,
}

impl IngestCoordinator {
    pub fn new(
        store: Arc<dyn ingest_manager_domain::IngestRecordStore>,
        locks: Arc<dyn UriLockRegistry>,
        output_pool: Arc<dyn ConnectorPool<dyn OutputConnector>>,
        transformation_pool: Arc<dyn ConnectorPool<dyn TransformationConnector>>,
    ) -> Self {
        let executor = PipelineExecutor::new(store.clone(), locks.clone());
        Self { store, locks, output_pool, transformation_pool, executor }
    }

    async fn grab_output(&self, name: &str) -> Result<Arc<dyn OutputConnector>, IngestError> {
        self.output_pool
            .grab(name)
            .await?
            .ok_or_else(|| IngestError::service_interruption(format!("output connector '{name}' not installed")))
    }

    async fn grab_transformation(&self, name: &str) -> Result<Arc<dyn TransformationConnector>, IngestError> {
        self.transformation_pool
            .grab(name)
            .await?
            .ok_or_else(|| IngestError::service_interruption(format!("transformation connector '{name}' not installed")))
    }

    /// Grabs a handle for every stage in `topology`, releasing whatever was
    /// already grabbed if any grab fails partway through.
    #[allow(clippy::type_complexity)]
    async fn grab_all(
        &self,
        topology: &PipelineTopology,
    ) -> Result<(HashMap<usize, Arc<dyn OutputConnector>>, HashMap<usize, Arc<dyn TransformationConnector>>), IngestError>
    {
        let mut outputs: HashMap<usize, Arc<dyn OutputConnector>> = HashMap::new();
        let mut transforms: HashMap<usize, Arc<dyn TransformationConnector>> = HashMap::new();

        for stage in 0..topology.stage_count() {
            let name = topology.connection_name(stage).to_string();
            let outcome = match topology.kind_of(stage) {
                PipelineStageKind::Output => self.grab_output(&name).await.map(|h| {
                    outputs.insert(stage, h);
                }),
                PipelineStageKind::Transformation => self.grab_transformation(&name).await.map(|h| {
                    transforms.insert(stage, h);
                }),
            };
            if let Err(err) = outcome {
                self.release_all(topology, outputs, transforms).await;
                return Err(err);
            }
        }
        Ok((outputs, transforms))
    }

    async fn release_all(
        &self,
        topology: &PipelineTopology,
        outputs: HashMap<usize, Arc<dyn OutputConnector>>,
        transforms: HashMap<usize, Arc<dyn TransformationConnector>>,
    ) {
        for (stage, handle) in outputs {
            self.output_pool.release(topology.connection_name(stage), Some(handle)).await;
        }
        for (stage, handle) in transforms {
            self.transformation_pool.release(topology.connection_name(stage), Some(handle)).await;
        }
    }

    async fn run_check(&self, spec: &PipelineSpecification, request: CheckRequest<'_>) -> Result<bool, IngestError> {
        let topology = PipelineTopology::build(spec)?;
        let (outputs, transforms) = self.grab_all(&topology).await?;
        let pipeline = match PipelineBuilder::build_check(&topology, spec, &outputs, &transforms) {
            Ok(p) => p,
            Err(err) => {
                self.release_all(&topology, outputs, transforms).await;
                return Err(err);
            }
        };
        let result = self.executor.check(&pipeline, &request).await;
        self.release_all(&topology, outputs, transforms).await;
        result
    }

    #[tracing::instrument(skip(self, spec))]
    pub async fn check_mime(&self, spec: &PipelineSpecification, mime_type: Option<&str>) -> Result<bool, IngestError> {
        self.run_check(spec, CheckRequest::Mime(mime_type)).await
    }

    #[tracing::instrument(skip(self, spec))]
    pub async fn check_file(&self, spec: &PipelineSpecification, file_name: Option<&str>) -> Result<bool, IngestError> {
        self.run_check(spec, CheckRequest::FileName(file_name)).await
    }

    #[tracing::instrument(skip(self, spec))]
    pub async fn check_length(&self, spec: &PipelineSpecification, length: Option<u64>) -> Result<bool, IngestError> {
        self.run_check(spec, CheckRequest::Length(length)).await
    }

    #[tracing::instrument(skip(self, spec))]
    pub async fn check_url(&self, spec: &PipelineSpecification, url: Option<&str>) -> Result<bool, IngestError> {
        self.run_check(spec, CheckRequest::Url(url)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_output_description(
        &self,
        output_name: &str,
        spec_version: &str,
    ) -> Result<ingest_manager_domain::VersionContext, IngestError> {
        let connector = self.grab_output(output_name).await?;
        let result = connector.get_pipeline_description(spec_version).await;
        self.output_pool.release(output_name, Some(connector)).await;
        result
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_transformation_description(
        &self,
        transformation_name: &str,
        spec_version: &str,
    ) -> Result<ingest_manager_domain::VersionContext, IngestError> {
        let connector = self.grab_transformation(transformation_name).await?;
        let result = connector.get_pipeline_description(spec_version).await;
        self.transformation_pool.release(transformation_name, Some(connector)).await;
        result
    }

    /// Pure decision, delegated to [`ChangeDecider`]; no connector grabs or
    /// DB round trips are needed since `spec` already carries the stored
    /// fingerprints (`PipelineSpecification::WithVersions`).
    pub fn check_fetch_document(
        &self,
        spec: &PipelineSpecification,
        new_doc_version: &str,
        new_param_version: &str,
        new_authority: &str,
    ) -> Result<bool, IngestError> {
        let topology = PipelineTopology::build(spec)?;
        Ok(ChangeDecider::needs_reindex(&topology, spec, new_doc_version, new_param_version, new_authority))
    }

    /// Records a document version against every output of `spec` without
    /// delivering bytes: if an output previously held a URI for this
    /// document, that URI is removed from the connector and any row sharing
    /// it is cleared first.
    #[tracing::instrument(skip(self, spec, activities))]
    pub async fn document_record(
        &self,
        spec: &PipelineSpecification,
        id_class: &str,
        id_hash: &str,
        doc_version: &str,
        record_time_ms: i64,
        activities: &dyn ActivityLog,
    ) -> Result<(), IngestError> {
        let topology = PipelineTopology::build(spec)?;
        let doc_key = DocKey::new(id_class, id_hash)?;

        for output_index in 0..topology.output_stage_count() {
            let stage = topology.output_stage_at(output_index);
            let name = topology.connection_name(stage).to_string();
            let output = OutputConnectionName::new(&name)?;
            let connector = self.grab_output(&name).await?;

            let result = self.record_one_output(&topology, spec, stage, &output, &*connector, &doc_key, doc_version, record_time_ms, activities).await;
            self.output_pool.release(&name, Some(connector)).await;
            result?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_one_output(
        &self,
        topology: &PipelineTopology,
        spec: &PipelineSpecification,
        stage: usize,
        output: &OutputConnectionName,
        connector: &dyn OutputConnector,
        doc_key: &DocKey,
        doc_version: &str,
        record_time_ms: i64,
        activities: &dyn ActivityLog,
    ) -> Result<(), IngestError> {
        let prior = self.store.lookup_by_key(output, doc_key).await?;
        let old_uri = prior.as_ref().and_then(|r| r.doc_uri.clone());
        let old_output_version = prior.as_ref().and_then(|r| r.last_output_version.clone()).unwrap_or_default();
        let self_id = prior.as_ref().map(|r| r.id);
        let carried_authority = prior.as_ref().map(|r| r.authority_name.clone()).unwrap_or_default();
        let carried_forced_params = prior.as_ref().and_then(|r| r.forced_params.clone());

        let transformation_version = ChangeDecider::pack_transformations(topology, spec, stage);
        let output_version = spec.description(stage).map(|v| v.as_str().to_string());
        let fields = UpsertFields {
            doc_uri: None,
            last_version: Some(doc_version.to_string()),
            last_output_version: output_version,
            last_transformation_version: Some(transformation_version),
            forced_params: carried_forced_params,
            authority_name: carried_authority,
        };

        match &old_uri {
            Some(old) => {
                let lock_name = format!("{}:{old}", output.as_str());
                let names = [lock_name.clone()];
                self.locks.acquire(&names).await?;
                let result = async {
                    connector.remove(old, &old_output_version, activities).await?;
                    // Delete stale rows sharing this URI and write the new record atomically, so
                    // a concurrent insert racing the lookup cannot escape deletion.
                    self.store
                        .delete_stale_uri_and_upsert(output, doc_key, &UriHash::of(old), old, self_id, fields, record_time_ms)
                        .await?;
                    Ok::<(), IngestError>(())
                }
                .await;
                self.locks.release(&names).await;
                result?;
            }
            None => {
                self.store.upsert_record(output, doc_key, fields, record_time_ms).await?;
            }
        }
        Ok(())
    }

    /// Builds an add pipeline from `spec` and runs it, delivering `document`
    /// to every output whose `WithVersions` fingerprint says it needs a
    /// resend.
    #[tracing::instrument(skip(self, spec, document, activities))]
    #[allow(clippy::too_many_arguments)]
    pub async fn document_ingest(
        &self,
        spec: &PipelineSpecification,
        id_class: &str,
        id_hash: &str,
        doc_version: &str,
        param_version: &str,
        authority: &str,
        document: RepositoryDocument,
        ingest_time_ms: i64,
        document_uri: Option<&str>,
        activities: &dyn ActivityLog,
    ) -> Result<bool, IngestError> {
        let topology = PipelineTopology::build(spec)?;
        let doc_key = DocKey::new(id_class, id_hash)?;

        let mut active_outputs = HashSet::new();
        for output_index in 0..topology.output_stage_count() {
            if ChangeDecider::output_needs_reindex(&topology, spec, output_index, doc_version, param_version, authority) {
                active_outputs.insert(topology.output_stage_at(output_index));
            }
        }
        if active_outputs.is_empty() {
            return Ok(false);
        }

        let (outputs, transforms) = self.grab_all(&topology).await?;
        let pipeline = match PipelineBuilder::build_add(&topology, spec, &outputs, &transforms, &active_outputs) {
            Ok(p) => p,
            Err(err) => {
                self.release_all(&topology, outputs, transforms).await;
                return Err(err);
            }
        };

        let mut connection_names = HashMap::new();
        let mut output_versions = HashMap::new();
        let mut transformation_versions = HashMap::new();
        for &stage in topology.output_stages() {
            let name = OutputConnectionName::new(topology.connection_name(stage))?;
            connection_names.insert(stage, name);
            if let Some(desc) = spec.description(stage) {
                output_versions.insert(stage, desc.as_str().to_string());
            }
            transformation_versions.insert(stage, ChangeDecider::pack_transformations(&topology, spec, stage));
        }

        let ctx = AddContext {
            doc_key,
            new_version: doc_version.to_string(),
            param_version: param_version.to_string(),
            authority: authority.to_string(),
            new_uri: document_uri.map(str::to_string),
            ingest_time_ms,
            connection_names,
            output_versions,
            transformation_versions,
        };

        let result = self.executor.execute_add(&pipeline, &ctx, document, activities).await;
        self.release_all(&topology, outputs, transforms).await;
        result
    }

    /// Chunked lookup of row ids for a batch of `(id_class, id_hash)` pairs
    /// against `spec`'s outputs, followed by a bulk `last_ingest` bump.
    #[tracing::instrument(skip(self, spec, id_classes, id_hashes))]
    pub async fn document_check_multiple(
        &self,
        spec: &PipelineSpecification,
        id_classes: &[String],
        id_hashes: &[String],
        check_time_ms: i64,
    ) -> Result<(), IngestError> {
        let topology = PipelineTopology::build(spec)?;
        let mut pairs = Vec::with_capacity(id_classes.len() * topology.output_stage_count());
        for (class, hash) in id_classes.iter().zip(id_hashes) {
            let doc_key = DocKey::new(class, hash)?;
            for &stage in topology.output_stages() {
                let output = OutputConnectionName::new(topology.connection_name(stage))?;
                pairs.push((output, doc_key.clone()));
            }
        }
        let ids = self.store.find_row_ids_by_doc_keys(&pairs).await?;
        if ids.is_empty() {
            return Ok(());
        }
        self.store.update_last_ingest(&ids.into_iter().collect::<Vec<_>>(), check_time_ms).await
    }

    pub async fn document_delete(
        &self,
        spec: &PipelineSpecification,
        id_class: &str,
        id_hash: &str,
        activities: &dyn ActivityLog,
    ) -> Result<(), IngestError> {
        self.document_delete_multiple(spec, &[id_class.to_string()], &[id_hash.to_string()], activities).await
    }

    /// Deletion path: for every `(id_class, id_hash)`, for every output of
    /// `spec`, remove the connector's copy (if any) then delete every row
    /// sharing that URI or that `doc_key`. Connector removes happen outside
    /// the row-deleting transaction per the store's own transaction
    /// boundaries; grouping by output keeps the row-id collection small.
    #[tracing::instrument(skip(self, spec, id_classes, id_hashes, activities))]
    pub async fn document_delete_multiple(
        &self,
        spec: &PipelineSpecification,
        id_classes: &[String],
        id_hashes: &[String],
        activities: &dyn ActivityLog,
    ) -> Result<(), IngestError> {
        let topology = PipelineTopology::build(spec)?;
        let doc_keys: Vec<DocKey> =
            id_classes.iter().zip(id_hashes).map(|(c, h)| DocKey::new(c, h)).collect::<Result<_, _>>()?;

        for &stage in topology.output_stages() {
            let name = topology.connection_name(stage).to_string();
            let output = OutputConnectionName::new(&name)?;
            let connector = self.grab_output(&name).await?;
            let result = self.delete_one_output(&output, &*connector, &doc_keys, activities).await;
            self.output_pool.release(&name, Some(connector)).await;
            result?;
        }
        Ok(())
    }

    async fn delete_one_output(
        &self,
        output: &OutputConnectionName,
        connector: &dyn OutputConnector,
        doc_keys: &[DocKey],
        activities: &dyn ActivityLog,
    ) -> Result<(), IngestError> {
        let pairs: Vec<(OutputConnectionName, DocKey)> = doc_keys.iter().map(|k| (output.clone(), k.clone())).collect();
        let mut extra_ids: HashSet<i64> = HashSet::new();

        for doc_key in doc_keys {
            let record = self.store.lookup_by_key(output, doc_key).await?;
            let Some(record) = record else { continue };
            extra_ids.insert(record.id);
            let Some(uri) = &record.doc_uri else { continue };
            let lock_name = format!("{}:{uri}", output.as_str());
            let names = [lock_name];
            self.locks.acquire(&names).await?;
            let remove_result = connector.remove(uri, record.last_output_version.as_deref().unwrap_or(""), activities).await;
            self.locks.release(&names).await;
            remove_result?;
        }

        // Resolve the row ids for `pairs` and delete them (plus `extra_ids`) in one
        // transaction, so a concurrent insert racing the lookup cannot escape deletion.
        self.store.find_and_delete_by_doc_keys(&pairs, &extra_ids.into_iter().collect::<Vec<_>>()).await?;
        Ok(())
    }

    /// Fills `out` with the stored fingerprints for every `(doc, output)`
    /// pair named by `keys` that has a row; pairs with no row are left
    /// untouched.
    pub async fn get_pipeline_document_ingest_data_multiple(
        &self,
        keys: &[OutputKey],
        out: &mut HashMap<OutputKey, DocumentIngestStatus>,
    ) -> Result<(), IngestError> {
        for key in keys {
            if let Some(status) = self.get_pipeline_document_ingest_data(key).await? {
                out.insert(key.clone(), status);
            }
        }
        Ok(())
    }

    pub async fn get_pipeline_document_ingest_data(
        &self,
        key: &OutputKey,
    ) -> Result<Option<DocumentIngestStatus>, IngestError> {
        let doc_key = DocKey::new(&key.identifier_class, &key.identifier_hash)?;
        let record = self.store.lookup_by_key(&key.output_connection, &doc_key).await?;
        Ok(record.map(|r| DocumentIngestStatus {
            last_version: r.last_version,
            last_transformation_version: r.last_transformation_version,
            last_output_version: r.last_output_version,
            forced_params: r.forced_params,
            authority_name: r.authority_name,
        }))
    }

    /// Minimum, across a document's outputs, of the observed re-check
    /// interval `(last_ingest - first_ingest) / change_count`; `0` when the
    /// document has never been ingested anywhere.
    pub async fn get_document_update_interval(
        &self,
        spec: &PipelineSpecification,
        id_class: &str,
        id_hash: &str,
    ) -> Result<i64, IngestError> {
        let topology = PipelineTopology::build(spec)?;
        let doc_key = DocKey::new(id_class, id_hash)?;
        let mut minimum: Option<i64> = None;
        for &stage in topology.output_stages() {
            let output = OutputConnectionName::new(topology.connection_name(stage))?;
            let Some(record) = self.store.lookup_by_key(&output, &doc_key).await? else { continue };
            if record.change_count <= 0 {
                continue;
            }
            let interval = (record.last_ingest - record.first_ingest) / record.change_count;
            minimum = Some(minimum.map_or(interval, |m: i64| m.min(interval)));
        }
        Ok(minimum.unwrap_or(0))
    }

    #[tracing::instrument(skip(self))]
    pub async fn reset_output_connection(&self, output_name: &str) -> Result<(), IngestError> {
        let output = OutputConnectionName::new(output_name)?;
        self.store.reset_versions(&output).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_output_connection(&self, output_name: &str) -> Result<(), IngestError> {
        let output = OutputConnectionName::new(output_name)?;
        self.store.delete_by_output(&output).await?;
        let connector = self.grab_output(output_name).await?;
        let result = connector.note_all_records_removed().await;
        self.output_pool.release(output_name, Some(connector)).await;
        result
    }
}
