//! # Change-Decision Properties
//!
//! (P2), (P3), and (P7)'s cross-output isolation, driven through the
//! coordinator rather than `ChangeDecider` directly so the assertions also
//! exercise `PipelineTopology::build` and the store.

use ingest_manager::{IngestCoordinator, InProcessLockRegistry};
use ingest_manager_domain::{
    ConnectorPool, DocumentIngestStatus, OutputConnectionName, OutputConnector, OutputKey, PipelineSpecification,
    PipelineStageKind, RepositoryDocument, StageDescriptor, TransformationConnector,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::support::{FixedPool, NullActivityLog, RecordingOutputConnector};

async fn fresh_store() -> (tempfile::NamedTempFile, ingest_manager::SqliteIngestRecordStore) {
    let temp = tempfile::NamedTempFile::new().unwrap();
    let url = format!("sqlite://{}", temp.path().to_str().unwrap());
    let pool = ingest_manager::schema::initialize_database(&url).await.unwrap();
    (temp, ingest_manager::SqliteIngestRecordStore::new(pool))
}

fn two_output_spec(statuses: [DocumentIngestStatus; 2]) -> PipelineSpecification {
    PipelineSpecification::WithVersions {
        stages: vec![
            StageDescriptor::new(None, "solr", PipelineStageKind::Output),
            StageDescriptor::new(None, "elastic", PipelineStageKind::Output),
        ],
        descriptions: vec!["out-solr".into(), "out-elastic".into()],
        output_statuses: statuses.to_vec(),
    }
}

fn coordinator_with(names: &[&str], store: ingest_manager::SqliteIngestRecordStore) -> IngestCoordinator {
    let store: Arc<dyn ingest_manager_domain::IngestRecordStore> = Arc::new(store);
    let locks: Arc<dyn ingest_manager_domain::UriLockRegistry> = Arc::new(InProcessLockRegistry::new());

    let mut outputs: HashMap<String, Arc<dyn OutputConnector>> = HashMap::new();
    for name in names {
        outputs.insert(name.to_string(), Arc::new(RecordingOutputConnector::new(format!("out-{name}"))) as Arc<dyn OutputConnector>);
    }
    let output_pool: Arc<dyn ConnectorPool<dyn OutputConnector>> = Arc::new(FixedPool::new(outputs));
    let transforms: HashMap<String, Arc<dyn TransformationConnector>> = HashMap::new();
    let transformation_pool: Arc<dyn ConnectorPool<dyn TransformationConnector>> = Arc::new(FixedPool::new(transforms));

    IngestCoordinator::new(store, locks, output_pool, transformation_pool)
}

#[tokio::test]
async fn empty_new_version_always_forces_reindex_p3() {
    let spec = two_output_spec([DocumentIngestStatus::never_ingested(), DocumentIngestStatus::never_ingested()]);
    let (_temp, store) = fresh_store().await;
    let coordinator = coordinator_with(&["solr", "elastic"], store);
    assert!(coordinator.check_fetch_document(&spec, "", "p1", "auth").unwrap());
}

#[tokio::test]
async fn identical_inputs_do_not_force_reindex_p2() {
    let (_temp, store) = fresh_store().await;
    let coordinator = coordinator_with(&["solr"], store);

    let spec_never = PipelineSpecification::WithVersions {
        stages: vec![StageDescriptor::new(None, "solr", PipelineStageKind::Output)],
        descriptions: vec!["out-solr".into()],
        output_statuses: vec![DocumentIngestStatus::never_ingested()],
    };
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec_never, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    let stored = coordinator
        .get_pipeline_document_ingest_data(&OutputKey::new("web", "h1", OutputConnectionName::new("solr").unwrap()))
        .await
        .unwrap()
        .unwrap();
    let spec_with_status = PipelineSpecification::WithVersions {
        stages: vec![StageDescriptor::new(None, "solr", PipelineStageKind::Output)],
        descriptions: vec!["out-solr".into()],
        output_statuses: vec![stored],
    };

    assert!(!coordinator.check_fetch_document(&spec_with_status, "v1", "p1", "auth").unwrap());
    assert!(coordinator.check_fetch_document(&spec_with_status, "v2", "p1", "auth").unwrap());
    assert!(coordinator.check_fetch_document(&spec_with_status, "v1", "p2", "auth").unwrap());
    assert!(coordinator.check_fetch_document(&spec_with_status, "v1", "p1", "someone-else").unwrap());
}

#[tokio::test]
async fn reset_output_connection_does_not_touch_other_outputs_p7() {
    let (_temp, store) = fresh_store().await;
    let coordinator = coordinator_with(&["solr", "elastic"], store);

    let spec = two_output_spec([DocumentIngestStatus::never_ingested(), DocumentIngestStatus::never_ingested()]);
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    coordinator.reset_output_connection("solr").await.unwrap();

    let solr_status = coordinator
        .get_pipeline_document_ingest_data(&OutputKey::new("web", "h1", OutputConnectionName::new("solr").unwrap()))
        .await
        .unwrap()
        .unwrap();
    let elastic_status = coordinator
        .get_pipeline_document_ingest_data(&OutputKey::new("web", "h1", OutputConnectionName::new("elastic").unwrap()))
        .await
        .unwrap()
        .unwrap();

    assert!(solr_status.last_version.is_none());
    assert_eq!(elastic_status.last_version.as_deref(), Some("v1"));
}
