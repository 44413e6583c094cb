//! # Coordinator End-to-End Scenarios
//!
//! The six literal scenarios plus the delete/reset invariants, run against a
//! real SQLite-backed store and an in-memory `InProcessLockRegistry`. Only
//! the connectors are stubs (§6 external collaborators).

use ingest_manager::{IngestCoordinator, InProcessLockRegistry};
use ingest_manager_domain::{
    ChangeDecider, ConnectorPool, DocumentIngestStatus, OutputConnectionName, OutputConnector, OutputKey,
    PipelineSpecification, PipelineStageKind, PipelineTopology, RepositoryDocument, StageDescriptor,
    TransformationConnector,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::support::{ConnectorCall, FixedPool, NullActivityLog, RecordingOutputConnector};

async fn fresh_store() -> (tempfile::NamedTempFile, ingest_manager::SqliteIngestRecordStore) {
    let temp = tempfile::NamedTempFile::new().unwrap();
    let url = format!("sqlite://{}", temp.path().to_str().unwrap());
    let pool = ingest_manager::schema::initialize_database(&url).await.unwrap();
    (temp, ingest_manager::SqliteIngestRecordStore::new(pool))
}

fn single_output_spec(
    connector_description: &str,
    status: DocumentIngestStatus,
) -> PipelineSpecification {
    PipelineSpecification::WithVersions {
        stages: vec![StageDescriptor::new(None, "solr", PipelineStageKind::Output)],
        descriptions: vec![connector_description.into()],
        output_statuses: vec![status],
    }
}

fn coordinator(
    store: ingest_manager::SqliteIngestRecordStore,
    connector: Arc<RecordingOutputConnector>,
) -> (IngestCoordinator, Arc<RecordingOutputConnector>) {
    let store: Arc<dyn ingest_manager_domain::IngestRecordStore> = Arc::new(store);
    let locks: Arc<dyn ingest_manager_domain::UriLockRegistry> = Arc::new(InProcessLockRegistry::new());

    let mut outputs: HashMap<String, Arc<dyn OutputConnector>> = HashMap::new();
    outputs.insert("solr".to_string(), connector.clone() as Arc<dyn OutputConnector>);
    let output_pool: Arc<dyn ConnectorPool<dyn OutputConnector>> = Arc::new(FixedPool::new(outputs));

    let transforms: HashMap<String, Arc<dyn TransformationConnector>> = HashMap::new();
    let transformation_pool: Arc<dyn ConnectorPool<dyn TransformationConnector>> = Arc::new(FixedPool::new(transforms));

    (IngestCoordinator::new(store, locks, output_pool, transformation_pool), connector)
}

fn output_key(id_hash: &str) -> OutputKey {
    OutputKey::new("web", id_hash, OutputConnectionName::new("solr").unwrap())
}

#[tokio::test]
async fn scenario_1_first_time_ingest() {
    let (_temp, store) = fresh_store().await;
    let connector = Arc::new(RecordingOutputConnector::new("out-v1"));
    let (coordinator, connector) = coordinator(store, connector);

    let spec = single_output_spec("out-v1", DocumentIngestStatus::never_ingested());
    let doc = RepositoryDocument::new(b"hello".to_vec());

    let accepted = coordinator
        .document_ingest(&spec, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();
    assert!(accepted);
    assert_eq!(connector.calls(), vec![ConnectorCall::AddOrReplace { uri: "http://a".to_string() }]);

    let status = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap().unwrap();
    assert_eq!(status.last_version.as_deref(), Some("v1"));
}

#[tokio::test]
async fn scenario_2_repeated_check_bumps_last_ingest_only() {
    let (_temp, store) = fresh_store().await;
    let connector = Arc::new(RecordingOutputConnector::new("out-v1"));
    let (coordinator, _connector) = coordinator(store, connector);

    let spec = single_output_spec("out-v1", DocumentIngestStatus::never_ingested());
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    coordinator
        .document_check_multiple(&spec, &["web".to_string()], &["h1".to_string()], 2000)
        .await
        .unwrap();

    let status = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap().unwrap();
    assert_eq!(status.last_version.as_deref(), Some("v1"));
    // change_count is still 1 after a check-only call, so the interval is 0.
    let interval = coordinator.get_document_update_interval(&spec, "web", "h1").await.unwrap();
    assert_eq!(interval, 0);
}

#[tokio::test]
async fn scenario_3_version_change_forces_reindex_and_bumps_change_count() {
    let (_temp, store) = fresh_store().await;
    let connector = Arc::new(RecordingOutputConnector::new("out-v1"));
    let (coordinator, _connector) = coordinator(store, connector);

    let spec_v1 = single_output_spec("out-v1", DocumentIngestStatus::never_ingested());
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec_v1, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    let stored = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap().unwrap();
    let spec_with_v1_status = single_output_spec("out-v1", stored.clone());

    let needs_reindex = coordinator.check_fetch_document(&spec_with_v1_status, "v2", "p1", "auth").unwrap();
    assert!(needs_reindex);

    let doc2 = RepositoryDocument::new(b"hello v2".to_vec());
    let accepted = coordinator
        .document_ingest(&spec_with_v1_status, "web", "h1", "v2", "p1", "auth", doc2, 1500, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();
    assert!(accepted);

    let status = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap().unwrap();
    assert_eq!(status.last_version.as_deref(), Some("v2"));
}

#[tokio::test]
async fn scenario_4_uri_replacement_removes_old_uri_first() {
    let (_temp, store) = fresh_store().await;
    let connector = Arc::new(RecordingOutputConnector::new("out-v1"));
    let (coordinator, connector) = coordinator(store, connector);

    let spec = single_output_spec("out-v1", DocumentIngestStatus::never_ingested());
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    let stored = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap().unwrap();
    let spec_with_status = single_output_spec("out-v1", stored);

    let doc2 = RepositoryDocument::new(b"hello moved".to_vec());
    let accepted = coordinator
        .document_ingest(&spec_with_status, "web", "h1", "v2", "p1", "auth", doc2, 1600, Some("http://b"), &NullActivityLog)
        .await
        .unwrap();
    assert!(accepted);

    assert_eq!(
        connector.calls(),
        vec![
            ConnectorCall::AddOrReplace { uri: "http://a".to_string() },
            ConnectorCall::Remove { uri: "http://a".to_string() },
            ConnectorCall::AddOrReplace { uri: "http://b".to_string() },
        ]
    );
}

#[tokio::test]
async fn scenario_5_delete_removes_connector_copy_and_all_rows() {
    let (_temp, store) = fresh_store().await;
    let connector = Arc::new(RecordingOutputConnector::new("out-v1"));
    let (coordinator, connector) = coordinator(store, connector);

    let spec = single_output_spec("out-v1", DocumentIngestStatus::never_ingested());
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    coordinator.document_delete(&spec, "web", "h1", &NullActivityLog).await.unwrap();

    assert_eq!(connector.calls().last(), Some(&ConnectorCall::Remove { uri: "http://a".to_string() }));
    let status = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap();
    assert!(status.is_none());
}

#[test]
fn scenario_6_pack_round_trip_distinguishes_delimiter_collisions() {
    let spec_a = PipelineSpecification::WithDescriptions {
        stages: vec![
            StageDescriptor::new(None, "a+b", PipelineStageKind::Transformation),
            StageDescriptor::new(Some(0), "c", PipelineStageKind::Transformation),
            StageDescriptor::new(Some(1), "solr", PipelineStageKind::Output),
        ],
        descriptions: vec!["v!1".into(), "d\\e".into(), "out".into()],
    };
    let spec_b = PipelineSpecification::WithDescriptions {
        stages: vec![
            StageDescriptor::new(None, "a", PipelineStageKind::Transformation),
            StageDescriptor::new(Some(0), "c", PipelineStageKind::Transformation),
            StageDescriptor::new(Some(1), "solr", PipelineStageKind::Output),
        ],
        descriptions: vec!["b+v!1".into(), "d\\e".into(), "out".into()],
    };

    let topo_a = PipelineTopology::build(&spec_a).unwrap();
    let topo_b = PipelineTopology::build(&spec_b).unwrap();

    let packed_a = ChangeDecider::pack_transformations(&topo_a, &spec_a, 2);
    let packed_b = ChangeDecider::pack_transformations(&topo_b, &spec_b, 2);
    assert_ne!(packed_a, packed_b);
}

#[tokio::test]
async fn reset_output_connection_blanks_only_that_outputs_versions() {
    let (_temp, store) = fresh_store().await;
    let connector = Arc::new(RecordingOutputConnector::new("out-v1"));
    let (coordinator, _connector) = coordinator(store, connector);

    let spec = single_output_spec("out-v1", DocumentIngestStatus::never_ingested());
    let doc = RepositoryDocument::new(b"hello".to_vec());
    coordinator
        .document_ingest(&spec, "web", "h1", "v1", "p1", "auth", doc, 1000, Some("http://a"), &NullActivityLog)
        .await
        .unwrap();

    coordinator.reset_output_connection("solr").await.unwrap();

    let status = coordinator.get_pipeline_document_ingest_data(&output_key("h1")).await.unwrap().unwrap();
    assert!(status.last_version.is_none());
}
