// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap
//!
//! Composition root for an embedding process: loads configuration, installs
//! logging, and wires an [`IngestCoordinator`] from a [`CoordinatorConfig`]
//! plus caller-supplied connector pools. Connector pools belong to the
//! embedding platform (they know how to reach its crawlers and downstream
//! indexes) and are never constructed here.
//!
//! There is no CLI or wire protocol at this layer — an embedding binary
//! drives [`build_coordinator`] and calls straight into the returned
//! coordinator's methods. [`logger`] and [`shutdown`] are the other two
//! pieces of ambient plumbing an embedder is expected to wire around those
//! calls.

pub mod logger;
pub mod shutdown;

use ingest_manager::infrastructure::repositories::schema;
use ingest_manager::{CoordinatorConfig, IngestCoordinator, InProcessLockRegistry, SqliteIngestRecordStore};
use ingest_manager_domain::{ConnectorPool, IngestError, OutputConnector, TransformationConnector};
use std::sync::Arc;

/// Loads configuration, opens (creating if necessary) the SQLite ingest
/// store, and assembles an [`IngestCoordinator`] around it and the
/// caller-supplied connector pools.
///
/// `config_path` is forwarded to [`CoordinatorConfig::load`] as the optional
/// TOML override file; `INGEST_MANAGER_*` environment variables always take
/// precedence over both.
pub async fn build_coordinator(
    config_path: Option<&str>,
    output_pool: Arc<dyn ConnectorPool<dyn OutputConnector>>,
    transformation_pool: Arc<dyn ConnectorPool<dyn TransformationConnector>>,
) -> Result<IngestCoordinator, IngestError> {
    let config = CoordinatorConfig::load(config_path)?;
    build_coordinator_from_config(&config, output_pool, transformation_pool).await
}

/// Same as [`build_coordinator`], for embedders that already loaded or built
/// their own [`CoordinatorConfig`] (e.g. to merge it with other sections of a
/// larger host-application config file).
pub async fn build_coordinator_from_config(
    config: &CoordinatorConfig,
    output_pool: Arc<dyn ConnectorPool<dyn OutputConnector>>,
    transformation_pool: Arc<dyn ConnectorPool<dyn TransformationConnector>>,
) -> Result<IngestCoordinator, IngestError> {
    let database_url = format!("sqlite://{}", config.database_path);
    let pool = schema::initialize_database(&database_url)
        .await
        .map_err(|e| IngestError::service_interruption(format!("failed to open ingest store: {e}")))?;

    let store: Arc<dyn ingest_manager_domain::IngestRecordStore> = Arc::new(SqliteIngestRecordStore::new(pool));
    let locks: Arc<dyn ingest_manager_domain::UriLockRegistry> = Arc::new(InProcessLockRegistry::new());

    Ok(IngestCoordinator::new(store, locks, output_pool, transformation_pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    struct EmptyPool;

    #[async_trait]
    impl ConnectorPool<dyn OutputConnector> for EmptyPool {
        async fn grab(&self, _name: &str) -> Result<Option<Arc<dyn OutputConnector>>, IngestError> {
            Ok(None)
        }
        async fn release(&self, _name: &str, _handle: Option<Arc<dyn OutputConnector>>) {}
    }

    #[async_trait]
    impl ConnectorPool<dyn TransformationConnector> for EmptyPool {
        async fn grab(&self, _name: &str) -> Result<Option<Arc<dyn TransformationConnector>>, IngestError> {
            Ok(None)
        }
        async fn release(&self, _name: &str, _handle: Option<Arc<dyn TransformationConnector>>) {}
    }

    #[tokio::test]
    async fn builds_coordinator_against_a_fresh_database() {
        let temp = NamedTempFile::new().unwrap();
        let config = CoordinatorConfig { database_path: temp.path().to_str().unwrap().to_string(), ..Default::default() };

        let pool = Arc::new(EmptyPool);
        let coordinator = build_coordinator_from_config(
            &config,
            pool.clone() as Arc<dyn ConnectorPool<dyn OutputConnector>>,
            pool as Arc<dyn ConnectorPool<dyn TransformationConnector>>,
        )
        .await;

        assert!(coordinator.is_ok());
    }
}
