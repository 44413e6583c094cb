// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Layered configuration for the coordinator: a TOML file overridden by
//! `INGEST_MANAGER_*` environment variables, following the same
//! `config::Config` builder pattern used elsewhere in the ambient stack.

use ingest_manager_domain::IngestError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Database file path, passed to `sqlite://<path>`.
    pub database_path: String,
    /// Maximum number of deadlock/busy retries before giving up on an
    /// otherwise-recoverable operation. `0` means unbounded, matching the
    /// starvation-free upsert loop described by the ingest record store.
    pub max_retry_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { database_path: "./ingest_manager.db".to_string(), max_retry_attempts: 0 }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from an optional TOML file plus
    /// `INGEST_MANAGER_*` environment overrides (e.g.
    /// `INGEST_MANAGER_DATABASE_PATH`).
    pub fn load(config_path: Option<&str>) -> Result<Self, IngestError> {
        let default_source = config::Config::try_from(&Self::default())
            .map_err(|e| IngestError::invalid_config(e.to_string()))?;
        let mut builder = config::Config::builder().add_source(default_source);
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("INGEST_MANAGER").separator("_"));
        let settings = builder.build().map_err(|e| IngestError::invalid_config(e.to_string()))?;
        settings.try_deserialize().map_err(|e| IngestError::invalid_config(e.to_string()))
    }
}
