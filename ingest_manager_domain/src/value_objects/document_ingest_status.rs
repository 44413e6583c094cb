// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Fingerprints recorded for a single (document, output) pairing as of the
//! last successful ingest, as returned by
//! `get_pipeline_document_ingest_data`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIngestStatus {
    pub last_version: Option<String>,
    pub last_transformation_version: Option<String>,
    pub last_output_version: Option<String>,
    pub forced_params: Option<String>,
    pub authority_name: String,
}

impl DocumentIngestStatus {
    pub fn never_ingested() -> Self {
        Self {
            last_version: None,
            last_transformation_version: None,
            last_output_version: None,
            forced_params: None,
            authority_name: String::new(),
        }
    }
}
