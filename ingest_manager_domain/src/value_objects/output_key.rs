// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Composite key identifying a single document/output pairing, used by
//! `get_pipeline_document_ingest_data` to address a caller-supplied map.

use crate::value_objects::OutputConnectionName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputKey {
    pub identifier_class: String,
    pub identifier_hash: String,
    pub output_connection: OutputConnectionName,
}

impl OutputKey {
    pub fn new(
        identifier_class: impl Into<String>,
        identifier_hash: impl Into<String>,
        output_connection: OutputConnectionName,
    ) -> Self {
        Self {
            identifier_class: identifier_class.into(),
            identifier_hash: identifier_hash.into(),
            output_connection,
        }
    }
}
