// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain-specific error taxonomy for the ingestion manager.
//!
//! Errors are categorized so callers can decide retry policy without matching
//! on every variant: [`IngestError::is_recoverable`] marks conditions a
//! retry loop should absorb, [`IngestError::category`] gives a stable label
//! for logging and metrics.

use thiserror::Error;

/// Errors that can occur anywhere in the ingestion manager domain and
/// application layers.
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("transient database error: {0}")]
    TransientDb(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("connector not installed: {0}")]
    ConnectorAbsent(String),

    #[error("service interruption: {0}")]
    ServiceInterruption(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl IngestError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn transient_db(msg: impl Into<String>) -> Self {
        Self::TransientDb(msg.into())
    }

    pub fn unique_violation(msg: impl Into<String>) -> Self {
        Self::UniqueViolation(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    pub fn connector_absent(msg: impl Into<String>) -> Self {
        Self::ConnectorAbsent(msg.into())
    }

    pub fn service_interruption(msg: impl Into<String>) -> Self {
        Self::ServiceInterruption(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether an inner retry loop should absorb this error and try again.
    ///
    /// `UniqueViolation` is deliberately excluded: the upsert loop handles it
    /// by falling through to the update branch rather than by backing off.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IngestError::TransientDb(_) | IngestError::ServiceInterruption(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            IngestError::InvalidConfiguration(_) => "configuration",
            IngestError::Invariant(_) => "invariant",
            IngestError::ValidationError(_) => "validation",
            IngestError::TransientDb(_) => "transient_db",
            IngestError::UniqueViolation(_) => "unique_violation",
            IngestError::DatabaseError(_) => "database",
            IngestError::ConnectorAbsent(_) => "connector_absent",
            IngestError::ServiceInterruption(_) => "service_interruption",
            IngestError::IoError(_) => "io",
            IngestError::SerializationError(_) => "serialization",
            IngestError::InternalError(_) => "internal",
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::SerializationError(err.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
