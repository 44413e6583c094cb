// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Incremental Ingestion Manager
//!
//! Decides, per `(document, output connection)` pair, whether a document
//! needs to be (re)sent through a transformation/output pipeline, runs that
//! pipeline, and keeps a persistent record of what each downstream index
//! currently holds.
//!
//! ## Layout
//!
//! - [`ingest_manager_domain`] — pure business logic: value objects,
//!   entities, the `ChangeDecider` service, and the repository/connector
//!   port traits.
//! - [`application`] — builds and executes pipelines from a
//!   `PipelineSpecification`, and exposes [`IngestCoordinator`], the façade
//!   external callers use.
//! - [`infrastructure`] — SQLite-backed `IngestRecordStore`, the in-process
//!   `UriLockRegistry`, schema migration, and configuration loading.

pub mod application;
pub mod infrastructure;

pub use application::{IngestCoordinator, PipelineBuilder, PipelineExecutor};
pub use infrastructure::config::CoordinatorConfig;
pub use infrastructure::lock_registry::InProcessLockRegistry;
pub use infrastructure::repositories::{schema, SqliteIngestRecordStore};

pub use ingest_manager_domain::*;
