// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # URI Lock Registry
//!
//! Advisory named locks keyed by arbitrary strings (in practice,
//! `"<output>:<uri>"`). Acquiring more than one name at a time must be
//! atomic with respect to other acquisitions on overlapping name sets, so
//! callers always acquire in sorted order to avoid AB/BA deadlock.

use crate::error::IngestError;
use async_trait::async_trait;

#[async_trait]
pub trait UriLockRegistry: Send + Sync {
    /// Acquires every name in `names`, blocking until all are free. Callers
    /// are responsible for passing `names` pre-sorted if they need deadlock
    /// freedom against other multi-name acquisitions.
    async fn acquire(&self, names: &[String]) -> Result<(), IngestError>;

    /// Releases every name in `names`. Must be called even when the guarded
    /// work failed.
    async fn release(&self, names: &[String]);
}
