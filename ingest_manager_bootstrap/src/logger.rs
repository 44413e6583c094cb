// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logging
//!
//! Initializes the process-wide `tracing` subscriber an embedding binary
//! installs once, before constructing an `IngestCoordinator`. The coordinator
//! and its collaborators only ever call `tracing::{info,debug,warn,error}!`
//! and `#[tracing::instrument]` — they never touch a subscriber directly.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`
/// when the variable is unset or unparsable.
///
/// Safe to call once per process; a second call is a no-op (the underlying
/// `try_init` fails silently if a global subscriber is already set).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_does_not_panic_when_called_twice() {
        init_logging();
        init_logging();
    }
}
