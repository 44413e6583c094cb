// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Process URI Lock Registry
//!
//! A mutex-guarded map from lock name to a waiter count, realizing the
//! advisory locking contract for a single process. Clustered deployments
//! substitute a distributed lock manager behind the same
//! [`UriLockRegistry`] trait.
//!
//! Acquiring a set of names is atomic with respect to other multi-name
//! acquisitions: each attempt checks every name and, only if all are free,
//! reserves all of them in the same hold of the top-level mutex. If any name
//! in the set is held, the attempt reserves nothing and waits on that name's
//! notifier before retrying the whole set, so no caller ever observes this
//! registry holding a strict subset of a pending acquisition. Callers still
//! pass names pre-sorted, which keeps retries from livelocking against each
//! other on overlapping sets.

use async_trait::async_trait;
use ingest_manager_domain::{IngestError, UriLockRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

struct LockState {
    held: bool,
    notify: Arc<Notify>,
}

pub struct InProcessLockRegistry {
    locks: Mutex<HashMap<String, LockState>>,
}

impl InProcessLockRegistry {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Tries to reserve every name in `names` under one hold of the mutex.
    /// Reserves nothing and returns the first held name's notifier if any
    /// name in the set is already held.
    fn try_reserve_all(&self, names: &[String]) -> Result<(), Arc<Notify>> {
        let mut locks = self.locks.lock();
        for name in names {
            if let Some(state) = locks.get(name) {
                if state.held {
                    return Err(state.notify.clone());
                }
            }
        }
        for name in names {
            let entry = locks
                .entry(name.clone())
                .or_insert_with(|| LockState { held: false, notify: Arc::new(Notify::new()) });
            entry.held = true;
        }
        Ok(())
    }
}

impl Default for InProcessLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UriLockRegistry for InProcessLockRegistry {
    async fn acquire(&self, names: &[String]) -> Result<(), IngestError> {
        // Callers pass pre-sorted names; retrying the whole set (rather than
        // holding a prefix while waiting) across all callers prevents AB/BA
        // deadlock on overlapping sets.
        loop {
            match self.try_reserve_all(names) {
                Ok(()) => return Ok(()),
                Err(notify) => notify.notified().await,
            }
        }
    }

    async fn release(&self, names: &[String]) {
        let mut locks = self.locks.lock();
        for name in names {
            if let Some(state) = locks.get_mut(name) {
                state.held = false;
                state.notify.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_blocks_until_release() {
        let registry = Arc::new(InProcessLockRegistry::new());
        let names = vec!["web:http://a".to_string()];
        registry.acquire(&names).await.unwrap();

        let registry2 = registry.clone();
        let names2 = names.clone();
        let handle = tokio::spawn(async move {
            registry2.acquire(&names2).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        registry.release(&names).await;
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn blocked_multi_name_acquire_reserves_nothing_from_the_set() {
        let registry = Arc::new(InProcessLockRegistry::new());
        registry.acquire(&["a".to_string()]).await.unwrap();

        let registry2 = registry.clone();
        let blocked = tokio::spawn(async move {
            registry2.acquire(&["a".to_string(), "b".to_string()]).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        // "b" was never reserved by the blocked attempt, so a disjoint acquire
        // for it alone succeeds immediately.
        tokio::time::timeout(Duration::from_millis(200), registry.acquire(&["b".to_string()])).await.unwrap().unwrap();
        registry.release(&["b".to_string()]).await;

        registry.release(&["a".to_string()]).await;
        tokio::time::timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn disjoint_names_do_not_block_each_other() {
        let registry = InProcessLockRegistry::new();
        registry.acquire(&["a".to_string()]).await.unwrap();
        registry.acquire(&["b".to_string()]).await.unwrap();
        registry.release(&["a".to_string()]).await;
        registry.release(&["b".to_string()]).await;
    }
}
