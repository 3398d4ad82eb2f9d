// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! External commit lock adapter.
//!
//! Cloud backends that lack atomic rename-if-absent (§6.4) require an
//! external lock to serialize the manifest-rename commit point. This
//! module defines the trait and a process-local in-memory implementation
//! suitable for single-process use and tests; production deployments
//! against such backends would supply their own (DynamoDB, etcd, ...)
//! implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contextframe_core::Result;

/// Serializes the manifest-rename commit point for a given dataset path
/// when the backing object store cannot do so natively.
#[async_trait]
pub trait CommitLock: Send + Sync + std::fmt::Debug {
    /// Acquire exclusive access to the commit point for `dataset_path`.
    /// The returned guard releases the lock on drop.
    async fn lock(&self, dataset_path: &str) -> Result<Box<dyn CommitLockGuard>>;
}

/// RAII guard for a held commit lock.
pub trait CommitLockGuard: Send {}

/// A process-local commit lock backed by per-path `tokio::sync::Mutex`es.
///
/// This is sufficient for the single-writer-per-process model the design
/// assumes; it does not coordinate across processes or machines.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCommitLock {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl InMemoryCommitLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, dataset_path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("commit lock registry poisoned");
        locks
            .entry(dataset_path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

struct InMemoryCommitGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl CommitLockGuard for InMemoryCommitGuard {}

#[async_trait]
impl CommitLock for InMemoryCommitLock {
    async fn lock(&self, dataset_path: &str) -> Result<Box<dyn CommitLockGuard>> {
        let mutex = self.lock_for(dataset_path);
        let permit = mutex.lock_owned().await;
        Ok(Box::new(InMemoryCommitGuard { _permit: permit }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_access_to_same_path() {
        let lock = InMemoryCommitLock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let lock_a = lock.clone();
        let order_a = order.clone();
        let task_a = tokio::spawn(async move {
            let _guard = lock_a.lock("ds").await.unwrap();
            order_a.lock().unwrap().push("a-start");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            order_a.lock().unwrap().push("a-end");
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let lock_b = lock.clone();
        let order_b = order.clone();
        let task_b = tokio::spawn(async move {
            let _guard = lock_b.lock("ds").await.unwrap();
            order_b.lock().unwrap().push("b-start");
        });

        task_a.await.unwrap();
        task_b.await.unwrap();

        let seq = order.lock().unwrap().clone();
        assert_eq!(seq, vec!["a-start", "a-end", "b-start"]);
    }

    #[tokio::test]
    async fn independent_paths_do_not_block() {
        let lock = InMemoryCommitLock::new();
        let g1 = lock.lock("ds1").await.unwrap();
        let g2 = lock.lock("ds2").await.unwrap();
        drop(g1);
        drop(g2);
    }
}
