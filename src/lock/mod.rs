// src/lock/mod.rs

//! Named mutual exclusion.
//!
//! Every lock name maps to one capacity-1 lock, created on first use and
//! kept for the life of the process. The number of names is bounded by the
//! configuration, so entries are never evicted.
//!
//! All acquisition methods run the caller's body while the lock is held and
//! release it when the body's future completes, panics or is dropped. Waiters
//! are not guaranteed to be served in any particular order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::config::LockSpec;
use crate::errors::ExecError;
use crate::types::LockWaitMode;

type NamedLock = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, NamedLock>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, name: &str) -> NamedLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(lock = %name, "creating named lock");
                Arc::new(AsyncMutex::new(()))
            })
            .clone()
    }

    /// Number of distinct lock names seen so far.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `body` only if the lock is free right now.
    ///
    /// Returns `None` without running `body` when the lock is held.
    pub async fn acquire_try<F, Fut, T>(&self, name: &str, body: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.get(name);
        let _guard = lock.try_lock().ok()?;
        debug!(lock = %name, "lock acquired (try)");
        Some(body().await)
    }

    /// Run `body` once the lock is acquired, waiting at most `timeout`.
    ///
    /// Returns `None` without running `body` if the timeout elapses first.
    pub async fn acquire_wait<F, Fut, T>(&self, name: &str, timeout: Duration, body: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.get(name);
        let _guard = tokio::time::timeout(timeout, lock.lock()).await.ok()?;
        debug!(lock = %name, "lock acquired (wait)");
        Some(body().await)
    }

    /// Run `body` once the lock is acquired, however long that takes.
    pub async fn acquire_blocking<F, Fut, T>(&self, name: &str, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.get(name);
        let _guard = lock.lock().await;
        debug!(lock = %name, "lock acquired (blocking)");
        body().await
    }

    /// Acquire according to a configured [`LockSpec`].
    ///
    /// An unlimited timeout in `Wait` mode waits forever.
    pub async fn acquire<F, Fut, T>(&self, spec: &LockSpec, body: F) -> Result<T, ExecError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match (spec.wait_mode, spec.timeout) {
            (LockWaitMode::Try, _) => self
                .acquire_try(&spec.name, body)
                .await
                .ok_or_else(|| ExecError::LockBusy(spec.name.clone())),
            (LockWaitMode::Wait, Some(timeout)) => self
                .acquire_wait(&spec.name, timeout, body)
                .await
                .ok_or_else(|| ExecError::LockTimeout(spec.name.clone())),
            (LockWaitMode::Wait, None) => Ok(self.acquire_blocking(&spec.name, body).await),
        }
    }
}
