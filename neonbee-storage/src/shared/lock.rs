//! In-process named locks with bounded wait.

use async_trait::async_trait;
use neonbee_core::{Acquired, Lock, LockData, LockProvider, NeonBeeResult, SharedDataError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

type LockTable = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Named-lock provider backed by one tokio mutex per lock name.
///
/// Entries are created on first use and removed once nobody holds or waits
/// for them, so the table only grows with the number of contended names.
#[derive(Debug, Clone, Default)]
pub struct LocalLockProvider {
    table: LockTable,
}

impl LocalLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lock names currently held or waited on.
    pub fn active_locks(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Drop the table entry for `name` if only the table still references it.
fn prune(table: &LockTable, name: &str) {
    let mut locks = table.lock().unwrap_or_else(|e| e.into_inner());
    if locks
        .get(name)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        locks.remove(name);
    }
}

/// Guard handed to [`Lock`]; gives the mutex back and prunes the table on drop.
struct LocalLockGuard {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl Drop for LocalLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.table, &self.name);
    }
}

#[async_trait]
impl LockProvider for LocalLockProvider {
    async fn acquire_lock(&self, name: &str, timeout: Duration) -> NeonBeeResult<Lock<Acquired>> {
        let mutex = {
            let mut locks = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(name.to_string()).or_default())
        };

        let started = Instant::now();
        let acquired = tokio::time::timeout(timeout, Arc::clone(&mutex).lock_owned()).await;
        drop(mutex);

        match acquired {
            Ok(guard) => Ok(Lock::new(
                LockData::new(name, started.elapsed()),
                LocalLockGuard {
                    name: name.to_string(),
                    guard: Some(guard),
                    table: Arc::clone(&self.table),
                },
            )),
            Err(_) => {
                prune(&self.table, name);
                Err(SharedDataError::LockTimeout {
                    name: name.to_string(),
                    timeout,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonbee_core::NeonBeeError;

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let locks = LocalLockProvider::new();
        let held = locks
            .acquire_lock("registry-key", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(held.name(), "registry-key");

        let second = locks
            .acquire_lock("registry-key", Duration::from_millis(20))
            .await;
        assert!(matches!(
            second,
            Err(NeonBeeError::SharedData(SharedDataError::LockTimeout { .. }))
        ));

        held.release();
        let third = locks
            .acquire_lock("registry-key", Duration::from_millis(20))
            .await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_different_names_do_not_contend() {
        let locks = LocalLockProvider::new();
        let _a = locks.acquire_lock("a", Duration::from_millis(10)).await.unwrap();
        let _b = locks.acquire_lock("b", Duration::from_millis(10)).await.unwrap();
        assert_eq!(locks.active_locks(), 2);
    }

    #[tokio::test]
    async fn test_table_is_pruned_after_release_and_timeout() {
        let locks = LocalLockProvider::new();
        let held = locks.acquire_lock("x", Duration::from_millis(10)).await.unwrap();
        let _ = locks.acquire_lock("x", Duration::from_millis(5)).await;
        assert_eq!(locks.active_locks(), 1);

        drop(held);
        assert_eq!(locks.active_locks(), 0);
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_holder_releases() {
        let locks = LocalLockProvider::new();
        let held = locks.acquire_lock("w", Duration::from_millis(10)).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire_lock("w", Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);

        let lock = waiter.await.unwrap().unwrap();
        assert!(lock.data().waited >= Duration::from_millis(20));
    }
}
