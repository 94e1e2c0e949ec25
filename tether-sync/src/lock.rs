//! In-memory per-resource execution locks.
//!
//! A lock is held for the lifetime of its [`LockGuard`] and released on drop.
//! Locks carry a TTL: a lock past its expiry is treated as abandoned and can
//! be taken over. Acquisition polls until the lock frees or the timeout
//! elapses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;

use tether_core::types::local_hostname;
use tether_core::LockRecord;

use crate::error::SyncError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Held {
    record: LockRecord,
    token: u64,
}

#[derive(Debug, Default)]
struct LockTable {
    locks: Mutex<HashMap<String, Held>>,
    next_token: AtomicU64,
}

/// Process-local lock manager. Cloning shares the same table.
#[derive(Debug, Clone)]
pub struct LockManager {
    table: Arc<LockTable>,
    ttl: Duration,
}

impl LockManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: Arc::new(LockTable::default()),
            ttl,
        }
    }

    /// Take the lock on `resource` if it is free or expired.
    pub fn try_acquire(&self, resource: &str, operation: &str) -> Option<LockGuard> {
        let now = Utc::now();
        let mut locks = self.table.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(held) = locks.get(resource) {
            if !held.record.is_expired_at(now) {
                return None;
            }
            tracing::warn!(
                resource,
                holder = %held.record.holder,
                "taking over expired lock"
            );
        }

        let token = self.table.next_token.fetch_add(1, Ordering::SeqCst);
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let record = LockRecord {
            holder: format!("pid-{}-{token}", std::process::id()),
            hostname: local_hostname(),
            acquired_at: now,
            operation: operation.to_string(),
            expires_at: now + ttl,
        };
        locks.insert(
            resource.to_string(),
            Held {
                record: record.clone(),
                token,
            },
        );
        tracing::debug!(resource, operation, "lock acquired");
        Some(LockGuard {
            table: Arc::clone(&self.table),
            resource: resource.to_string(),
            token,
            record,
        })
    }

    /// Wait up to `timeout` for the lock on `resource`.
    pub async fn acquire(
        &self,
        resource: &str,
        operation: &str,
        timeout: Duration,
    ) -> Result<LockGuard, SyncError> {
        let start = Instant::now();
        loop {
            if let Some(guard) = self.try_acquire(resource, operation) {
                return Ok(guard);
            }
            if start.elapsed() >= timeout {
                let holder = self
                    .holder_of(resource)
                    .map(|r| format!("{} on {} ({})", r.holder, r.hostname, r.operation))
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(SyncError::LockTimeout {
                    resource: resource.to_string(),
                    holder,
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Current holder of `resource`, if held and unexpired.
    pub fn holder_of(&self, resource: &str) -> Option<LockRecord> {
        let now = Utc::now();
        self.table
            .locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource)
            .filter(|held| !held.record.is_expired_at(now))
            .map(|held| held.record.clone())
    }

    pub fn is_locked(&self, resource: &str) -> bool {
        self.holder_of(resource).is_some()
    }
}

/// Releases its lock on drop. A guard whose lock was taken over after expiry
/// leaves the new holder's lock alone.
#[derive(Debug)]
pub struct LockGuard {
    table: Arc<LockTable>,
    resource: String,
    token: u64,
    record: LockRecord,
}

impl LockGuard {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut locks = self.table.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(&self.resource).map(|h| h.token) == Some(self.token) {
            locks.remove(&self.resource);
            tracing::debug!(resource = %self.resource, "lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_release_reacquire() {
        let locks = LockManager::new(Duration::from_secs(60));
        {
            let guard = locks.acquire("r1", "execute", Duration::from_millis(50)).await.unwrap();
            assert!(locks.is_locked("r1"));
            assert_eq!(guard.record().operation, "execute");
        }
        assert!(!locks.is_locked("r1"));
        let _again = locks.acquire("r1", "execute", Duration::from_millis(50)).await.unwrap();
    }

    #[tokio::test]
    async fn second_acquire_times_out() {
        let locks = LockManager::new(Duration::from_secs(60));
        let _held = locks.acquire("r1", "execute", Duration::from_millis(50)).await.unwrap();
        let start = Instant::now();
        let err = locks
            .acquire("r1", "execute", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(err.code(), crate::ErrorCode::LockTimeout);
        assert!(err.to_string().contains("execute"));
    }

    #[tokio::test]
    async fn different_resources_do_not_contend() {
        let locks = LockManager::new(Duration::from_secs(60));
        let _a = locks.try_acquire("a", "x").expect("a");
        assert!(locks.try_acquire("b", "x").is_some());
    }

    #[tokio::test]
    async fn waiter_gets_lock_after_release() {
        let locks = LockManager::new(Duration::from_secs(60));
        let held = locks.acquire("r1", "first", Duration::from_millis(50)).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("r1", "second", Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);
        let guard = waiter.await.unwrap().unwrap();
        assert_eq!(guard.record().operation, "second");
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over_and_old_guard_is_harmless() {
        let locks = LockManager::new(Duration::from_millis(20));
        let stale = locks.try_acquire("r1", "crashed").expect("first");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh = locks.try_acquire("r1", "new").expect("takeover");
        drop(stale);
        assert_eq!(
            locks.holder_of("r1").map(|r| r.operation),
            Some("new".to_string()),
            "dropping the stale guard must not release the new lock"
        );
        drop(fresh);
    }
}
