use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::TenantId;

/// Per-tenant exclusive locks. Score writers and score readers (billing,
/// ranking, player detail) of one tenant serialize on its mutex; tenants never
/// contend with each other. Entries are created lazily and never removed.
pub struct TenantLocks {
    locks: DashMap<TenantId, Arc<Mutex<()>>>,
    max_tenants: usize,
}

impl Default for TenantLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::with_limit(MAX_TENANTS)
    }

    pub fn with_limit(max_tenants: usize) -> Self {
        Self {
            locks: DashMap::new(),
            max_tenants,
        }
    }

    /// Wait for the tenant's lock. Tokio's mutex hands it out in FIFO order.
    pub async fn acquire(&self, tenant_id: TenantId) -> Result<TenantGuard, EngineError> {
        let lock = self.lock_for(tenant_id)?;
        let wait_start = Instant::now();
        let guard = lock.lock_owned().await;
        metrics::histogram!(crate::observability::TENANT_LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());
        Ok(TenantGuard {
            tenant_id,
            guard: Some(guard),
        })
    }

    fn lock_for(&self, tenant_id: TenantId) -> Result<Arc<Mutex<()>>, EngineError> {
        if let Some(lock) = self.locks.get(&tenant_id) {
            return Ok(lock.value().clone());
        }
        if self.locks.len() >= self.max_tenants {
            return Err(EngineError::LockAcquire {
                tenant_id,
                reason: "too many tenant locks",
            });
        }
        Ok(self
            .locks
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held tenant lock. Dropping it releases the lock.
pub struct TenantGuard {
    tenant_id: TenantId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TenantGuard {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    /// Release early. Safe to call more than once.
    pub fn release(&mut self) {
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn release_is_idempotent() {
        let locks = TenantLocks::new();
        let mut guard = locks.acquire(1).await.unwrap();
        assert!(guard.is_held());
        assert_eq!(guard.tenant_id(), 1);

        guard.release();
        guard.release();
        assert!(!guard.is_held());

        // Lock is free again
        let again = tokio::time::timeout(Duration::from_millis(100), locks.acquire(1)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn same_tenant_is_exclusive() {
        let locks = Arc::new(TenantLocks::new());
        let guard = locks.acquire(7).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(7)).await;
        assert!(blocked.is_err(), "second acquire must wait");

        drop(guard);
        let after = tokio::time::timeout(Duration::from_millis(100), locks.acquire(7)).await;
        assert!(after.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tenants_do_not_block_each_other() {
        let locks = Arc::new(TenantLocks::new());
        let _a = locks.acquire(1).await.unwrap();

        let other = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(other.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn lock_table_limit() {
        let locks = TenantLocks::with_limit(2);
        let a = locks.acquire(1).await.unwrap();
        let _b = locks.acquire(2).await.unwrap();

        let err = locks.acquire(3).await.err().unwrap();
        assert!(matches!(err, EngineError::LockAcquire { tenant_id: 3, .. }));
        assert!(err.to_string().contains("too many tenant locks"));

        // Existing tenants still work at the limit.
        drop(a);
        assert!(locks.acquire(1).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn guard_released_on_error_path() {
        let locks = Arc::new(TenantLocks::new());

        async fn failing(locks: &TenantLocks) -> Result<(), EngineError> {
            let _guard = locks.acquire(3).await?;
            Err(EngineError::LimitExceeded("boom"))
        }
        assert!(failing(&locks).await.is_err());

        let after = tokio::time::timeout(Duration::from_millis(100), locks.acquire(3)).await;
        assert!(after.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiter_runs_after_holder_releases() {
        let locks = Arc::new(TenantLocks::new());
        let done = Arc::new(AtomicBool::new(false));

        let guard = locks.acquire(5).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(5).await.unwrap();
                done.load(Ordering::SeqCst)
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        done.store(true, Ordering::SeqCst);
        drop(guard);

        assert!(waiter.await.unwrap(), "waiter saw state written before release");
    }
}
