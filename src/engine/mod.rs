mod billing;
mod cache;
mod error;
mod mutations;
mod queries;
mod ranking;

pub use cache::{Cache, CacheSet, EntityKey, Epoch};
pub use error::EngineError;
use error::StoreResultExt;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::dispenser::{IdDispenser, render_id};
use crate::model::*;
use crate::store::RowStore;
use crate::tenant::{TenantGuard, TenantLocks};
use crate::visits::VisitRecorder;

/// Tenant id used in diagnostics for work that is not tenant-scoped.
const NO_TENANT: TenantId = 0;

/// Consistency and aggregation engine. Owns every lock, cache and buffer;
/// request handlers share it as `Arc<Engine>`.
pub struct Engine {
    store: Arc<dyn RowStore>,
    locks: TenantLocks,
    caches: CacheSet,
    visits: VisitRecorder,
    ids: IdDispenser,
    /// Serializes tenant creation so name uniqueness holds.
    tenant_creation: Mutex<()>,
}

impl Engine {
    pub fn new<S: RowStore + 'static>(store: Arc<S>) -> Self {
        Self::with_locks(store, TenantLocks::new())
    }

    pub fn with_locks<S: RowStore + 'static>(store: Arc<S>, locks: TenantLocks) -> Self {
        Self {
            visits: VisitRecorder::new(store.clone()),
            ids: IdDispenser::new(store.clone()),
            store,
            locks,
            caches: CacheSet::new(),
            tenant_creation: Mutex::new(()),
        }
    }

    pub fn caches(&self) -> &CacheSet {
        &self.caches
    }

    /// Next process-wide id, rendered as lower-case hex.
    pub async fn dispense_id(&self) -> Result<String, EngineError> {
        self.next_id(NO_TENANT).await
    }

    async fn next_id(&self, tenant_id: TenantId) -> Result<String, EngineError> {
        let id = self.ids.next().await.during("dispense id", tenant_id)?;
        Ok(render_id(id))
    }

    async fn lock_tenant(&self, tenant_id: TenantId) -> Result<TenantGuard, EngineError> {
        self.locks.acquire(tenant_id).await
    }

    /// Buffer a ranking view. Never fails and never blocks on storage.
    pub fn record_visit(
        &self,
        tenant_id: TenantId,
        player_id: &str,
        competition_id: &str,
        visited_at: Ms,
    ) {
        self.visits.record(VisitEvent {
            player_id: player_id.to_string(),
            tenant_id,
            competition_id: competition_id.to_string(),
            visited_at,
        });
    }

    pub fn pending_visits(&self) -> usize {
        self.visits.pending()
    }

    /// Drop everything derived from the competition's open state: the cached
    /// billing report (zero while open) and the cached competition row whose
    /// `finished_at` is still empty.
    pub fn on_competition_finished(&self, tenant_id: TenantId, competition_id: &str) {
        let key = (tenant_id, competition_id.to_string());
        self.caches.billing_reports.delete(&key);
        self.caches.competitions.delete(&key);
        debug!(tenant_id, competition_id, "finished competition evicted from caches");
    }

    /// Clear every cache and drop buffered visits. Used on reinitialization.
    pub fn reset_all(&self) {
        self.caches.reset_all();
        self.visits.clear();
        info!("engine caches reset");
    }

    pub async fn flush_visits(&self) -> usize {
        self.visits.flush().await
    }

    pub async fn persist_id_high_water(&self) {
        self.ids.persist().await;
    }

    /// Final visit flush and high-water persist. Call after background
    /// tasks have stopped.
    pub async fn shutdown(&self) {
        let flushed = self.visits.flush().await;
        self.ids.persist().await;
        info!(flushed, last_id = ?self.ids.current(), "engine shut down");
    }
}
