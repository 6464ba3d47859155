//! Row-store interface consumed by the engine.
//!
//! The engine never issues persistence statements itself: it calls these
//! keyed operations and owns locking and caching around them. Score-row
//! operations must only be called while holding the tenant's lock.

mod memory;
mod writer;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Batch persistence for ranking-view access events.
#[async_trait]
pub trait VisitSink: Send + Sync {
    async fn insert_visits(&self, events: Vec<VisitEvent>) -> Result<(), StoreError>;
}

/// Durable high-water mark for the ID dispenser.
#[async_trait]
pub trait IdHighWater: Send + Sync {
    /// Last persisted value, or 0 on a fresh store.
    async fn load_id_high_water(&self) -> Result<u64, StoreError>;
    async fn save_id_high_water(&self, value: u64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RowStore: VisitSink + IdHighWater {
    // ── Tenants ──────────────────────────────────────────────

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;
    /// All tenants, descending id.
    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    /// Assigns the next tenant id.
    async fn insert_tenant(&self, name: &str, display_name: &str, now: Ms)
    -> Result<Tenant, StoreError>;

    // ── Players ──────────────────────────────────────────────

    async fn get_player(
        &self,
        tenant_id: TenantId,
        id: &str,
    ) -> Result<Option<Player>, StoreError>;
    /// Players of a tenant, oldest first.
    async fn list_players(&self, tenant_id: TenantId) -> Result<Vec<Player>, StoreError>;
    async fn insert_player(&self, player: Player) -> Result<(), StoreError>;
    async fn disqualify_player(
        &self,
        tenant_id: TenantId,
        id: &str,
        now: Ms,
    ) -> Result<(), StoreError>;

    // ── Competitions ─────────────────────────────────────────

    async fn get_competition(
        &self,
        tenant_id: TenantId,
        id: &str,
    ) -> Result<Option<Competition>, StoreError>;
    /// Competitions of a tenant, newest first.
    async fn list_competitions(&self, tenant_id: TenantId)
    -> Result<Vec<Competition>, StoreError>;
    async fn insert_competition(&self, competition: Competition) -> Result<(), StoreError>;
    /// Sets `finished_at` unless already set.
    async fn finish_competition(
        &self,
        tenant_id: TenantId,
        id: &str,
        now: Ms,
    ) -> Result<(), StoreError>;

    // ── Score rows (tenant lock required) ────────────────────

    /// All rows of one competition, descending `row_num`.
    async fn competition_scores(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<Vec<ScoreRecord>, StoreError>;
    /// All rows of one player across competitions.
    async fn player_scores(
        &self,
        tenant_id: TenantId,
        player_id: &str,
    ) -> Result<Vec<ScoreRecord>, StoreError>;
    /// Distinct (player, competition) pairs with at least one row.
    async fn scored_players(&self, tenant_id: TenantId) -> Result<Vec<ScoredPlayer>, StoreError>;
    async fn delete_scores(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<(), StoreError>;
    async fn insert_scores(&self, rows: Vec<ScoreRecord>) -> Result<(), StoreError>;

    // ── Visits ───────────────────────────────────────────────

    /// Per (player, competition) earliest visit for one tenant.
    async fn visit_summaries(&self, tenant_id: TenantId)
    -> Result<Vec<VisitSummary>, StoreError>;
}
