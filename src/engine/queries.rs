use std::sync::Arc;

use crate::model::*;
use crate::tenant::TenantGuard;

use super::{Engine, EngineError, StoreResultExt};

impl Engine {
    pub async fn tenant(&self, tenant_id: TenantId) -> Result<Tenant, EngineError> {
        self.store
            .get_tenant(tenant_id)
            .await
            .during("get tenant", tenant_id)?
            .ok_or_else(|| EngineError::not_found("tenant", tenant_id, &tenant_id.to_string()))
    }

    /// Player through the player cache.
    pub async fn retrieve_player(
        &self,
        tenant_id: TenantId,
        player_id: &str,
    ) -> Result<Player, EngineError> {
        let key = (tenant_id, player_id.to_string());
        if let Some(player) = self.caches.players.get(&key) {
            return Ok(player);
        }
        let epoch = self.caches.epoch();
        let player = self
            .store
            .get_player(tenant_id, player_id)
            .await
            .during("get player", tenant_id)?
            .ok_or_else(|| EngineError::not_found("player", tenant_id, player_id))?;
        self.caches.players.set_if_epoch(key, player.clone(), epoch);
        Ok(player)
    }

    /// Competition through the competition cache.
    pub async fn retrieve_competition(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<Competition, EngineError> {
        let key = (tenant_id, competition_id.to_string());
        if let Some(competition) = self.caches.competitions.get(&key) {
            return Ok(competition);
        }
        let epoch = self.caches.epoch();
        let competition = self
            .store
            .get_competition(tenant_id, competition_id)
            .await
            .during("get competition", tenant_id)?
            .ok_or_else(|| EngineError::not_found("competition", tenant_id, competition_id))?;
        self.caches.competitions.set_if_epoch(key, competition.clone(), epoch);
        Ok(competition)
    }

    /// Re-read an open competition while holding its tenant's lock.
    ///
    /// Finishing happens under the same lock, so the row read here is current
    /// even if a reader repopulated the cache with the open row just before
    /// the finish evicted it. Finished rows never change and are returned as is.
    pub(super) async fn confirm_competition(
        &self,
        guard: &TenantGuard,
        competition: Competition,
    ) -> Result<Competition, EngineError> {
        debug_assert_eq!(guard.tenant_id(), competition.tenant_id);
        if competition.is_finished() {
            return Ok(competition);
        }
        let tenant_id = competition.tenant_id;
        let epoch = self.caches.epoch();
        let current = self
            .store
            .get_competition(tenant_id, &competition.id)
            .await
            .during("get competition", tenant_id)?
            .ok_or_else(|| EngineError::not_found("competition", tenant_id, &competition.id))?;
        if current.is_finished() {
            self.caches.competitions.set_if_epoch(
                (tenant_id, current.id.clone()),
                current.clone(),
                epoch,
            );
        }
        Ok(current)
    }

    /// Earliest visit per (player, competition) for the whole tenant. Cached
    /// until the next `reset_all`; a read that straddles a reset is not cached.
    pub(super) async fn visit_summaries(
        &self,
        tenant_id: TenantId,
    ) -> Result<Arc<Vec<VisitSummary>>, EngineError> {
        if let Some(summaries) = self.caches.visit_summaries.get(&tenant_id) {
            return Ok(summaries);
        }
        let epoch = self.caches.epoch();
        let summaries = Arc::new(
            self.store
                .visit_summaries(tenant_id)
                .await
                .during("visit summaries", tenant_id)?,
        );
        self.caches
            .visit_summaries
            .set_if_epoch(tenant_id, summaries.clone(), epoch);
        Ok(summaries)
    }

    /// Scored (player, competition) pairs. Requires the tenant lock: uploads
    /// invalidate this entry under it, so nothing cached here can predate a
    /// committed upload.
    pub(super) async fn scored_players(
        &self,
        guard: &TenantGuard,
    ) -> Result<Arc<Vec<ScoredPlayer>>, EngineError> {
        let tenant_id = guard.tenant_id();
        if let Some(scored) = self.caches.scored_players.get(&tenant_id) {
            return Ok(scored);
        }
        let epoch = self.caches.epoch();
        let scored = Arc::new(
            self.store
                .scored_players(tenant_id)
                .await
                .during("scored players", tenant_id)?,
        );
        self.caches
            .scored_players
            .set_if_epoch(tenant_id, scored.clone(), epoch);
        Ok(scored)
    }

    /// The player may act: exists and is not disqualified.
    pub async fn authorize_player(
        &self,
        tenant_id: TenantId,
        player_id: &str,
    ) -> Result<Player, EngineError> {
        let player = self.retrieve_player(tenant_id, player_id).await?;
        if player.is_disqualified {
            return Err(EngineError::PlayerDisqualified {
                tenant_id,
                player_id: player.id,
            });
        }
        Ok(player)
    }

    /// Newest first.
    pub async fn list_competitions(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<CompetitionInfo>, EngineError> {
        let competitions = self
            .store
            .list_competitions(tenant_id)
            .await
            .during("list competitions", tenant_id)?;
        Ok(competitions.iter().map(CompetitionInfo::from).collect())
    }

    /// Creation order.
    pub async fn list_players(&self, tenant_id: TenantId) -> Result<Vec<PlayerDetail>, EngineError> {
        let players = self
            .store
            .list_players(tenant_id)
            .await
            .during("list players", tenant_id)?;
        Ok(players.iter().map(PlayerDetail::from).collect())
    }
}
