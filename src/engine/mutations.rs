use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, StoreResultExt};

static TENANT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{0,61}[a-z0-9]$").expect("Invalid tenant name regex")
});

fn validate_tenant_name(name: &str) -> Result<(), EngineError> {
    if !TENANT_NAME.is_match(name) {
        return Err(EngineError::InvalidTenantName(name.to_string()));
    }
    Ok(())
}

fn check_name_len(value: &str, what: &'static str) -> Result<(), EngineError> {
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

impl Engine {
    pub async fn add_tenant(&self, name: &str, display_name: &str) -> Result<Tenant, EngineError> {
        validate_tenant_name(name)?;
        check_name_len(display_name, "tenant display name too long")?;

        let _creating = self.tenant_creation.lock().await;
        let existing = self
            .store
            .list_tenants()
            .await
            .during("list tenants", super::NO_TENANT)?;
        if existing.iter().any(|t| t.name == name) {
            return Err(EngineError::InvalidTenantName(format!("{name} (already taken)")));
        }
        let tenant = self
            .store
            .insert_tenant(name, display_name, now_ms())
            .await
            .during("insert tenant", super::NO_TENANT)?;
        info!(tenant_id = tenant.id, name, "tenant added");
        Ok(tenant)
    }

    pub async fn add_player(
        &self,
        tenant_id: TenantId,
        display_name: &str,
    ) -> Result<Player, EngineError> {
        check_name_len(display_name, "player display name too long")?;
        self.tenant(tenant_id).await?;
        let now = now_ms();
        let player = Player {
            id: self.next_id(tenant_id).await?,
            tenant_id,
            display_name: display_name.to_string(),
            is_disqualified: false,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_player(player.clone())
            .await
            .during("insert player", tenant_id)?;
        Ok(player)
    }

    pub async fn add_competition(
        &self,
        tenant_id: TenantId,
        title: &str,
    ) -> Result<Competition, EngineError> {
        check_name_len(title, "competition title too long")?;
        self.tenant(tenant_id).await?;
        let now = now_ms();
        let competition = Competition {
            id: self.next_id(tenant_id).await?,
            tenant_id,
            title: title.to_string(),
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_competition(competition.clone())
            .await
            .during("insert competition", tenant_id)?;
        info!(tenant_id, competition_id = %competition.id, "competition added");
        Ok(competition)
    }

    /// Replace every score of an open competition with `rows`, given as
    /// (player, score) in sheet order. Returns the number of rows stored.
    pub async fn upload_scores(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
        rows: Vec<(PlayerId, i64)>,
    ) -> Result<usize, EngineError> {
        if rows.len() > MAX_UPLOAD_ROWS {
            return Err(EngineError::LimitExceeded("too many score rows"));
        }
        let competition = self.retrieve_competition(tenant_id, competition_id).await?;
        if competition.is_finished() {
            return Err(EngineError::CompetitionFinished {
                tenant_id,
                competition_id: competition.id,
            });
        }

        let now = now_ms();
        let mut records = Vec::with_capacity(rows.len());
        for (row_num, (player_id, score)) in (1i64..).zip(rows) {
            self.retrieve_player(tenant_id, &player_id).await?;
            records.push(ScoreRecord {
                id: self.next_id(tenant_id).await?,
                tenant_id,
                player_id,
                competition_id: competition.id.clone(),
                score,
                row_num,
                created_at: now,
                updated_at: now,
            });
        }
        let count = records.len();

        let mut guard = self.lock_tenant(tenant_id).await?;
        let competition = self.confirm_competition(&guard, competition).await?;
        if competition.is_finished() {
            return Err(EngineError::CompetitionFinished {
                tenant_id,
                competition_id: competition.id,
            });
        }
        self.store
            .delete_scores(tenant_id, &competition.id)
            .await
            .during("delete scores", tenant_id)?;
        self.store
            .insert_scores(records)
            .await
            .during("insert scores", tenant_id)?;
        // Billing must not see the pre-upload pairs once the lock is released.
        self.caches.scored_players.delete(&tenant_id);
        guard.release();

        metrics::counter!(crate::observability::SCORE_UPLOADS_TOTAL).increment(1);
        info!(tenant_id, competition_id, rows = count, "scores uploaded");
        Ok(count)
    }

    /// Close the competition. Finishing twice keeps the first timestamp.
    pub async fn finish_competition(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<(), EngineError> {
        let competition = self.retrieve_competition(tenant_id, competition_id).await?;

        let mut guard = self.lock_tenant(tenant_id).await?;
        self.store
            .finish_competition(tenant_id, &competition.id, now_ms())
            .await
            .during("finish competition", tenant_id)?;
        self.on_competition_finished(tenant_id, &competition.id);
        guard.release();

        info!(tenant_id, competition_id, "competition finished");
        Ok(())
    }

    pub async fn disqualify_player(
        &self,
        tenant_id: TenantId,
        player_id: &str,
    ) -> Result<PlayerDetail, EngineError> {
        let player = self.retrieve_player(tenant_id, player_id).await?;
        self.store
            .disqualify_player(tenant_id, &player.id, now_ms())
            .await
            .during("disqualify player", tenant_id)?;
        self.caches.players.delete(&(tenant_id, player.id.clone()));
        info!(tenant_id, player_id, "player disqualified");

        let player = self.retrieve_player(tenant_id, player_id).await?;
        Ok(PlayerDetail::from(&player))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_names() {
        for ok in ["ab", "a1", "team-42", "x0"] {
            assert!(validate_tenant_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "a", "1abc", "ab-", "Abc", "a_b", "a".repeat(64).as_str()] {
            assert!(validate_tenant_name(bad).is_err(), "{bad}");
        }
        assert!(validate_tenant_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn name_length_limit() {
        assert!(check_name_len(&"x".repeat(MAX_NAME_LEN), "long").is_ok());
        let err = check_name_len(&"x".repeat(MAX_NAME_LEN + 1), "long").unwrap_err();
        assert!(matches!(err, EngineError::LimitExceeded("long")));
    }
}
