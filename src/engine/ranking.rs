use std::collections::{BTreeMap, HashSet};

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, StoreResultExt};

/// Keep the authoritative row per player. `rows` must be in descending
/// `row_num` order, so the first row seen for a player wins.
fn latest_per_player(rows: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.player_id.clone()))
        .collect()
}

/// Highest score first; ties go to the row uploaded earlier in the sheet.
fn order_for_ranking(rows: &mut [ScoreRecord]) {
    rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.row_num.cmp(&b.row_num)));
}

impl Engine {
    /// One page of the competition's ranking, strictly after `rank_after`.
    /// The viewer must be an existing, non-disqualified player of the tenant;
    /// their access is recorded for visitor billing.
    pub async fn rank(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
        viewer_player_id: &str,
        rank_after: i64,
    ) -> Result<(CompetitionInfo, Vec<RankEntry>), EngineError> {
        let competition = self.retrieve_competition(tenant_id, competition_id).await?;
        self.authorize_player(tenant_id, viewer_player_id).await?;
        self.record_visit(tenant_id, viewer_player_id, competition_id, now_ms());
        metrics::counter!(crate::observability::RANKING_REQUESTS_TOTAL).increment(1);

        let mut guard = self.lock_tenant(tenant_id).await?;
        let rows = self
            .store
            .competition_scores(tenant_id, competition_id)
            .await
            .during("competition scores", tenant_id)?;
        guard.release();

        let mut ranked = latest_per_player(rows);
        order_for_ranking(&mut ranked);

        let mut page = Vec::new();
        for (rank, row) in (1i64..).zip(ranked) {
            if rank <= rank_after {
                continue;
            }
            if page.len() >= RANKING_PAGE_SIZE {
                break;
            }
            let player = self.retrieve_player(tenant_id, &row.player_id).await?;
            page.push(RankEntry {
                rank,
                score: row.score,
                player_id: player.id,
                player_display_name: player.display_name,
            });
        }
        Ok((CompetitionInfo::from(&competition), page))
    }

    /// A player's detail and latest score in every competition they scored
    /// in, oldest competition first.
    pub async fn player_scores(
        &self,
        tenant_id: TenantId,
        player_id: &str,
    ) -> Result<(PlayerDetail, Vec<PlayerScoreDetail>), EngineError> {
        let player = self.retrieve_player(tenant_id, player_id).await?;
        let mut competitions = self
            .store
            .list_competitions(tenant_id)
            .await
            .during("list competitions", tenant_id)?;

        let mut guard = self.lock_tenant(tenant_id).await?;
        let rows = self
            .store
            .player_scores(tenant_id, player_id)
            .await
            .during("player scores", tenant_id)?;
        guard.release();

        let mut latest: BTreeMap<CompetitionId, ScoreRecord> = BTreeMap::new();
        for row in rows {
            match latest.get(&row.competition_id) {
                Some(kept) if kept.row_num >= row.row_num => {}
                _ => {
                    latest.insert(row.competition_id.clone(), row);
                }
            }
        }

        competitions.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        let scores = competitions
            .iter()
            .filter_map(|c| {
                latest.get(&c.id).map(|row| PlayerScoreDetail {
                    competition_title: c.title.clone(),
                    score: row.score,
                })
            })
            .collect();
        Ok((PlayerDetail::from(&player), scores))
    }
}
