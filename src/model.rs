use serde::{Deserialize, Serialize};

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub type TenantId = i64;
pub type PlayerId = String;
pub type CompetitionId = String;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub display_name: String,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub is_disqualified: bool,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competition {
    pub id: CompetitionId,
    pub tenant_id: TenantId,
    pub title: String,
    /// `None` while the competition is still open.
    pub finished_at: Option<Ms>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Competition {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// A visit counts toward billing if it happened no later than the finish.
    pub fn within_window(&self, visited_at: Ms) -> bool {
        self.finished_at.is_none_or(|finished| visited_at <= finished)
    }
}

/// One uploaded score. Within a (tenant, player, competition) triple the
/// record with the largest `row_num` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub player_id: PlayerId,
    pub competition_id: CompetitionId,
    pub score: i64,
    pub row_num: i64,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub player_id: PlayerId,
    pub tenant_id: TenantId,
    pub competition_id: CompetitionId,
    pub visited_at: Ms,
}

/// Earliest visit of one player to one competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSummary {
    pub player_id: PlayerId,
    pub competition_id: CompetitionId,
    pub min_visited_at: Ms,
}

/// A (player, competition) pair with at least one score row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoredPlayer {
    pub player_id: PlayerId,
    pub competition_id: CompetitionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingCategory {
    /// Submitted at least one score.
    Player,
    /// Viewed the ranking within the window without scoring.
    Visitor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingReport {
    pub competition_id: CompetitionId,
    pub competition_title: String,
    pub player_count: i64,
    pub visitor_count: i64,
    pub billing_player_yen: i64,
    pub billing_visitor_yen: i64,
    pub billing_yen: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBilling {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "billing")]
    pub billing_yen: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionInfo {
    pub id: CompetitionId,
    pub title: String,
    pub is_finished: bool,
}

impl From<&Competition> for CompetitionInfo {
    fn from(c: &Competition) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            is_finished: c.is_finished(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub rank: i64,
    pub score: i64,
    pub player_id: PlayerId,
    pub player_display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScoreDetail {
    pub competition_title: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDetail {
    pub id: PlayerId,
    pub display_name: String,
    pub is_disqualified: bool,
}

impl From<&Player> for PlayerDetail {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            display_name: p.display_name.clone(),
            is_disqualified: p.is_disqualified,
        }
    }
}

/// Row-store mutations as journaled to the WAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TenantInserted(Tenant),
    PlayerInserted(Player),
    PlayerDisqualified {
        tenant_id: TenantId,
        id: PlayerId,
        at: Ms,
    },
    CompetitionInserted(Competition),
    CompetitionFinished {
        tenant_id: TenantId,
        id: CompetitionId,
        at: Ms,
    },
    ScoresDeleted {
        tenant_id: TenantId,
        competition_id: CompetitionId,
    },
    ScoresInserted {
        rows: Vec<ScoreRecord>,
    },
    VisitsInserted {
        events: Vec<VisitEvent>,
    },
    IdHighWaterSaved {
        value: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn competition(finished_at: Option<Ms>) -> Competition {
        Competition {
            id: "c1".into(),
            tenant_id: 1,
            title: "c".into(),
            finished_at,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn open_competition_accepts_any_visit() {
        let c = competition(None);
        assert!(c.within_window(i64::MAX));
        assert!(!c.is_finished());
    }

    #[test]
    fn finished_competition_window_is_inclusive() {
        let c = competition(Some(1000));
        assert!(c.within_window(999));
        assert!(c.within_window(1000));
        assert!(!c.within_window(1001));
    }
}
