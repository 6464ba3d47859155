use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::*;
use crate::wal::Journal;

use super::writer::JournalWriter;
use super::{IdHighWater, RowStore, StoreError, VisitSink};

type TenantKey = (TenantId, String);

/// Current state of every table. Mutated only through `apply`.
#[derive(Default)]
pub(super) struct Tables {
    tenants: DashMap<TenantId, Tenant>,
    players: DashMap<TenantKey, Player>,
    competitions: DashMap<TenantKey, Competition>,
    scores: DashMap<TenantKey, Vec<ScoreRecord>>,
    visits: DashMap<TenantId, Vec<VisitEvent>>,
    id_high_water: AtomicU64,
    last_tenant_id: AtomicI64,
}

impl Tables {
    pub(super) fn apply(&self, event: Event) {
        match event {
            Event::TenantInserted(tenant) => {
                self.last_tenant_id.fetch_max(tenant.id, Ordering::SeqCst);
                self.tenants.insert(tenant.id, tenant);
            }
            Event::PlayerInserted(player) => {
                self.players
                    .insert((player.tenant_id, player.id.clone()), player);
            }
            Event::PlayerDisqualified { tenant_id, id, at } => {
                if let Some(mut p) = self.players.get_mut(&(tenant_id, id)) {
                    p.is_disqualified = true;
                    p.updated_at = at;
                }
            }
            Event::CompetitionInserted(competition) => {
                self.competitions
                    .insert((competition.tenant_id, competition.id.clone()), competition);
            }
            Event::CompetitionFinished { tenant_id, id, at } => {
                if let Some(mut c) = self.competitions.get_mut(&(tenant_id, id))
                    && c.finished_at.is_none()
                {
                    c.finished_at = Some(at);
                    c.updated_at = at;
                }
            }
            Event::ScoresDeleted {
                tenant_id,
                competition_id,
            } => {
                self.scores.remove(&(tenant_id, competition_id));
            }
            Event::ScoresInserted { rows } => {
                for row in rows {
                    self.scores
                        .entry((row.tenant_id, row.competition_id.clone()))
                        .or_default()
                        .push(row);
                }
            }
            Event::VisitsInserted { events } => {
                for visit in events {
                    self.visits.entry(visit.tenant_id).or_default().push(visit);
                }
            }
            Event::IdHighWaterSaved { value } => {
                self.id_high_water.fetch_max(value, Ordering::SeqCst);
            }
        }
    }

    /// Minimal event set recreating current state.
    /// Visit history collapses to the earliest visit per
    /// (tenant, player, competition), which is all billing ever reads.
    pub(super) fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::new();

        let mut tenants: Vec<Tenant> = self.tenants.iter().map(|e| e.value().clone()).collect();
        tenants.sort_by_key(|t| t.id);
        events.extend(tenants.into_iter().map(Event::TenantInserted));

        let mut players: Vec<Player> = self.players.iter().map(|e| e.value().clone()).collect();
        players.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        events.extend(players.into_iter().map(Event::PlayerInserted));

        let mut competitions: Vec<Competition> =
            self.competitions.iter().map(|e| e.value().clone()).collect();
        competitions.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        events.extend(competitions.into_iter().map(Event::CompetitionInserted));

        for entry in self.scores.iter() {
            events.push(Event::ScoresInserted {
                rows: entry.value().clone(),
            });
        }

        let visits: Vec<Vec<VisitEvent>> = self.visits.iter().map(|e| e.value().clone()).collect();
        let mut earliest: HashMap<(TenantId, &str, &str), Ms> = HashMap::new();
        for v in visits.iter().flatten() {
            earliest
                .entry((v.tenant_id, v.player_id.as_str(), v.competition_id.as_str()))
                .and_modify(|t| *t = (*t).min(v.visited_at))
                .or_insert(v.visited_at);
        }
        if !earliest.is_empty() {
            events.push(Event::VisitsInserted {
                events: earliest
                    .into_iter()
                    .map(|((tenant_id, player_id, competition_id), visited_at)| VisitEvent {
                        player_id: player_id.to_string(),
                        tenant_id,
                        competition_id: competition_id.to_string(),
                        visited_at,
                    })
                    .collect(),
            });
        }

        events.push(Event::IdHighWaterSaved {
            value: self.id_high_water.load(Ordering::SeqCst),
        });
        events
    }
}

/// `DashMap`-backed row store, optionally journaled so that a restart
/// replays every committed mutation.
#[derive(Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
    journal: Option<JournalWriter>,
    compaction: Mutex<()>,
}

impl MemoryStore {
    /// Volatile store; nothing survives the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the journal at `path` (if any) and keep appending to it through
    /// a group-commit writer task. Must be called within a Tokio runtime.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let events = Journal::replay(path)?;
        let tables = Arc::new(Tables::default());
        let replayed = events.len();
        for event in events {
            tables.apply(event);
        }
        let journal = JournalWriter::spawn(Journal::open(path)?, tables.clone());
        info!(path = %path.display(), replayed, "row store journal opened");
        Ok(Self {
            tables,
            journal: Some(journal),
            compaction: Mutex::new(()),
        })
    }

    /// Journaled stores apply on the writer task after the group fsync, so
    /// the replayed order always matches the applied one.
    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        match &self.journal {
            Some(journal) => journal.commit(event).await,
            None => {
                self.tables.apply(event);
                Ok(())
            }
        }
    }

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.journal {
            Some(journal) => journal.appends_since_compact().await,
            None => 0,
        }
    }

    /// Rewrite the journal as the minimal event set recreating current state.
    /// Commits keep flowing while the rewrite is staged.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let _running = self.compaction.lock().await;
        let events = journal.compact().await?;
        info!(events, "journal compacted");
        Ok(())
    }
}

#[async_trait]
impl VisitSink for MemoryStore {
    async fn insert_visits(&self, events: Vec<VisitEvent>) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        self.commit(Event::VisitsInserted { events }).await
    }
}

#[async_trait]
impl IdHighWater for MemoryStore {
    async fn load_id_high_water(&self) -> Result<u64, StoreError> {
        Ok(self.tables.id_high_water.load(Ordering::SeqCst))
    }

    async fn save_id_high_water(&self, value: u64) -> Result<(), StoreError> {
        self.commit(Event::IdHighWaterSaved { value }).await
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tables.tenants.get(&id).map(|e| e.value().clone()))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let mut tenants: Vec<Tenant> = self.tables.tenants.iter().map(|e| e.value().clone()).collect();
        tenants.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(tenants)
    }

    async fn insert_tenant(
        &self,
        name: &str,
        display_name: &str,
        now: Ms,
    ) -> Result<Tenant, StoreError> {
        let id = self.tables.last_tenant_id.fetch_add(1, Ordering::SeqCst) + 1;
        let tenant = Tenant {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.commit(Event::TenantInserted(tenant.clone())).await?;
        Ok(tenant)
    }

    async fn get_player(
        &self,
        tenant_id: TenantId,
        id: &str,
    ) -> Result<Option<Player>, StoreError> {
        Ok(self
            .tables.players
            .get(&(tenant_id, id.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn list_players(&self, tenant_id: TenantId) -> Result<Vec<Player>, StoreError> {
        let mut players: Vec<Player> = self
            .tables.players
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| e.value().clone())
            .collect();
        players.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(players)
    }

    async fn insert_player(&self, player: Player) -> Result<(), StoreError> {
        self.commit(Event::PlayerInserted(player)).await
    }

    async fn disqualify_player(
        &self,
        tenant_id: TenantId,
        id: &str,
        now: Ms,
    ) -> Result<(), StoreError> {
        self.commit(Event::PlayerDisqualified {
            tenant_id,
            id: id.to_string(),
            at: now,
        })
        .await
    }

    async fn get_competition(
        &self,
        tenant_id: TenantId,
        id: &str,
    ) -> Result<Option<Competition>, StoreError> {
        Ok(self
            .tables.competitions
            .get(&(tenant_id, id.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn list_competitions(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<Competition>, StoreError> {
        let mut competitions: Vec<Competition> = self
            .tables.competitions
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| e.value().clone())
            .collect();
        competitions.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        Ok(competitions)
    }

    async fn insert_competition(&self, competition: Competition) -> Result<(), StoreError> {
        self.commit(Event::CompetitionInserted(competition)).await
    }

    async fn finish_competition(
        &self,
        tenant_id: TenantId,
        id: &str,
        now: Ms,
    ) -> Result<(), StoreError> {
        let already = self
            .tables.competitions
            .get(&(tenant_id, id.to_string()))
            .is_none_or(|c| c.is_finished());
        if already {
            return Ok(());
        }
        self.commit(Event::CompetitionFinished {
            tenant_id,
            id: id.to_string(),
            at: now,
        })
        .await
    }

    async fn competition_scores(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        let mut rows = self
            .tables.scores
            .get(&(tenant_id, competition_id.to_string()))
            .map(|e| e.value().clone())
            .unwrap_or_default();
        rows.sort_by(|a, b| b.row_num.cmp(&a.row_num));
        Ok(rows)
    }

    async fn player_scores(
        &self,
        tenant_id: TenantId,
        player_id: &str,
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self
            .tables.scores
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .flat_map(|e| {
                e.value()
                    .iter()
                    .filter(|r| r.player_id == player_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    async fn scored_players(&self, tenant_id: TenantId) -> Result<Vec<ScoredPlayer>, StoreError> {
        let mut distinct = HashSet::new();
        for entry in self.tables.scores.iter().filter(|e| e.key().0 == tenant_id) {
            for row in entry.value() {
                distinct.insert(ScoredPlayer {
                    player_id: row.player_id.clone(),
                    competition_id: row.competition_id.clone(),
                });
            }
        }
        Ok(distinct.into_iter().collect())
    }

    async fn delete_scores(
        &self,
        tenant_id: TenantId,
        competition_id: &str,
    ) -> Result<(), StoreError> {
        self.commit(Event::ScoresDeleted {
            tenant_id,
            competition_id: competition_id.to_string(),
        })
        .await
    }

    async fn insert_scores(&self, rows: Vec<ScoreRecord>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.commit(Event::ScoresInserted { rows }).await
    }

    async fn visit_summaries(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<VisitSummary>, StoreError> {
        let Some(visits) = self.tables.visits.get(&tenant_id) else {
            return Ok(Vec::new());
        };
        let mut earliest: HashMap<(&str, &str), Ms> = HashMap::new();
        for v in visits.iter() {
            earliest
                .entry((v.player_id.as_str(), v.competition_id.as_str()))
                .and_modify(|t| *t = (*t).min(v.visited_at))
                .or_insert(v.visited_at);
        }
        Ok(earliest
            .into_iter()
            .map(|((player_id, competition_id), min_visited_at)| VisitSummary {
                player_id: player_id.to_string(),
                competition_id: competition_id.to_string(),
                min_visited_at,
            })
            .collect())
    }
}
