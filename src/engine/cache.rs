//! Read-through caches with manual invalidation.
//!
//! Entries never expire. Every mutation that can make an entry wrong must
//! delete it explicitly; the call sites are:
//!
//! | mutation                   | invalidated entry                          |
//! |----------------------------|--------------------------------------------|
//! | competition finished       | `billing_reports[(tenant, competition)]`,  |
//! |                            | `competitions[(tenant, competition)]`      |
//! | score upload committed     | `scored_players[tenant]` (under the lock)  |
//! | player disqualified        | `players[(tenant, player)]`                |
//! | system reinitialized       | everything (`CacheSet::reset_all`)         |
//!
//! Read-through fills take an `Epoch` before going to the store and store
//! their result with `set_if_epoch`. A reset in between bumps the epoch, so a
//! value read before the reset is dropped instead of outliving it.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::model::*;

/// Reset generation observed by a read-through fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

pub struct Cache<K, V> {
    name: &'static str,
    entries: DashMap<K, V>,
    /// Shared by every cache of a `CacheSet`.
    generation: Arc<AtomicU64>,
}

impl<K: Eq + Hash, V: Clone> Cache<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self::sharing(name, Arc::new(AtomicU64::new(0)))
    }

    fn sharing(name: &'static str, generation: Arc<AtomicU64>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            generation,
        }
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.generation.load(Ordering::SeqCst))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key).map(|e| e.value().clone());
        let metric = if hit.is_some() {
            crate::observability::CACHE_HITS_TOTAL
        } else {
            crate::observability::CACHE_MISSES_TOTAL
        };
        metrics::counter!(metric, "cache" => self.name).increment(1);
        hit
    }

    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Store `value` only if no reset happened since `epoch` was taken.
    /// Returns whether the value was kept.
    pub fn set_if_epoch(&self, key: K, value: V, epoch: Epoch) -> bool
    where
        K: Clone,
    {
        if self.epoch() != epoch {
            return false;
        }
        self.entries.insert(key.clone(), value);
        // A reset that started after the check may have cleared before the
        // insert landed. Removing costs at most one extra miss.
        if self.epoch() != epoch {
            self.entries.remove(&key);
            return false;
        }
        true
    }

    pub fn delete(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Bumps the generation before clearing so in-flight fills see it.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type EntityKey = (TenantId, String);

pub struct CacheSet {
    pub players: Cache<EntityKey, Player>,
    pub competitions: Cache<EntityKey, Competition>,
    /// Whole-tenant visit summary, shared by every competition of the tenant.
    pub visit_summaries: Cache<TenantId, Arc<Vec<VisitSummary>>>,
    /// Whole-tenant scored pairs. Populated only under the tenant lock.
    pub scored_players: Cache<TenantId, Arc<Vec<ScoredPlayer>>>,
    pub billing_reports: Cache<EntityKey, BillingReport>,
}

impl Default for CacheSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheSet {
    pub fn new() -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        Self {
            players: Cache::sharing("player", generation.clone()),
            competitions: Cache::sharing("competition", generation.clone()),
            visit_summaries: Cache::sharing("visit_summary", generation.clone()),
            scored_players: Cache::sharing("scored_player", generation.clone()),
            billing_reports: Cache::sharing("billing_report", generation),
        }
    }

    /// Taken before a fill reads anything, cached or not, that its value
    /// derives from.
    pub fn epoch(&self) -> Epoch {
        self.players.epoch()
    }

    pub fn reset_all(&self) {
        self.players.reset();
        self.competitions.reset();
        self.visit_summaries.reset();
        self.scored_players.reset();
        self.billing_reports.reset();
        metrics::counter!(crate::observability::CACHE_RESETS_TOTAL).increment(1);
    }
}
