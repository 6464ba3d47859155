use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::store::MemoryStore;

/// A named task running `tick` once per `period` until cancelled. The first
/// tick fires one period after spawning.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> PeriodicTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => tick().await,
            }
        }
        debug!(task = name, "periodic task stopped");
    });
    PeriodicTask {
        name,
        cancel,
        handle,
    }
}

impl PeriodicTask {
    /// Cancel and wait for an in-flight tick to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(task = self.name, "periodic task ended abnormally: {e}");
        }
    }
}

/// Rewrite the journal once it has grown past `threshold` appends.
pub async fn compact_if_needed(store: &MemoryStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends == 0 || appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            debug!(appends, "journal compaction done");
            true
        }
        Err(e) => {
            warn!(appends, "journal compaction failed: {e}");
            false
        }
    }
}

/// Engine housekeeping: visit flushing, id high-water persistence and,
/// for journaled stores, compaction.
pub struct Background {
    tasks: Vec<PeriodicTask>,
}

impl Background {
    pub fn start(engine: Arc<Engine>, journal: Option<Arc<MemoryStore>>, config: &Config) -> Self {
        let mut tasks = Vec::new();

        let flusher = engine.clone();
        tasks.push(spawn_periodic("visit-flush", config.visit_flush_interval, move || {
            let engine = flusher.clone();
            async move {
                engine.flush_visits().await;
            }
        }));

        let persister = engine;
        tasks.push(spawn_periodic("id-persist", config.id_persist_interval, move || {
            let engine = persister.clone();
            async move {
                engine.persist_id_high_water().await;
            }
        }));

        if let Some(store) = journal {
            let threshold = config.compact_threshold;
            tasks.push(spawn_periodic("compact", Duration::from_secs(30), move || {
                let store = store.clone();
                async move {
                    compact_if_needed(&store, threshold).await;
                }
            }));
        }

        info!(tasks = tasks.len(), "background tasks started");
        Self { tasks }
    }

    pub async fn shutdown(self) {
        for task in self.tasks {
            task.stop().await;
        }
        info!("background tasks stopped");
    }
}
