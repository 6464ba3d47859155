use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::store::{IdHighWater, StoreError};

/// Process-wide id source shared by competitions, players and score rows.
///
/// The persisted high-water mark is read once, on first use. After that every
/// id comes from an atomic increment, so concurrent callers always see
/// distinct, strictly increasing values. The mark is written back by a
/// periodic task (see `background`) and on shutdown.
pub struct IdDispenser {
    store: Arc<dyn IdHighWater>,
    counter: OnceCell<AtomicU64>,
}

impl IdDispenser {
    pub fn new(store: Arc<dyn IdHighWater>) -> Self {
        Self {
            store,
            counter: OnceCell::new(),
        }
    }

    /// Next id. Fails only if the initial high-water mark cannot be read.
    pub async fn next(&self) -> Result<u64, StoreError> {
        let counter = self
            .counter
            .get_or_try_init(|| async {
                let mark = self.store.load_id_high_water().await?;
                debug!(mark, "id dispenser initialized");
                Ok::<_, StoreError>(AtomicU64::new(mark))
            })
            .await?;
        metrics::counter!(crate::observability::IDS_DISPENSED_TOTAL).increment(1);
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Last issued value, or `None` before the first call to `next`.
    pub fn current(&self) -> Option<u64> {
        self.counter.get().map(|c| c.load(Ordering::SeqCst))
    }

    /// Write the current value back to the store. Failures are logged and
    /// counted, never returned: issuance must not depend on persistence.
    pub async fn persist(&self) {
        let Some(value) = self.current() else {
            return;
        };
        match self.store.save_id_high_water(value).await {
            Ok(()) => debug!(value, "id high-water persisted"),
            Err(e) => {
                metrics::counter!(crate::observability::ID_PERSIST_FAILURES_TOTAL).increment(1);
                warn!(value, "id high-water persist failed: {e}");
            }
        }
    }
}

/// External rendering of an id.
pub fn render_id(id: u64) -> String {
    format!("{id:x}")
}
