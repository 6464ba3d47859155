use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

use crate::limits::VISIT_BUFFER_CAPACITY;
use crate::model::*;
use crate::store::VisitSink;

type VisitKey = (TenantId, PlayerId, CompetitionId);

#[derive(Default)]
struct Batch {
    events: Vec<VisitEvent>,
    seen: HashSet<VisitKey>,
}

impl Batch {
    fn with_capacity(n: usize) -> Self {
        Self {
            events: Vec::with_capacity(n),
            seen: HashSet::with_capacity(n),
        }
    }
}

/// Buffers ranking-view access events off the request path and persists them
/// in batches. Within one window only the first access per
/// (tenant, player, competition) is kept; billing reads the minimum anyway.
pub struct VisitRecorder {
    sink: Arc<dyn VisitSink>,
    buffer: Mutex<Batch>,
}

impl VisitRecorder {
    pub fn new(sink: Arc<dyn VisitSink>) -> Self {
        Self {
            sink,
            buffer: Mutex::new(Batch::with_capacity(VISIT_BUFFER_CAPACITY)),
        }
    }

    pub fn record(&self, event: VisitEvent) {
        let key = (
            event.tenant_id,
            event.player_id.clone(),
            event.competition_id.clone(),
        );
        let mut batch = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if batch.seen.insert(key) {
            batch.events.push(event);
        }
    }

    /// Events waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    fn take(&self) -> Vec<VisitEvent> {
        let mut batch = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *batch, Batch::with_capacity(VISIT_BUFFER_CAPACITY)).events
    }

    /// Swap the buffer out and persist it as one batch. Persistence errors
    /// are logged and the batch is dropped. Returns the batch size.
    pub async fn flush(&self) -> usize {
        let events = self.take();
        if events.is_empty() {
            return 0;
        }
        let n = events.len();
        metrics::histogram!(crate::observability::VISIT_FLUSH_BATCH_SIZE).record(n as f64);
        let flush_start = Instant::now();
        match self.sink.insert_visits(events).await {
            Ok(()) => debug!(events = n, "visit batch flushed"),
            Err(e) => {
                metrics::counter!(crate::observability::VISIT_FLUSH_FAILURES_TOTAL).increment(1);
                warn!(events = n, "visit batch lost: {e}");
            }
        }
        metrics::histogram!(crate::observability::VISIT_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        n
    }

    /// Drop everything buffered without persisting it.
    pub fn clear(&self) {
        let dropped = self.take().len();
        if dropped > 0 {
            debug!(dropped, "visit buffer cleared");
        }
    }
}
