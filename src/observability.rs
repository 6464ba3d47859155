use std::net::SocketAddr;

// ── Caches ──────────────────────────────────────────────────────

/// Counter: cache lookups that found an entry. Labels: cache.
pub const CACHE_HITS_TOTAL: &str = "scorekeep_cache_hits_total";

/// Counter: cache lookups that missed. Labels: cache.
pub const CACHE_MISSES_TOTAL: &str = "scorekeep_cache_misses_total";

/// Counter: full cache resets.
pub const CACHE_RESETS_TOTAL: &str = "scorekeep_cache_resets_total";

// ── Locks ───────────────────────────────────────────────────────

/// Histogram: time spent waiting for a tenant lock, in seconds.
pub const TENANT_LOCK_WAIT_SECONDS: &str = "scorekeep_tenant_lock_wait_seconds";

// ── IDs ─────────────────────────────────────────────────────────

/// Counter: ids handed out.
pub const IDS_DISPENSED_TOTAL: &str = "scorekeep_ids_dispensed_total";

/// Counter: failed high-water persists.
pub const ID_PERSIST_FAILURES_TOTAL: &str = "scorekeep_id_persist_failures_total";

// ── Visits ──────────────────────────────────────────────────────

/// Histogram: visit events per flush.
pub const VISIT_FLUSH_BATCH_SIZE: &str = "scorekeep_visit_flush_batch_size";

/// Histogram: visit flush duration in seconds.
pub const VISIT_FLUSH_DURATION_SECONDS: &str = "scorekeep_visit_flush_duration_seconds";

/// Counter: flushes whose batch could not be persisted.
pub const VISIT_FLUSH_FAILURES_TOTAL: &str = "scorekeep_visit_flush_failures_total";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: events per journal group commit.
pub const JOURNAL_COMMIT_BATCH_SIZE: &str = "scorekeep_journal_commit_batch_size";

/// Histogram: journal write + fsync duration per group commit, in seconds.
pub const JOURNAL_COMMIT_DURATION_SECONDS: &str = "scorekeep_journal_commit_duration_seconds";

// ── Requests ────────────────────────────────────────────────────

/// Counter: billing reports computed (cache misses only).
pub const BILLING_REPORTS_COMPUTED_TOTAL: &str = "scorekeep_billing_reports_computed_total";

/// Counter: ranking requests served.
pub const RANKING_REQUESTS_TOTAL: &str = "scorekeep_ranking_requests_total";

/// Counter: score uploads committed.
pub const SCORE_UPLOADS_TOTAL: &str = "scorekeep_score_uploads_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
