use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: slots promoted onto the marketplace.
pub const SLOTS_OFFERED_TOTAL: &str = "slotswap_slots_offered_total";

/// Counter: swap requests opened.
pub const REQUESTS_OPENED_TOTAL: &str = "slotswap_requests_opened_total";

/// Counter: requests accepted (atomic exchanges committed).
pub const SWAPS_ACCEPTED_TOTAL: &str = "slotswap_swaps_accepted_total";

/// Counter: requests rejected by the responder.
pub const SWAPS_REJECTED_TOTAL: &str = "slotswap_swaps_rejected_total";

/// Counter: requests cancelled by the requester.
pub const SWAPS_CANCELLED_TOTAL: &str = "slotswap_swaps_cancelled_total";

/// Counter: offers that lost the race for a slot (SlotUnavailable).
pub const SLOT_CONFLICTS_TOTAL: &str = "slotswap_slot_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "slotswap_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotswap_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotswap_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
