use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;

/// Background task that rewrites the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        debug!("compacting WAL after {appends} appends");
        match engine.compact_wal().await {
            Ok(()) => info!("WAL compacted ({appends} appends folded)"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
