//! Background tasks spawned at startup.

use std::time::Duration;

use crate::db::DbPool;
use crate::services::expiry_service;

/// Spawn the detached loop that sweeps expired wallet credits every
/// `interval_secs` seconds. The first pass runs one full interval after
/// startup so a crash-looping process does not hammer the sweep.
pub fn spawn_expiry_sweeper(pool: DbPool, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // first tick fires immediately
        tracing::info!(interval_secs, "expiry sweeper started");

        loop {
            interval.tick().await;

            if let Err(e) = expiry_service::sweep_expired_credits(&pool).await {
                tracing::error!(error = %e, "expired credit sweep failed");
            }
        }
    });
}
