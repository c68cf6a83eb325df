//! Periodic sweep of expired cache entries.
//!
//! Entries are otherwise only dropped when their own key is read again, and
//! range query keys rarely repeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::Cache;

/// Sweep `cache` every `every` until `shutdown_rx` fires.
pub fn spawn(
    handle: &Handle,
    cache: Arc<dyn Cache>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(cache_type = cache.kind(), interval = ?every, "Cache reaper started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                _ = ticker.tick() => {
                    let sweep = Arc::clone(&cache);
                    match tokio::task::spawn_blocking(move || sweep.reap()).await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(removed)) => tracing::debug!(removed, "Reaped expired cache entries"),
                        Ok(Err(e)) => tracing::warn!(detail = %e, "Cache reap failed"),
                        Err(e) => tracing::warn!(detail = %e, "Cache reap task failed"),
                    }
                }
            }
        }

        tracing::debug!(cache_type = cache.kind(), "Cache reaper stopped");
    })
}
