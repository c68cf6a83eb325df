//! Shutdown coordination and release guards.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::cache::{reaper, Cache, CacheError};

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that long-running tasks subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of subscribers still waiting.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Future resolving once `trigger` is called.
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Connected cache handle, closed when the guard is dropped.
///
/// A reaper started through the guard is stopped before the cache closes.
pub struct CacheGuard {
    cache: Arc<dyn Cache>,
    reaper: Option<Shutdown>,
}

impl std::fmt::Debug for CacheGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheGuard")
            .field("cache", &self.cache)
            .field("reaping", &self.reaper.is_some())
            .finish()
    }
}

impl CacheGuard {
    /// Connect `cache` and take responsibility for closing it.
    pub fn connect(cache: Arc<dyn Cache>) -> Result<Self, CacheError> {
        cache.connect()?;
        tracing::info!(cache_type = cache.kind(), "Cache connected");
        Ok(Self {
            cache,
            reaper: None,
        })
    }

    /// Sweep expired entries every `every` on `handle`. A zero interval
    /// leaves reaping off.
    pub fn with_reaper(mut self, handle: &Handle, every: Duration) -> Self {
        if every.is_zero() || self.reaper.is_some() {
            return self;
        }
        let stop = Shutdown::new();
        reaper::spawn(handle, Arc::clone(&self.cache), every, stop.subscribe());
        self.reaper = Some(stop);
        self
    }

    pub fn is_reaping(&self) -> bool {
        self.reaper.is_some()
    }

    pub fn cache(&self) -> Arc<dyn Cache> {
        Arc::clone(&self.cache)
    }
}

impl Drop for CacheGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.reaper.take() {
            stop.trigger();
        }
        match self.cache.close() {
            Ok(()) => tracing::info!(cache_type = self.cache.kind(), "Cache closed"),
            Err(e) => tracing::warn!(
                cache_type = self.cache.kind(),
                detail = %e,
                "Failed to close cache"
            ),
        }
    }
}
