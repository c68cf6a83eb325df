//! In-process cache backed by a concurrent map.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::cache::{Cache, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

/// A thread-safe in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    connected: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_connected(&self) -> Result<(), CacheError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::NotConnected)
        }
    }
}

impl Cache for MemoryCache {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn connect(&self) -> Result<(), CacheError> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn store(&self, key: &str, data: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.ensure_connected()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                data: data.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.ensure_connected()?;
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        // Expired: drop it outside the read guard.
        if hit {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    fn reap(&self) -> Result<usize, CacheError> {
        self.ensure_connected()?;
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn close(&self) -> Result<(), CacheError> {
        self.connected.store(false, Ordering::Release);
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_operations() {
        let cache = MemoryCache::new();
        cache.connect().unwrap();

        assert!(cache.retrieve("k").unwrap().is_none());

        cache.store("k", b"value", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.retrieve("k").unwrap().unwrap(), b"value");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::new();
        cache.connect().unwrap();

        cache.store("k", b"value", Duration::ZERO).unwrap();
        assert!(cache.retrieve("k").unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reap_drops_unread_expired_entries() {
        let cache = MemoryCache::new();
        cache.connect().unwrap();

        for i in 0..10_000 {
            cache.store(&format!("expired.{i}"), b"v", Duration::ZERO).unwrap();
        }
        cache.store("live", b"v", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.len(), 10_001);

        assert_eq!(cache.reap().unwrap(), 10_000);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.retrieve("live").unwrap().unwrap(), b"v");
    }

    #[test]
    fn test_requires_connection() {
        let cache = MemoryCache::new();
        assert!(matches!(
            cache.store("k", b"v", Duration::from_secs(1)),
            Err(CacheError::NotConnected)
        ));

        cache.connect().unwrap();
        cache.store("k", b"v", Duration::from_secs(60)).unwrap();
        cache.close().unwrap();

        assert!(matches!(cache.retrieve("k"), Err(CacheError::NotConnected)));
        assert!(cache.is_empty());
    }
}
