//! Cache subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     CachingConfig → from_config() → Arc<dyn Cache>
//!     → connect() (fatal on error)
//!     → CacheGuard closes it on every exit path
//!
//! Request (query capabilities):
//!     cache_key(origin, capability, request) → retrieve()
//!     miss → origin response → store() with record TTL
//! ```
//!
//! # Design Decisions
//! - Backends are synchronous; handlers call them on the blocking pool
//! - Expiry is checked on read and by a periodic reaper (reaper.rs)
//! - Keys are SHA-256 based so persisted entries survive toolchain upgrades
//! - Use after close is an error, not a silent miss

pub mod filesystem;
pub mod memory;
pub mod reaper;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{CacheType, CachingConfig};

pub use filesystem::FilesystemCache;
pub use memory::MemoryCache;

/// Error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cache is not connected")]
    NotConnected,
}

/// A key/value store for origin responses.
pub trait Cache: Send + Sync + fmt::Debug {
    /// Backend name for logs and metrics.
    fn kind(&self) -> &'static str;

    /// Open the backend. Called once at startup.
    fn connect(&self) -> Result<(), CacheError>;

    /// Store `data` under `key` for `ttl`.
    fn store(&self, key: &str, data: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Fetch a live entry.
    fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Drop every expired entry, returning how many were removed.
    fn reap(&self) -> Result<usize, CacheError>;

    /// Release the backend. Further calls fail with `NotConnected`.
    fn close(&self) -> Result<(), CacheError>;
}

/// Create the configured (not yet connected) cache backend.
pub fn from_config(config: &CachingConfig) -> Arc<dyn Cache> {
    match config.cache_type {
        CacheType::Memory => Arc::new(MemoryCache::new()),
        CacheType::Filesystem => Arc::new(FilesystemCache::new(&config.filesystem.cache_path)),
    }
}

/// Derive a file-name safe cache key for a request.
pub fn cache_key(origin: &str, capability: &str, method: &str, path_and_query: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\0");
    hasher.update(path_and_query.as_bytes());
    hasher.update(b"\0");
    hasher.update(body);
    let digest = hasher.finalize();
    format!("{origin}.{capability}.{}", hex::encode(&digest[..16]))
}
