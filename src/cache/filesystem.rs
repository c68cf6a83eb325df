//! Cache persisted as one file per key.
//!
//! Each file starts with the expiry as big-endian seconds since the Unix
//! epoch, followed by the payload.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::{Cache, CacheError};

const HEADER_LEN: usize = 8;

/// A cache storing entries under a directory.
#[derive(Debug)]
pub struct FilesystemCache {
    root: PathBuf,
    connected: AtomicBool,
}

impl FilesystemCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.data"))
    }

    fn ensure_connected(&self) -> Result<(), CacheError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::NotConnected)
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn io_error(path: &Path, source: io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Expiry header of an entry file; `None` when the file is truncated.
fn read_expiry(path: &Path) -> io::Result<Option<u64>> {
    let mut header = [0u8; HEADER_LEN];
    let mut file = fs::File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(Some(u64::from_be_bytes(header))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

impl Cache for FilesystemCache {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn connect(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root).map_err(|e| io_error(&self.root, e))?;
        self.connected.store(true, Ordering::Release);
        tracing::debug!(path = %self.root.display(), "Filesystem cache ready");
        Ok(())
    }

    fn store(&self, key: &str, data: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.ensure_connected()?;
        let path = self.entry_path(key);
        let expires_at = now_secs().saturating_add(ttl.as_secs());

        let mut contents = Vec::with_capacity(HEADER_LEN + data.len());
        contents.extend_from_slice(&expires_at.to_be_bytes());
        contents.extend_from_slice(data);
        fs::write(&path, contents).map_err(|e| io_error(&path, e))
    }

    fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.ensure_connected()?;
        let path = self.entry_path(key);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let Some((header, payload)) = contents.split_first_chunk::<HEADER_LEN>() else {
            tracing::warn!(path = %path.display(), "Discarding truncated cache file");
            let _ = fs::remove_file(&path);
            return Ok(None);
        };

        if u64::from_be_bytes(*header) <= now_secs() {
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(payload.to_vec()))
    }

    fn reap(&self) -> Result<usize, CacheError> {
        self.ensure_connected()?;
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(&self.root, e))?;
        let now = now_secs();

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("data") {
                continue;
            }
            let expired = match read_expiry(&path) {
                Ok(Some(expires_at)) => expires_at <= now,
                Ok(None) => true,
                Err(_) => continue,
            };
            if expired && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn close(&self) -> Result<(), CacheError> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemCache::new(dir.path().join("nested"));
        cache.connect().unwrap();

        cache.store("a.query.0001", b"{\"status\":\"success\"}", Duration::from_secs(60)).unwrap();
        assert_eq!(
            cache.retrieve("a.query.0001").unwrap().unwrap(),
            b"{\"status\":\"success\"}"
        );
        assert!(cache.retrieve("missing").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemCache::new(dir.path());
        cache.connect().unwrap();

        cache.store("k", b"v", Duration::ZERO).unwrap();
        assert!(cache.retrieve("k").unwrap().is_none());
        assert!(!dir.path().join("k.data").exists());
    }

    #[test]
    fn test_reap_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemCache::new(dir.path());
        cache.connect().unwrap();

        for i in 0..20 {
            cache.store(&format!("expired.{i}"), b"v", Duration::ZERO).unwrap();
        }
        cache.store("live", b"v", Duration::from_secs(60)).unwrap();
        fs::write(dir.path().join("truncated.data"), b"abc").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(cache.reap().unwrap(), 21);
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(dir.path().join("live.data").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_connect_fails_when_root_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let cache = FilesystemCache::new(file.path());
        assert!(matches!(cache.connect(), Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_closed_cache_rejects_use() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FilesystemCache::new(dir.path());
        cache.connect().unwrap();
        cache.close().unwrap();
        assert!(matches!(cache.retrieve("k"), Err(CacheError::NotConnected)));
    }
}
