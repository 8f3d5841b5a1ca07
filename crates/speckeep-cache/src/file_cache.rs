//! File content cache
//!
//! Freshness is checked against filesystem metadata, not content: a hit
//! re-stats the file and drops the entry if mtime or size moved. Edits that
//! land inside the filesystem's timestamp granularity and keep the size
//! identical go unnoticed until the entry expires.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::lru::LruMap;
use crate::{CacheConfig, CacheStats};

struct FileEntry {
    content: String,
    mtime: SystemTime,
    size: u64,
    checksum: String,
}

/// Snapshot of the metadata an entry is validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    mtime: SystemTime,
    size: u64,
}

impl FileStamp {
    /// Stamp of the file currently at `path`, following symlinks
    pub fn read(path: &Path) -> Option<Self> {
        Self::from_metadata(&fs::metadata(path).ok()?)
    }

    /// Stamp from metadata already in hand, e.g. of an open file handle
    pub fn from_metadata(metadata: &fs::Metadata) -> Option<Self> {
        Some(Self {
            mtime: metadata.modified().ok()?,
            size: metadata.len(),
        })
    }
}

/// Bounded, expiring cache of decoded file contents keyed by absolute path
pub struct FileCache {
    entries: Mutex<LruMap<FileEntry>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruMap::new(config.max_size, config.ttl())),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached content for `path`, if present, unexpired, and still matching
    /// the file on disk.
    pub fn get(&self, path: &Path) -> Option<String> {
        let key = cache_key(path);
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.purge_expired(now);

        let snapshot = match entries.get_mut(&key) {
            Some(slot) => FileStamp {
                mtime: slot.value.mtime,
                size: slot.value.size,
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if FileStamp::read(path) != Some(snapshot) {
            entries.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "file changed since caching, evicted");
            return None;
        }

        let slot = entries.get_mut(&key)?;
        slot.last_access = now;
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(path = %path.display(), "file cache hit");
        Some(slot.value.content.clone())
    }

    /// Cache `content` as the current state of `path`.
    ///
    /// Best effort: if the file cannot be stat'ed nothing is cached and
    /// `false` is returned. Never an error for the caller.
    pub fn put(&self, path: &Path, content: impl Into<String>) -> bool {
        let Some(stamp) = FileStamp::read(path) else {
            debug!(path = %path.display(), "stat failed, not caching");
            return false;
        };
        self.insert(path, content.into(), stamp)
    }

    /// Cache `content` read while the file carried `stamp`.
    ///
    /// Nothing is cached if the file on disk no longer matches `stamp`, so
    /// content read before a concurrent edit can never be served under the
    /// edited file's metadata.
    pub fn put_stamped(&self, path: &Path, content: impl Into<String>, stamp: FileStamp) -> bool {
        if FileStamp::read(path) != Some(stamp) {
            debug!(path = %path.display(), "file changed while reading, not caching");
            return false;
        }
        self.insert(path, content.into(), stamp)
    }

    fn insert(&self, path: &Path, content: String, stamp: FileStamp) -> bool {
        let checksum = hex::encode(Sha256::digest(content.as_bytes()));

        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.purge_expired(now);
        let evicted = entries.insert(
            cache_key(path),
            FileEntry {
                content,
                mtime: stamp.mtime,
                size: stamp.size,
                checksum,
            },
            now,
        );
        if let Some(evicted) = evicted {
            trace!(%evicted, "file cache full, evicted least recently used");
        }
        self.config.max_size > 0
    }

    /// Forget `path`. Returns whether an entry was present.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.lock().remove(&cache_key(path)).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// SHA-256 of the cached content, without validating or refreshing it
    pub fn checksum(&self, path: &Path) -> Option<String> {
        self.entries
            .lock()
            .get_mut(&cache_key(path))
            .map(|slot| slot.value.checksum.clone())
    }

    /// Whether an entry exists, without validating or refreshing it
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.lock().contains(&cache_key(path))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max_size: self.config.max_size,
            ttl_seconds: self.config.ttl_seconds,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Absolute form of `path` without touching the filesystem, so an entry can
/// still be found (and evicted) after its file has vanished.
///
/// The key is lexical, not canonical: `docs/../a.md` and `a.md` are two
/// entries, and a symlink and its target are cached separately. Each entry
/// is still validated against the file it names, so aliases never serve
/// stale content; they only cost an extra slot.
fn cache_key(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cache(max_size: usize, ttl_seconds: u64) -> (FileCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = FileCache::with_clock(
            CacheConfig::new(max_size, ttl_seconds),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    fn file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "hello");
        let (cache, _) = cache(10, 60);

        assert!(cache.put(&path, "hello"));
        assert_eq!(cache.get(&path).as_deref(), Some("hello"));
        assert_eq!(
            cache.checksum(&path).as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_size_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "hello");
        let (cache, _) = cache(10, 60);
        cache.put(&path, "hello");

        fs::write(&path, "hello, world").unwrap();
        assert_eq!(cache.get(&path), None);
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_mtime_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "hello");
        let (cache, _) = cache(10, 60);
        cache.put(&path, "hello");

        let handle = fs::OpenOptions::new().write(true).open(&path).unwrap();
        handle
            .set_modified(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();
        drop(handle);

        assert_eq!(cache.get(&path), None);
        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_vanished_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "hello");
        let (cache, _) = cache(10, 60);
        cache.put(&path, "hello");

        fs::remove_file(&path).unwrap();
        assert_eq!(cache.get(&path), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_content_read_before_an_edit_is_never_served() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "v1");
        let (cache, _) = cache(10, 60);

        let before = FileStamp::read(&path).unwrap();
        let stale = fs::read_to_string(&path).unwrap();
        fs::write(&path, "v2 with a new length").unwrap();

        assert!(!cache.put_stamped(&path, stale, before));
        assert!(!cache.contains(&path));
        assert_eq!(cache.get(&path), None);

        let current = FileStamp::read(&path).unwrap();
        assert!(cache.put_stamped(&path, "v2 with a new length", current));
        assert_eq!(cache.get(&path).as_deref(), Some("v2 with a new length"));
    }

    #[cfg(unix)]
    #[test]
    fn test_aliased_paths_validate_independently() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        let path = file(&dir, "a.md", "v1");
        let alias = dir.path().join("docs/../a.md");
        let (cache, _) = cache(10, 60);

        cache.put(&path, "v1");
        cache.put(&alias, "v1");
        assert_eq!(cache.len(), 2);

        fs::write(&path, "v2, longer").unwrap();
        assert_eq!(cache.get(&alias), None);
        assert_eq!(cache.get(&path), None);
    }

    #[test]
    fn test_put_missing_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(10, 60);
        assert!(!cache.put(&dir.path().join("ghost.md"), "boo"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "hello");
        let (cache, clock) = cache(10, 30);
        cache.put(&path, "hello");

        clock.advance(Duration::from_secs(30) + Duration::from_millis(1));
        assert_eq!(cache.get(&path), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_access_extends_residency() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "a.md", "hello");
        let (cache, clock) = cache(10, 30);
        cache.put(&path, "hello");

        clock.advance(Duration::from_secs(20));
        assert!(cache.get(&path).is_some());
        clock.advance(Duration::from_secs(20));
        assert!(cache.get(&path).is_some());
    }

    #[test]
    fn test_lru_bound() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(3, 600);
        let paths: Vec<_> = (0..4)
            .map(|i| file(&dir, &format!("{i}.md"), &format!("content {i}")))
            .collect();

        for (i, path) in paths.iter().enumerate() {
            cache.put(path, format!("content {i}"));
            clock.advance(Duration::from_secs(1));
            assert!(cache.len() <= 3);
        }

        assert!(!cache.contains(&paths[0]));
        for path in &paths[1..] {
            assert!(cache.contains(path));
        }
    }

    #[test]
    fn test_get_refreshes_recency() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, clock) = cache(2, 600);
        let a = file(&dir, "a.md", "a");
        let b = file(&dir, "b.md", "b");
        let c = file(&dir, "c.md", "c");

        cache.put(&a, "a");
        clock.advance(Duration::from_secs(1));
        cache.put(&b, "b");
        clock.advance(Duration::from_secs(1));
        cache.get(&a);
        clock.advance(Duration::from_secs(1));
        cache.put(&c, "c");

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache(10, 60);
        let a = file(&dir, "a.md", "a");
        let b = file(&dir, "b.md", "b");
        cache.put(&a, "a");
        cache.put(&b, "b");

        assert!(cache.invalidate(&a));
        assert!(!cache.invalidate(&a));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_shape() {
        let (cache, _) = cache(7, 42);
        let stats = cache.stats();
        assert_eq!((stats.size, stats.max_size, stats.ttl_seconds), (0, 7, 42));
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["max_size"], 7);
        assert_eq!(json["ttl_seconds"], 42);
    }

    #[test]
    fn test_concurrent_access() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileCache::new(CacheConfig::new(8, 60)));
        let paths: Arc<Vec<PathBuf>> = Arc::new(
            (0..16)
                .map(|i| file(&dir, &format!("{i}.txt"), &i.to_string()))
                .collect(),
        );

        let workers: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                let paths = paths.clone();
                std::thread::spawn(move || {
                    for round in 0..200 {
                        let i = (t * 7 + round) % paths.len();
                        if let Some(content) = cache.get(&paths[i]) {
                            assert_eq!(content, i.to_string());
                        } else {
                            cache.put(&paths[i], i.to_string());
                        }
                        assert!(cache.len() <= 8);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(cache.len() <= 8);
    }
}
