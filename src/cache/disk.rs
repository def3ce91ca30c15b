//! Disk-based cache store.

use super::backend::Cache;
use super::entry::CacheEntry;
use super::key::filename_for_key;
use super::record::RecordHeader;
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default disk budget (5 MiB).
pub const DEFAULT_DISK_USAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Pruning stops once usage drops below this fraction of the budget.
pub const HYSTERESIS_FACTOR: f64 = 0.9;

/// In-memory index of records on disk, in access order.
struct Index {
    entries: LruCache<String, RecordHeader>,
    total_size: u64,
}

impl Index {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_size: 0,
        }
    }

    fn put_entry(&mut self, header: RecordHeader) {
        let size = header.size;
        if let Some(old) = self.entries.put(header.key.clone(), header) {
            self.total_size -= old.size;
        }
        self.total_size += size;
    }

    fn remove_entry(&mut self, key: &str) -> Option<RecordHeader> {
        let removed = self.entries.pop(key)?;
        self.total_size -= removed.size;
        Some(removed)
    }
}

/// Cache that writes one file per key into a directory.
///
/// An access-ordered index of record headers lives in memory; payloads are
/// read from disk on demand. When a write would reach `max_bytes`, least
/// recently used records are evicted until usage falls below
/// `max_bytes * HYSTERESIS_FACTOR`.
///
/// All operations, reads included, run under one lock so pruning always sees
/// a consistent size.
pub struct DiskCache {
    root: PathBuf,
    max_bytes: u64,
    index: Mutex<Index>,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            index: Mutex::new(Index::new()),
        }
    }

    pub fn with_default_size(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_DISK_USAGE_BYTES)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Sum of indexed record sizes.
    pub async fn total_size(&self) -> u64 {
        self.index.lock().await.total_size
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `key` is indexed. Does not affect eviction order.
    pub async fn contains(&self, key: &str) -> bool {
        self.index.lock().await.entries.contains(key)
    }

    fn file_for_key(&self, key: &str) -> PathBuf {
        self.root.join(filename_for_key(key))
    }

    async fn read_record(path: &Path, key: &str) -> io::Result<CacheEntry> {
        let file = tokio::fs::File::open(path).await?;
        let file_len = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        let (header, consumed) = RecordHeader::read_from(&mut reader, file_len).await?;
        if header.key != key {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record key mismatch: stored {}", header.key),
            ));
        }
        let mut data = vec![0u8; (file_len - consumed) as usize];
        reader.read_exact(&mut data).await?;
        Ok(header.to_entry(Bytes::from(data)))
    }

    async fn read_header(path: &Path) -> io::Result<RecordHeader> {
        let file = tokio::fs::File::open(path).await?;
        let file_len = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        let (header, _) = RecordHeader::read_from(&mut reader, file_len).await?;
        Ok(header)
    }

    async fn get_locked(&self, index: &mut Index, key: &str) -> Option<CacheEntry> {
        // Promote to most recently used before touching the disk.
        index.entries.get(key)?;

        let path = self.file_for_key(key);
        match Self::read_record(&path, key).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cache read failed, dropping entry");
                self.remove_locked(index, key).await;
                None
            }
        }
    }

    async fn put_locked(&self, index: &mut Index, key: &str, entry: &CacheEntry) {
        let header = RecordHeader::from_entry(key, entry);
        self.prune_if_needed(index, header.size).await;

        let mut buf = Vec::with_capacity(header.size as usize);
        header.encode(&mut buf);
        buf.extend_from_slice(&entry.data);

        let path = self.file_for_key(key);
        let written = match tokio::fs::create_dir_all(&self.root).await {
            Ok(()) => tokio::fs::write(&path, &buf).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => index.put_entry(header),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache write failed");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %e, "could not clean up cache file");
                    }
                }
                // A stale header for this key no longer matches the disk.
                index.remove_entry(key);
            }
        }
    }

    async fn remove_locked(&self, index: &mut Index, key: &str) {
        let path = self.file_for_key(key);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(key, path = %path.display(), error = %e, "could not delete cache entry");
            }
        }
        index.remove_entry(key);
    }

    async fn prune_if_needed(&self, index: &mut Index, needed: u64) {
        if index.total_size + needed < self.max_bytes {
            return;
        }
        debug!("pruning old cache entries");

        let before = index.total_size;
        let started = Instant::now();
        let target = self.max_bytes as f64 * HYSTERESIS_FACTOR;
        let mut pruned = 0usize;

        while let Some((key, header)) = index.entries.pop_lru() {
            let path = self.file_for_key(&key);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!(key, path = %path.display(), error = %e, "could not delete cache entry");
            }
            index.total_size -= header.size;
            pruned += 1;

            if ((index.total_size + needed) as f64) < target {
                break;
            }
        }

        info!(
            files = pruned,
            bytes = before - index.total_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pruned disk cache"
        );
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn initialize(&self) {
        let mut index = self.index.lock().await;

        if tokio::fs::metadata(&self.root).await.is_err() {
            if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
                warn!(dir = %self.root.display(), error = %e, "unable to create cache dir");
            }
            return;
        }

        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(dir = %self.root.display(), error = %e, "unable to scan cache dir");
                return;
            }
        };

        loop {
            let path = match dir.next_entry().await {
                Ok(Some(entry)) => entry.path(),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "cache dir scan interrupted");
                    break;
                }
            };
            match Self::read_header(&path).await {
                Ok(header) => index.put_entry(header),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "removing corrupt cache file");
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        debug!(
            entries = index.entries.len(),
            bytes = index.total_size,
            "disk cache initialized"
        );
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut index = self.index.lock().await;
        self.get_locked(&mut index, key).await
    }

    async fn put(&self, key: &str, entry: CacheEntry) {
        let mut index = self.index.lock().await;
        self.put_locked(&mut index, key, &entry).await;
    }

    async fn invalidate(&self, key: &str, full_expire: bool) {
        let mut index = self.index.lock().await;
        if let Some(mut entry) = self.get_locked(&mut index, key).await {
            entry.soft_ttl = 0;
            if full_expire {
                entry.ttl = 0;
            }
            self.put_locked(&mut index, key, &entry).await;
        }
    }

    async fn remove(&self, key: &str) {
        let mut index = self.index.lock().await;
        self.remove_locked(&mut index, key).await;
    }

    async fn clear(&self) {
        let mut index = self.index.lock().await;
        if let Ok(mut dir) = tokio::fs::read_dir(&self.root).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
        index.entries.clear();
        index.total_size = 0;
        debug!("cache cleared");
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{now_millis, Headers};
    use tempfile::TempDir;

    fn entry_of(len: usize) -> CacheEntry {
        let now = now_millis();
        CacheEntry::new(vec![7u8; len]).with_ttls(now + 60_000, now + 120_000)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_default_size(dir.path());
        cache.initialize().await;

        let mut headers = Headers::new();
        headers.insert("Content-Type".into(), "application/json".into());
        let entry = CacheEntry::new(&b"{\"ok\":true}"[..])
            .with_etag("W/\"42\"")
            .with_last_modified(1_000)
            .with_server_date(2_000)
            .with_ttls(3_000, 4_000)
            .with_headers(headers);

        cache.put("GET:http://h/a", entry.clone()).await;
        let loaded = cache.get("GET:http://h/a").await.unwrap();
        assert_eq!(loaded, entry);
        assert!(cache.get("GET:http://h/missing").await.is_none());
    }

    #[tokio::test]
    async fn test_index_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let cache = DiskCache::with_default_size(dir.path());
            cache.initialize().await;
            cache.put("a", entry_of(10)).await;
            cache.put("b", entry_of(20)).await;
        }
        let reopened = DiskCache::with_default_size(dir.path());
        reopened.initialize().await;
        assert_eq!(reopened.len().await, 2);
        let expected: u64 = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().metadata().unwrap().len())
            .sum();
        assert_eq!(reopened.total_size().await, expected);
        assert_eq!(reopened.get("b").await.unwrap().data.len(), 20);
    }

    #[tokio::test]
    async fn test_initialize_deletes_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let junk = dir.path().join("junk");
        std::fs::write(&junk, b"definitely not a cache record").unwrap();

        let cache = DiskCache::with_default_size(dir.path());
        cache.initialize().await;
        assert!(!junk.exists());
        assert_eq!(cache.total_size().await, 0);
    }

    #[tokio::test]
    async fn test_initialize_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("cache");
        let cache = DiskCache::with_default_size(&root);
        cache.initialize().await;
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_default_size(dir.path());
        cache.initialize().await;
        cache.put("k", entry_of(100)).await;

        let path = dir.path().join(filename_for_key("k"));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..20]).unwrap();

        assert!(cache.get("k").await.is_none());
        assert!(!path.exists());
        assert_eq!(cache.total_size().await, 0);
        assert!(!cache.contains("k").await);
    }

    #[tokio::test]
    async fn test_replacing_key_replaces_size() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_default_size(dir.path());
        cache.put("k", entry_of(100)).await;
        let first = cache.total_size().await;
        cache.put("k", entry_of(10)).await;
        assert_eq!(cache.total_size().await, first - 90);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_write_drops_stale_index_entry() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_default_size(dir.path());
        cache.initialize().await;
        cache.put("k", entry_of(100)).await;
        assert!(cache.contains("k").await);

        // A directory where the record file should go makes the write fail.
        let path = dir.path().join(filename_for_key("k"));
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        cache.put("k", entry_of(50)).await;
        assert!(!cache.contains("k").await);
        assert_eq!(cache.total_size().await, 0);
        assert!(cache.get("k").await.is_none());

        cache.put("other", entry_of(10)).await;
        let on_disk = std::fs::metadata(dir.path().join(filename_for_key("other")))
            .unwrap()
            .len();
        assert_eq!(cache.total_size().await, on_disk);
    }

    #[tokio::test]
    async fn test_unusable_root_keeps_index_empty() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"occupied").unwrap();

        let cache = DiskCache::with_default_size(&root);
        cache.initialize().await;
        cache.put("k", entry_of(10)).await;

        assert!(cache.is_empty().await);
        assert_eq!(cache.total_size().await, 0);
        assert!(cache.get("k").await.is_none());
        assert_eq!(std::fs::read(&root).unwrap(), b"occupied");
    }

    #[tokio::test]
    async fn test_lru_eviction_with_hysteresis() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), 1000);
        cache.initialize().await;

        // 58 header bytes for a two-byte key, no etag, no headers.
        let record = |payload: usize| CacheEntry::new(vec![1u8; payload]);
        assert_eq!(RecordHeader::from_entry("k0", &record(142)).size, 200);

        for i in 0..4 {
            cache.put(&format!("k{}", i), record(142)).await;
        }
        assert_eq!(cache.total_size().await, 800);

        // Touch k0 so it becomes most recently used.
        assert!(cache.get("k0").await.is_some());

        // 800 + 200 reaches the limit: evict until below 900.
        cache.put("k4", record(142)).await;
        assert!(cache.total_size().await <= 900);
        assert!(!cache.contains("k1").await);
        assert!(!dir.path().join(filename_for_key("k1")).exists());
        for key in ["k0", "k2", "k3", "k4"] {
            assert!(cache.contains(key).await, "{} should survive", key);
        }
        assert_eq!(cache.total_size().await, 800);
    }

    #[tokio::test]
    async fn test_most_recently_read_is_evicted_last() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), 1000);
        for i in 0..4 {
            cache.put(&format!("k{}", i), CacheEntry::new(vec![0u8; 142])).await;
        }
        assert!(cache.get("k0").await.is_some());

        // A record large enough to force out everything but one.
        cache.put("big", CacheEntry::new(vec![0u8; 539])).await;
        assert!(cache.contains("k0").await);
        assert!(!cache.contains("k1").await);
        assert!(!cache.contains("k2").await);
        assert!(!cache.contains("k3").await);
    }

    #[tokio::test]
    async fn test_invalidate_soft_and_full() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_default_size(dir.path());
        cache.put("k", entry_of(8)).await;

        cache.invalidate("k", false).await;
        let soft = cache.get("k").await.unwrap();
        assert_eq!(soft.soft_ttl, 0);
        assert!(soft.refresh_needed());
        assert!(!soft.is_expired());

        cache.invalidate("k", true).await;
        let full = cache.get("k").await.unwrap();
        assert_eq!(full.ttl, 0);
        assert!(full.is_expired());

        cache.invalidate("absent", true).await;
        assert!(!cache.contains("absent").await);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::with_default_size(dir.path());
        cache.put("a", entry_of(8)).await;
        cache.put("b", entry_of(8)).await;

        cache.remove("a").await;
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.total_size().await, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
