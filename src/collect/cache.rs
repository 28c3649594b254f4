// Per-prefix capture cache with TTL freshness

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AppResult;
use crate::routes::Prefix;

pub const DEFAULT_TTL_SECS: i64 = 3600;

/// One captured transcript. Replaced wholesale on refresh, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub prefix: Prefix,
    pub captured_at: DateTime<Utc>,
    pub raw_text: String,
}

/// Key-value backing store for cache entries.
///
/// Implementations must tolerate concurrent `put` calls on different keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<CacheEntry>>;
    async fn put(&self, key: &str, entry: CacheEntry) -> AppResult<()>;
}

/// One file per prefix under a directory, written via rename so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("bgp-tools-{}.json", key))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> AppResult<Option<CacheEntry>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&entry)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// In-process store, used when nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

/// Why a prefix does or does not need a new capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh(Duration),
    Stale(Duration),
    Missing,
    Forced,
}

impl Freshness {
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Freshness::Fresh(_))
    }
}

#[derive(Clone)]
pub struct CollectionCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CollectionCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        CollectionCache { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A store read error is logged and treated as a missing entry.
    pub async fn get(&self, prefix: &Prefix) -> Option<CacheEntry> {
        match self.store.get(&prefix.cache_key()).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cache entry for {} unreadable, treating as missing: {}", prefix, e);
                None
            }
        }
    }

    pub async fn put(&self, prefix: &Prefix, raw_text: String, now: DateTime<Utc>) -> AppResult<()> {
        let entry = CacheEntry {
            prefix: *prefix,
            captured_at: now,
            raw_text,
        };
        self.store.put(&prefix.cache_key(), entry).await
    }

    pub async fn age(&self, prefix: &Prefix, now: DateTime<Utc>) -> Option<Duration> {
        self.get(prefix).await.map(|entry| now - entry.captured_at)
    }

    pub async fn is_fresh(&self, prefix: &Prefix, now: DateTime<Utc>) -> bool {
        matches!(self.age(prefix, now).await, Some(age) if age < self.ttl)
    }

    pub async fn freshness(&self, prefix: &Prefix, now: DateTime<Utc>, force: bool) -> Freshness {
        if force {
            return Freshness::Forced;
        }
        match self.age(prefix, now).await {
            None => Freshness::Missing,
            Some(age) if age < self.ttl => Freshness::Fresh(age),
            Some(age) => Freshness::Stale(age),
        }
    }
}
