//! Key-value cache with expiry.
//!
//! Used as the session store of the RPC client and as the general plugin
//! cache. Keys are opaque; callers hash anything that could contain path
//! characters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::RpcError;

/// Lifetime applied when `save` is called without one (2 hours).
pub const DEFAULT_CACHE_LIFETIME_SECS: u64 = 7200;

/// Cache collaborator consumed by the RPC client and the plugin host.
///
/// `lifetime` is in seconds: `None` applies [`DEFAULT_CACHE_LIFETIME_SECS`],
/// `Some(0)` stores the value without expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>, RpcError>;

    async fn save(&self, key: &str, value: &Value, lifetime: Option<u64>)
        -> Result<(), RpcError>;

    async fn remove(&self, key: &str) -> Result<(), RpcError>;
}

/// Resolve an optional lifetime to a concrete number of seconds (0 = forever).
pub fn effective_lifetime(lifetime: Option<u64>) -> u64 {
    lifetime.unwrap_or(DEFAULT_CACHE_LIFETIME_SECS)
}

// ─── File backend ───────────────────────────────────────────────────────

/// On-disk representation of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    data: Value,
    /// Unix timestamp (seconds) after which the entry is stale.
    expires: Option<i64>,
}

/// One JSON file per key at `<dir>/cache-<key>`.
///
/// Writes go through a temporary file in the same directory and are renamed
/// over the target, so concurrent processes never observe a torn entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache rooted at `<root>/tmp`.
    pub fn from_root(root: &Path) -> Self {
        Self::new(root.join("tmp"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("cache-{}", sanitize_key(key)))
    }

    async fn delete(&self, path: &Path) -> Result<(), RpcError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entry(&self, key: &str, entry: &FileEntry) -> Result<(), RpcError> {
        let bytes = serde_json::to_vec(entry)?;
        let cache_err = |e: std::io::Error| {
            RpcError::Cache(format!(
                "cannot write to cache directory {}: {e}",
                self.dir.display()
            ))
        };

        fs::create_dir_all(&self.dir).await.map_err(cache_err)?;

        let target = self.entry_path(key);
        let tmp = self.dir.join(format!(
            ".cache-{}.{}.tmp",
            sanitize_key(key),
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&tmp, &bytes).await.map_err(cache_err)?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(cache_err(e));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn load(&self, key: &str) -> Result<Option<Value>, RpcError> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, "discarding unreadable cache entry: {e}");
                self.delete(&path).await?;
                return Ok(None);
            }
        };

        match entry.expires {
            Some(expires) if chrono::Utc::now().timestamp() >= expires => {
                tracing::debug!(key = %key, "cache entry expired, purging");
                self.delete(&path).await?;
                Ok(None)
            }
            _ => Ok(Some(entry.data)),
        }
    }

    async fn save(
        &self,
        key: &str,
        value: &Value,
        lifetime: Option<u64>,
    ) -> Result<(), RpcError> {
        let expires = match effective_lifetime(lifetime) {
            0 => None,
            // Past the representable range the entry simply never expires.
            secs => i64::try_from(secs)
                .ok()
                .and_then(|s| chrono::Utc::now().timestamp().checked_add(s)),
        };
        let entry = FileEntry {
            data: value.clone(),
            expires,
        };
        self.write_entry(key, &entry).await
    }

    async fn remove(&self, key: &str) -> Result<(), RpcError> {
        self.delete(&self.entry_path(key)).await
    }
}

/// Keep keys inside the cache directory.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect::<String>()
        .replace("..", "_")
}

// ─── In-memory backend ──────────────────────────────────────────────────

/// Process-local cache with the same expiry semantics as [`FileCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Value, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until touched.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn load(&self, key: &str) -> Result<Option<Value>, RpcError> {
        let mut entries = self.entries.write().await;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some((_, Some(deadline))) => Instant::now() >= *deadline,
            Some((_, None)) => false,
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(v, _)| v.clone()))
    }

    async fn save(
        &self,
        key: &str,
        value: &Value,
        lifetime: Option<u64>,
    ) -> Result<(), RpcError> {
        let deadline = match effective_lifetime(lifetime) {
            0 => None,
            secs => Instant::now().checked_add(Duration::from_secs(secs)),
        };
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.clone(), deadline));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RpcError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── FileCache ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_file_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        cache.save("token", &json!("abc"), Some(60)).await.unwrap();
        assert_eq!(cache.load("token").await.unwrap(), Some(json!("abc")));
        assert!(tmp.path().join("cache-token").exists());
    }

    #[tokio::test]
    async fn test_file_expired_entry_is_purged() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        let stale = FileEntry {
            data: json!({"n": 1}),
            expires: Some(chrono::Utc::now().timestamp() - 1),
        };
        cache.write_entry("stale", &stale).await.unwrap();
        assert!(tmp.path().join("cache-stale").exists());

        assert_eq!(cache.load("stale").await.unwrap(), None);
        assert!(!tmp.path().join("cache-stale").exists());
    }

    #[tokio::test]
    async fn test_file_zero_lifetime_never_expires() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        cache.save("forever", &json!([1, 2]), Some(0)).await.unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("cache-forever")).unwrap();
        let entry: FileEntry = serde_json::from_str(&raw).unwrap();
        assert!(entry.expires.is_none());
        assert_eq!(cache.load("forever").await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_file_default_lifetime_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        let before = chrono::Utc::now().timestamp();
        cache.save("k", &json!(1), None).await.unwrap();
        let raw = std::fs::read_to_string(tmp.path().join("cache-k")).unwrap();
        let entry: FileEntry = serde_json::from_str(&raw).unwrap();
        let expires = entry.expires.unwrap();
        assert!(expires >= before + DEFAULT_CACHE_LIFETIME_SECS as i64);
    }

    #[tokio::test]
    async fn test_file_remove_and_remove_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        cache.save("k", &json!("v"), Some(60)).await.unwrap();
        cache.remove("k").await.unwrap();
        assert_eq!(cache.load("k").await.unwrap(), None);
        cache.remove("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_corrupt_entry_reads_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("cache-bad"), b"not json").unwrap();
        let cache = FileCache::new(tmp.path());

        assert_eq!(cache.load("bad").await.unwrap(), None);
        assert!(!tmp.path().join("cache-bad").exists());
    }

    #[tokio::test]
    async fn test_file_overwrite_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        cache.save("k", &json!(1), Some(60)).await.unwrap();
        cache.save("k", &json!(2), Some(60)).await.unwrap();
        assert_eq!(cache.load("k").await.unwrap(), Some(json!(2)));

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["cache-k".to_string()]);
    }

    #[tokio::test]
    async fn test_file_unwritable_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // A regular file where the directory should be
        let cache = FileCache::new(blocker.join("tmp"));

        let err = cache.save("k", &json!(1), Some(60)).await.unwrap_err();
        assert!(matches!(err, RpcError::Cache(_)));
    }

    #[tokio::test]
    async fn test_file_huge_lifetime_never_expires() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = FileCache::new(tmp.path());

        cache.save("k", &json!("v"), Some(u64::MAX)).await.unwrap();
        assert_eq!(cache.load("k").await.unwrap(), Some(json!("v")));
        let raw = std::fs::read_to_string(tmp.path().join("cache-k")).unwrap();
        let entry: FileEntry = serde_json::from_str(&raw).unwrap();
        assert!(entry.expires.is_none());
    }

    #[test]
    fn test_sanitize_key_strips_path_characters() {
        assert_eq!(sanitize_key("../etc/passwd"), "__etc_passwd");
        assert_eq!(sanitize_key("plain-key"), "plain-key");
    }

    // ── MemoryCache ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_memory_expiry() {
        let cache = MemoryCache::new();
        cache.save("k", &json!("v"), Some(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.load("k").await.unwrap(), Some(json!("v")));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.load("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_zero_lifetime() {
        let cache = MemoryCache::new();
        cache.save("k", &json!(true), Some(0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1_000_000)).await;
        assert_eq!(cache.load("k").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_memory_huge_lifetime_never_expires() {
        let cache = MemoryCache::new();
        cache.save("k", &json!("v"), Some(u64::MAX)).await.unwrap();
        assert_eq!(cache.load("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_memory_remove() {
        let cache = MemoryCache::new();
        cache.save("k", &json!(1), None).await.unwrap();
        assert_eq!(cache.len().await, 1);
        cache.remove("k").await.unwrap();
        assert_eq!(cache.load("k").await.unwrap(), None);
    }
}
