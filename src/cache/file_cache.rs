//! Local File Cache
//!
//! Persists fetched Figma documents on local disk so repeated queries for the
//! same file skip the API. One JSON file per file key, expired by a per-entry
//! TTL evaluated at read time. There is no size bound and no eviction beyond
//! the TTL.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::errors::CacheError;
use crate::config::CachingOptions;
use crate::figma::FileDocument;

/// Suffix of committed entries
const ENTRY_SUFFIX: &str = ".json";

/// Suffix of in-flight writes
const TEMP_SUFFIX: &str = ".json.tmp";

/// Source of "now" for TTL checks, in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// On-disk entry: `{"fetchedAt": <epoch ms>, "data": <file>}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPayload<D> {
    fetched_at: u64,
    data: D,
}

/// A live cache entry
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub data: FileDocument,
    /// When the document was fetched, epoch milliseconds
    pub cached_at: u64,
    pub ttl_ms: u64,
}

/// Why a lookup did not produce an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No entry on disk
    Absent,
    /// Entry older than the TTL; removed
    Expired,
    /// Entry is not a well-formed payload; removed
    Corrupt,
    /// Entry could not be read; left in place
    Unreadable,
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(CachedFile),
    Miss(MissReason),
}

impl CacheLookup {
    /// The entry, if this was a hit
    pub fn hit(self) -> Option<CachedFile> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss(_) => None,
        }
    }
}

type InitFuture = Shared<BoxFuture<'static, Result<(), String>>>;

/// Disk-backed TTL cache of Figma documents
#[derive(Clone)]
pub struct FileCache {
    /// Directory holding one `<key>.json` per cached file
    cache_dir: PathBuf,
    /// Maximum entry age
    ttl: Duration,
    /// Time source for `fetchedAt` and expiry
    clock: Arc<dyn Clock>,
    /// Directory setup, run once and awaited by every operation
    init: InitFuture,
}

impl FileCache {
    /// Create a cache using the wall clock
    pub fn new(options: CachingOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Create a cache with a custom time source
    ///
    /// No I/O happens here. Directory setup starts on first use and is shared
    /// by every caller that arrives while it is still pending.
    pub fn with_clock(options: CachingOptions, clock: Arc<dyn Clock>) -> Self {
        let init = initialize(options.cache_dir.clone()).boxed().shared();
        Self {
            cache_dir: options.cache_dir,
            ttl: options.ttl,
            clock,
            init,
        }
    }

    /// Wait for directory setup to settle
    pub async fn wait_for_init(&self) -> Result<(), CacheError> {
        self.init
            .clone()
            .await
            .map_err(|reason| CacheError::Init {
                dir: self.cache_dir.clone(),
                reason,
            })
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }

    fn is_expired(&self, fetched_at: u64) -> bool {
        self.clock.now_millis().saturating_sub(fetched_at) > self.ttl_ms()
    }

    /// Look up the entry for a file key
    ///
    /// Corrupt and expired entries are deleted as a side effect. Only a failed
    /// initialization is an error.
    pub async fn get(&self, file_key: &str) -> Result<CacheLookup, CacheError> {
        self.wait_for_init().await?;

        // Concurrent misses for the same key each fetch and overwrite the
        // entry; the last writer wins.
        let path = self.path_for(file_key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file_key = file_key, "File cache MISS");
                return Ok(CacheLookup::Miss(MissReason::Absent));
            }
            Err(e) => {
                warn!(file_key = file_key, error = %e, "Error reading cache entry");
                return Ok(CacheLookup::Miss(MissReason::Unreadable));
            }
        };

        let parsed = tokio::task::spawn_blocking(move || {
            serde_json::from_slice::<StoredPayload<FileDocument>>(&bytes)
        })
        .await;

        let payload = match parsed {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                warn!(file_key = file_key, error = %e, "Cache entry corrupted, removing");
                safe_delete(&path).await;
                return Ok(CacheLookup::Miss(MissReason::Corrupt));
            }
            Err(e) => {
                warn!(file_key = file_key, error = %e, "Cache entry parse task failed");
                return Ok(CacheLookup::Miss(MissReason::Unreadable));
            }
        };

        if self.is_expired(payload.fetched_at) {
            debug!(
                file_key = file_key,
                fetched_at = payload.fetched_at,
                "Cache entry expired, removing"
            );
            safe_delete(&path).await;
            return Ok(CacheLookup::Miss(MissReason::Expired));
        }

        debug!(file_key = file_key, "File cache HIT");
        Ok(CacheLookup::Hit(CachedFile {
            data: payload.data,
            cached_at: payload.fetched_at,
            ttl_ms: self.ttl_ms(),
        }))
    }

    /// Store a document, replacing any existing entry
    ///
    /// The payload is written to `<key>.json.tmp` and renamed over
    /// `<key>.json`, so readers see either the old entry or the new one.
    pub async fn set(&self, file_key: &str, data: &FileDocument) -> Result<(), CacheError> {
        self.wait_for_init().await?;

        let path = self.path_for(file_key);
        let temp_path = self.temp_path_for(file_key);
        let payload = StoredPayload {
            fetched_at: self.clock.now_millis(),
            data,
        };

        let json = serde_json::to_vec(&payload).map_err(|e| CacheError::Serialize {
            file_key: file_key.to_string(),
            reason: e.to_string(),
        })?;

        if let Err(e) = write_and_rename(&temp_path, &path, &json).await {
            warn!(file_key = file_key, error = %e, "Failed to write cache entry");
            safe_delete(&temp_path).await;
            return Err(CacheError::Write {
                file_key: file_key.to_string(),
                source: e,
            });
        }

        info!(file_key = file_key, size = json.len(), "Cached file");
        Ok(())
    }

    /// Convert a file key to its entry path
    fn path_for(&self, file_key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}{}", safe_file_name(file_key), ENTRY_SUFFIX))
    }

    fn temp_path_for(&self, file_key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}{}", safe_file_name(file_key), TEMP_SUFFIX))
    }
}

/// Percent-encode a file key into a single path component
///
/// The encoding is one-to-one, so distinct keys never share an entry.
fn safe_file_name(file_key: &str) -> String {
    urlencoding::encode(file_key).into_owned()
}

/// Create the directory, check it is writable, and clear stale temp files
async fn initialize(cache_dir: PathBuf) -> Result<(), String> {
    fs::create_dir_all(&cache_dir)
        .await
        .map_err(|e| format!("cannot create directory: {}", e))?;

    let probe = cache_dir.join(format!(".write-probe-{}", std::process::id()));
    fs::write(&probe, b"")
        .await
        .map_err(|e| format!("directory is not writable: {}", e))?;
    safe_delete(&probe).await;

    cleanup_temp_files(&cache_dir).await;

    info!(cache_dir = %cache_dir.display(), "Initialized Figma file cache");
    Ok(())
}

/// Remove `.json.tmp` files left from interrupted writes
async fn cleanup_temp_files(cache_dir: &Path) {
    let Ok(mut read_dir) = fs::read_dir(cache_dir).await else {
        return;
    };
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let path = entry.path();
        let is_temp = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TEMP_SUFFIX));
        if is_temp {
            debug!(path = %path.display(), "Removing stale temp file");
            safe_delete(&path).await;
        }
    }
}

async fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, path).await
}

/// Remove a file, treating "already gone" as success
async fn safe_delete(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to delete cache file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(millis: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(millis)))
        }

        fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn sample_file() -> FileDocument {
        serde_json::from_value(serde_json::json!({
            "name": "Test File",
            "lastModified": "2024-05-01T12:00:00Z",
            "thumbnailUrl": "",
            "version": "1",
            "role": "viewer",
            "editorType": "figma",
            "document": {
                "id": "0:0",
                "name": "Document",
                "type": "DOCUMENT",
                "children": [{"id": "1:1", "name": "Page", "type": "CANVAS"}]
            },
            "schemaVersion": 0,
            "components": {},
            "componentSets": {},
            "styles": {}
        }))
        .unwrap()
    }

    fn options(dir: &Path, ttl_ms: u64) -> CachingOptions {
        CachingOptions {
            cache_dir: dir.to_path_buf(),
            ttl: Duration::from_millis(ttl_ms),
        }
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(options(dir.path(), 60_000));
        let file = sample_file();

        cache.set("ABC", &file).await.unwrap();
        let entry = cache.get("ABC").await.unwrap().hit().unwrap();

        assert_eq!(entry.data, file);
        assert_eq!(entry.ttl_ms, 60_000);
        assert!(dir.path().join("ABC.json").exists());
        assert!(!dir.path().join("ABC.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1000);
        let cache = FileCache::with_clock(options(dir.path(), 10), clock.clone());

        cache.set("ABC", &sample_file()).await.unwrap();

        clock.set(1010);
        let entry = cache.get("ABC").await.unwrap().hit().unwrap();
        assert_eq!(entry.cached_at, 1000);

        clock.set(1011);
        let lookup = cache.get("ABC").await.unwrap();
        assert!(matches!(lookup, CacheLookup::Miss(MissReason::Expired)));
        assert!(!dir.path().join("ABC.json").exists());
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ABC.json");
        std::fs::write(&path, "not-json").unwrap();

        let cache = FileCache::new(options(dir.path(), 60_000));
        let lookup = cache.get("ABC").await.unwrap();

        assert!(matches!(lookup, CacheLookup::Miss(MissReason::Corrupt)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_structurally_invalid_entries_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(options(dir.path(), 60_000));
        let data = serde_json::to_value(sample_file()).unwrap();

        let cases = [
            serde_json::json!({ "data": data }),
            serde_json::json!({ "fetchedAt": "yesterday", "data": data }),
            serde_json::json!({ "fetchedAt": 1000 }),
            serde_json::json!({ "fetchedAt": 1000, "data": { "name": "no document" } }),
        ];

        for case in cases {
            let path = dir.path().join("BAD.json");
            std::fs::write(&path, serde_json::to_vec(&case).unwrap()).unwrap();

            let lookup = cache.get("BAD").await.unwrap();
            assert!(
                matches!(lookup, CacheLookup::Miss(MissReason::Corrupt)),
                "expected corrupt miss for {}",
                case
            );
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_absent_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(options(dir.path(), 60_000));

        let lookup = cache.get("MISSING").await.unwrap();
        assert!(matches!(lookup, CacheLookup::Miss(MissReason::Absent)));
    }

    #[tokio::test]
    async fn test_set_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(5_000);
        let cache = FileCache::with_clock(options(dir.path(), 60_000), clock.clone());

        cache.set("ABC", &sample_file()).await.unwrap();

        let mut updated = sample_file();
        updated.name = "Renamed".to_string();
        clock.set(6_000);
        cache.set("ABC", &updated).await.unwrap();

        let entry = cache.get("ABC").await.unwrap().hit().unwrap();
        assert_eq!(entry.data.name, "Renamed");
        assert_eq!(entry.cached_at, 6_000);
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = FileCache::new(options(&nested, 60_000));

        cache.set("ABC", &sample_file()).await.unwrap();
        assert!(nested.join("ABC.json").exists());
    }

    #[tokio::test]
    async fn test_init_failure_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("occupied");
        std::fs::write(&not_a_dir, "file in the way").unwrap();

        let cache = FileCache::new(options(&not_a_dir, 60_000));

        assert!(matches!(cache.get("ABC").await, Err(CacheError::Init { .. })));
        assert!(matches!(
            cache.set("ABC", &sample_file()).await,
            Err(CacheError::Init { .. })
        ));

        // Fixing the directory afterwards does not re-run setup
        std::fs::remove_file(&not_a_dir).unwrap();
        assert!(matches!(cache.wait_for_init().await, Err(CacheError::Init { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(options(&dir.path().join("fresh"), 60_000));

        let (a, b, c) = tokio::join!(cache.get("A"), cache.get("B"), cache.wait_for_init());
        assert!(matches!(a.unwrap(), CacheLookup::Miss(MissReason::Absent)));
        assert!(matches!(b.unwrap(), CacheLookup::Miss(MissReason::Absent)));
        c.unwrap();
    }

    #[tokio::test]
    async fn test_stale_temp_files_removed_on_init() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("OLD.json.tmp");
        std::fs::write(&stale, "{\"fetchedAt\": 1, \"da").unwrap();

        let cache = FileCache::new(options(dir.path(), 60_000));
        cache.wait_for_init().await.unwrap();

        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_failed_write_cleans_up_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = FileCache::new(options(&cache_dir, 60_000));
        cache.wait_for_init().await.unwrap();

        std::fs::remove_dir_all(&cache_dir).unwrap();

        let result = cache.set("ABC", &sample_file()).await;
        assert!(matches!(result, Err(CacheError::Write { .. })));
        assert!(!cache_dir.join("ABC.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_distinct_keys_never_share_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(options(dir.path(), 60_000));

        let mut other = sample_file();
        other.name = "Other File".to_string();
        cache.set("a_b", &other).await.unwrap();

        for key in ["a.b", "a b", "a/b", "a%5Fb"] {
            assert_ne!(cache.path_for(key), cache.path_for("a_b"), "key {:?}", key);
            let lookup = cache.get(key).await.unwrap();
            assert!(
                matches!(lookup, CacheLookup::Miss(MissReason::Absent)),
                "key {:?} hit another key's entry",
                key
            );
        }

        let entry = cache.get("a_b").await.unwrap().hit().unwrap();
        assert_eq!(entry.data.name, "Other File");
    }

    #[tokio::test]
    async fn test_failed_rename_removes_written_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(options(dir.path(), 60_000));
        cache.wait_for_init().await.unwrap();

        // A non-empty directory in the entry slot makes the rename fail after
        // the temp file has been fully written
        let slot = dir.path().join("ABC.json");
        std::fs::create_dir(&slot).unwrap();
        std::fs::write(slot.join("occupant"), "x").unwrap();

        let result = cache.set("ABC", &sample_file()).await;
        assert!(matches!(result, Err(CacheError::Write { ref file_key, .. }) if file_key == "ABC"));
        assert!(!dir.path().join("ABC.json.tmp").exists());
        assert!(slot.join("occupant").exists());
    }

    #[test]
    fn test_keys_cannot_escape_cache_dir() {
        let cache = FileCache::new(options(Path::new("/cache"), 1));
        assert_eq!(cache.path_for("abc123"), PathBuf::from("/cache/abc123.json"));
        assert_eq!(
            cache.path_for("../etc/x"),
            PathBuf::from("/cache/..%2Fetc%2Fx.json")
        );
        assert_eq!(cache.path_for(".."), PathBuf::from("/cache/...json"));
        assert_eq!(
            cache.temp_path_for("abc"),
            PathBuf::from("/cache/abc.json.tmp")
        );
    }
}
