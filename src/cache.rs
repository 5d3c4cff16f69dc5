//! Content Cache
//!
//! Compile results keyed by file fingerprint, bounded by the size of their
//! JSON form and evicted least-recently-used first. An options sentinel marks
//! which configuration the entries were produced under. A cache can also be
//! backed by a directory, one `<key>.json` file per entry; evicting an entry
//! deletes its file.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::output::CompileResult;

/// 10 MiB of serialized compile results.
pub const DEFAULT_CACHE_SIZE: usize = 10 * 1024 * 1024;

/// An import a cached result was compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedImport {
    pub import_path: String,
    pub source_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub compile_result: CompileResult,
    pub referenced_imports: Vec<ReferencedImport>,
}

impl CacheEntry {
    /// `true` when every referenced import still has the fingerprint it had
    /// at compile time. `current` maps import paths to fingerprints.
    pub fn dependencies_unchanged(&self, current: &HashMap<String, String>) -> bool {
        self.referenced_imports
            .iter()
            .all(|import| current.get(&import.import_path) == Some(&import.source_hash))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum CacheSlot {
    OptionsSentinel,
    Compiled(CacheEntry),
}

struct StoredSlot {
    slot: CacheSlot,
    size: usize,
}

pub struct ContentCache {
    entries: HashMap<String, StoredSlot>,
    /// Compiled entry keys, least recently used first.
    order: VecDeque<String>,
    size: usize,
    max_size: usize,
    cache_dir: Option<PathBuf>,
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl ContentCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            size: 0,
            max_size,
            cache_dir: None,
        }
    }

    /// A cache that also persists entries under `cache_dir`.
    pub fn persistent(cache_dir: impl Into<PathBuf>, max_size: usize) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(
                "[CssModules] Unable to create cache directory {}: {}",
                cache_dir.display(),
                e
            );
        }
        Self {
            cache_dir: Some(cache_dir),
            ..Self::new(max_size)
        }
    }

    /// Number of compiled entries held in memory.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Charged size of the compiled entries held in memory.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&mut self, fingerprint: &str) -> Option<&CacheEntry> {
        if !self.entries.contains_key(fingerprint) {
            let slot = self.read_persisted(fingerprint)?;
            self.insert(fingerprint, slot);
        }
        self.touch(fingerprint);

        match self.entries.get(fingerprint).map(|stored| &stored.slot) {
            Some(CacheSlot::Compiled(entry)) => Some(entry),
            _ => None,
        }
    }

    pub fn set(&mut self, fingerprint: &str, entry: CacheEntry) {
        let slot = CacheSlot::Compiled(entry);
        self.persist(fingerprint, &slot);
        self.insert(fingerprint, slot);
    }

    /// Drop every entry, persisted ones included.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.size = 0;

        let Some(dir) = &self.cache_dir else {
            return;
        };
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) => {
                tracing::warn!("[CssModules] Unable to clear cache {}: {}", dir.display(), e);
                return;
            }
        };
        for entry in read.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!("[CssModules] Unable to remove {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Make sure the cache belongs to the given options. Returns `true` when
    /// the cache had to be reset.
    pub fn ensure_options(&mut self, options_fingerprint: &str) -> bool {
        let key = options_key(options_fingerprint);
        if self.entries.contains_key(&key) {
            return false;
        }
        if let Some(slot @ CacheSlot::OptionsSentinel) = self.read_persisted(&key) {
            self.insert(&key, slot);
            return false;
        }

        tracing::debug!("[CssModules] Options changed, resetting cache");
        self.reset();
        self.persist(&key, &CacheSlot::OptionsSentinel);
        self.insert(&key, CacheSlot::OptionsSentinel);
        true
    }

    fn insert(&mut self, key: &str, slot: CacheSlot) {
        let size = match &slot {
            CacheSlot::OptionsSentinel => 0,
            CacheSlot::Compiled(entry) => serde_json::to_string(entry).map(|s| s.len()).unwrap_or(0),
        };
        let compiled = matches!(slot, CacheSlot::Compiled(_));

        if let Some(previous) = self.entries.insert(key.to_string(), StoredSlot { slot, size }) {
            self.size -= previous.size;
            self.order.retain(|k| k != key);
        }
        if compiled {
            self.size += size;
            self.order.push_back(key.to_string());
            self.evict();
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(index) = self.order.iter().position(|k| k == key) {
            if let Some(key) = self.order.remove(index) {
                self.order.push_back(key);
            }
        }
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            if let Some(stored) = self.entries.remove(&key) {
                self.size -= stored.size;
                self.remove_persisted(&key);
                tracing::debug!("[CssModules] Evicted cache entry {}", key);
            }
        }
    }

    fn entry_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.json", key))
    }

    fn persist(&self, key: &str, slot: &CacheSlot) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        let path = Self::entry_path(dir, key);
        let result = serde_json::to_string(slot)
            .map_err(|e| e.to_string())
            .and_then(|data| fs::write(&path, data).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!("[CssModules] Unable to persist {}: {}", path.display(), e);
        }
    }

    fn remove_persisted(&self, key: &str) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        let path = Self::entry_path(dir, key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("[CssModules] Unable to remove {}: {}", path.display(), e);
            }
        }
    }

    fn read_persisted(&self, key: &str) -> Option<CacheSlot> {
        let path = Self::entry_path(self.cache_dir.as_ref()?, key);
        if !path.exists() {
            return None;
        }

        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("[CssModules] Unable to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(slot) => Some(slot),
            Err(e) => {
                tracing::warn!(
                    "[CssModules] Cache deserialization failed for {}: {}",
                    key,
                    e
                );
                fs::remove_file(&path).ok();
                None
            }
        }
    }
}

fn options_key(options_fingerprint: &str) -> String {
    format!("options-{}", options_fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(file_path: &str, css: &str) -> CacheEntry {
        CacheEntry {
            compile_result: CompileResult {
                file_path: file_path.to_string(),
                is_lazy: false,
                stylesheet: Some(css.to_string()),
                script: None,
                source_map: None,
            },
            referenced_imports: Vec::new(),
        }
    }

    fn entry_size(entry: &CacheEntry) -> usize {
        serde_json::to_string(entry).unwrap().len()
    }

    #[test]
    fn test_get_and_set() {
        let mut cache = ContentCache::default();
        assert!(cache.get("abc").is_none());

        cache.set("abc", entry("a.css", ".a {}"));
        let hit = cache.get("abc").unwrap();
        assert_eq!(hit.compile_result.file_path, "a.css");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), entry_size(&entry("a.css", ".a {}")));
    }

    #[test]
    fn test_replacing_an_entry_recharges_its_size() {
        let mut cache = ContentCache::default();
        cache.set("abc", entry("a.css", ".a {}"));
        cache.set("abc", entry("a.css", ".a { color: red; }"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), entry_size(&entry("a.css", ".a { color: red; }")));
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let one = entry_size(&entry("a.css", ".a {}"));
        let mut cache = ContentCache::new(one * 2);

        cache.set("a", entry("a.css", ".a {}"));
        cache.set("b", entry("b.css", ".b {}"));
        assert!(cache.get("a").is_some());
        cache.set("c", entry("c.css", ".c {}"));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.size() <= one * 2);
    }

    #[test]
    fn test_options_sentinel_survives_eviction() {
        let mut cache = ContentCache::new(1);
        assert!(cache.ensure_options("opts"));
        cache.set("a", entry("a.css", ".a {}"));

        assert!(cache.is_empty());
        assert!(!cache.ensure_options("opts"));
    }

    #[test]
    fn test_ensure_options_resets_on_change() {
        let mut cache = ContentCache::default();
        assert!(cache.ensure_options("first"));
        cache.set("a", entry("a.css", ".a {}"));
        assert!(!cache.ensure_options("first"));
        assert_eq!(cache.len(), 1);

        assert!(cache.ensure_options("second"));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dependencies_unchanged() {
        let mut cached = entry("a.css", ".a {}");
        cached.referenced_imports.push(ReferencedImport {
            import_path: "/app/b.css".to_string(),
            source_hash: "h1".to_string(),
        });

        let mut current = HashMap::new();
        assert!(!cached.dependencies_unchanged(&current));
        current.insert("/app/b.css".to_string(), "h1".to_string());
        assert!(cached.dependencies_unchanged(&current));
        current.insert("/app/b.css".to_string(), "h2".to_string());
        assert!(!cached.dependencies_unchanged(&current));
    }

    #[test]
    fn test_persistent_cache_survives_restart() {
        let dir = tempdir().unwrap();

        let mut cache = ContentCache::persistent(dir.path(), DEFAULT_CACHE_SIZE);
        assert!(cache.ensure_options("opts"));
        cache.set("abc", entry("a.css", ".a {}"));
        assert!(dir.path().join("abc.json").exists());

        let mut reopened = ContentCache::persistent(dir.path(), DEFAULT_CACHE_SIZE);
        assert!(!reopened.ensure_options("opts"));
        assert_eq!(
            reopened.get("abc").unwrap().compile_result.stylesheet.as_deref(),
            Some(".a {}")
        );
    }

    #[test]
    fn test_persistent_reset_removes_files() {
        let dir = tempdir().unwrap();

        let mut cache = ContentCache::persistent(dir.path(), DEFAULT_CACHE_SIZE);
        cache.ensure_options("first");
        cache.set("abc", entry("a.css", ".a {}"));
        assert!(cache.ensure_options("second"));

        assert!(!dir.path().join("abc.json").exists());
        assert!(!dir.path().join("options-first.json").exists());
        assert!(dir.path().join("options-second.json").exists());
    }

    #[test]
    fn test_eviction_removes_persisted_file() {
        let dir = tempdir().unwrap();
        let one = entry_size(&entry("a.css", ".a {}"));

        let mut cache = ContentCache::persistent(dir.path(), one);
        cache.ensure_options("opts");
        cache.set("a", entry("a.css", ".a {}"));
        cache.set("b", entry("b.css", ".b {}"));

        assert!(!dir.path().join("a.json").exists());
        assert!(dir.path().join("b.json").exists());
        assert!(dir.path().join("options-opts.json").exists());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("abc.json"), "{ not json").unwrap();

        let mut cache = ContentCache::persistent(dir.path(), DEFAULT_CACHE_SIZE);
        assert!(cache.get("abc").is_none());
        assert!(!dir.path().join("abc.json").exists());
    }
}
