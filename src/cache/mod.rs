//! Bounded in-memory memoization of verdicts with optional JSON persistence.
//!
//! Eviction policy: when the cache is full, the oldest 10% of entries by
//! insertion order are dropped in one batch. There is no TTL; entries live
//! until evicted or until the process restarts without a cache file.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::VerificationResult;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} is not valid JSON: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Default)]
struct Inner {
    map: HashMap<String, VerificationResult>,
    order: VecDeque<String>,
}

pub struct ResultCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl ResultCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_size: max_size.max(1),
        }
    }

    pub fn get(&self, address: &str) -> Option<VerificationResult> {
        self.inner.lock().map.get(address).cloned()
    }

    pub fn insert(&self, result: VerificationResult) {
        let mut inner = self.inner.lock();
        if inner.map.len() >= self.max_size && !inner.map.contains_key(&result.address) {
            let drop_count = (self.max_size / 10).max(1);
            for _ in 0..drop_count {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.map.remove(&oldest);
            }
            debug!(target: "cache", dropped = drop_count, "evicted oldest entries");
        }
        if !inner.map.contains_key(&result.address) {
            inner.order.push_back(result.address.clone());
        }
        inner.map.insert(result.address.clone(), result);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load persisted entries, oldest first. Missing file is not an error.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let entries: Vec<VerificationResult> =
            serde_json::from_str(&content).map_err(|source| CacheError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        let count = entries.len();
        for entry in entries {
            self.insert(entry);
        }
        info!(target: "cache", count, "loaded cached results");
        Ok(count)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let path = path.as_ref();
        let inner = self.inner.lock();
        let entries: Vec<&VerificationResult> = inner
            .order
            .iter()
            .filter_map(|address| inner.map.get(address))
            .collect();
        let json = serde_json::to_string_pretty(&entries).map_err(|source| CacheError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;

    fn result(address: &str) -> VerificationResult {
        VerificationResult::new(address, Verdict::Valid, "ok", "example.com", "smtp")
    }

    #[test]
    fn get_returns_inserted_entry() {
        let cache = ResultCache::new(10);
        cache.insert(result("a@example.com"));
        let hit = cache.get("a@example.com").expect("hit");
        assert_eq!(hit.verdict, Verdict::Valid);
        assert!(cache.get("b@example.com").is_none());
    }

    #[test]
    fn full_cache_drops_oldest_tenth() {
        let cache = ResultCache::new(10);
        for i in 0..10 {
            cache.insert(result(&format!("u{i}@example.com")));
        }
        assert_eq!(cache.len(), 10);

        cache.insert(result("new@example.com"));
        assert_eq!(cache.len(), 10);
        assert!(cache.get("u0@example.com").is_none(), "oldest evicted");
        assert!(cache.get("u1@example.com").is_some());
        assert!(cache.get("new@example.com").is_some());
    }

    #[test]
    fn reinsert_does_not_duplicate_order() {
        let cache = ResultCache::new(3);
        cache.insert(result("a@example.com"));
        cache.insert(result("a@example.com"));
        cache.insert(result("b@example.com"));
        cache.insert(result("c@example.com"));
        cache.insert(result("d@example.com"));
        assert!(cache.len() <= 3);
        assert!(cache.get("d@example.com").is_some());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        let cache = ResultCache::new(10);
        cache.insert(result("a@example.com"));
        cache.insert(result("b@example.com"));
        cache.save(&path).expect("save");

        let fresh = ResultCache::new(10);
        assert_eq!(fresh.load(&path).expect("load"), 2);
        assert!(fresh.get("a@example.com").is_some());
        assert!(fresh.get("b@example.com").is_some());
    }

    #[test]
    fn load_missing_file_is_empty() {
        let cache = ResultCache::new(10);
        assert_eq!(cache.load("/nonexistent/cache.json").expect("load"), 0);
        assert!(cache.is_empty());
    }
}
