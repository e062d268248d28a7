//! AI response cache
//!
//! Completion text keyed by the SHA-256 of (model, system prompt, user
//! prompt). Entries expire after the TTL; when full, the oldest entry is
//! evicted.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    content: String,
    inserted_at: Instant,
}

/// Hit/miss counters and size
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
    /// Approximate bytes held by keys and values
    pub memory_bytes: usize,
}

#[derive(Debug)]
pub struct AiCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for AiCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_MAX_ENTRIES)
    }
}

impl AiCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Hex SHA-256 over the request parts
    pub fn key(model: &str, system_prompt: &str, user_prompt: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [model, system_prompt, user_prompt] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(key) {
                if entry.inserted_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.content.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // Expired
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: String, content: String) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                content,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: entries.len(),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            memory_bytes: entries.iter().map(|(k, v)| k.len() + v.content.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = AiCache::key("m", "sys", "молоток");
        assert_eq!(a, AiCache::key("m", "sys", "молоток"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, AiCache::key("m2", "sys", "молоток"));
        // Part boundaries matter
        assert_ne!(AiCache::key("ab", "c", ""), AiCache::key("a", "bc", ""));
    }

    #[test]
    fn test_hit_and_miss_counts() {
        let cache = AiCache::default();
        assert!(cache.get("k").is_none());
        cache.insert("k".into(), "v".into());
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.memory_bytes, 2);
    }

    #[test]
    fn test_expiry() {
        let cache = AiCache::new(Duration::from_millis(10), 10);
        cache.insert("k".into(), "v".into());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());

        cache.insert("a".into(), "1".into());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.purge_expired(), 1);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let cache = AiCache::new(Duration::from_secs(60), 2);
        cache.insert("first".into(), "1".into());
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("second".into(), "2".into());
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("third".into(), "3".into());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("first").is_none());
        assert!(cache.get("third").is_some());

        // Overwriting an existing key does not evict
        cache.insert("third".into(), "3b".into());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("second").is_some());
    }
}
