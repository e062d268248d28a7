//! Thread-safe frequency counter over string keys

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct Counter {
    counts: RwLock<HashMap<String, u64>>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, key: &str) -> u64 {
        self.add(key, 1)
    }

    /// Add `amount` to `key`, returning the new count
    pub fn add(&self, key: &str, amount: u64) -> u64 {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let entry = counts.entry(key.to_string()).or_insert(0);
        *entry += amount;
        *entry
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// The `n` most frequent keys, highest first (ties broken by key)
    pub fn most_common(&self, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.counts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.counts.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
