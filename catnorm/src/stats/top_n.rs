//! Bounded top-N tracker
//!
//! Keeps the N highest-ranked entries seen so far, ranked by `(count, score)`.
//! The backing store is a min-heap so the weakest entry is always the one
//! compared against (and evicted by) a new arrival.

use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{PoisonError, RwLock};

/// One ranked entry
#[derive(Debug, Clone, Serialize)]
pub struct RankedItem<M> {
    pub key: String,
    pub count: u64,
    pub score: f64,
    pub metadata: M,
}

impl<M> RankedItem<M> {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| self.score.total_cmp(&other.score))
    }
}

impl<M> PartialEq for RankedItem<M> {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl<M> Eq for RankedItem<M> {}

impl<M> PartialOrd for RankedItem<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for RankedItem<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Capacity-capped top-N structure, safe to share between threads
#[derive(Debug)]
pub struct BoundedTopN<M> {
    capacity: usize,
    heap: RwLock<BinaryHeap<Reverse<RankedItem<M>>>>,
}

impl<M: Clone> BoundedTopN<M> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: RwLock::new(BinaryHeap::with_capacity(capacity)),
        }
    }

    /// Offer an entry
    ///
    /// Below capacity the entry is always kept. At capacity it replaces the
    /// current minimum only when its `(count, score)` is strictly greater.
    /// Returns whether the entry was kept.
    pub fn add(&self, key: impl Into<String>, count: u64, score: f64, metadata: M) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let item = RankedItem {
            key: key.into(),
            count,
            score,
            metadata,
        };

        let mut heap = self.heap.write().unwrap_or_else(PoisonError::into_inner);
        if heap.len() < self.capacity {
            heap.push(Reverse(item));
            return true;
        }

        let replace = heap
            .peek()
            .map(|Reverse(min)| item.rank_cmp(min) == Ordering::Greater)
            .unwrap_or(false);
        if replace {
            heap.pop();
            heap.push(Reverse(item));
        }
        replace
    }

    /// Snapshot sorted by `(count, score)`, highest first
    pub fn top_n(&self) -> Vec<RankedItem<M>> {
        let heap = self.heap.read().unwrap_or_else(PoisonError::into_inner);
        let mut items: Vec<RankedItem<M>> = heap.iter().map(|Reverse(item)| item.clone()).collect();
        items.sort_by(|a, b| b.rank_cmp(a));
        items
    }

    /// Current minimum, if any
    pub fn min(&self) -> Option<RankedItem<M>> {
        let heap = self.heap.read().unwrap_or_else(PoisonError::into_inner);
        heap.peek().map(|Reverse(item)| item.clone())
    }

    pub fn len(&self) -> usize {
        self.heap.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.heap.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_keeps_highest_ranked() {
        let top = BoundedTopN::new(3);
        top.add("a", 1, 0.5, ());
        top.add("b", 5, 0.1, ());
        top.add("c", 3, 0.9, ());
        assert!(top.add("d", 4, 0.0, ()));
        assert!(!top.add("e", 1, 0.9, ()));

        let keys: Vec<String> = top.top_n().into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["b", "d", "c"]);
        assert_eq!(top.len(), 3);
    }

    #[test]
    fn test_equal_rank_does_not_replace() {
        let top = BoundedTopN::new(2);
        top.add("a", 2, 0.5, ());
        top.add("b", 3, 0.5, ());
        assert!(!top.add("c", 2, 0.5, ()));
        assert_eq!(top.min().unwrap().key, "a");

        // Same count, higher score wins
        assert!(top.add("d", 2, 0.6, ()));
        assert_eq!(top.min().unwrap().key, "d");
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let top = BoundedTopN::new(4);
        for i in 0..4 {
            top.add(format!("k{}", i), i, 0.0, i);
        }
        let first = top.top_n();
        let second = top.top_n();
        assert_eq!(first.len(), 4);
        assert_eq!(
            first.iter().map(|i| &i.key).collect::<Vec<_>>(),
            second.iter().map(|i| &i.key).collect::<Vec<_>>()
        );
        assert_eq!(first[0].metadata, 3);
    }

    #[test]
    fn test_zero_capacity_and_clear() {
        let top: BoundedTopN<()> = BoundedTopN::new(0);
        assert!(!top.add("a", 10, 1.0, ()));
        assert!(top.is_empty());

        let top = BoundedTopN::new(2);
        top.add("a", 1, 0.0, ());
        top.clear();
        assert!(top.is_empty());
        assert_eq!(top.capacity(), 2);
    }

    #[test]
    fn test_concurrent_adds_respect_capacity() {
        let top = Arc::new(BoundedTopN::new(10));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let top = Arc::clone(&top);
                thread::spawn(move || {
                    for i in 0..100u64 {
                        top.add(format!("{}-{}", t, i), i, t as f64, ());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let items = top.top_n();
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|i| i.count == 99 || i.count == 98));
        assert!(items.windows(2).all(|w| w[0] >= w[1]));
    }
}
