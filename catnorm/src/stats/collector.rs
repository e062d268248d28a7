//! Process-wide pipeline metrics
//!
//! Records AI request outcomes and latency, normalizations per processing
//! level with a running quality average, and errors grouped by kind.

use crate::validators::ProcessingLevel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Copy of the collected metrics at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub ai_requests: u64,
    pub ai_successes: u64,
    pub ai_failures: u64,
    pub avg_ai_latency_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_normalized: u64,
    pub basic: u64,
    pub ai_enhanced: u64,
    pub benchmark: u64,
    pub avg_quality: f64,
    pub total_errors: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub last_error: Option<String>,
}

impl StatsSnapshot {
    fn empty() -> Self {
        Self {
            started_at: Utc::now(),
            ai_requests: 0,
            ai_successes: 0,
            ai_failures: 0,
            avg_ai_latency_ms: 0.0,
            cache_hits: 0,
            cache_misses: 0,
            total_normalized: 0,
            basic: 0,
            ai_enhanced: 0,
            benchmark: 0,
            avg_quality: 0.0,
            total_errors: 0,
            errors_by_kind: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Share of successful AI requests (0 when none were made)
    pub fn ai_success_rate(&self) -> f64 {
        if self.ai_requests == 0 {
            0.0
        } else {
            self.ai_successes as f64 / self.ai_requests as f64
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Totals {
    snapshot: StatsSnapshot,
    ai_latency_total: Duration,
    quality_total: f64,
}

impl Totals {
    fn new() -> Self {
        Self {
            snapshot: StatsSnapshot::empty(),
            ai_latency_total: Duration::ZERO,
            quality_total: 0.0,
        }
    }
}

/// Shared metrics sink
#[derive(Debug)]
pub struct StatsCollector {
    totals: RwLock<Totals>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            totals: RwLock::new(Totals::new()),
        }
    }

    pub fn record_ai_request(&self, latency: Duration, success: bool) {
        let mut guard = self.totals.write().unwrap_or_else(PoisonError::into_inner);
        let totals = &mut *guard;
        totals.ai_latency_total += latency;

        let s = &mut totals.snapshot;
        s.ai_requests += 1;
        if success {
            s.ai_successes += 1;
        } else {
            s.ai_failures += 1;
        }
        s.avg_ai_latency_ms = totals.ai_latency_total.as_secs_f64() * 1000.0 / s.ai_requests as f64;
    }

    pub fn record_cache_access(&self, hit: bool) {
        let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
        if hit {
            totals.snapshot.cache_hits += 1;
        } else {
            totals.snapshot.cache_misses += 1;
        }
    }

    pub fn record_normalization(&self, level: ProcessingLevel, quality: f64) {
        let mut guard = self.totals.write().unwrap_or_else(PoisonError::into_inner);
        let totals = &mut *guard;
        totals.quality_total += quality;

        let s = &mut totals.snapshot;
        s.total_normalized += 1;
        match level {
            ProcessingLevel::Basic => s.basic += 1,
            ProcessingLevel::AiEnhanced => s.ai_enhanced += 1,
            ProcessingLevel::Benchmark => s.benchmark += 1,
        }
        s.avg_quality = totals.quality_total / s.total_normalized as f64;
    }

    pub fn record_error(&self, kind: &str, message: impl Into<String>) {
        let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
        let s = &mut totals.snapshot;
        s.total_errors += 1;
        *s.errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
        s.last_error = Some(message.into());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.totals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    pub fn reset(&self) {
        *self.totals.write().unwrap_or_else(PoisonError::into_inner) = Totals::new();
    }
}
