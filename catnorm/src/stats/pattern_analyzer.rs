//! Pattern statistics accumulated across many items
//!
//! A `PatternAnalyzer` is owned by whoever drives the pipeline and shared by
//! `Arc` with each pipeline instance. All updates go through one write lock
//! so concurrent sessions can record into the same analyzer.

use crate::models::{PatternMatch, PatternType};
use crate::normalization::Tokenizer;
use crate::stats::{BoundedTopN, Counter, RankedItem};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{PoisonError, RwLock};

/// Default number of patterns kept in the top list
pub const DEFAULT_TOP_PATTERNS: usize = 100;

/// Default limit on distinct "type:text" keys tracked between resets
pub const DEFAULT_MAX_TRACKED_PATTERNS: usize = 10_000;

/// Per-category aggregate
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAggregate {
    pub category: String,
    pub total_items: u64,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub pattern_counts: BTreeMap<PatternType, u64>,
    #[serde(skip)]
    total_confidence: f64,
}

impl CategoryAggregate {
    fn new(category: &str, confidence: f64) -> Self {
        Self {
            category: category.to_string(),
            total_items: 0,
            avg_confidence: 0.0,
            min_confidence: confidence,
            max_confidence: confidence,
            pattern_counts: BTreeMap::new(),
            total_confidence: 0.0,
        }
    }

    fn record(&mut self, confidence: f64, matches: &[PatternMatch]) {
        self.total_items += 1;
        self.total_confidence += confidence;
        self.avg_confidence = self.total_confidence / self.total_items as f64;
        self.min_confidence = self.min_confidence.min(confidence);
        self.max_confidence = self.max_confidence.max(confidence);
        for m in matches {
            *self.pattern_counts.entry(m.pattern_type).or_insert(0) += 1;
        }
    }
}

/// Serializable snapshot of everything the analyzer has seen
#[derive(Debug, Clone, Serialize)]
pub struct PatternReport {
    pub total_items: u64,
    pub total_patterns: u64,
    pub avg_patterns_per_item: f64,
    pub avg_token_count: f64,
    /// Word-token count → number of items
    pub token_count_distribution: BTreeMap<usize, u64>,
    pub type_counts: BTreeMap<PatternType, u64>,
    pub type_distribution: BTreeMap<PatternType, f64>,
    pub top_patterns: Vec<RankedItem<PatternType>>,
    /// Occurrences of new keys dropped after the tracking limit was reached
    pub untracked_patterns: u64,
    /// Sorted by item count, largest first
    pub categories: Vec<CategoryAggregate>,
}

#[derive(Debug, Default)]
struct AnalyzerState {
    total_items: u64,
    total_patterns: u64,
    token_count_distribution: BTreeMap<usize, u64>,
    type_counts: BTreeMap<PatternType, u64>,
    /// "type:text" → best confidence seen
    pattern_confidence: HashMap<String, (PatternType, f64)>,
    untracked_patterns: u64,
    categories: HashMap<String, CategoryAggregate>,
}

/// Accumulates pattern statistics
///
/// Per-pattern counts are kept for at most `max_tracked` distinct keys; once
/// the limit is reached only already-known keys keep counting until
/// [`PatternAnalyzer::reset`]. Type and category totals are unaffected.
#[derive(Debug)]
pub struct PatternAnalyzer {
    top_n: usize,
    max_tracked: usize,
    tokenizer: Tokenizer,
    pattern_counts: Counter,
    state: RwLock<AnalyzerState>,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_PATTERNS)
    }
}

impl PatternAnalyzer {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            max_tracked: DEFAULT_MAX_TRACKED_PATTERNS,
            tokenizer: Tokenizer::new(),
            pattern_counts: Counter::new(),
            state: RwLock::new(AnalyzerState::default()),
        }
    }

    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked;
        self
    }

    /// Record one analyzed item
    pub fn record(&self, name: &str, category: &str, confidence: f64, matches: &[PatternMatch]) {
        let structure = self.tokenizer.analyze_structure(name);
        let token_count = structure.text_tokens + structure.number_tokens;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.total_items += 1;
        state.total_patterns += matches.len() as u64;
        *state.token_count_distribution.entry(token_count).or_insert(0) += 1;

        for m in matches {
            *state.type_counts.entry(m.pattern_type).or_insert(0) += 1;

            let key = format!("{}:{}", m.pattern_type, m.matched_text);
            if state.pattern_confidence.len() >= self.max_tracked
                && !state.pattern_confidence.contains_key(&key)
            {
                state.untracked_patterns += 1;
                continue;
            }
            self.pattern_counts.increment(&key);
            let entry = state
                .pattern_confidence
                .entry(key)
                .or_insert((m.pattern_type, m.confidence));
            entry.1 = entry.1.max(m.confidence);
        }

        state
            .categories
            .entry(category.to_string())
            .or_insert_with(|| CategoryAggregate::new(category, confidence))
            .record(confidence, matches);
    }

    /// Share of each pattern type, in percent
    pub fn type_distribution(&self) -> BTreeMap<PatternType, f64> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        percentages(&state.type_counts)
    }

    /// Most frequent "type:text" patterns, highest first
    pub fn top_patterns(&self, n: usize) -> Vec<RankedItem<PatternType>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.ranked_patterns(&state);
        items.truncate(n);
        items
    }

    pub fn category(&self, category: &str) -> Option<CategoryAggregate> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.categories.get(category).cloned()
    }

    pub fn report(&self) -> PatternReport {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        let (avg_patterns_per_item, avg_token_count) = if state.total_items > 0 {
            let tokens: u64 = state
                .token_count_distribution
                .iter()
                .map(|(len, count)| *len as u64 * count)
                .sum();
            (
                state.total_patterns as f64 / state.total_items as f64,
                tokens as f64 / state.total_items as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let mut categories: Vec<CategoryAggregate> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| {
            b.total_items
                .cmp(&a.total_items)
                .then_with(|| a.category.cmp(&b.category))
        });

        PatternReport {
            total_items: state.total_items,
            total_patterns: state.total_patterns,
            avg_patterns_per_item,
            avg_token_count,
            token_count_distribution: state.token_count_distribution.clone(),
            type_counts: state.type_counts.clone(),
            type_distribution: percentages(&state.type_counts),
            top_patterns: self.ranked_patterns(&state),
            untracked_patterns: state.untracked_patterns,
            categories,
        }
    }

    /// Plain-text rendering of [`PatternAnalyzer::report`]
    pub fn format_report(&self) -> String {
        let report = self.report();
        let mut out = String::new();

        let _ = writeln!(out, "=== Pattern statistics ===");
        let _ = writeln!(out);
        let _ = writeln!(out, "Items: {}", report.total_items);
        let _ = writeln!(out, "Patterns: {}", report.total_patterns);
        let _ = writeln!(out, "Patterns per item: {:.2}", report.avg_patterns_per_item);
        let _ = writeln!(out, "Word tokens per item: {:.2}", report.avg_token_count);

        let _ = writeln!(out, "\nWord token counts:");
        for (len, count) in &report.token_count_distribution {
            let share = *count as f64 / report.total_items.max(1) as f64 * 100.0;
            let _ = writeln!(out, "  {} tokens: {} items ({:.1}%)", len, count, share);
        }

        let _ = writeln!(out, "\nPattern types:");
        let mut types: Vec<(&PatternType, &f64)> = report.type_distribution.iter().collect();
        types.sort_by(|a, b| b.1.total_cmp(a.1));
        for (pattern_type, share) in types {
            let count = report.type_counts.get(pattern_type).copied().unwrap_or(0);
            let _ = writeln!(out, "  {}: {} ({:.1}%)", pattern_type, count, share);
        }

        let _ = writeln!(out, "\nTop patterns:");
        for (i, item) in report.top_patterns.iter().take(10).enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} (count: {}, confidence: {:.2})",
                i + 1,
                item.key,
                item.count,
                item.score
            );
        }

        if !report.categories.is_empty() {
            let _ = writeln!(out, "\nCategories:");
            for agg in &report.categories {
                let label = if agg.category.is_empty() { "(none)" } else { &agg.category };
                let _ = writeln!(
                    out,
                    "  {}: {} items, confidence avg {:.2} (min {:.2}, max {:.2})",
                    label, agg.total_items, agg.avg_confidence, agg.min_confidence, agg.max_confidence
                );
            }
        }

        out
    }

    pub fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = AnalyzerState::default();
        self.pattern_counts.clear();
    }

    fn ranked_patterns(&self, state: &AnalyzerState) -> Vec<RankedItem<PatternType>> {
        let top = BoundedTopN::new(self.top_n);
        for (key, count) in self.pattern_counts.snapshot() {
            if let Some(&(pattern_type, confidence)) = state.pattern_confidence.get(&key) {
                top.add(key, count, confidence, pattern_type);
            }
        }
        top.top_n()
    }
}

fn percentages(counts: &BTreeMap<PatternType, u64>) -> BTreeMap<PatternType, f64> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(t, c)| (*t, *c as f64 / total as f64 * 100.0))
        .collect()
}
