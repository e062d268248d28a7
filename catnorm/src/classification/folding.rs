//! Category path folding
//!
//! Collapses a variable-depth category path (root → leaf) into at most
//! `max_depth` display levels. Three built-in strategies are registered:
//!
//! - `top_priority`: keep the first N−1 labels, join the rest into level N
//! - `bottom_priority`: join the head into level 1, keep the last N−1 labels
//! - `mixed_priority`: keep the first and last labels, spread the interior
//!   labels over the N−2 middle levels
//!
//! Paths that already fit are returned unchanged. Custom strategies can be
//! loaded from JSON and fold with explicit rules.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Separator placed between joined labels
pub const DEFAULT_SEPARATOR: &str = " / ";

/// Strategy used when a requested one is unavailable
pub const DEFAULT_STRATEGY_ID: &str = "top_priority";

/// Depth used when a caller leaves it unset
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Folding variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldingPriority {
    #[serde(rename = "top_priority", alias = "top")]
    Top,
    #[serde(rename = "bottom_priority", alias = "bottom")]
    Bottom,
    #[serde(rename = "mixed_priority", alias = "mixed")]
    Mixed,
    /// Fold with the strategy's explicit rules
    Custom,
}

/// Explicit fold rule: join `source_levels` of the path into `target_level`
///
/// Both are 0-based. Source indexes beyond the path are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldingRule {
    pub source_levels: Vec<usize>,
    pub target_level: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

/// Registered strategy parameters (immutable once registered)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldingStrategyConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    pub priority: FoldingPriority,
    #[serde(default)]
    pub rules: Vec<FoldingRule>,
}

impl FoldingStrategyConfig {
    /// Strategy with the default depth of 2
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: FoldingPriority) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            priority,
            rules: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_rules(mut self, rules: Vec<FoldingRule>) -> Self {
        self.rules = rules;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::Config("strategy id is empty".to_string()));
        }
        if self.max_depth == 0 {
            return Err(PipelineError::Config(format!(
                "strategy '{}': max_depth must be at least 1",
                self.id
            )));
        }
        if self.priority == FoldingPriority::Custom {
            if self.rules.is_empty() {
                return Err(PipelineError::Config(format!(
                    "strategy '{}': custom strategy needs at least one rule",
                    self.id
                )));
            }
            if let Some(rule) = self
                .rules
                .iter()
                .find(|rule| rule.target_level >= self.max_depth as usize)
            {
                return Err(PipelineError::Config(format!(
                    "strategy '{}': target level {} exceeds max_depth {}",
                    self.id, rule.target_level, self.max_depth
                )));
            }
        }
        Ok(())
    }
}

/// Folding outcome with the parameters that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldedCategory {
    pub levels: Vec<String>,
    pub original_path: Vec<String>,
    pub strategy_id: String,
    pub max_depth: u32,
}

/// Strategy registry and folding entry point
#[derive(Debug, Clone)]
pub struct FoldingEngine {
    strategies: BTreeMap<String, FoldingStrategyConfig>,
}

impl Default for FoldingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FoldingEngine {
    /// Engine with the three built-in strategies
    pub fn new() -> Self {
        let mut strategies = BTreeMap::new();
        for config in [
            FoldingStrategyConfig::new("top_priority", "Top priority", FoldingPriority::Top),
            FoldingStrategyConfig::new("bottom_priority", "Bottom priority", FoldingPriority::Bottom),
            FoldingStrategyConfig::new("mixed_priority", "Mixed priority", FoldingPriority::Mixed),
        ] {
            strategies.insert(config.id.clone(), config);
        }
        Self { strategies }
    }

    /// Register a strategy; an existing id is replaced
    pub fn register(&mut self, config: FoldingStrategyConfig) -> Result<()> {
        config.validate()?;
        debug!(
            strategy = %config.id,
            max_depth = config.max_depth,
            priority = ?config.priority,
            "Registered folding strategy"
        );
        self.strategies.insert(config.id.clone(), config);
        Ok(())
    }

    /// Register strategies from JSON (one object or an array)
    ///
    /// Returns the registered ids. A missing `max_depth` defaults to 2.
    pub fn load_strategy_json(&mut self, json: &str) -> Result<Vec<String>> {
        let configs: Vec<FoldingStrategyConfig> = if json.trim_start().starts_with('[') {
            serde_json::from_str(json)
        } else {
            serde_json::from_str::<FoldingStrategyConfig>(json).map(|c| vec![c])
        }
        .map_err(|e| PipelineError::Config(format!("invalid strategy JSON: {}", e)))?;

        // Validate everything before registering anything
        for config in &configs {
            config.validate()?;
        }

        let mut ids = Vec::with_capacity(configs.len());
        for config in configs {
            ids.push(config.id.clone());
            self.register(config)?;
        }
        Ok(ids)
    }

    pub fn strategy(&self, id: &str) -> Option<&FoldingStrategyConfig> {
        self.strategies.get(id)
    }

    pub fn strategies(&self) -> impl Iterator<Item = &FoldingStrategyConfig> {
        self.strategies.values()
    }

    /// Fold `path` with a registered strategy
    ///
    /// `max_depth == 0` means "use the strategy's configured depth".
    pub fn fold(&self, path: &[String], strategy_id: &str, max_depth: u32) -> Result<Vec<String>> {
        let config = self
            .strategies
            .get(strategy_id)
            .ok_or_else(|| PipelineError::UnknownStrategy(strategy_id.to_string()))?;
        let depth = if max_depth == 0 {
            config.max_depth
        } else {
            max_depth
        };
        Ok(fold_with(config, path, depth as usize))
    }

    /// Fold, falling back to `top_priority` at depth 2 for unknown strategies
    pub fn fold_or_default(&self, path: &[String], strategy_id: &str, max_depth: u32) -> FoldedCategory {
        match self.fold(path, strategy_id, max_depth) {
            Ok(levels) => FoldedCategory {
                levels,
                original_path: path.to_vec(),
                strategy_id: strategy_id.to_string(),
                max_depth: self.effective_depth(strategy_id, max_depth),
            },
            Err(e) => {
                warn!(
                    strategy = %strategy_id,
                    error = %e,
                    "Folding strategy unavailable, using default"
                );
                FoldedCategory {
                    levels: fold_top(path, DEFAULT_MAX_DEPTH as usize, DEFAULT_SEPARATOR),
                    original_path: path.to_vec(),
                    strategy_id: DEFAULT_STRATEGY_ID.to_string(),
                    max_depth: DEFAULT_MAX_DEPTH,
                }
            }
        }
    }

    fn effective_depth(&self, strategy_id: &str, max_depth: u32) -> u32 {
        if max_depth != 0 {
            return max_depth;
        }
        self.strategies
            .get(strategy_id)
            .map(|c| c.max_depth)
            .unwrap_or(DEFAULT_MAX_DEPTH)
    }
}

fn fold_with(config: &FoldingStrategyConfig, path: &[String], depth: usize) -> Vec<String> {
    if path.is_empty() || depth == 0 {
        return Vec::new();
    }
    if path.len() <= depth {
        return path.to_vec();
    }

    match config.priority {
        FoldingPriority::Top => fold_top(path, depth, DEFAULT_SEPARATOR),
        FoldingPriority::Bottom => fold_bottom(path, depth, DEFAULT_SEPARATOR),
        FoldingPriority::Mixed => fold_mixed(path, depth, DEFAULT_SEPARATOR),
        FoldingPriority::Custom => fold_rules(&config.rules, path, depth),
    }
}

fn join(labels: &[String], separator: &str) -> String {
    labels.join(separator)
}

fn fold_top(path: &[String], depth: usize, separator: &str) -> Vec<String> {
    if path.len() <= depth {
        return path.to_vec();
    }
    let mut levels: Vec<String> = path[..depth - 1].to_vec();
    levels.push(join(&path[depth - 1..], separator));
    levels
}

fn fold_bottom(path: &[String], depth: usize, separator: &str) -> Vec<String> {
    let split = path.len() - depth + 1;
    let mut levels = vec![join(&path[..split], separator)];
    levels.extend_from_slice(&path[split..]);
    levels
}

fn fold_mixed(path: &[String], depth: usize, separator: &str) -> Vec<String> {
    let last = path.len() - 1;
    match depth {
        1 => vec![join(path, separator)],
        2 => vec![path[0].clone(), join(&path[1..], separator)],
        _ => {
            let interior = &path[1..last];
            let groups = depth - 2;
            let base = interior.len() / groups;
            let extra = interior.len() % groups;

            let mut levels = Vec::with_capacity(depth);
            levels.push(path[0].clone());
            let mut start = 0;
            for group in 0..groups {
                let size = base + usize::from(group < extra);
                if size > 0 {
                    levels.push(join(&interior[start..start + size], separator));
                }
                start += size;
            }
            levels.push(path[last].clone());
            levels
        }
    }
}

fn fold_rules(rules: &[FoldingRule], path: &[String], depth: usize) -> Vec<String> {
    let mut slots: Vec<Option<String>> = vec![None; depth];
    for rule in rules {
        let labels: Vec<String> = rule
            .source_levels
            .iter()
            .filter_map(|&i| path.get(i).cloned())
            .collect();
        if labels.is_empty() || rule.target_level >= depth {
            continue;
        }
        slots[rule.target_level] = Some(labels.join(&rule.separator));
    }
    slots.into_iter().flatten().collect()
}
