//! Versioned normalization pipeline and batch driver
//!
//! [`VersionedPipeline`] applies stages to one session at a time and
//! persists each stage before it becomes visible. [`BatchDriver`] runs the
//! pipeline over many items with an inter-call delay and a stop signal.

pub mod batch;
pub mod versioned;

pub use batch::{BatchDriver, BatchItem, BatchReport};
pub use versioned::VersionedPipeline;

use crate::classification::{DEFAULT_MAX_DEPTH, DEFAULT_STRATEGY_ID};
use crate::error::{PipelineError, Result};
use catnorm_common::TomlConfig;
use std::time::Duration;

/// Default category depth requested from the classifier
pub const DEFAULT_CLASSIFICATION_LEVELS: u32 = 6;

/// Default pause between consecutive AI calls in a batch
pub const DEFAULT_INTER_CALL_DELAY: Duration = Duration::from_millis(200);

/// Settings for [`VersionedPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Folding strategy used when `classify` is not given one
    pub default_strategy: String,
    /// Folded depth; 0 means the strategy's own depth
    pub max_depth: u32,
    /// Send earlier AI stages along with correction requests
    pub use_chat: bool,
    /// Deepest category path the classifier is asked for
    pub classification_levels: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_strategy: DEFAULT_STRATEGY_ID.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            use_chat: false,
            classification_levels: DEFAULT_CLASSIFICATION_LEVELS,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            default_strategy: config.pipeline.default_strategy.clone(),
            max_depth: config.pipeline.max_depth,
            use_chat: config.pipeline.use_chat,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_strategy.trim().is_empty() {
            return Err(PipelineError::Config(
                "default folding strategy is empty".to_string(),
            ));
        }
        if self.classification_levels == 0 {
            return Err(PipelineError::Config(
                "classification_levels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for [`BatchDriver`]
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Pause before every AI call except the first of the run
    pub inter_call_delay: Duration,
    pub use_ai_correction: bool,
    pub classify: bool,
    /// Folding strategy for classification; `None` uses the pipeline default
    pub strategy_id: Option<String>,
    pub use_chat: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_call_delay: DEFAULT_INTER_CALL_DELAY,
            use_ai_correction: false,
            classify: false,
            strategy_id: None,
            use_chat: false,
        }
    }
}

impl BatchConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            inter_call_delay: Duration::from_millis(config.batch.inter_call_delay_ms),
            use_chat: config.pipeline.use_chat,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.strategy_id {
            if id.trim().is_empty() {
                return Err(PipelineError::Config(
                    "batch strategy id is empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether any item in the run will call the AI service
    pub fn uses_ai(&self) -> bool {
        self.use_ai_correction || self.classify
    }
}
