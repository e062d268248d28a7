//! Immutable stage records

use crate::models::PatternMatch;
use crate::validators::QualityScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of transformation a stage records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    PatternCleanup,
    AiCorrection,
    Classification,
    Revert,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::PatternCleanup => "pattern_cleanup",
            StageType::AiCorrection => "ai_correction",
            StageType::Classification => "classification",
            StageType::Revert => "revert",
        }
    }
}

impl FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pattern_cleanup" => Ok(StageType::PatternCleanup),
            "ai_correction" => Ok(StageType::AiCorrection),
            "classification" => Ok(StageType::Classification),
            "revert" => Ok(StageType::Revert),
            other => Err(format!("unknown stage type '{}'", other)),
        }
    }
}

/// Stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Applied,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Applied => "applied",
        }
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(StageStatus::Applied),
            other => Err(format!("unknown stage status '{}'", other)),
        }
    }
}

/// Output of an earlier AI stage, passed back in chat mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorStage {
    pub stage_type: StageType,
    pub input_name: String,
    pub output_name: String,
    pub confidence: f64,
}

/// Prompt/response summary of an AI stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiContext {
    pub use_chat: bool,
    #[serde(default)]
    pub prior_stages: Vec<PriorStage>,
    pub suggested_name: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// One immutable transformation record within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub session_id: Uuid,
    /// 1-based position in the session history
    pub ordinal: u32,
    pub stage_type: StageType,
    pub input_name: String,
    pub output_name: String,
    #[serde(default)]
    pub applied_patterns: Vec<PatternMatch>,
    pub ai_context: Option<AiContext>,
    pub category_original: Option<Vec<String>>,
    pub category_folded: Option<Vec<String>>,
    pub strategy_id: Option<String>,
    pub max_depth: Option<u32>,
    pub quality: Option<QualityScore>,
    /// Target stage of a revert
    pub reverted_to: Option<Uuid>,
    pub confidence: f64,
    pub status: StageStatus,
    pub created_at: DateTime<Utc>,
}

impl Stage {
    /// New stage record; confidence is clamped to 0.0-1.0
    pub fn new(
        session_id: Uuid,
        ordinal: u32,
        stage_type: StageType,
        input_name: impl Into<String>,
        output_name: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            ordinal,
            stage_type,
            input_name: input_name.into(),
            output_name: output_name.into(),
            applied_patterns: Vec::new(),
            ai_context: None,
            category_original: None,
            category_folded: None,
            strategy_id: None,
            max_depth: None,
            quality: None,
            reverted_to: None,
            confidence: clamp_confidence(confidence),
            status: StageStatus::Applied,
            created_at: Utc::now(),
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<PatternMatch>) -> Self {
        self.applied_patterns = patterns;
        self
    }

    pub fn with_ai_context(mut self, context: AiContext) -> Self {
        self.ai_context = Some(context);
        self
    }

    /// Attach classification results and the strategy that produced them
    pub fn with_category(
        mut self,
        original: Vec<String>,
        folded: Vec<String>,
        strategy_id: impl Into<String>,
        max_depth: u32,
    ) -> Self {
        self.category_original = Some(original);
        self.category_folded = Some(folded);
        self.strategy_id = Some(strategy_id.into());
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_quality(mut self, quality: QualityScore) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_revert_target(mut self, target: Uuid) -> Self {
        self.reverted_to = Some(target);
        self
    }

    pub fn is_ai_stage(&self) -> bool {
        matches!(
            self.stage_type,
            StageType::AiCorrection | StageType::Classification
        )
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
