//! Normalization session state machine
//!
//! A session moves Created → PatternsApplied → AiCorrected → Classified.
//! Reverts do not move the state machine; they append a stage and flip the
//! session status to `Reverted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Pipeline position of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Session exists, no stage applied yet
    Created,
    /// At least one pattern cleanup stage applied
    PatternsApplied,
    /// AI correction applied
    AiCorrected,
    /// Category assigned
    Classified,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Created => "created",
            PipelineState::PatternsApplied => "patterns_applied",
            PipelineState::AiCorrected => "ai_corrected",
            PipelineState::Classified => "classified",
        }
    }
}

impl FromStr for PipelineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PipelineState::Created),
            "patterns_applied" => Ok(PipelineState::PatternsApplied),
            "ai_corrected" => Ok(PipelineState::AiCorrected),
            "classified" => Ok(PipelineState::Classified),
            other => Err(format!("unknown pipeline state '{}'", other)),
        }
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Reverted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Reverted => "reverted",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "reverted" => Ok(SessionStatus::Reverted),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: PipelineState,
    pub new_state: PipelineState,
    pub transitioned_at: DateTime<Utc>,
}

/// One normalization effort for one catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,

    /// Reference to the source catalog item
    pub item_ref: String,

    /// Name as imported (never changes)
    pub original_name: String,

    /// Output of the most recently appended stage
    pub current_name: String,

    pub stage_count: u32,

    pub status: SessionStatus,

    pub state: PipelineState,

    /// Free-form caller metadata
    pub metadata: HashMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session in state `Created`
    pub fn new(item_ref: impl Into<String>, original_name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            item_ref: item_ref.into(),
            current_name: original_name.clone(),
            original_name,
            stage_count: 0,
            status: SessionStatus::Active,
            state: PipelineState::Created,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new pipeline state
    pub fn transition_to(&mut self, new_state: PipelineState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        self.updated_at = transition.transitioned_at;
        transition
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}
