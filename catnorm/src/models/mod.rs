//! Data models for catnorm
//!
//! - Session: one normalization effort for one catalog item
//! - Stage: one immutable transformation record within a session
//! - PatternMatch: one detected noise span in a raw name

pub mod pattern_match;
pub mod session;
pub mod stage;

pub use pattern_match::{PatternMatch, PatternType, Severity};
pub use session::{PipelineState, Session, SessionStatus, StateTransition};
pub use stage::{AiContext, PriorStage, Stage, StageStatus, StageType};
