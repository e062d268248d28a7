//! AI collaborators
//!
//! The pipeline talks to two external services through object-safe traits:
//! - [`NameCorrector`]: suggests a cleaned-up item name
//! - [`CategoryClassifier`]: proposes a root-to-leaf category path
//!
//! [`AiClient`] is the shared HTTP transport (OpenAI-style chat completions)
//! with rate limiting, retry with exponential backoff, a circuit breaker and
//! a response cache. [`AiNameCorrector`] and [`AiCategoryClassifier`]
//! implement the traits on top of it.

pub mod cache;
pub mod circuit_breaker;
pub mod classifier;
pub mod client;
pub mod corrector;
pub mod retry;

pub use cache::{AiCache, CacheStats};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use classifier::AiCategoryClassifier;
pub use client::{AiClient, AiClientConfig};
pub use corrector::AiNameCorrector;
pub use retry::{retry_with_backoff, RetryPolicy};

use crate::models::PriorStage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from AI collaborators
#[derive(Debug, Error)]
pub enum AiError {
    /// Transport failure (connect, timeout, reset)
    #[error("AI network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("AI service returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Failed to parse AI response: {0}")]
    Parse(String),

    #[error("AI request cancelled")]
    Cancelled,

    /// Too many consecutive failures, calls are blocked for a while
    #[error("AI circuit breaker is open")]
    CircuitOpen,

    #[error("AI client configuration error: {0}")]
    Config(String),
}

impl AiError {
    /// Network errors and 5xx responses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Network(_) => true,
            AiError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AiError::Api {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None if err.is_decode() => AiError::Parse(err.to_string()),
            None => AiError::Network(err.to_string()),
        }
    }
}

/// Name correction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub current_name: String,
    pub original_name: String,
    /// Earlier AI stages, only filled in chat mode
    #[serde(default)]
    pub prior_stages: Vec<PriorStage>,
    /// Number of stages already in the session (chat mode)
    #[serde(default)]
    pub stage_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResponse {
    pub corrected_name: String,
    /// In 0.0-1.0
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Classification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub item_name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub max_levels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    /// Root to leaf
    pub category_path: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<Vec<String>>,
}

/// Suggests a corrected item name
#[async_trait]
pub trait NameCorrector: Send + Sync {
    async fn correct(
        &self,
        request: CorrectionRequest,
        cancel: &CancellationToken,
    ) -> Result<CorrectionResponse, AiError>;

    /// Model identifier recorded in the stage context
    fn model(&self) -> Option<String> {
        None
    }
}

/// Proposes a category path for an item
#[async_trait]
pub trait CategoryClassifier: Send + Sync {
    async fn classify(
        &self,
        request: ClassificationRequest,
        cancel: &CancellationToken,
    ) -> Result<ClassificationResponse, AiError>;
}

/// Strip a surrounding Markdown code fence (```json ... ```) from a reply
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest));
    inner.unwrap_or(trimmed).trim()
}
