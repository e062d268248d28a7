//! HTTP client for an OpenAI-style chat completions endpoint
//!
//! Every call goes through, in order: the response cache, the circuit
//! breaker, then the retry loop. Each attempt waits for a rate limiter
//! permit before sending. Cancellation is honored while waiting for a
//! permit, during the request and between retries.

use crate::ai::cache::{DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL};
use crate::ai::{retry_with_backoff, strip_code_fence, AiCache, AiError, CircuitBreaker, RetryPolicy};
use crate::error::{PipelineError, Result};
use crate::stats::StatsCollector;
use catnorm_common::TomlConfig;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Settings for [`AiClient`]
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// API root, e.g. `https://api.arliai.com/v1`
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub burst: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl AiClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
            requests_per_second: 1,
            burst: 5,
            temperature: 0.3,
            max_tokens: 1024,
            retry: RetryPolicy::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }

    /// Build from the `[ai]` section; the API key comes from the configured
    /// environment variable
    pub fn from_toml(config: &TomlConfig) -> Result<Self> {
        let api_key = config.ai.api_key().ok_or_else(|| {
            PipelineError::Config(format!(
                "AI API key not set (environment variable {})",
                config.ai.api_key_env
            ))
        })?;

        let mut client_config = Self::new(&config.ai.base_url, api_key, &config.ai.model);
        client_config.timeout = Duration::from_secs(config.ai.timeout_secs);
        client_config.requests_per_second = config.ai.requests_per_second;
        client_config.burst = config.ai.burst;
        Ok(client_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PipelineError::Config("AI base URL is empty".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(PipelineError::Config("AI API key is empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::Config("AI model is empty".to_string()));
        }
        if self.requests_per_second == 0 || self.burst == 0 {
            return Err(PipelineError::Config(
                "AI rate limit and burst must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(PipelineError::Config("AI timeout must be positive".to_string()));
        }
        self.retry.validate()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ChatErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Shared AI transport
pub struct AiClient {
    http: Client,
    config: AiClientConfig,
    endpoint: String,
    rate_limiter: DefaultDirectRateLimiter,
    breaker: CircuitBreaker,
    cache: AiCache,
    stats: Option<Arc<StatsCollector>>,
}

impl AiClient {
    pub fn new(config: AiClientConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| PipelineError::Config("requests_per_second is zero".to_string()))?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| PipelineError::Config("burst is zero".to_string()))?;
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst));

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            cache: AiCache::new(config.cache_ttl, config.cache_max_entries),
            config,
            rate_limiter,
            breaker: CircuitBreaker::default(),
            stats: None,
        })
    }

    /// Report request outcomes and cache accesses to `stats`
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &AiCache {
        &self.cache
    }

    /// One system + user exchange; returns the reply with any code fence
    /// stripped
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, AiError> {
        let key = AiCache::key(&self.config.model, system_prompt, user_prompt);
        let cached = self.cache.get(&key);
        if let Some(stats) = &self.stats {
            stats.record_cache_access(cached.is_some());
        }
        if let Some(content) = cached {
            debug!("AI response served from cache");
            return Ok(content);
        }

        if !self.breaker.can_proceed() {
            return Err(AiError::CircuitOpen);
        }

        let started = Instant::now();
        let result = retry_with_backoff(&self.config.retry, "chat_completion", cancel, || {
            self.send_once(system_prompt, user_prompt)
        })
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(AiError::Cancelled) => {}
            Err(_) => self.breaker.record_failure(),
        }
        if !matches!(result, Err(AiError::Cancelled)) {
            if let Some(stats) = &self.stats {
                stats.record_ai_request(started.elapsed(), result.is_ok());
            }
        }

        let content = result?;
        self.cache.insert(key, content.clone());
        Ok(content)
    }

    async fn send_once(&self, system_prompt: &str, user_prompt: &str) -> std::result::Result<String, AiError> {
        self.rate_limiter.until_ready().await;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        debug!(endpoint = %self.endpoint, model = %self.config.model, "Sending AI request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::Parse(format!("{}: {}", e, body)))?;

        if let Some(error) = parsed.error {
            return Err(AiError::Parse(format!(
                "service error: {} (type: {})",
                error.message,
                error.kind.unwrap_or_default()
            )));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AiError::Parse("no choices in response".to_string()))?;

        Ok(strip_code_fence(&content).to_string())
    }
}
