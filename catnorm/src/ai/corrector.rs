//! AI name corrector
//!
//! Asks the model for a cleaned-up item name as JSON
//! (`normalized_name`, `confidence`, `reasoning`). In chat mode the user
//! prompt also carries the earlier AI stages of the session.

use crate::ai::{strip_code_fence, AiClient, AiError, CorrectionRequest, CorrectionResponse, NameCorrector};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SYSTEM_PROMPT: &str = r#"Ты - эксперт по нормализации наименований товаров.

ТВОЯ ЗАДАЧА - НОРМАЛИЗОВАТЬ наименование товара:
- Исправить опечатки и грамматические ошибки
- Привести к стандартной форме
- Удалить технические коды, артикулы, размеры (но сохранить смысл)
- Унифицировать синонимы и использовать единообразную терминологию

ПРАВИЛА:
- Нормализованное имя должно быть лаконичным и понятным (2-100 символов)
- Сохраняй ключевые характеристики товара (материал, назначение)
- Уверенность (confidence) от 0.0 до 1.0 (0.9+ только если полностью уверен)

ФОРМАТ ОТВЕТА - СТРОГО JSON:
{
    "normalized_name": "нормализованное наименование",
    "confidence": 0.95,
    "reasoning": "краткое объяснение"
}

Отвечай ТОЛЬКО JSON, без дополнительных пояснений."#;

/// Confidence used when the model omits it
const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct CorrectionReply {
    #[serde(default)]
    normalized_name: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: String,
}

/// [`NameCorrector`] backed by [`AiClient`]
pub struct AiNameCorrector {
    client: Arc<AiClient>,
}

impl AiNameCorrector {
    pub fn new(client: Arc<AiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NameCorrector for AiNameCorrector {
    async fn correct(
        &self,
        request: CorrectionRequest,
        cancel: &CancellationToken,
    ) -> Result<CorrectionResponse, AiError> {
        let prompt = build_user_prompt(&request);
        let reply = self.client.complete(SYSTEM_PROMPT, &prompt, cancel).await?;
        parse_correction(&reply)
    }

    fn model(&self) -> Option<String> {
        Some(self.client.model().to_string())
    }
}

/// User prompt; chat mode appends the session history
pub fn build_user_prompt(request: &CorrectionRequest) -> String {
    let mut prompt = format!(
        "НАИМЕНОВАНИЕ ТОВАРА ДЛЯ ОБРАБОТКИ: \"{}\"",
        request.current_name
    );

    if !request.prior_stages.is_empty() || request.stage_count > 0 {
        let _ = write!(
            prompt,
            "\n\nИСХОДНОЕ НАИМЕНОВАНИЕ: \"{}\"\nСТАДИЙ В СЕССИИ: {}",
            request.original_name, request.stage_count
        );
        if !request.prior_stages.is_empty() {
            prompt.push_str("\nПРЕДЫДУЩИЕ ИСПРАВЛЕНИЯ:");
            for stage in &request.prior_stages {
                let _ = write!(
                    prompt,
                    "\n- {}: \"{}\" -> \"{}\" (уверенность {:.2})",
                    stage.stage_type.as_str(),
                    stage.input_name,
                    stage.output_name,
                    stage.confidence
                );
            }
        }
    }

    prompt
}

/// Parse the model's JSON reply
pub fn parse_correction(reply: &str) -> Result<CorrectionResponse, AiError> {
    let cleaned = strip_code_fence(reply);
    let parsed: CorrectionReply = serde_json::from_str(cleaned)
        .map_err(|e| AiError::Parse(format!("{}, response: {}", e, cleaned)))?;

    let corrected_name = parsed.normalized_name.trim().to_string();
    if corrected_name.is_empty() {
        return Err(AiError::Parse("empty normalized_name in AI response".to_string()));
    }

    let confidence = match parsed.confidence {
        Some(c) if c.is_finite() && c > 0.0 => c.min(1.0),
        _ => DEFAULT_CONFIDENCE,
    };

    Ok(CorrectionResponse {
        corrected_name,
        confidence,
        reasoning: parsed.reasoning,
    })
}
