//! AI category classifier
//!
//! Puts an outline of the attached category tree into the prompt and asks
//! for a root-to-leaf path as JSON.

use crate::ai::{
    strip_code_fence, AiClient, AiError, CategoryClassifier, ClassificationRequest,
    ClassificationResponse,
};
use crate::classification::CategoryTree;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SYSTEM_PROMPT: &str = r#"Ты - эксперт по классификации товаров и услуг.

ВАЖНО:
- Физические товары (материалы, оборудование, изделия) НЕ могут быть услугами
- Если видишь марку, модель, технические характеристики - это товар
- Услуги описывают действия, работы, консультации, а не физические объекты

Отвечай только в формате JSON."#;

/// Tree levels included in the prompt outline
const OUTLINE_LEVELS: usize = 3;

/// Confidence used when the model returns one outside (0, 1]
const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    #[serde(default)]
    category_path: Vec<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    alternatives: Vec<Vec<String>>,
}

/// [`CategoryClassifier`] backed by [`AiClient`]
pub struct AiCategoryClassifier {
    client: Arc<AiClient>,
    tree: Option<Arc<CategoryTree>>,
}

impl AiCategoryClassifier {
    pub fn new(client: Arc<AiClient>) -> Self {
        Self { client, tree: None }
    }

    /// Attach the classifier tree shown to the model
    pub fn with_tree(mut self, tree: Arc<CategoryTree>) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn tree(&self) -> Option<&CategoryTree> {
        self.tree.as_deref()
    }

    /// Whether a returned path exists in the attached tree
    pub fn path_exists(&self, path: &[String]) -> bool {
        self.tree
            .as_deref()
            .and_then(|tree| tree.find_by_path(path))
            .is_some()
    }

    pub fn build_prompt(&self, request: &ClassificationRequest) -> String {
        let outline = match self.tree.as_deref() {
            Some(tree) if !tree.is_empty() => tree.summary(OUTLINE_LEVELS),
            _ => "Классификатор не загружен".to_string(),
        };
        build_prompt(request, &outline)
    }
}

#[async_trait]
impl CategoryClassifier for AiCategoryClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
        cancel: &CancellationToken,
    ) -> Result<ClassificationResponse, AiError> {
        let prompt = self.build_prompt(&request);
        let reply = self.client.complete(SYSTEM_PROMPT, &prompt, cancel).await?;
        let response = parse_classification(&reply)?;

        if self.tree.is_some() && !self.path_exists(&response.category_path) {
            tracing::debug!(
                path = ?response.category_path,
                "Classifier returned a path outside the attached tree"
            );
        }
        Ok(response)
    }
}

fn build_prompt(request: &ClassificationRequest, outline: &str) -> String {
    let mut object = format!("Название: {}", request.item_name);
    if let Some(code) = request.code.as_deref().filter(|c| !c.is_empty()) {
        object.push_str(&format!("\nКод: {}", code));
    }
    object.push_str(&format!(
        "\nОписание: {}",
        request.description.as_deref().unwrap_or_default()
    ));

    format!(
        r#"ТВОЯ ЗАДАЧА:
Определить наиболее подходящий путь категории для объекта из предложенного классификатора.

ОБЪЕКТ:
{object}

КЛАССИФИКАТОР КАТЕГОРИЙ:
{outline}

ПРАВИЛА ВЫБОРА КАТЕГОРИИ:
- Выбирай наиболее специфичный (детальный) путь, не глубже {levels} уровней
- Путь должен быть полным (от корня до листа)
- Если не уверен - используй более общий путь
- Учитывай назначение и материал объекта

ФОРМАТ ОТВЕТА - ТОЛЬКО JSON:
{{
    "category_path": ["Уровень1", "Уровень2", "Уровень3"],
    "confidence": 0.95,
    "reasoning": "Краткое обоснование выбора",
    "alternatives": [["Альтернативный", "Путь"]]
}}"#,
        object = object,
        outline = outline.trim_end(),
        levels = request.max_levels,
    )
}

/// Parse the model's JSON reply
pub fn parse_classification(reply: &str) -> Result<ClassificationResponse, AiError> {
    let cleaned = strip_code_fence(reply);
    let parsed: ClassificationReply = serde_json::from_str(cleaned)
        .map_err(|e| AiError::Parse(format!("{}, response: {}", e, cleaned)))?;

    let category_path: Vec<String> = parsed
        .category_path
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect();
    if category_path.is_empty() {
        return Err(AiError::Parse("empty category path in AI response".to_string()));
    }

    let confidence = if parsed.confidence > 0.0 && parsed.confidence <= 1.0 {
        parsed.confidence
    } else {
        DEFAULT_CONFIDENCE
    };

    Ok(ClassificationResponse {
        category_path,
        confidence,
        reasoning: parsed.reasoning,
        alternatives: parsed.alternatives,
    })
}
