//! Quality Validator
//!
//! Scores a (source name, normalized name, category) triple.
//!
//! # Quality Dimensions
//! - **Category confidence** (weight: 0.20): fallback bucket 0.3, keyword
//!   confirmed 0.95, known but unconfirmed 0.6, unknown category 0.7
//! - **Name clarity** (weight: 0.25): length, digit/symbol density, letters,
//!   casing
//! - **Consistency** (weight: 0.20): share of source keywords preserved
//! - **Completeness** (weight: 0.15): name, category and keywords present
//! - **Standardization** (weight: 0.20): trimming, spacing, code prefixes,
//!   edge hyphens
//! - **AI bonus**: `ai_confidence * 0.1` when AI was involved
//!
//! The extended score re-weights to eight dimensions
//! (0.15/0.20/0.15/0.10/0.15/0.15/0.05/0.05) adding classifier code
//! accuracy, duplicate status and data enrichment. The AI bonus is unchanged.
//!
//! Overall is capped at 1.0. Benchmark quality means overall ≥ 0.9.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Overall score at or above which a result counts as benchmark quality
pub const BENCHMARK_THRESHOLD: f64 = 0.9;

/// Dimension score below which a recommendation is emitted
const WEAK_DIMENSION: f64 = 0.7;

/// Categories treated as the fallback bucket
const FALLBACK_CATEGORIES: &[&str] = &["", "другое", "unknown"];

const STOP_WORDS: &[&str] = &["и", "в", "на", "с", "для", "по", "из", "к", "от"];

/// Category → confirming keyword stems
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("инструмент", &["молот", "отвер", "ключ", "пила", "дрель", "шуруп"]),
    ("медикаменты", &["лекарств", "препарат", "таблет", "мазь", "сироп"]),
    ("стройматериалы", &["цемент", "кирпич", "блок", "панель", "плита"]),
    ("электроника", &["компьютер", "телефон", "планшет", "монитор", "принтер"]),
    ("оборудование", &["станок", "агрегат", "установ", "машин"]),
    ("канцелярия", &["ручк", "карандаш", "тетрад", "папк", "скреп"]),
    ("автоаксессуары", &["автомобиль", "авто", "машин", "колес", "шин"]),
    ("средства очистки", &["мыло", "моющ", "чист", "порош"]),
    ("продукты", &["хлеб", "молок", "мяс", "рыб", "овощ"]),
    ("сельское хозяйство", &["семен", "удобр", "корм", "сельхоз"]),
    ("связь", &["телефон", "роутер", "модем", "антенн"]),
    ("сантехника", &["кран", "труб", "смесител", "унитаз"]),
    ("мебель", &["стол", "стул", "шкаф", "диван", "кресл"]),
    ("инструменты измерительные", &["измер", "метр", "линейк", "уровень"]),
];

/// How far processing went for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingLevel {
    /// Rules only
    Basic,
    /// AI correction or classification involved
    AiEnhanced,
    /// Highest tier (AI plus verified reference data)
    Benchmark,
}

impl ProcessingLevel {
    pub fn involves_ai(&self) -> bool {
        matches!(self, ProcessingLevel::AiEnhanced | ProcessingLevel::Benchmark)
    }
}

/// Extra inputs for the extended score
#[derive(Debug, Clone, Default)]
pub struct ExtendedInputs<'a> {
    pub kpved_code: Option<&'a str>,
    pub kpved_confidence: f64,
    pub ai_reasoning: Option<&'a str>,
    pub is_duplicate: bool,
}

/// Computed quality of one stage snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall: f64,
    pub category_confidence: f64,
    pub name_clarity: f64,
    pub consistency: f64,
    pub completeness: f64,
    pub standardization: f64,
    pub ai_confidence_bonus: f64,
    pub is_benchmark_quality: bool,
    #[serde(default)]
    pub kpved_accuracy: f64,
    #[serde(default)]
    pub duplicate_score: f64,
    #[serde(default)]
    pub data_enrichment: f64,
    /// True when the eight-dimension weighting was used
    #[serde(default)]
    pub extended: bool,
    /// Weak dimensions worth a second look
    #[serde(default)]
    pub issues: Vec<String>,
}

impl QualityScore {
    /// Weak dimensions, as human-readable notes
    pub fn recommendations(&self) -> &[String] {
        &self.issues
    }
}

/// Quality Validator
#[derive(Debug, Clone)]
pub struct QualityValidator {
    benchmark_threshold: f64,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityValidator {
    pub fn new() -> Self {
        Self {
            benchmark_threshold: BENCHMARK_THRESHOLD,
        }
    }

    /// Five-dimension score plus AI bonus
    pub fn score(
        &self,
        source_name: &str,
        normalized_name: &str,
        category: &str,
        ai_confidence: f64,
        level: ProcessingLevel,
    ) -> QualityScore {
        let mut score = self.base_dimensions(source_name, normalized_name, category, ai_confidence, level);

        score.overall = cap(
            score.category_confidence * 0.20
                + score.name_clarity * 0.25
                + score.consistency * 0.20
                + score.completeness * 0.15
                + score.standardization * 0.20
                + score.ai_confidence_bonus,
        );
        self.finish(score)
    }

    /// Eight-dimension score plus AI bonus
    pub fn score_extended(
        &self,
        source_name: &str,
        normalized_name: &str,
        category: &str,
        ai_confidence: f64,
        level: ProcessingLevel,
        inputs: &ExtendedInputs<'_>,
    ) -> QualityScore {
        let mut score = self.base_dimensions(source_name, normalized_name, category, ai_confidence, level);

        let code = inputs.kpved_code.map(str::trim).unwrap_or_default();
        score.kpved_accuracy = evaluate_kpved_accuracy(code, inputs.kpved_confidence);
        score.duplicate_score = if inputs.is_duplicate { 0.0 } else { 1.0 };
        score.data_enrichment =
            evaluate_data_enrichment(inputs.ai_reasoning.unwrap_or_default(), code, level);
        score.extended = true;

        score.overall = cap(
            score.category_confidence * 0.15
                + score.name_clarity * 0.20
                + score.consistency * 0.15
                + score.completeness * 0.10
                + score.standardization * 0.15
                + score.kpved_accuracy * 0.15
                + score.duplicate_score * 0.05
                + score.data_enrichment * 0.05
                + score.ai_confidence_bonus,
        );
        self.finish(score)
    }

    fn base_dimensions(
        &self,
        source_name: &str,
        normalized_name: &str,
        category: &str,
        ai_confidence: f64,
        level: ProcessingLevel,
    ) -> QualityScore {
        let ai_confidence = if ai_confidence.is_nan() {
            0.0
        } else {
            ai_confidence.clamp(0.0, 1.0)
        };

        QualityScore {
            category_confidence: evaluate_category_confidence(category, source_name),
            name_clarity: evaluate_name_clarity(normalized_name),
            consistency: evaluate_consistency(source_name, normalized_name),
            completeness: evaluate_completeness(normalized_name, category),
            standardization: evaluate_standardization(normalized_name),
            ai_confidence_bonus: if level.involves_ai() && ai_confidence > 0.0 {
                ai_confidence * 0.1
            } else {
                0.0
            },
            ..Default::default()
        }
    }

    fn finish(&self, mut score: QualityScore) -> QualityScore {
        score.is_benchmark_quality = score.overall >= self.benchmark_threshold;
        score.issues = recommendations(&score);

        debug!(
            overall = score.overall,
            category = score.category_confidence,
            clarity = score.name_clarity,
            consistency = score.consistency,
            completeness = score.completeness,
            standardization = score.standardization,
            ai_bonus = score.ai_confidence_bonus,
            extended = score.extended,
            benchmark = score.is_benchmark_quality,
            "Quality scoring complete"
        );
        score
    }
}

fn cap(overall: f64) -> f64 {
    overall.clamp(0.0, 1.0)
}

fn recommendations(score: &QualityScore) -> Vec<String> {
    let mut issues = Vec::new();
    let mut check = |value: f64, label: &str| {
        if value < WEAK_DIMENSION {
            issues.push(format!("Low {}: {:.0}%", label, value * 100.0));
        }
    };

    check(score.category_confidence, "category confidence");
    check(score.name_clarity, "name clarity");
    check(score.consistency, "consistency");
    check(score.completeness, "completeness");
    check(score.standardization, "standardization");
    if score.extended {
        check(score.kpved_accuracy, "classifier code accuracy");
        check(score.duplicate_score, "uniqueness");
        check(score.data_enrichment, "data enrichment");
    }
    issues
}

fn is_fallback_category(category: &str) -> bool {
    let lowered = category.trim().to_lowercase();
    FALLBACK_CATEGORIES.contains(&lowered.as_str())
}

fn evaluate_category_confidence(category: &str, source_name: &str) -> f64 {
    if is_fallback_category(category) {
        return 0.3;
    }

    let category_lower = category.trim().to_lowercase();
    let Some((_, keywords)) = CATEGORY_KEYWORDS
        .iter()
        .find(|(name, _)| *name == category_lower)
    else {
        return 0.7;
    };

    let name_lower = source_name.to_lowercase();
    if keywords.iter().any(|keyword| name_lower.contains(keyword)) {
        0.95
    } else {
        0.6
    }
}

fn evaluate_name_clarity(name: &str) -> f64 {
    if name.is_empty() {
        return 0.0;
    }

    let mut score = 1.0;
    let len = name.chars().count();
    if len < 3 {
        score -= 0.5;
    } else if len < 10 {
        score -= 0.2;
    } else if len > 100 {
        score -= 0.3;
    } else if len > 50 {
        score -= 0.1;
    }

    let mut letters = 0usize;
    let mut digits = 0usize;
    let mut symbols = 0usize;
    for c in name.chars() {
        if c.is_alphabetic() {
            letters += 1;
        } else if c.is_numeric() {
            digits += 1;
        } else if !c.is_whitespace() {
            symbols += 1;
        }
    }

    if digits as f64 / len as f64 > 0.4 {
        score -= 0.2;
    }
    if symbols as f64 / len as f64 > 0.05 {
        score -= 0.3;
    }
    if letters == 0 {
        score -= 0.5;
    }
    if name != name.to_lowercase() {
        score -= 0.1;
    }

    f64::max(score, 0.0)
}

fn evaluate_consistency(source_name: &str, normalized_name: &str) -> f64 {
    if source_name.is_empty() || normalized_name.is_empty() {
        return 0.0;
    }

    let source_words = extract_keywords(source_name);
    if source_words.is_empty() {
        return 0.5;
    }
    let normalized_words = extract_keywords(normalized_name);

    let preserved = source_words
        .iter()
        .filter(|source| {
            normalized_words
                .iter()
                .any(|norm| norm.contains(source.as_str()) || source.contains(norm.as_str()))
        })
        .count();

    let rate = preserved as f64 / source_words.len() as f64;
    let mut score = 1.0;
    if rate < 0.3 {
        score -= 0.5;
    } else if rate < 0.5 {
        score -= 0.3;
    } else if rate < 0.7 {
        score -= 0.1;
    }
    f64::max(score, 0.0)
}

fn evaluate_completeness(normalized_name: &str, category: &str) -> f64 {
    let mut score = 1.0;
    if normalized_name.is_empty() {
        score -= 0.5;
    }
    if is_fallback_category(category) {
        score -= 0.3;
    }
    if extract_keywords(normalized_name).is_empty() {
        score -= 0.2;
    }
    f64::max(score, 0.0)
}

fn evaluate_standardization(name: &str) -> f64 {
    let mut score = 1.0;
    if name != name.trim() {
        score -= 0.2;
    }
    if name.contains("  ") {
        score -= 0.1;
    }

    let lowered = name.to_lowercase();
    if lowered.starts_with("арт") || lowered.starts_with("код") {
        score -= 0.3;
    }
    if name.starts_with('-') || name.ends_with('-') {
        score -= 0.1;
    }
    f64::max(score, 0.0)
}

fn evaluate_kpved_accuracy(code: &str, confidence: f64) -> f64 {
    if code.is_empty() {
        return 0.0;
    }

    let mut score = 0.4;
    if is_valid_kpved_format(code) {
        score += 0.3;
    }
    if confidence > 0.0 {
        score += confidence.min(1.0) * 0.3;
    }
    score.min(1.0)
}

fn evaluate_data_enrichment(reasoning: &str, code: &str, level: ProcessingLevel) -> f64 {
    let mut score: f64 = 0.0;
    if reasoning.trim().chars().count() > 10 {
        score += 0.4;
    }
    if !code.is_empty() {
        score += 0.3;
    }
    match level {
        ProcessingLevel::Benchmark => score += 0.3,
        ProcessingLevel::AiEnhanced => score += 0.2,
        ProcessingLevel::Basic => {}
    }
    score.min(1.0)
}

/// Keyword set of a name: lower-cased words of 3+ characters, trimmed of
/// edge punctuation, without stop words or numbers
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c| ".,!?;:-\"'".contains(c)))
        .filter(|word| word.chars().count() >= 3)
        .filter(|word| !STOP_WORDS.contains(word))
        .filter(|word| !is_numeric(word))
        .map(str::to_string)
        .collect()
}

fn is_numeric(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_numeric() || c == '.' || c == ',')
}

/// Classifier code format: 2-4 dot-separated groups of exactly two digits
pub fn is_valid_kpved_format(code: &str) -> bool {
    let parts: Vec<&str> = code.split('.').collect();
    (2..=4).contains(&parts.len())
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_digit()))
}
