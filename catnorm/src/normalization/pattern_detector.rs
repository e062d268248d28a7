//! Noise pattern detection
//!
//! Rules are evaluated in priority order. A candidate span that overlaps a
//! span accepted by an earlier (higher priority) rule is discarded, and
//! matches of one rule are taken left to right, so the output never holds
//! overlapping spans. Offsets are character offsets into the scanned name.
//!
//! Brand and model designations are detected separately by
//! [`PatternDetector::detect_entities`]; those matches are informational and
//! never removed by the normalizer.

use crate::error::{PipelineError, Result};
use crate::models::{PatternMatch, PatternType, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;

static TECHNICAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-ZА-ЯЁ]{2,5}-\d{4,10}\b").expect("valid technical code regex"));

static ARTICLE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:артикул|арт\.?|art\.?)\s*:?\s*\d+[-\w]*").expect("valid article regex")
});

static DIMENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d+(?:[.,]\d+)?\s?[xхXХ×*]\s?\d+(?:[.,]\d+)?(?:\s?[xхXХ×*]\s?\d+(?:[.,]\d+)?)?(?:\s?(?:мм|см|м|mm|cm|m)\b|\b)",
    )
    .expect("valid dimension regex")
});

static UNIT_QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:[.,]\d+)?(?:\s?(?:мм²|см²|м²|м³)|\s?(?:квт|мин|сек|шт|мм|см|мл|мг|кг|вт|kg|mm|cm|ml|м|л|г|m|l|g)\b|(?:в|а|ч)\b|\s?%)",
    )
    .expect("valid unit regex")
});

static LEADING_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[№#]\s*\d+[-\w]*\s*|\d+(?:[-./]\d+)*\s*-\s*|\d+(?:[-./]\d+)*\s+)")
        .expect("valid leading code regex")
});

static SPECIAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[@#$^&*_=+<>|~\\`]+").expect("valid special chars regex"));

static BRAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:Samsung|Apple|LG|Bosch|Sony|Philips|Siemens|Panasonic|Xiaomi|Huawei|Lenovo|",
        r"HP|Dell|Asus|Acer|MSI|Gigabyte|Intel|AMD|Nvidia|Canon|Nikon|Olympus|Fujifilm|",
        r"Whirlpool|Electrolux|Indesit|Ariston|Gorenje|Candy|Zanussi|Beko|Hotpoint|Miele|",
        r"Liebherr|AEG|Neff|Kuppersberg|Haier|Hisense|TCL|Sharp|Toshiba|Hitachi|JVC|Pioneer|",
        r"Grundig|Vestel|Midea|Artel|Shivaki|Atlant|Pozis|Норд|Бирюса|Саратов|Свияга|",
        r"Microsoft|Google|Motorola|Nokia|OnePlus|Oppo|Vivo|Realme|Honor|Redmi|Poco|",
        r"Tesla|Makita|DeWalt|Metabo|Stanley|Black\+Decker|Ryobi|Einhell)\b"
    ))
    .expect("valid brand regex")
});

static MODEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:[A-ZА-Я]{1,4}-?\d{2,5}[A-ZА-Я]?|[A-ZА-Я]{2,}\s?\d{1,3}(?:\s?(?:Pro|Max|Plus|Ultra|Mini|Lite|SE))?)\b",
    )
    .expect("valid model regex")
});

/// One detection rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern_type: PatternType,
    regex: Regex,
    pub confidence: f64,
    pub severity: Severity,
    pub auto_fixable: bool,
    pub description: String,
}

impl PatternRule {
    /// Build a rule from a regex source string
    pub fn new(
        pattern_type: PatternType,
        pattern: &str,
        confidence: f64,
        severity: Severity,
        description: impl Into<String>,
    ) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| PipelineError::Config(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self::from_regex(pattern_type, regex, confidence, severity, description))
    }

    fn from_regex(
        pattern_type: PatternType,
        regex: Regex,
        confidence: f64,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern_type,
            regex,
            confidence: confidence.clamp(0.0, 1.0),
            severity,
            auto_fixable: true,
            description: description.into(),
        }
    }

    fn informational(mut self) -> Self {
        self.auto_fixable = false;
        self
    }
}

/// Ordered rule set for noise detection
#[derive(Debug, Clone)]
pub struct PatternDetector {
    rules: Vec<PatternRule>,
    entity_rules: Vec<PatternRule>,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDetector {
    /// Detector with the built-in rules, highest priority first
    pub fn new() -> Self {
        let rules = vec![
            PatternRule::from_regex(
                PatternType::TechnicalCode,
                TECHNICAL_CODE.clone(),
                0.95,
                Severity::High,
                "technical code",
            ),
            PatternRule::from_regex(
                PatternType::ArticleCode,
                ARTICLE_CODE.clone(),
                0.90,
                Severity::High,
                "article number",
            ),
            PatternRule::from_regex(
                PatternType::Dimension,
                DIMENSION.clone(),
                0.85,
                Severity::Medium,
                "dimensions",
            ),
            PatternRule::from_regex(
                PatternType::UnitQuantity,
                UNIT_QUANTITY.clone(),
                0.80,
                Severity::Medium,
                "quantity with unit",
            ),
            PatternRule::from_regex(
                PatternType::LeadingCode,
                LEADING_CODE.clone(),
                0.75,
                Severity::Medium,
                "leading code token",
            ),
            PatternRule::from_regex(
                PatternType::SpecialChars,
                SPECIAL_CHARS.clone(),
                0.70,
                Severity::Low,
                "stray symbols",
            ),
        ];

        let entity_rules = vec![
            PatternRule::from_regex(PatternType::Brand, BRAND.clone(), 0.95, Severity::Low, "brand")
                .informational(),
            PatternRule::from_regex(PatternType::Model, MODEL.clone(), 0.85, Severity::Low, "model")
                .informational(),
        ];

        Self {
            rules,
            entity_rules,
        }
    }

    /// Append a rule with the lowest priority
    pub fn add_rule(&mut self, rule: PatternRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Non-overlapping noise matches, sorted by start offset
    pub fn detect_patterns(&self, name: &str) -> Vec<PatternMatch> {
        scan(&self.rules, name)
    }

    /// Brand and model matches (informational, never auto-fixable)
    pub fn detect_entities(&self, name: &str) -> Vec<PatternMatch> {
        scan(&self.entity_rules, name)
    }

    /// Match counts per pattern type
    pub fn summary(&self, matches: &[PatternMatch]) -> BTreeMap<PatternType, usize> {
        let mut counts = BTreeMap::new();
        for m in matches {
            *counts.entry(m.pattern_type).or_insert(0) += 1;
        }
        counts
    }

    /// Human-readable listing of matches
    pub fn format_report(&self, name: &str, matches: &[PatternMatch]) -> String {
        if matches.is_empty() {
            return format!("'{}': no noise patterns", name);
        }

        let mut report = format!("{} patterns in '{}':\n", matches.len(), name);
        for (i, m) in matches.iter().enumerate() {
            let _ = writeln!(
                report,
                "{}. [{:?}] {}: '{}' (chars {}..{}, confidence {:.2})",
                i + 1,
                m.severity,
                m.description,
                m.matched_text,
                m.start,
                m.end,
                m.confidence
            );
        }
        report
    }
}

/// Confidence of a pattern cleanup stage
///
/// 1.0 with no matches. Otherwise the mean match confidence (non
/// auto-fixable matches weighted by 0.7), scaled by 0.95 when every match is
/// auto-fixable and by 0.8 otherwise.
pub fn pattern_confidence(matches: &[PatternMatch]) -> f64 {
    if matches.is_empty() {
        return 1.0;
    }

    let total: f64 = matches
        .iter()
        .map(|m| {
            if m.auto_fixable {
                m.confidence
            } else {
                m.confidence * 0.7
            }
        })
        .sum();
    let average = total / matches.len() as f64;

    let factor = if matches.iter().all(|m| m.auto_fixable) {
        0.95
    } else {
        0.8
    };

    (average * factor).clamp(0.0, 1.0)
}

fn scan(rules: &[PatternRule], name: &str) -> Vec<PatternMatch> {
    let mut accepted: Vec<PatternMatch> = Vec::new();

    for rule in rules {
        for found in rule.regex.find_iter(name) {
            if found.as_str().trim().is_empty() {
                continue;
            }

            let start = char_offset(name, found.start());
            let candidate = PatternMatch {
                pattern_type: rule.pattern_type,
                matched_text: found.as_str().to_string(),
                start,
                end: start + found.as_str().chars().count(),
                confidence: rule.confidence,
                severity: rule.severity,
                auto_fixable: rule.auto_fixable,
                description: rule.description.clone(),
            };

            if accepted.iter().any(|m| m.overlaps(&candidate)) {
                continue;
            }
            accepted.push(candidate);
        }
    }

    accepted.sort_by_key(|m| m.start);
    accepted
}

fn char_offset(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}
