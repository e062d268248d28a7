//! Detected noise spans

use serde::{Deserialize, Serialize};
use std::fmt;

/// Noise category detected in a raw name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Letter prefix, hyphen, digit run (`ER-00013004`)
    TechnicalCode,
    /// Article/SKU marker followed by a number (`арт. 12345`)
    ArticleCode,
    /// Numeric dimension group (`100x100`, `10х20х30`)
    Dimension,
    /// Number with a unit suffix (`50кг`, `2 л`)
    UnitQuantity,
    /// Stray code token at the start of the name (`№12`, `0012 -`)
    LeadingCode,
    /// Run of stray symbols (`***`, `@`)
    SpecialChars,
    /// Known brand name (informational)
    Brand,
    /// Product model designation (informational)
    Model,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::TechnicalCode => "technical_code",
            PatternType::ArticleCode => "article_code",
            PatternType::Dimension => "dimension",
            PatternType::UnitQuantity => "unit_quantity",
            PatternType::LeadingCode => "leading_code",
            PatternType::SpecialChars => "special_chars",
            PatternType::Brand => "brand",
            PatternType::Model => "model",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly a match degrades the name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One matched span
///
/// `start` and `end` are character offsets (half-open) into the scanned
/// name, so callers can excise multi-byte text precisely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_type: PatternType,
    pub matched_text: String,
    pub start: usize,
    pub end: usize,
    /// Detection confidence (0.0-1.0)
    pub confidence: f64,
    pub severity: Severity,
    /// Whether the normalizer may remove the span
    pub auto_fixable: bool,
    pub description: String,
}

impl PatternMatch {
    /// Span length in characters
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the two half-open spans share at least one character
    pub fn overlaps(&self, other: &PatternMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}
