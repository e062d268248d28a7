//! Canonical name construction
//!
//! Steps, in order: lower-case, remove detected spans, collapse whitespace,
//! trim whitespace and stray connector characters from both ends. Interior
//! punctuation is left alone.
//!
//! Lower-casing is applied per character, so the character offsets produced
//! by the detector still address the same characters after step one.

use crate::models::PatternMatch;
use crate::normalization::PatternDetector;

/// Characters trimmed from both ends of a normalized name
const CONNECTORS: &[char] = &['-', '+', ',', '.', '/', '\\', '|'];

/// Name normalizer
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    detector: PatternDetector,
}

impl NameNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer that uses a custom detector for [`Self::normalize_raw`]
    pub fn with_detector(detector: PatternDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &PatternDetector {
        &self.detector
    }

    /// Produce the canonical form of `raw`, removing the given spans
    ///
    /// Only auto-fixable matches are removed. Each removed span is replaced
    /// by a single space so the words around it never merge; the whitespace
    /// collapse that follows absorbs it.
    pub fn normalize(&self, raw: &str, matches: &[PatternMatch]) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut removed = vec![false; chars.len()];
        for m in matches.iter().filter(|m| m.auto_fixable) {
            let end = m.end.min(chars.len());
            for flag in removed.iter_mut().take(end).skip(m.start) {
                *flag = true;
            }
        }

        let mut lowered = String::with_capacity(raw.len());
        let mut in_gap = false;
        for (c, is_removed) in chars.iter().zip(&removed) {
            if *is_removed {
                if !in_gap {
                    lowered.push(' ');
                    in_gap = true;
                }
                continue;
            }
            in_gap = false;
            lowered.extend(c.to_lowercase());
        }

        let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .trim_matches(|c: char| c.is_whitespace() || CONNECTORS.contains(&c))
            .to_string()
    }

    /// Detect noise in `raw` and normalize in one call
    pub fn normalize_raw(&self, raw: &str) -> (String, Vec<PatternMatch>) {
        let matches = self.detector.detect_patterns(raw);
        let normalized = self.normalize(raw, &matches);
        (normalized, matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_name() {
        let normalizer = NameNormalizer::new();
        let (normalized, matches) = normalizer.normalize_raw("Молоток ER-00013004 100x100 50кг");
        assert_eq!(matches.len(), 3);
        assert_eq!(normalized, "молоток");
    }

    #[test]
    fn test_interior_noise_keeps_words_apart() {
        let normalizer = NameNormalizer::new();
        let (normalized, _) = normalizer.normalize_raw("Кабель ВВГ 3х2,5 медный");
        assert_eq!(normalized, "кабель ввг медный");
    }

    #[test]
    fn test_no_matches_only_cleans_spacing() {
        let normalizer = NameNormalizer::new();
        assert_eq!(
            normalizer.normalize("  Перчатки   Рабочие, Х/Б -", &[]),
            "перчатки рабочие, х/б"
        );
    }

    #[test]
    fn test_general_punctuation_is_kept() {
        let normalizer = NameNormalizer::new();
        assert_eq!(normalizer.normalize("Супер, клей!", &[]), "супер, клей!");
    }

    #[test]
    fn test_empty_input() {
        let normalizer = NameNormalizer::new();
        assert_eq!(normalizer.normalize("", &[]), "");
        assert_eq!(normalizer.normalize_raw("").0, "");
    }

    #[test]
    fn test_informational_matches_are_not_removed() {
        let normalizer = NameNormalizer::new();
        let name = "Дрель Bosch ударная";
        let entities = normalizer.detector().detect_entities(name);
        assert!(!entities.is_empty());
        assert_eq!(normalizer.normalize(name, &entities), "дрель bosch ударная");
    }

    #[test]
    fn test_idempotent() {
        let normalizer = NameNormalizer::new();
        let names = [
            "Молоток ER-00013004 100x100 50кг",
            "  -- Гвозди   строительные 4x100 ,",
            "№ 12 Краска «Эмаль» ПФ-115 белая 2,5 кг +",
            "Лампа LED 220в (тёплый свет)...",
            "",
        ];
        for name in names {
            let once = normalizer.normalize(name, &[]);
            assert_eq!(normalizer.normalize(&once, &[]), once, "{}", name);

            let (cleaned, _) = normalizer.normalize_raw(name);
            assert_eq!(normalizer.normalize(&cleaned, &[]), cleaned, "{}", name);
        }
    }

    #[test]
    fn test_out_of_range_match_is_clamped() {
        let normalizer = NameNormalizer::new();
        let mut matches = normalizer.detector().detect_patterns("Гвоздь 5кг");
        matches[0].end = 100;
        assert_eq!(normalizer.normalize("Гвоздь 5кг", &matches), "гвоздь");
    }
}
