//! Name normalization
//!
//! Tokenizer → PatternDetector → NameNormalizer. All three are pure and
//! cheap to clone.

pub mod name_normalizer;
pub mod pattern_detector;
pub mod tokenizer;

pub use name_normalizer::NameNormalizer;
pub use pattern_detector::{pattern_confidence, PatternDetector, PatternRule};
pub use tokenizer::{StructureInfo, Token, TokenKind, Tokenizer};
